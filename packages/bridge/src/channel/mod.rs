// packages/bridge/src/channel/mod.rs
//! Message channels between interceptor and resolver contexts
//!
//! - **Message**: tagged wire records and correlation ids
//! - **Port**: in-process bidirectional ports with close notification
//! - **Framed**: byte-stream transport carrying newline-delimited JSON

pub mod framed;
pub mod message;
pub mod port;

pub use framed::spawn_framed;
pub use message::{
    BridgeMessage, ChannelId, EnvelopeHeaders, FetchRequestPayload, RequestId, ResponseEnvelope,
};
pub use port::{MessagePort, PortReceiver, PortSender, Registrar};
