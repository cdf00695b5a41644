// packages/bridge/src/channel/message.rs
//! Wire messages exchanged between interceptor and resolver
//!
//! Every message is a JSON record tagged by a `type` discriminator:
//!
//! ```text
//! resolver    ──REGISTER_CLIENT──────────────────────────▶ interceptor
//! resolver    ◀─CLIENT_REGISTERED { clientId }─────────── interceptor
//! resolver    ◀─FETCH_REQUEST { requestId, payload }───── interceptor
//! resolver    ──FETCH_RESPONSE { requestId, payload }────▶ interceptor
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Allocate a fresh, practically collision-free id
            pub fn generate() -> Self {
                Self(Ulid::new().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Identifies one registered resolver channel
    ChannelId
);

opaque_id!(
    /// Correlates a forwarded request with its response
    RequestId
);

/// Messages carried by a bridge channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    /// Resolver announces itself on a freshly opened channel
    RegisterClient,

    /// Interceptor acknowledges a registration
    ClientRegistered {
        #[serde(rename = "clientId")]
        client_id: ChannelId,
    },

    /// Interceptor forwards a captured request
    FetchRequest {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        payload: FetchRequestPayload,
    },

    /// Resolver answers a forwarded request
    FetchResponse {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        payload: ResponseEnvelope,
    },
}

impl BridgeMessage {
    /// Discriminator name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::RegisterClient => "REGISTER_CLIENT",
            BridgeMessage::ClientRegistered { .. } => "CLIENT_REGISTERED",
            BridgeMessage::FetchRequest { .. } => "FETCH_REQUEST",
            BridgeMessage::FetchResponse { .. } => "FETCH_RESPONSE",
        }
    }
}

/// Request details forwarded to the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequestPayload {
    /// Full request URL
    pub url: String,

    /// URL path component, still percent-encoded
    pub path: String,

    /// HTTP method
    pub method: String,
}

impl FetchRequestPayload {
    pub fn get(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            method: "GET".to_string(),
        }
    }
}

/// Response headers carried in an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeaders {
    #[serde(rename = "contentType")]
    pub content_type: String,
}

/// Resolver's answer to a forwarded request
///
/// Exactly one of a successful body or `error` is meaningful. A receiver that
/// sees `error` treats the envelope as a failure regardless of the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Body as text
    pub response: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<EnvelopeHeaders>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response with an explicit status and content type
    pub fn ok(body: impl Into<String>, status: u16, content_type: impl Into<String>) -> Self {
        Self {
            response: body.into(),
            status: Some(status),
            headers: Some(EnvelopeHeaders {
                content_type: content_type.into(),
            }),
            error: None,
        }
    }

    /// Failed resolution carrying an error message
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            response: "Internal Server Error".to_string(),
            status: Some(500),
            headers: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
