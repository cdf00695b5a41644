// packages/bridge/src/interception/mod.rs
//! Request interception layer
//!
//! This module captures outbound requests from the sandbox and serves them
//! through a resolver running in another context:
//!
//! - **Interceptor**: forwards captured requests and awaits the answer
//! - **Registration Broker**: live resolver channels, newest first
//! - **Pending Table**: correlation id to waiting continuation
//! - **Scope**: origin and path exclusions
//! - **Outcome**: HTTP-shaped responses and failure taxonomy
//! - **HTTP Front-end**: hyper server feeding the interceptor
//!
//! # Architecture
//!
//! ```text
//! Sandbox (guest VM / frame)
//!     │
//!     └─ HTTP request → HTTP Front-end → Interceptor ──FETCH_REQUEST──▶ Resolver
//!                                            ▲                            │
//!                                            └────────FETCH_RESPONSE──────┘
//! ```

pub mod broker;
pub mod http_frontend;
pub mod interceptor;
pub mod outcome;
pub mod pending;
pub mod scope;

// Re-export commonly used types
pub use broker::{RegistrationBroker, ResolverRegistration};
pub use http_frontend::{HttpFrontend, ServerConfig};
pub use interceptor::{InterceptedRequest, Interceptor, InterceptorConfig};
pub use outcome::{FetchFailure, InterceptedResponse};
pub use pending::{PendingRequestTable, Resolution};
pub use scope::{InterceptScope, ScopeConfig};
