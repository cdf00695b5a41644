// packages/bridge/src/lib.rs
//! VFS Bridge Library
//!
//! Serves a sandboxed preview's network requests from an in-memory project
//! tree that lives in another execution context.
//!
//! # Architecture
//!
//! - **channel**: message ports, wire messages, framed transport
//! - **interception**: interceptor, registration broker, pending requests
//! - **resolver**: resolver endpoint, content lookup, auto-index
//! - **vfs**: the in-memory project tree
//! - **observability**: tracing and metrics
//! - **utils**: configuration and errors

// Public module exports
pub mod channel;
pub mod interception;
pub mod observability;
pub mod resolver;
pub mod utils;
pub mod vfs;

// Re-export commonly used types
pub use channel::{BridgeMessage, ChannelId, MessagePort, RequestId};
pub use interception::{HttpFrontend, InterceptedRequest, InterceptedResponse, Interceptor};
pub use resolver::{ResolverConfig, ResolverEndpoint, ResolverSession};
pub use utils::config::BridgeConfig;
pub use utils::errors::{BridgeError, Result};
pub use vfs::{SharedTree, VirtualFile};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Bridge build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
