// packages/bridge/src/utils/config.rs
//! Bridge configuration
//!
//! Sources, later ones winning:
//!
//! 1. Built-in defaults
//! 2. `vfs-bridge.{toml,yaml,json}` in the working directory, or the file
//!    named by `VFS_BRIDGE_CONFIG`
//! 3. Environment variables such as `VFS_BRIDGE__SERVER__PORT=9000`

use crate::interception::http_frontend::ServerConfig;
use crate::interception::interceptor::InterceptorConfig;
use crate::observability::ObservabilityConfig;
use crate::resolver::endpoint::ResolverConfig;
use crate::utils::errors::{BridgeError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "VFS_BRIDGE_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub interceptor: InterceptorConfig,
    pub resolver: ResolverConfig,
    pub observability: ObservabilityConfig,
}

impl BridgeConfig {
    /// Load from the default file locations and the environment
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(Some(Path::new(&path))),
            Err(_) => Self::load_from(None),
        }
    }

    /// Load from `path` (required) or the optional default file, plus the
    /// environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("vfs-bridge").required(false),
        };

        let config: BridgeConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("VFS_BRIDGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interceptor.request_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "interceptor.request_timeout_ms cannot be 0".to_string(),
            ));
        }

        if self.interceptor.handshake_timeout_ms == 0 || self.resolver.handshake_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "handshake timeouts cannot be 0".to_string(),
            ));
        }

        if !self.resolver.default_document.starts_with('/') {
            return Err(BridgeError::Config(format!(
                "resolver.default_document must start with '/': {}",
                self.resolver.default_document
            )));
        }

        self.server.listen_addr()?;
        self.server.resolver_addr()?;

        Ok(())
    }
}
