// packages/bridge/src/utils/errors.rs
//! Error types for the bridge library
//!
//! Request-level failures that end up as HTTP-shaped responses live in
//! `interception::outcome`; this enum covers everything that can fail as an
//! ordinary `Result`.

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Registration handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Virtual filesystem error: {0}")]
    Tree(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Observability setup failed: {0}")]
    Observability(String),
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for BridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        BridgeError::Tree(format!("Invalid YAML tree: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_display() {
        let err = BridgeError::HandshakeFailed("no REGISTER_CLIENT within 5000ms".to_string());
        assert_eq!(
            err.to_string(),
            "Registration handshake failed: no REGISTER_CLIENT within 5000ms"
        );
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err: BridgeError = yaml_err.into();
        assert!(matches!(err, BridgeError::Tree(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }
}
