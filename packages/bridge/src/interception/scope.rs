// packages/bridge/src/interception/scope.rs
//! Which requests the bridge virtualizes
//!
//! Requests to another origin, and paths belonging to the bridge itself
//! (control endpoints, bootstrap script), bypass interception. Serving those
//! through the bridge would recurse into it.

use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scope configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Origin (`scheme://host[:port]`) being virtualized; `None` accepts any
    pub origin: Option<String>,

    /// Paths starting with any of these bypass the bridge
    pub excluded_prefixes: Vec<String>,

    /// Paths containing any of these bypass the bridge
    pub excluded_substrings: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            origin: None,
            excluded_prefixes: vec!["/__bridge".to_string()],
            excluded_substrings: vec!["sw.js".to_string()],
        }
    }
}

/// Compiled scope check
#[derive(Debug, Clone)]
pub struct InterceptScope {
    origin: Option<String>,
    excluded_prefixes: Vec<String>,
    excluded_substrings: Vec<String>,
}

impl InterceptScope {
    pub fn new(config: &ScopeConfig) -> Self {
        Self {
            origin: config
                .origin
                .as_deref()
                .map(|o| o.trim_end_matches('/').to_ascii_lowercase()),
            excluded_prefixes: config.excluded_prefixes.clone(),
            excluded_substrings: config.excluded_substrings.clone(),
        }
    }

    /// Whether a request for `url` should be served by the bridge
    ///
    /// Relative URLs count as same-origin. Unparsable URLs bypass.
    pub fn should_intercept(&self, url: &str) -> bool {
        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                debug!("Bypassing unparsable URL {}: {}", url, e);
                return false;
            }
        };

        if let (Some(expected), Some(actual)) = (&self.origin, origin_of(&uri)) {
            if *expected != actual {
                debug!("Bypassing cross-origin request to {}", actual);
                return false;
            }
        }

        !self.is_excluded_path(uri.path())
    }

    pub fn is_excluded_path(&self, path: &str) -> bool {
        self.excluded_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.excluded_substrings.iter().any(|s| path.contains(s.as_str()))
    }
}

/// `scheme://authority` of an absolute URI, lowercased
pub fn origin_of(uri: &Uri) -> Option<String> {
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{}://{}", scheme, authority).to_ascii_lowercase())
}
