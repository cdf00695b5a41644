// packages/bridge/src/interception/outcome.rs
//! HTTP-shaped results of an interception
//!
//! Every request captured by the interceptor ends in exactly one
//! `InterceptedResponse`, whether the resolver answered or not.

use crate::channel::message::ResponseEnvelope;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::fmt;

/// Directive attached to every resolved response
pub const NO_STORE: &str = "no-cache, no-store, must-revalidate";

/// Content type used when the resolver does not name one
pub const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// Ways a forwarded request can fail
///
/// A missing file is not a failure: it arrives as a normal 404 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// No resolver channel was registered
    NoResolver,

    /// No response arrived before the deadline
    Timeout,

    /// The resolver reported an error
    ResolverError(String),

    /// The resolver channel closed while the request was in flight
    Disconnected,
}

impl FetchFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            FetchFailure::NoResolver => StatusCode::SERVICE_UNAVAILABLE,
            FetchFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FetchFailure::ResolverError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FetchFailure::Disconnected => StatusCode::BAD_GATEWAY,
        }
    }

    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::NoResolver => "no_resolver",
            FetchFailure::Timeout => "timeout",
            FetchFailure::ResolverError(_) => "resolver_error",
            FetchFailure::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::NoResolver => f.write_str("No client channels available"),
            FetchFailure::Timeout => f.write_str("Request timeout"),
            FetchFailure::ResolverError(message) => f.write_str(message),
            FetchFailure::Disconnected => f.write_str("Resolver channel closed"),
        }
    }
}

/// Final response handed back to the network layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub cache_control: Option<&'static str>,
    pub body: Bytes,
}

impl InterceptedResponse {
    /// Build a success response, or the failure an error envelope stands for
    pub fn from_envelope(envelope: ResponseEnvelope) -> Result<Self, FetchFailure> {
        if let Some(error) = envelope.error {
            return Err(FetchFailure::ResolverError(error));
        }

        // An unset or zero status means success
        let status = match envelope.status {
            None | Some(0) => StatusCode::OK,
            Some(code) => StatusCode::from_u16(code).map_err(|_| {
                FetchFailure::ResolverError(format!("Resolver returned invalid status {}", code))
            })?,
        };

        let content_type = envelope
            .headers
            .map(|h| h.content_type)
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

        Ok(Self {
            status,
            content_type,
            cache_control: Some(NO_STORE),
            body: Bytes::from(envelope.response),
        })
    }

    pub fn failure(failure: &FetchFailure) -> Self {
        Self {
            status: failure.status(),
            content_type: FALLBACK_CONTENT_TYPE.to_string(),
            cache_control: None,
            body: Bytes::from(failure.to_string()),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: FALLBACK_CONTENT_TYPE.to_string(),
            cache_control: None,
            body: Bytes::from(body.into()),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_http(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;

        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
        response.headers_mut().insert(CONTENT_TYPE, content_type);

        if let Some(directive) = self.cache_control {
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static(directive));
        }

        response
    }
}
