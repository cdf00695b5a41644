// packages/bridge/src/interception/interceptor.rs
//! Request interceptor
//!
//! Captures requests from the sandbox and forwards them to the newest
//! registered resolver:
//!
//! ```text
//! intercept(request)
//!     │
//!     ├─ no channel ─────────────────────────▶ 503
//!     │
//!     ├─ requestId → pending table
//!     ├─ FETCH_REQUEST ─▶ resolver
//!     │
//!     ├─ FETCH_RESPONSE (error) ─────────────▶ 500
//!     ├─ FETCH_RESPONSE ─────────────────────▶ status / content type / no-store
//!     └─ deadline passed ────────────────────▶ 504
//! ```

use crate::channel::message::{BridgeMessage, ChannelId, FetchRequestPayload, RequestId};
use crate::channel::port::{MessagePort, Registrar};
use crate::channel::framed::spawn_framed;
use crate::interception::broker::RegistrationBroker;
use crate::interception::outcome::{FetchFailure, InterceptedResponse};
use crate::interception::pending::{PendingRequestTable, Resolution};
use crate::interception::scope::{InterceptScope, ScopeConfig};
use crate::utils::errors::{BridgeError, Result};
use hyper::Uri;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for the interceptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// How long a forwarded request may wait for its response (milliseconds)
    pub request_timeout_ms: u64,

    /// How long a new channel may take to announce itself (milliseconds)
    pub handshake_timeout_ms: u64,

    /// Fail in-flight requests as soon as their channel closes,
    /// instead of leaving them to the timeout
    pub cancel_on_disconnect: bool,

    /// Enable request logging
    pub log_requests: bool,

    /// Which requests are virtualized
    pub scope: ScopeConfig,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            handshake_timeout_ms: 5_000,
            cancel_on_disconnect: false,
            log_requests: true,
            scope: ScopeConfig::default(),
        }
    }
}

/// A captured outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub url: String,
    pub path: String,
    pub method: String,
}

impl InterceptedRequest {
    /// Build from a method and URL; the path is taken from the URL
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let path = url
            .parse::<Uri>()
            .map(|uri| uri.path().to_string())
            .unwrap_or_else(|_| "/".to_string());

        Self {
            url,
            path,
            method: method.into(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }
}

/// Interceptor owning the broker and the pending-request table
pub struct Interceptor {
    config: InterceptorConfig,
    scope: InterceptScope,
    broker: Arc<RegistrationBroker>,
    pending: Arc<PendingRequestTable>,
}

impl Interceptor {
    pub fn new(config: InterceptorConfig) -> Self {
        let scope = InterceptScope::new(&config.scope);

        Self {
            config,
            scope,
            broker: Arc::new(RegistrationBroker::new()),
            pending: Arc::new(PendingRequestTable::new()),
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn scope(&self) -> &InterceptScope {
        &self.scope
    }

    pub fn broker(&self) -> &RegistrationBroker {
        &self.broker
    }

    pub fn pending(&self) -> &PendingRequestTable {
        &self.pending
    }

    /// Intercept `request` if it is in scope; `None` means let it through
    pub async fn handle(&self, request: InterceptedRequest) -> Option<InterceptedResponse> {
        if !self.scope.should_intercept(&request.url) {
            debug!("Bypassing {} {}", request.method, request.url);
            return None;
        }
        Some(self.intercept(request).await)
    }

    /// Serve one captured request through a resolver
    ///
    /// Always produces a response; failures become 5xx responses.
    pub async fn intercept(&self, request: InterceptedRequest) -> InterceptedResponse {
        let started = std::time::Instant::now();

        if self.config.log_requests {
            debug!("Intercepted request: {} {}", request.method, request.url);
        }

        let outcome = self
            .forward(&request)
            .await
            .and_then(InterceptedResponse::from_envelope);

        let (label, response) = match outcome {
            Ok(response) => {
                let label = if response.status.is_success() { "ok" } else { "status" };
                (label, response)
            }
            Err(failure) => {
                warn!(
                    "{} {} failed: {} ({})",
                    request.method,
                    request.path,
                    failure,
                    failure.kind()
                );
                (failure.kind(), InterceptedResponse::failure(&failure))
            }
        };

        metrics::counter!("bridge_requests_total", "outcome" => label).increment(1);
        metrics::histogram!("bridge_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if self.config.log_requests {
            debug!("Response: {} for {}", response.status, request.path);
        }

        response
    }

    async fn forward(&self, request: &InterceptedRequest) -> Resolution {
        let Some(registration) = self.broker.select_channel() else {
            self.broker.evict_closed();
            return Err(FetchFailure::NoResolver);
        };

        let request_id = RequestId::generate();
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let deadline = Instant::now() + timeout;

        let mut continuation =
            self.pending
                .insert(request_id.clone(), registration.channel_id.clone(), deadline);
        let _guard = self.pending.track(request_id.clone());

        let message = BridgeMessage::FetchRequest {
            request_id: request_id.clone(),
            payload: FetchRequestPayload {
                url: request.url.clone(),
                path: request.path.clone(),
                method: request.method.clone(),
            },
        };

        if let Err(e) = registration.sender.send(message) {
            warn!("Channel {} unusable: {}", registration.channel_id, e);
            self.pending.discard(&request_id);
            self.broker.unregister(&registration.channel_id);
            return Err(FetchFailure::NoResolver);
        }

        debug!(
            "Forwarded {} as {} on channel {}",
            request.path, request_id, registration.channel_id
        );

        match tokio::time::timeout_at(deadline, &mut continuation).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(FetchFailure::Disconnected),
            Err(_) => {
                if self.pending.expire(&request_id) {
                    warn!(
                        "Request {} timed out after {}ms",
                        request_id, self.config.request_timeout_ms
                    );
                }
                // Whoever removed the entry has already resolved it
                continuation.await.unwrap_or(Err(FetchFailure::Timeout))
            }
        }
    }

    /// Run the registration handshake on a new channel and start routing its
    /// responses
    pub async fn attach(&self, port: MessagePort) -> Result<ChannelId> {
        let (sender, mut receiver) = port.into_split();
        let timeout = Duration::from_millis(self.config.handshake_timeout_ms);

        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(BridgeMessage::RegisterClient)) => {}
            Ok(Some(other)) => {
                sender.close();
                return Err(BridgeError::HandshakeFailed(format!(
                    "expected REGISTER_CLIENT, got {}",
                    other.kind()
                )));
            }
            Ok(None) => {
                return Err(BridgeError::HandshakeFailed(
                    "channel closed before REGISTER_CLIENT".to_string(),
                ))
            }
            Err(_) => {
                sender.close();
                return Err(BridgeError::HandshakeFailed(format!(
                    "no REGISTER_CLIENT within {}ms",
                    self.config.handshake_timeout_ms
                )));
            }
        }

        let channel_id = self.broker.register(sender.clone());

        if let Err(e) = sender.send(BridgeMessage::ClientRegistered {
            client_id: channel_id.clone(),
        }) {
            self.broker.unregister(&channel_id);
            return Err(e);
        }

        let broker = Arc::clone(&self.broker);
        let pending = Arc::clone(&self.pending);
        let cancel_on_disconnect = self.config.cancel_on_disconnect;
        let task_channel = channel_id.clone();

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    BridgeMessage::FetchResponse { request_id, payload } => {
                        if payload.is_error() {
                            debug!("Resolver reported an error for {}", request_id);
                        }
                        if !pending.complete(&request_id, payload) {
                            debug!("Discarding response for unknown request {}", request_id);
                        }
                    }
                    other => warn!("Unexpected {} on channel {}", other.kind(), task_channel),
                }
            }

            broker.unregister(&task_channel);

            if cancel_on_disconnect {
                let failed = pending.fail_channel(&task_channel, FetchFailure::Disconnected);
                if failed > 0 {
                    info!(
                        "Failed {} in-flight requests on closed channel {}",
                        failed, task_channel
                    );
                }
            }
        });

        Ok(channel_id)
    }

    /// Accept resolvers connecting over TCP until `shutdown` fires
    pub async fn accept_remote_resolvers(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("Accepting remote resolvers on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Resolver connection from {}", addr);
                        if let Err(e) = self.deliver(spawn_framed(stream)) {
                            error!("Failed to attach resolver from {}: {}", addr, e);
                        }
                    }
                    Err(e) => error!("Failed to accept resolver connection: {}", e),
                },
            }
        }

        Ok(())
    }
}

impl Registrar for Arc<Interceptor> {
    fn deliver(&self, port: MessagePort) -> Result<()> {
        let interceptor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = interceptor.attach(port).await {
                warn!("Resolver registration failed: {}", e);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::message::ResponseEnvelope;
    use hyper::StatusCode;

    fn fast_config() -> InterceptorConfig {
        InterceptorConfig {
            request_timeout_ms: 100,
            ..Default::default()
        }
    }

    /// Registers a hand-driven resolver and returns its end of the channel
    async fn manual_resolver(interceptor: &Interceptor) -> (ChannelId, MessagePort) {
        let (resolver_end, interceptor_end) = MessagePort::pair();
        resolver_end.send(BridgeMessage::RegisterClient).unwrap();

        let id = interceptor.attach(interceptor_end).await.unwrap();
        let mut resolver_end = resolver_end;
        match resolver_end.recv().await {
            Some(BridgeMessage::ClientRegistered { client_id }) => assert_eq!(client_id, id),
            other => panic!("unexpected: {:?}", other),
        }
        (id, resolver_end)
    }

    async fn next_request(port: &mut MessagePort) -> (RequestId, FetchRequestPayload) {
        match port.recv().await {
            Some(BridgeMessage::FetchRequest { request_id, payload }) => (request_id, payload),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_config_default() {
        let config = InterceptorConfig::default();
        assert_eq!(config.request_timeout_ms, 10_000);
        assert!(!config.cancel_on_disconnect);
        assert!(config.log_requests);
    }

    #[test]
    fn test_request_path_from_url() {
        let request = InterceptedRequest::get("http://localhost:8080/styles/style.css?v=1");
        assert_eq!(request.path, "/styles/style.css");
        assert_eq!(request.method, "GET");
    }

    #[tokio::test]
    async fn test_no_resolver_fails_fast() {
        let interceptor = Interceptor::new(InterceptorConfig::default());

        let started = std::time::Instant::now();
        let response = interceptor
            .intercept(InterceptedRequest::get("http://localhost/"))
            .await;

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(interceptor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_response_is_routed_by_request_id() {
        let interceptor = Arc::new(Interceptor::new(InterceptorConfig::default()));
        let (_id, mut resolver) = manual_resolver(&interceptor).await;

        let call = {
            let interceptor = Arc::clone(&interceptor);
            tokio::spawn(async move {
                interceptor
                    .intercept(InterceptedRequest::get("http://localhost/app.js"))
                    .await
            })
        };

        let (request_id, payload) = next_request(&mut resolver).await;
        assert_eq!(payload.path, "/app.js");
        assert!(interceptor.pending().contains(&request_id));

        resolver
            .send(BridgeMessage::FetchResponse {
                request_id: request_id.clone(),
                payload: ResponseEnvelope::ok("console.log(1)", 200, "application/javascript"),
            })
            .unwrap();

        let response = call.await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, "application/javascript");
        assert_eq!(response.body_text(), "console.log(1)");
        assert!(!interceptor.pending().contains(&request_id));
    }

    #[tokio::test]
    async fn test_timeout_then_late_response_is_discarded() {
        let interceptor = Arc::new(Interceptor::new(fast_config()));
        let (_id, mut resolver) = manual_resolver(&interceptor).await;

        let call = {
            let interceptor = Arc::clone(&interceptor);
            tokio::spawn(async move {
                interceptor
                    .intercept(InterceptedRequest::get("http://localhost/slow"))
                    .await
            })
        };

        let (request_id, _) = next_request(&mut resolver).await;
        let response = call.await.unwrap();

        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.body_text(), "Request timeout");
        assert!(!interceptor.pending().contains(&request_id));

        // Late answer must not disturb anything
        resolver
            .send(BridgeMessage::FetchResponse {
                request_id,
                payload: ResponseEnvelope::ok("late", 200, "text/plain"),
            })
            .unwrap();
        tokio::task::yield_now().await;
        assert!(interceptor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_error_is_500() {
        let interceptor = Arc::new(Interceptor::new(InterceptorConfig::default()));
        let (_id, mut resolver) = manual_resolver(&interceptor).await;

        let call = {
            let interceptor = Arc::clone(&interceptor);
            tokio::spawn(async move {
                interceptor
                    .intercept(InterceptedRequest::get("http://localhost/x"))
                    .await
            })
        };

        let (request_id, _) = next_request(&mut resolver).await;
        resolver
            .send(BridgeMessage::FetchResponse {
                request_id,
                payload: ResponseEnvelope::failure("lookup failed"),
            })
            .unwrap();

        let response = call.await.unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body_text(), "lookup failed");
    }

    #[tokio::test]
    async fn test_closed_channel_is_unregistered() {
        let interceptor = Arc::new(Interceptor::new(InterceptorConfig::default()));
        let (id, resolver) = manual_resolver(&interceptor).await;
        assert_eq!(interceptor.broker().channel_ids(), vec![id]);

        resolver.close();

        for _ in 0..100 {
            if interceptor.broker().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(interceptor.broker().is_empty());

        let response = interceptor
            .intercept(InterceptedRequest::get("http://localhost/"))
            .await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cancel_on_disconnect() {
        let config = InterceptorConfig {
            cancel_on_disconnect: true,
            ..Default::default()
        };
        let interceptor = Arc::new(Interceptor::new(config));
        let (_id, mut resolver) = manual_resolver(&interceptor).await;

        let call = {
            let interceptor = Arc::clone(&interceptor);
            tokio::spawn(async move {
                interceptor
                    .intercept(InterceptedRequest::get("http://localhost/app.js"))
                    .await
            })
        };

        let _ = next_request(&mut resolver).await;
        resolver.close();

        let response = call.await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert!(interceptor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_first_message() {
        let interceptor = Interceptor::new(InterceptorConfig::default());
        let (resolver_end, interceptor_end) = MessagePort::pair();
        resolver_end
            .send(BridgeMessage::ClientRegistered {
                client_id: "bogus".into(),
            })
            .unwrap();

        let result = interceptor.attach(interceptor_end).await;

        assert!(matches!(result, Err(BridgeError::HandshakeFailed(_))));
        assert!(interceptor.broker().is_empty());
        assert!(resolver_end.sender.is_closed());
    }

    #[tokio::test]
    async fn test_out_of_scope_request_bypasses() {
        let interceptor = Interceptor::new(InterceptorConfig::default());
        let bypassed = interceptor
            .handle(InterceptedRequest::get("http://localhost/__bridge/status"))
            .await;
        assert!(bypassed.is_none());
    }

    #[tokio::test]
    async fn test_abandoned_request_leaves_no_entry() {
        let interceptor = Arc::new(Interceptor::new(InterceptorConfig::default()));
        let (_id, mut resolver) = manual_resolver(&interceptor).await;

        let call = {
            let interceptor = Arc::clone(&interceptor);
            tokio::spawn(async move {
                interceptor
                    .intercept(InterceptedRequest::get("http://localhost/hang"))
                    .await
            })
        };

        let (request_id, _) = next_request(&mut resolver).await;
        assert!(interceptor.pending().contains(&request_id));

        call.abort();
        let _ = call.await;

        assert!(!interceptor.pending().contains(&request_id));
    }
}
