// packages/bridge/src/resolver/endpoint.rs
//! Resolver endpoint
//!
//! Runs next to the project tree. It announces itself to an interceptor over
//! a fresh channel, then answers every `FETCH_REQUEST` arriving on that
//! channel with exactly one `FETCH_RESPONSE`, including when resolution
//! fails or panics.

use crate::channel::message::{
    BridgeMessage, ChannelId, FetchRequestPayload, RequestId, ResponseEnvelope,
};
use crate::channel::port::{MessagePort, PortSender, Registrar};
use crate::resolver::auto_index::{self, AUTO_INDEX_MEDIA_TYPE};
use crate::resolver::content::resolve;
use crate::resolver::media_type::DEFAULT_MEDIA_TYPE;
use crate::utils::errors::{BridgeError, Result};
use crate::vfs::TreeSource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Document served for the root path
    pub default_document: String,

    /// Generate a listing when the default document is missing
    pub auto_index: bool,

    /// Optional JSON/YAML file holding the initial tree
    pub tree_path: Option<PathBuf>,

    /// How long to wait for `CLIENT_REGISTERED` (milliseconds)
    pub handshake_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_document: "/index.html".to_string(),
            auto_index: true,
            tree_path: None,
            handshake_timeout_ms: 5_000,
        }
    }
}

/// Registration lifecycle as seen from the resolver side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegistrationState {
    #[default]
    Unregistered,
    Registering,
    Registered,
    Closed,
}

/// Answers forwarded requests from a tree source
pub struct ResolverEndpoint<S> {
    source: S,
    config: ResolverConfig,
}

impl<S: TreeSource + 'static> ResolverEndpoint<S> {
    pub fn new(source: S, config: ResolverConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Map empty and root paths onto the default document
    pub fn normalize_path(&self, path: &str) -> String {
        match path {
            "" | "/" => self.config.default_document.clone(),
            p if p.starts_with('/') => p.to_string(),
            p => format!("/{}", p),
        }
    }

    /// Produce the response for one forwarded request
    ///
    /// Never fails: errors and panics become an error envelope.
    pub fn on_request(&self, request: &FetchRequestPayload) -> ResponseEnvelope {
        let envelope = match catch_unwind(AssertUnwindSafe(|| self.try_resolve(request))) {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                error!("Failed to resolve {}: {}", request.path, e);
                ResponseEnvelope::failure(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Resolver panicked on {}: {}", request.path, message);
                ResponseEnvelope::failure(message)
            }
        };

        let status = envelope.status.unwrap_or(200);
        metrics::counter!("bridge_resolver_requests_total", "status" => status.to_string())
            .increment(1);

        envelope
    }

    fn try_resolve(&self, request: &FetchRequestPayload) -> Result<ResponseEnvelope> {
        let path = self.normalize_path(&request.path);
        let tree = self.source.tree()?;

        if let Some(found) = resolve(&path, &tree) {
            debug!("Resolved {} as {}", path, found.media_type);
            return Ok(ResponseEnvelope::ok(found.content, 200, found.media_type));
        }

        if self.config.auto_index && path == self.config.default_document {
            debug!("No {}, serving generated index", path);
            return Ok(ResponseEnvelope::ok(
                auto_index::render(&tree),
                200,
                AUTO_INDEX_MEDIA_TYPE,
            ));
        }

        debug!("Not found: {}", path);
        Ok(ResponseEnvelope::ok("File not found", 404, DEFAULT_MEDIA_TYPE))
    }

    /// Open a new channel, hand one end to `registrar` and serve the other
    pub async fn register_with(
        self: &Arc<Self>,
        registrar: &dyn Registrar,
    ) -> Result<ResolverSession> {
        let (local, remote) = MessagePort::pair();
        registrar.deliver(remote)?;
        self.serve_port(local).await
    }

    /// Register over an already connected port and start serving it
    pub async fn serve_port(self: &Arc<Self>, port: MessagePort) -> Result<ResolverSession> {
        let state = Arc::new(Mutex::new(RegistrationState::default()));
        let (sender, mut receiver) = port.into_split();

        if let Err(e) = sender.send(BridgeMessage::RegisterClient) {
            transition(&state, RegistrationState::Closed);
            return Err(e);
        }
        transition(&state, RegistrationState::Registering);

        // A request can overtake the acknowledgement; keep it for later.
        let mut early = Vec::new();
        let handshake = async {
            loop {
                match receiver.recv().await {
                    Some(BridgeMessage::ClientRegistered { client_id }) => return Ok(client_id),
                    Some(BridgeMessage::FetchRequest { request_id, payload }) => {
                        early.push((request_id, payload))
                    }
                    Some(other) => warn!("Ignoring {} before registration", other.kind()),
                    None => {
                        return Err(BridgeError::ChannelClosed(
                            "closed before CLIENT_REGISTERED".to_string(),
                        ))
                    }
                }
            }
        };

        let timeout = Duration::from_millis(self.config.handshake_timeout_ms);
        let client_id = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(client_id)) => client_id,
            Ok(Err(e)) => {
                transition(&state, RegistrationState::Closed);
                return Err(BridgeError::HandshakeFailed(e.to_string()));
            }
            Err(_) => {
                sender.close();
                transition(&state, RegistrationState::Closed);
                return Err(BridgeError::HandshakeFailed(format!(
                    "no acknowledgement within {}ms",
                    self.config.handshake_timeout_ms
                )));
            }
        };

        transition(&state, RegistrationState::Registered);
        info!("Resolver registered as {}", client_id);

        let endpoint = Arc::clone(self);
        let task_sender = sender.clone();
        let task_state = Arc::clone(&state);
        let task_client = client_id.clone();

        let task = tokio::spawn(async move {
            let mut open = true;
            for (request_id, payload) in early {
                if !endpoint.answer(&task_sender, request_id, &payload) {
                    open = false;
                    break;
                }
            }

            while open {
                match receiver.recv().await {
                    Some(BridgeMessage::FetchRequest { request_id, payload }) => {
                        open = endpoint.answer(&task_sender, request_id, &payload);
                    }
                    Some(BridgeMessage::ClientRegistered { .. }) => {
                        debug!("Duplicate CLIENT_REGISTERED on {}", task_client)
                    }
                    Some(other) => warn!("Unexpected {} on {}", other.kind(), task_client),
                    None => open = false,
                }
            }

            transition(&task_state, RegistrationState::Closed);
            info!("Resolver channel {} closed", task_client);
        });

        Ok(ResolverSession {
            client_id,
            sender,
            state,
            task,
        })
    }

    fn answer(
        &self,
        sender: &PortSender,
        request_id: RequestId,
        payload: &FetchRequestPayload,
    ) -> bool {
        debug!("{} {} ({})", payload.method, payload.path, request_id);
        let response = self.on_request(payload);

        match sender.send(BridgeMessage::FetchResponse {
            request_id,
            payload: response,
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not deliver response: {}", e);
                false
            }
        }
    }
}

/// A registered resolver channel
pub struct ResolverSession {
    client_id: ChannelId,
    sender: PortSender,
    state: Arc<Mutex<RegistrationState>>,
    task: JoinHandle<()>,
}

impl ResolverSession {
    /// Id assigned by the interceptor's broker
    pub fn client_id(&self) -> &ChannelId {
        &self.client_id
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.lock()
    }

    /// Resolves once the channel closes from either side
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    /// Close the channel and wait for the serve loop to finish
    pub async fn close(self) {
        self.sender.close();
        if let Err(e) = self.task.await {
            warn!("Resolver task for {} ended abnormally: {}", self.client_id, e);
        }
    }
}

/// Move to `next`, returning the previous state
fn transition(state: &Mutex<RegistrationState>, next: RegistrationState) -> RegistrationState {
    let previous = std::mem::replace(&mut *state.lock(), next);
    debug!("Registration state {:?} -> {:?}", previous, next);
    previous
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("resolver panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("resolver panicked: {}", s)
    } else {
        "resolver panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{SharedTree, VirtualFile};

    struct FailingSource;

    impl TreeSource for FailingSource {
        fn tree(&self) -> Result<Arc<VirtualFile>> {
            Err(BridgeError::Tree("store unavailable".to_string()))
        }
    }

    struct PanickingSource;

    impl TreeSource for PanickingSource {
        fn tree(&self) -> Result<Arc<VirtualFile>> {
            panic!("tree exploded")
        }
    }

    fn demo_endpoint() -> ResolverEndpoint<SharedTree> {
        ResolverEndpoint::new(
            SharedTree::new(VirtualFile::demo_project()),
            ResolverConfig::default(),
        )
    }

    fn get(path: &str) -> FetchRequestPayload {
        FetchRequestPayload::get(format!("http://localhost{}", path), path)
    }

    #[test]
    fn test_config_default() {
        let config = ResolverConfig::default();
        assert_eq!(config.default_document, "/index.html");
        assert!(config.auto_index);
    }

    #[test]
    fn test_normalize_path() {
        let endpoint = demo_endpoint();
        assert_eq!(endpoint.normalize_path("/"), "/index.html");
        assert_eq!(endpoint.normalize_path(""), "/index.html");
        assert_eq!(endpoint.normalize_path("app.js"), "/app.js");
        assert_eq!(endpoint.normalize_path("/a/b"), "/a/b");
    }

    #[test]
    fn test_root_equals_index() {
        let endpoint = demo_endpoint();
        assert_eq!(endpoint.on_request(&get("/")), endpoint.on_request(&get("/index.html")));
    }

    #[test]
    fn test_found_file_has_media_type() {
        let response = demo_endpoint().on_request(&get("/styles/style.css"));
        assert_eq!(response.status, Some(200));
        assert_eq!(response.headers.unwrap().content_type, "text/css");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_missing_file_is_404_plain_text() {
        let response = demo_endpoint().on_request(&get("/missing.txt"));
        assert_eq!(response.status, Some(404));
        assert_eq!(response.response, "File not found");
        assert_eq!(response.headers.unwrap().content_type, "text/plain");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_auto_index_when_no_index_html() {
        let tree = VirtualFile::folder(
            "project",
            vec![
                VirtualFile::file("app.js", "1"),
                VirtualFile::folder("styles", vec![VirtualFile::file("style.css", "")]),
            ],
        );
        let endpoint = ResolverEndpoint::new(SharedTree::new(tree), ResolverConfig::default());

        let response = endpoint.on_request(&get("/"));
        assert_eq!(response.status, Some(200));
        assert_eq!(response.headers.unwrap().content_type, "text/html");
        assert!(response.response.contains(r#"href="/app.js""#));
        assert!(response.response.contains(r#"href="/styles/style.css""#));
        assert!(response.response.contains("styles/</li>"));
    }

    #[test]
    fn test_auto_index_can_be_disabled() {
        let config = ResolverConfig {
            auto_index: false,
            ..Default::default()
        };
        let endpoint =
            ResolverEndpoint::new(SharedTree::new(VirtualFile::folder("p", vec![])), config);
        assert_eq!(endpoint.on_request(&get("/")).status, Some(404));
    }

    #[test]
    fn test_source_error_becomes_error_envelope() {
        let endpoint = ResolverEndpoint::new(FailingSource, ResolverConfig::default());
        let response = endpoint.on_request(&get("/app.js"));
        assert_eq!(response.status, Some(500));
        assert!(response.error.unwrap().contains("store unavailable"));
    }

    #[test]
    fn test_panic_becomes_error_envelope() {
        let endpoint = ResolverEndpoint::new(PanickingSource, ResolverConfig::default());
        let response = endpoint.on_request(&get("/app.js"));
        assert_eq!(response.status, Some(500));
        assert!(response.error.unwrap().contains("tree exploded"));
    }

    #[test]
    fn test_state_starts_unregistered() {
        let state = Mutex::new(RegistrationState::default());

        assert_eq!(
            transition(&state, RegistrationState::Registering),
            RegistrationState::Unregistered
        );
        assert_eq!(
            transition(&state, RegistrationState::Registered),
            RegistrationState::Registering
        );
        assert_eq!(*state.lock(), RegistrationState::Registered);
    }

    #[tokio::test]
    async fn test_handshake_and_serve_over_port() {
        let endpoint = Arc::new(demo_endpoint());
        let (local, mut remote) = MessagePort::pair();

        let serving = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move { endpoint.serve_port(local).await })
        };

        assert_eq!(remote.recv().await, Some(BridgeMessage::RegisterClient));
        remote
            .send(BridgeMessage::ClientRegistered {
                client_id: "chan-1".into(),
            })
            .unwrap();

        let session = serving.await.unwrap().unwrap();
        assert_eq!(session.client_id().as_str(), "chan-1");
        assert_eq!(session.state(), RegistrationState::Registered);

        remote
            .send(BridgeMessage::FetchRequest {
                request_id: "r1".into(),
                payload: get("/app.js"),
            })
            .unwrap();

        match remote.recv().await {
            Some(BridgeMessage::FetchResponse { request_id, payload }) => {
                assert_eq!(request_id.as_str(), "r1");
                assert_eq!(payload.status, Some(200));
            }
            other => panic!("unexpected: {:?}", other),
        }

        remote.close();
        session.closed().await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_request_before_ack_is_answered() {
        let endpoint = Arc::new(demo_endpoint());
        let (local, mut remote) = MessagePort::pair();

        remote
            .send(BridgeMessage::FetchRequest {
                request_id: "early".into(),
                payload: get("/app.js"),
            })
            .unwrap();
        remote
            .send(BridgeMessage::ClientRegistered {
                client_id: "chan-2".into(),
            })
            .unwrap();

        let session = endpoint.serve_port(local).await.unwrap();

        assert_eq!(remote.recv().await, Some(BridgeMessage::RegisterClient));
        match remote.recv().await {
            Some(BridgeMessage::FetchResponse { request_id, .. }) => {
                assert_eq!(request_id.as_str(), "early")
            }
            other => panic!("unexpected: {:?}", other),
        }

        session.close().await;
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        let config = ResolverConfig {
            handshake_timeout_ms: 20,
            ..Default::default()
        };
        let endpoint = Arc::new(ResolverEndpoint::new(
            SharedTree::new(VirtualFile::demo_project()),
            config,
        ));
        let (local, _remote) = MessagePort::pair();

        let result = endpoint.serve_port(local).await;
        assert!(matches!(result, Err(BridgeError::HandshakeFailed(_))));
    }
}
