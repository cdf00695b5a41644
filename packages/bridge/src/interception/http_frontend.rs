// packages/bridge/src/interception/http_frontend.rs
//! HTTP front-end for the interceptor
//!
//! Accepts plain HTTP/1 connections from the sandbox (a guest VM or an
//! embedded frame pointed at this address) and answers every in-scope request
//! through the bridge. Paths under `/__bridge/` are served locally.

use crate::interception::interceptor::{InterceptedRequest, Interceptor};
use crate::interception::outcome::InterceptedResponse;
use crate::utils::errors::{BridgeError, Result};
use crate::BuildInfo;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HOST;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Prefix of the bridge's own endpoints
pub const CONTROL_PREFIX: &str = "/__bridge";

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Address accepting resolvers over TCP, if any
    pub resolver_listen: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            resolver_listen: None,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| BridgeError::Config(format!("Invalid listen address: {}", e)))
    }

    pub fn resolver_addr(&self) -> Result<Option<SocketAddr>> {
        self.resolver_listen
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|e| {
                    BridgeError::Config(format!("Invalid resolver address {}: {}", addr, e))
                })
            })
            .transpose()
    }
}

/// HTTP server in front of an interceptor
pub struct HttpFrontend {
    interceptor: Arc<Interceptor>,
}

impl HttpFrontend {
    pub fn new(interceptor: Arc<Interceptor>) -> Self {
        Self { interceptor }
    }

    /// Accept connections until `shutdown` fires
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("HTTP front-end listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("HTTP front-end shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let frontend = Arc::clone(&self);

            tokio::spawn(async move {
                debug!("Accepted connection from {}", addr);

                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let frontend = Arc::clone(&frontend);
                    async move { Ok::<_, Infallible>(frontend.handle_request(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }

    /// Answer one HTTP request; the body is never read
    pub async fn handle_request<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let method = req.method().as_str().to_string();
        let path = req.uri().path().to_string();

        if path == CONTROL_PREFIX || path.starts_with(&format!("{}/", CONTROL_PREFIX)) {
            return self.handle_control(&path).into_http();
        }

        let url = absolute_url(&req);
        let request = InterceptedRequest {
            url,
            path,
            method,
        };

        match self.interceptor.handle(request).await {
            Some(response) => response.into_http(),
            None => InterceptedResponse::text(
                StatusCode::NOT_FOUND,
                "Outside the virtualized scope",
            )
            .into_http(),
        }
    }

    fn handle_control(&self, path: &str) -> InterceptedResponse {
        match path.trim_start_matches(CONTROL_PREFIX) {
            "/status" => {
                let info = BuildInfo::current();
                let broker = self.interceptor.broker();
                let active = broker.select_channel();
                let status = serde_json::json!({
                    "version": info.version,
                    "gitHash": info.git_hash,
                    "registeredChannels": broker.len(),
                    "channels": broker.channel_ids(),
                    "activeChannel": active.as_ref().map(|r| r.channel_id.clone()),
                    "activeSince": active.as_ref().map(|r| r.registered_at.to_rfc3339()),
                    "pendingRequests": self.interceptor.pending().len(),
                });

                InterceptedResponse {
                    content_type: "application/json".to_string(),
                    ..InterceptedResponse::text(StatusCode::OK, status.to_string())
                }
            }
            other => InterceptedResponse::text(
                StatusCode::NOT_FOUND,
                format!("Unknown control endpoint: {}", other),
            ),
        }
    }
}

/// Full URL of a request, rebuilt from the Host header for origin-form URIs
fn absolute_url<B>(req: &Request<B>) -> String {
    let uri = req.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }

    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("http://{}{}", host, path_and_query)
}
