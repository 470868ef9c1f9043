//! HTTP server implementation.

use crate::auth::TOKEN_HEADER;
use crate::config::Config;
use crate::error::ServerError;
use crate::handler::{ApiRequest, CommandHandler};
use crate::metrics::Metrics;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_connections", &self.max_connections)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 1000,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

/// HTTP server for dbapi.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, handler: CommandHandler) -> Self {
        let handler = match config.metrics {
            Some(ref metrics) => handler.with_metrics(metrics.clone()),
            None => handler,
        };
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Creates a server with a fresh broker from configuration.
    pub fn from_config(config: &Config, metrics: Option<Arc<Metrics>>) -> Self {
        let mut server_config = ServerConfig::new(config.network.bind_addr);
        server_config.max_connections = config.network.max_connections;
        server_config.metrics = metrics;
        Self::new(server_config, CommandHandler::from_config(config))
    }

    pub fn handler(&self) -> &Arc<CommandHandler> {
        &self.handler
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Binds the configured address and runs until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accepts connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on http://{}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            self.spawn_connection(tcp_stream, addr);
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn spawn_connection(&self, tcp_stream: tokio::net::TcpStream, addr: SocketAddr) {
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.connections_total.inc();
            metrics.connections_active.inc();
        }

        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let metrics = self.config.metrics.clone();
        tokio::spawn(async move {
            tracing::debug!("Connection from {}", addr);
            let io = TokioIo::new(tcp_stream);
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { handle_http(req, addr, handler).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!("Connection error from {}: {}", addr, e);
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            if let Some(metrics) = metrics {
                metrics.connections_active.dec();
            }
        });
    }

    /// Signals the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns a receiver notified on shutdown, for companion tasks.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Converts one HTTP exchange into an [`ApiRequest`] and back.
async fn handle_http(
    req: Request<Incoming>,
    peer: SocketAddr,
    handler: Arc<CommandHandler>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let token = parts
        .headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!("Failed to read body from {}: {}", peer, e);
            return Ok(text_response(
                StatusCode::BAD_REQUEST,
                "Invalid data: unreadable request body",
            ));
        }
    };
    let Ok(body) = String::from_utf8(bytes.to_vec()) else {
        return Ok(text_response(
            StatusCode::BAD_REQUEST,
            "Invalid data: body is not UTF-8",
        ));
    };

    let request = ApiRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        token,
        peer,
        body,
    };
    let response = handler.handle(&request);
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(text_response(status, response.body))
}

/// Plain-text response with the given status.
pub(crate) fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
