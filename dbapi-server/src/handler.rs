//! Request handlers.

use crate::auth::Authenticator;
use crate::broker::ChannelBroker;
use crate::config::Config;
use crate::error::ServerError;
use crate::metrics::Metrics;
use dbapi_protocol::{validate_identifier, InstanceInfo, Operation, Response};
use std::net::SocketAddr;
use std::sync::Arc;

/// A request as seen by the handler, detached from the HTTP stack.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    /// Request path including the leading slash.
    pub path: String,
    /// Raw `token` header value.
    pub token: Option<String>,
    pub peer: SocketAddr,
    pub body: String,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, peer: SocketAddr) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            token: None,
            peer,
            body: String::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Routes requests to the broker and instance endpoints.
pub struct CommandHandler {
    broker: Arc<ChannelBroker>,
    auth: Authenticator,
    info: InstanceInfo,
    metrics: Option<Arc<Metrics>>,
}

impl CommandHandler {
    pub fn new(broker: Arc<ChannelBroker>, auth: Authenticator) -> Self {
        Self {
            broker,
            auth,
            info: InstanceInfo::default(),
            metrics: None,
        }
    }

    /// Builds a handler with a fresh broker from configuration.
    pub fn from_config(config: &Config) -> Self {
        let broker = Arc::new(ChannelBroker::new(config.broker));
        Self::new(broker, Authenticator::new(&config.auth)).with_info(InstanceInfo {
            https_enabled: config.https.enabled,
            self_signed: config.https.enabled && config.https.self_signed,
            certificate: if config.https.enabled {
                config.https.certificate.clone()
            } else {
                String::new()
            },
        })
    }

    pub fn with_info(mut self, info: InstanceInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn broker(&self) -> &Arc<ChannelBroker> {
        &self.broker
    }

    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Refreshes the broker gauges.
    pub fn update_gauge_metrics(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.channels_total.set(self.broker.channel_count() as f64);
            metrics.messages_total.set(self.broker.message_count() as f64);
        }
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, request: &ApiRequest) -> Response {
        if request.path == "/" {
            return Response::ok(format!("dbapi {}", env!("CARGO_PKG_VERSION")));
        }

        if !self
            .auth
            .authorize(&request.path, request.peer, request.token.as_deref())
        {
            tracing::warn!(peer = %request.peer, path = %request.path, "rejected unauthenticated request");
            self.record_error(&ServerError::Unauthorized);
            return Response::new(ServerError::Unauthorized.status().as_u16(), "");
        }

        let Some((op, target)) = Operation::route(&request.path) else {
            tracing::debug!(path = %request.path, "no route");
            return self.error_response(ServerError::NotFound);
        };

        let op_name = op.to_string();
        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[op_name.as_str()])
                .start_timer()
        });

        let result = self.dispatch(op, target, request);

        if let Some(ref metrics) = self.metrics {
            metrics
                .requests_total
                .with_label_values(&[op_name.as_str()])
                .inc();
        }
        drop(timer);

        match result {
            Ok(body) => Response::ok(body),
            Err(e) => {
                tracing::debug!(%op, error = %e, "request failed");
                self.error_response(e)
            }
        }
    }

    fn dispatch(
        &self,
        op: Operation,
        target: Option<&str>,
        request: &ApiRequest,
    ) -> Result<String, ServerError> {
        let expected = op.method().as_str();
        if !request.method.eq_ignore_ascii_case(expected) {
            return Err(ServerError::MethodNotAllowed {
                op,
                expected,
                method: request.method.clone(),
            });
        }

        match op {
            Operation::ListChannels => Ok(serde_json::to_string(&self.broker.list())?),
            Operation::ReadChannel => {
                let batch = self.broker.read(channel_name(target)?);
                self.update_gauge_metrics();
                Ok(batch)
            }
            Operation::PeekChannel => Ok(self.broker.peek(channel_name(target)?)),
            Operation::SendChannel => self.handle_send(channel_name(target)?, &request.body),
            Operation::ClearChannel => {
                let channel = channel_name(target)?;
                self.broker.clear(channel)?;
                self.update_gauge_metrics();
                tracing::info!(channel, "channel cleared");
                Ok(String::new())
            }
            Operation::Info => Ok(serde_json::to_string(&self.info)?),
            _ => Err(ServerError::NotHosted(op)),
        }
    }

    fn handle_send(&self, channel: &str, body: &str) -> Result<String, ServerError> {
        let count = self.broker.send(channel, body)?;
        if let Some(ref metrics) = self.metrics {
            metrics.messages_sent_total.inc_by(count as f64);
        }
        self.update_gauge_metrics();
        Ok(String::new())
    }

    fn error_response(&self, error: ServerError) -> Response {
        self.record_error(&error);
        Response::new(error.status().as_u16(), error.to_string())
    }

    fn record_error(&self, error: &ServerError) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .errors_total
                .with_label_values(&[error.error_code()])
                .inc();
        }
    }
}

fn channel_name(target: Option<&str>) -> Result<&str, ServerError> {
    let channel = target.ok_or(ServerError::NotFound)?;
    validate_identifier(channel).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    Ok(channel)
}
