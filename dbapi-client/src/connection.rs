//! Connection configuration and transports.

use crate::error::ClientError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dbapi_protocol::{Method, Request, Response, SchemaOptions, DEFAULT_PORT};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the base64-encoded access token.
pub const TOKEN_HEADER: &str = "token";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: String,
    pub port: u16,
    /// Access token issued by the server.
    pub token: Uuid,
    /// Use `https` instead of `http`.
    pub use_ssl: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Options applied when describing record types.
    pub schema_options: SchemaOptions,
}

impl ConnectionConfig {
    /// Creates a configuration. The token must be a GUID.
    pub fn new(host: impl Into<String>, token: &str) -> Result<Self, ClientError> {
        let host = host.into();
        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(ClientError::InvalidConfig(format!(
                "invalid host format: {:?}",
                host
            )));
        }
        let token = Uuid::parse_str(token.trim())
            .map_err(|_| ClientError::InvalidConfig("invalid token format".to_string()))?;

        Ok(Self {
            host,
            port: DEFAULT_PORT,
            token,
            use_ssl: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            schema_options: SchemaOptions::default(),
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Maps unsigned integer fields to same-width columns instead of
    /// rejecting them.
    pub fn with_allow_unsigned(mut self, allow: bool) -> Self {
        self.schema_options.allow_unsigned = allow;
        self
    }

    /// `http(s)://host:port`.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Value of the token header.
    pub fn token_header_value(&self) -> String {
        BASE64.encode(self.token.hyphenated().to_string())
    }
}

/// Sends one request and returns the raw response.
///
/// Suspension happens only here; everything above is synchronous.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, ClientError>> + Send;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: reqwest::Url,
    token: String,
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let base_url = reqwest::Url::parse(&config.base_url())
            .map_err(|e| ClientError::InvalidConfig(format!("invalid host format: {}", e)))?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token_header_value(),
        })
    }

    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let url = self
            .base_url
            .join(&request.path())
            .map_err(|e| ClientError::InvalidConfig(format!("invalid request path: {}", e)))?;
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token);
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Response::new(status, body))
    }
}
