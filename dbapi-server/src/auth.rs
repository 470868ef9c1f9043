//! Token-based authentication.
//!
//! Tokens are GUIDs. Callers send them base64-encoded in the `token`
//! header. Configured tokens are validated against SHA-256 hashes of their
//! hyphen-less form, so plaintext tokens never reach configuration.
//! A per-process session token is accepted as well and is logged at startup.

use crate::config::AuthConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::net::SocketAddr;
use uuid::Uuid;

/// Header carrying the base64-encoded token.
pub const TOKEN_HEADER: &str = "token";

/// Validates tokens against pre-configured hashes.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    /// Set of valid token hashes (SHA-256 hex strings).
    valid_hashes: HashSet<String>,
    session_token: Uuid,
}

impl TokenValidator {
    /// Creates a new validator with the given token hashes and a fresh
    /// session token.
    pub fn new(hashes: impl IntoIterator<Item = String>) -> Self {
        Self {
            valid_hashes: hashes
                .into_iter()
                .map(|hash| hash.to_ascii_lowercase())
                .collect(),
            session_token: Uuid::new_v4(),
        }
    }

    /// Returns whether any tokens are configured.
    pub fn has_tokens(&self) -> bool {
        !self.valid_hashes.is_empty()
    }

    /// Returns the number of configured tokens.
    pub fn token_count(&self) -> usize {
        self.valid_hashes.len()
    }

    pub fn session_token(&self) -> Uuid {
        self.session_token
    }

    /// Validates a plaintext token.
    ///
    /// Trailing NUL padding and surrounding whitespace are ignored; the rest
    /// must parse as a GUID in any of its textual forms.
    pub fn validate(&self, token: &str) -> bool {
        let token = token.trim_end_matches('\0').trim();
        let Ok(guid) = Uuid::parse_str(token) else {
            return false;
        };
        guid == self.session_token || self.valid_hashes.contains(&Self::hash_token(&guid))
    }

    /// Decodes a `token` header value and validates it.
    pub fn validate_header(&self, header: &str) -> bool {
        let Ok(bytes) = BASE64.decode(header.trim()) else {
            return false;
        };
        match String::from_utf8(bytes) {
            Ok(token) => self.validate(&token),
            Err(_) => false,
        }
    }

    /// Hashes a token using SHA-256, returning a lowercase hex string.
    pub fn hash_token(token: &Uuid) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.simple().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Encodes a token the way clients send it.
    pub fn encode_header(token: &Uuid) -> String {
        BASE64.encode(token.hyphenated().to_string())
    }
}

/// Decides whether a request may proceed.
#[derive(Debug, Clone)]
pub struct Authenticator {
    validator: TokenValidator,
    required: bool,
    require_token_for_localhost: bool,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            validator: TokenValidator::new(config.token_hashes.iter().cloned()),
            required: config.required,
            require_token_for_localhost: config.require_token_for_localhost,
        }
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns whether a request to `path` from `peer` carrying `header`
    /// is allowed.
    ///
    /// The root path is always open. Loopback callers skip the check unless
    /// `require_token_for_localhost` is set.
    pub fn authorize(&self, path: &str, peer: SocketAddr, header: Option<&str>) -> bool {
        if !self.required || path == "/" {
            return true;
        }
        if !self.require_token_for_localhost && peer.ip().is_loopback() {
            return true;
        }
        match header {
            Some(value) if !value.is_empty() => self.validator.validate_header(value),
            _ => false,
        }
    }
}
