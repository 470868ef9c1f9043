//! Endpoint catalogue, request bodies and response payloads.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path prefix shared by every versioned endpoint.
pub const API_BASE: &str = "Application/V1/";

/// Separates the two halves of select and update bodies.
pub const BODY_SEPARATOR: char = '|';

/// Select list used by every fetch.
pub const SELECT_ALL_COLUMNS: &str = "*";

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    // Table management
    ListTables,
    CreateTable,
    EnsureTable,
    DropTable,

    // Rows
    Insert,
    Update,
    Delete,
    Select,
    SelectAll,

    // Message channels
    ListChannels,
    ReadChannel,
    PeekChannel,
    SendChannel,
    ClearChannel,

    // Instance
    Info,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::ListTables,
        Operation::CreateTable,
        Operation::EnsureTable,
        Operation::DropTable,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
        Operation::Select,
        Operation::SelectAll,
        Operation::ListChannels,
        Operation::ReadChannel,
        Operation::PeekChannel,
        Operation::SendChannel,
        Operation::ClearChannel,
        Operation::Info,
    ];

    pub fn method(&self) -> Method {
        match self {
            Operation::ListTables
            | Operation::SelectAll
            | Operation::ListChannels
            | Operation::ReadChannel
            | Operation::PeekChannel
            | Operation::ClearChannel
            | Operation::Info => Method::Get,
            Operation::DropTable => Method::Delete,
            Operation::CreateTable
            | Operation::EnsureTable
            | Operation::Insert
            | Operation::Update
            | Operation::Delete
            | Operation::Select
            | Operation::SendChannel => Method::Post,
        }
    }

    /// Controller segment of the endpoint path.
    pub fn controller(&self) -> &'static str {
        match self {
            Operation::ListChannels
            | Operation::ReadChannel
            | Operation::PeekChannel
            | Operation::SendChannel
            | Operation::ClearChannel => "Messaging",
            Operation::Info => "Instance",
            _ => "DataStore",
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Operation::ListTables => "table/show",
            Operation::CreateTable => "table/create",
            Operation::EnsureTable => "table/ensureexist",
            Operation::DropTable => "table/delete",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Select => "select",
            Operation::SelectAll => "selectall",
            Operation::ListChannels => "list",
            Operation::ReadChannel => "read",
            Operation::PeekChannel => "peek",
            Operation::SendChannel => "send",
            Operation::ClearChannel => "clear",
            Operation::Info => "getinfo",
        }
    }

    /// Whether the path ends with a table or channel name.
    pub fn takes_target(&self) -> bool {
        !matches!(
            self,
            Operation::ListTables | Operation::ListChannels | Operation::Info
        )
    }

    /// Builds the endpoint path, without a leading slash.
    pub fn path(&self, target: Option<&str>) -> String {
        let mut path = format!("{}{}/{}", API_BASE, self.controller(), self.action());
        if let Some(target) = target.filter(|_| self.takes_target()) {
            path.push('/');
            path.push_str(target);
        }
        path
    }

    /// Resolves a request path into an operation and its target.
    ///
    /// Segments match ignoring ASCII case. Returns `None` for unknown
    /// paths and for a missing or extra target.
    pub fn route(path: &str) -> Option<(Operation, Option<&str>)> {
        let path = path.trim_start_matches('/');
        let rest = strip_prefix_ignore_case(path, API_BASE)?;

        Operation::ALL.iter().find_map(|op| {
            let prefix = format!("{}/{}", op.controller(), op.action());
            let tail = strip_prefix_ignore_case(rest, &prefix)?;
            if !op.takes_target() {
                return tail.trim_end_matches('/').is_empty().then_some((*op, None));
            }
            let target = tail.strip_prefix('/')?;
            if target.is_empty() || target.contains('/') {
                return None;
            }
            Some((*op, Some(target)))
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.controller(), self.action())
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Rejects empty, whitespace-only and whitespace-containing identifiers.
pub fn validate_identifier(ident: &str) -> Result<(), ProtocolError> {
    let reason = if ident.is_empty() {
        "empty"
    } else if ident.trim().is_empty() {
        "whitespace only"
    } else if ident.chars().any(char::is_whitespace) {
        "contains whitespace"
    } else if ident.contains('/') {
        "contains a path separator"
    } else {
        return Ok(());
    };
    Err(ProtocolError::InvalidIdentifier {
        ident: ident.to_string(),
        reason,
    })
}

/// `<select-list>|<where-clause>`.
pub fn select_body(where_clause: &str) -> String {
    format!("{}{}{}", SELECT_ALL_COLUMNS, BODY_SEPARATOR, where_clause)
}

/// `<set-clause>|<where-clause>`.
pub fn update_body(set_clause: &str, where_clause: &str) -> String {
    format!("{}{}{}", set_clause, BODY_SEPARATOR, where_clause)
}

/// `<where-clause>`.
pub fn delete_body(where_clause: &str) -> String {
    where_clause.to_string()
}

/// A request to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub op: Operation,
    pub target: Option<String>,
    pub body: Option<String>,
}

impl Request {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            target: None,
            body: None,
        }
    }

    /// Builds a request addressed to a table or channel. The name is
    /// validated before any I/O.
    pub fn to_target(op: Operation, target: &str) -> Result<Self, ProtocolError> {
        validate_identifier(target)?;
        Ok(Self {
            op,
            target: Some(target.to_string()),
            body: None,
        })
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> Method {
        self.op.method()
    }

    pub fn path(&self) -> String {
        self.op.path(self.target.as_deref())
    }
}

/// Status and body returned by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Payload of the instance info endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceInfo {
    pub https_enabled: bool,
    pub self_signed: bool,
    /// Base64 certificate hash, empty when HTTPS is off.
    #[serde(default)]
    pub certificate: String,
}
