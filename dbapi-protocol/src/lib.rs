//! # dbapi-protocol
//!
//! Wire codec for dbapi.
//!
//! This crate provides:
//! - Registration-time record schemas and SQL column definitions
//! - Value encoding and decoding for the row, message and predicate framings
//! - Row-set and message-batch framing with quote-aware splitting
//! - The endpoint catalogue and request bodies
//! - The error taxonomy shared with the client
//!
//! Everything here is synchronous and free of I/O.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod schema;
pub mod value;

pub use codec::{DecodeMode, Decoder, Encoder};
pub use error::{ErrorKind, ProtocolError};
pub use frame::{Conjunction, Framing};
pub use message::{
    validate_identifier, InstanceInfo, Method, Operation, Request, Response, API_BASE,
};
pub use schema::{
    FieldDef, FieldDescriptor, Record, SchemaDescriptor, SchemaOptions, SchemaRegistry,
};
pub use value::{datetime_min, Decimal, EnumDescriptor, FieldType, FieldValue, TimeSpan, Value};

/// Default port of a dbapi server.
pub const DEFAULT_PORT: u16 = 5000;
