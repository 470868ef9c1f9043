//! # dbapi-client
//!
//! Client library for dbapi.
//!
//! This crate provides:
//! - Typed fetch, insert, update and delete against the relational store
//! - Snapshot tracking for optimistic updates
//! - Message channel send, read and peek
//! - A pluggable transport with an HTTP implementation

pub mod client;
pub mod connection;
pub mod error;
pub mod tracker;

pub use client::Client;
pub use connection::{ConnectionConfig, HttpTransport, Transport, TOKEN_HEADER};
pub use error::ClientError;
pub use tracker::{EntityTracker, TrackHandle, Tracked, UpdateRequest};
