//! actionrpc – a batched, schema-validated action dispatch engine
//!
//! This crate implements JSON-RPC style "actions" with:
//! - A registry of actions with capability rules and declared parameters
//! - Pluggable parameter factories with type-coercing JSON Schema validation
//! - Batches executed sequentially, in order, with per-request isolation
//! - Notifications that never produce output
//! - Cacheability metadata aggregated across every batch
//! - An NDJSON service for embedding the engine behind a transport

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Dispatch engine: registry, factories, binder, access gate, dispatcher
pub mod runtime;

/// Transport-facing reply mapping and the NDJSON service protocol
pub mod service;

/// Sample in-memory domain used by the binaries
pub mod things;

// Re-export key types for convenience
pub use runtime::{Runtime, RuntimeConfig};

/// Current version of the actionrpc runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version of the NDJSON service
pub const PROTOCOL_VERSION: &str = "1.0.0";
