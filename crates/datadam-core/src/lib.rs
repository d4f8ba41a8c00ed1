//! Core contracts and helpers for datadam.
//!
//! This crate defines the table metadata model, the DML payloads exchanged
//! between the generator and the dispatcher, the backend port every database
//! adapter implements, and the per-connection schema cache.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod routing;
pub mod schema;

pub use backend::{Backend, Introspector, RowSampler};
pub use cache::SchemaCache;
pub use config::{DamConfig, DbConfig, MySqlConfig, parse_duration};
pub use error::{Error, Result};
pub use model::{DmlParams, OpKind, Row, Value};
pub use registry::{BackendFactory, BackendRegistry};
pub use routing::{hash_key, lane_for};
pub use schema::{Column, Table, table_name};

/// Weight vector used when the configuration does not provide one,
/// aligned to [`OpKind::ALL`].
pub const DEFAULT_OP_WEIGHT: [u32; 4] = [5, 4, 1, 0];
