//! # Pulse Columnar Storage
//!
//! Two DuckDB-backed stores:
//!
//! - the **hot store** (`pulse.duckdb`): recently-ingested events, written
//!   in batches by the processor, read by introspection and the warehouse
//!   synchronizer;
//! - the **warehouse** (`duckdb/warehouse.ducklake`): long-lived tables the
//!   synchronizer mirrors source rows into, de-duplicated by primary key.

pub mod hot;
pub mod warehouse;

pub use hot::HotStore;
pub use warehouse::{SourceBatch, Warehouse};
