//! # Pulse Common Library
//!
//! Shared utilities and infrastructure code used by all Pulse services.
//!
//! This crate provides:
//! - Custom error types for the whole pipeline
//! - Structured logging setup
//! - Named file locks for cross-process exclusion

// Module declarations
pub mod error;
pub mod filelock;
pub mod logging;

// Re-export commonly used types
pub use error::{Error, Result};
pub use filelock::NamedFileLock;
pub use logging::{init_tracing, init_tracing_json};
