//! # Pulse Stream Log
//!
//! Durable append-only event log over Redis Streams with consumer-group
//! semantics, plus the dead-letter sink for batches the processor cannot
//! persist.

pub mod codec;
pub mod dlq;
pub mod stream;

pub use dlq::DeadLetterQueue;
pub use stream::{ConsumerInfo, EventStream, RangeOrder};
