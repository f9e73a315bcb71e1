/*!
 * Event Processor Service
 *
 * Drains the event stream in batches, sanitizes raw entries into hot event
 * rows, persists them to DuckDB, and acknowledges everything it read.
 *
 * ## Drain Cycle
 *
 * ```text
 * Redis Stream              Event Processor             DuckDB
 * ────────────             ─────────────────            ──────
 *      │                          │
 *      │<── read(max_length/2) ───┤
 *      │    pending → stale → new │
 *      ├────── raw entries ──────>│
 *      │                          ├── sanitize ──┐
 *      │                          │   accepted   │ discarded
 *      │                          │<─────────────┘
 *      │                          ├── store_batch (one tx) ──>│
 *      │                          │     └─ on failure: DLQ    │
 *      │<── XACK (all read ids) ──┤
 * ```
 *
 * ## Why ACK everything?
 *
 * - Accepted entries are durable in DuckDB or deposited in the DLQ.
 * - Discarded entries are permanently unprocessable; redelivering them
 *   would only block the head of the line.
 *
 * One invocation = one drain cycle; a scheduler triggers cycles and the
 * consumer-group pending list carries state across crashes.
 */

pub mod health;
pub mod metrics;
pub mod processor;

pub use processor::{EventProcessor, Prepared, ProcessOutcome, prepare_entries};
