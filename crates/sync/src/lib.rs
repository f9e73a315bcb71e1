/*!
 * Warehouse Sync Service
 *
 * Checkpointed, lock-guarded copy from the hot store (or the stream) into
 * long-lived warehouse tables with anti-join de-duplication.
 *
 * ## Run Lifecycle
 *
 * ```text
 * Queued ──> should_sync? ──no──> Skipped
 *    │yes
 *    ├──> estimate batch size (~256 MiB / row)
 *    ├──> acquire file lock "duckdb_sync:<table>" (60 s bounded wait)
 *    │        └── timeout ──> Skipped
 *    ├──> ensure warehouse table (schema from a one-row sample)
 *    ├──> drain loop: fetch > checkpoint, anti-join insert, advance
 *    │                checkpoint, persist it, repeat until short batch
 *    └──> Completed  (any error ──> Failed, checkpoint stays at the last
 *                     successfully persisted value)
 * ```
 */

pub mod job;
pub mod source;
pub mod store;

pub use job::SyncJob;
pub use source::EventSource;
pub use store::SyncStore;
