pub mod event;
pub mod sync;

pub use event::{EventRow, IngestEvent, StreamEntry, entry_ms};
pub use sync::{SyncConfig, SyncRun, SyncStatus};
