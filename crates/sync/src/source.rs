/*!
 * Sync Sources
 *
 * A source yields batches of rows strictly past a checkpoint, ordered by
 * `(creation_key, primary_key)` ascending, with every value stringified.
 *
 * Two kinds exist:
 *
 * - **Hot store**: a plain table fetch from DuckDB
 *   (`WHERE creation > checkpoint ORDER BY creation, pk LIMIT n`).
 * - **Stream**: a cursor over the event log using the entry id as the
 *   creation key (`XRANGE` from an exclusive start id).
 */

use tracing::debug;

use pulse_common::Result;
use pulse_storage::{HotStore, SourceBatch};
use pulse_stream::codec::parse_entry_list;

/// Columns a stream-backed source exposes. The entry id doubles as both
/// the primary key (`name`) and the cursor (`creation`).
const STREAM_COLUMNS: [&str; 6] = ["name", "creation", "event_name", "site", "timestamp", "data"];

/// A warehouse sync source.
pub enum EventSource {
    /// Rows from the hot `event` table.
    Hot {
        store: HotStore,
        creation_key: String,
        primary_key: String,
    },
    /// Entries straight off the Redis stream.
    Stream { redis_url: String, key: String },
}

impl EventSource {
    pub fn hot(store: HotStore, creation_key: &str, primary_key: &str) -> Self {
        EventSource::Hot {
            store,
            creation_key: creation_key.to_string(),
            primary_key: primary_key.to_string(),
        }
    }

    pub fn stream(redis_url: &str, key: &str) -> Self {
        EventSource::Stream {
            redis_url: redis_url.to_string(),
            key: key.to_string(),
        }
    }

    /// Fetch up to `limit` rows strictly past `checkpoint`.
    pub fn fetch(&self, checkpoint: Option<&str>, limit: i64) -> Result<SourceBatch> {
        match self {
            EventSource::Hot {
                store,
                creation_key,
                primary_key,
            } => store.fetch_batch(creation_key, primary_key, checkpoint, limit),
            EventSource::Stream { redis_url, key } => {
                fetch_stream_batch(redis_url, key, checkpoint, limit)
            }
        }
    }

    /// A small sample for schema derivation and row-size estimation.
    pub fn sample(&self, count: i64) -> Result<SourceBatch> {
        self.fetch(None, count)
    }
}

/// Cursor fetch over the stream: `XRANGE key (checkpoint +` (exclusive
/// start), normalized to the stream source columns.
fn fetch_stream_batch(
    redis_url: &str,
    key: &str,
    checkpoint: Option<&str>,
    limit: i64,
) -> Result<SourceBatch> {
    let client = redis::Client::open(redis_url)?;
    let mut conn = client.get_connection()?;

    // '(' makes the range exclusive of the checkpoint id itself
    let min_id = match checkpoint {
        Some(id) => format!("({id}"),
        None => "-".to_string(),
    };

    let reply: redis::Value = redis::cmd("XRANGE")
        .arg(key)
        .arg(&min_id)
        .arg("+")
        .arg("COUNT")
        .arg(limit)
        .query(&mut conn)?;

    let entries = parse_entry_list(&reply);
    debug!("Stream source fetched {} entries after {:?}", entries.len(), checkpoint);

    let rows = entries
        .iter()
        .map(|entry| {
            let event_name = entry
                .data
                .get("name")
                .or_else(|| entry.data.get("event_name"))
                .cloned();
            vec![
                Some(entry.id.clone()),
                Some(entry.id.clone()),
                event_name,
                entry.data.get("site").cloned(),
                entry.data.get("timestamp").cloned(),
                serde_json::to_string(&entry.data).ok(),
            ]
        })
        .collect();

    Ok(SourceBatch {
        columns: STREAM_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_domain::EventRow;
    use std::collections::BTreeMap;

    fn seeded_hot_store(dir: &std::path::Path) -> HotStore {
        let store = HotStore::new(dir.join("pulse.duckdb"));
        let rows: Vec<EventRow> = (0..5)
            .map(|i| EventRow {
                id: format!("170000000000{i}-0"),
                site: "s1".to_string(),
                name: "login".to_string(),
                timestamp: format!("2025-01-01 00:00:0{i}"),
                app: None,
                app_version: None,
                frappe_version: None,
                data: BTreeMap::new(),
            })
            .collect();
        store.store_batch(&rows).unwrap();
        store
    }

    #[test]
    fn test_hot_source_pagination_by_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let source = EventSource::hot(seeded_hot_store(dir.path()), "timestamp", "id");

        let first = source.fetch(None, 3).unwrap();
        assert_eq!(first.len(), 3);

        let checkpoint = first.last_value("timestamp").unwrap();
        let rest = source.fetch(Some(&checkpoint), 10).unwrap();
        assert_eq!(rest.len(), 2, "strictly-greater filter resumes after checkpoint");
    }

    #[test]
    fn test_hot_source_sample() {
        let dir = tempfile::tempdir().unwrap();
        let source = EventSource::hot(seeded_hot_store(dir.path()), "timestamp", "id");

        let sample = source.sample(2).unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.estimated_row_bytes() > 0);
    }
}
