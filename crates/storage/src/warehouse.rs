/*!
 * Warehouse Engine
 *
 * Long-lived tables mirrored from a source by the synchronizer. The
 * warehouse is a DuckDB database file attached under the database name
 * `warehouse` on an in-memory connection, one table per reference entity.
 *
 * Insertion is idempotent: each batch is staged into a temp table and
 * anti-joined against the target on the primary key, so re-running a sync
 * with the same input inserts zero rows.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use duckdb::Connection;
use tracing::debug;

use pulse_common::{Error, Result};

/// A batch of source rows with every value stringified. Rows arrive ordered
/// by `(creation_key, primary_key)` ascending from the source fetch.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl SourceBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in the last row. Because batches are fetched in
    /// ascending `creation_key` order, this is the batch maximum - the new
    /// checkpoint.
    pub fn last_value(&self, column: &str) -> Option<String> {
        let idx = self.column_index(column)?;
        self.rows.last()?.get(idx)?.clone()
    }

    /// Rough bytes-per-row estimate over the batch (deep string sizes).
    pub fn estimated_row_bytes(&self) -> i64 {
        if self.rows.is_empty() {
            return 0;
        }
        let total: usize = self
            .rows
            .iter()
            .map(|row| row.iter().flatten().map(String::len).sum::<usize>())
            .sum();
        (total / self.rows.len()) as i64
    }
}

/// Quote an identifier after validating it, so table/column names coming
/// from sync configs can never smuggle SQL.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Config(format!("invalid identifier: {name:?}")));
    }
    Ok(format!("\"{name}\""))
}

/// Column name/type pairs of a table, in declaration order.
fn table_columns(conn: &Connection, table: &str) -> Result<Vec<(String, String)>> {
    quote_ident(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{table}')"))?;
    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Fetch one sync batch from a table source: rows with
/// `creation_key > checkpoint`, ordered `(creation_key, primary_key)`
/// ascending, every column cast to VARCHAR.
pub fn fetch_table_batch(
    conn: &Connection,
    table: &str,
    creation_key: &str,
    primary_key: &str,
    checkpoint: Option<&str>,
    limit: i64,
) -> Result<SourceBatch> {
    let columns = table_columns(conn, table)?;
    if columns.is_empty() {
        return Ok(SourceBatch::default());
    }

    let types: HashMap<&str, &str> = columns
        .iter()
        .map(|(n, t)| (n.as_str(), t.as_str()))
        .collect();
    let ck_type = types.get(creation_key).copied().unwrap_or("VARCHAR");

    let select_list = columns
        .iter()
        .map(|(name, _)| Ok(format!("CAST(src.{0} AS VARCHAR) AS {0}", quote_ident(name)?)))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut sql = format!("SELECT {select_list} FROM {} AS src", quote_ident(table)?);
    if checkpoint.is_some() {
        sql.push_str(&format!(
            " WHERE src.{} > CAST(? AS {ck_type})",
            quote_ident(creation_key)?
        ));
    }
    // order on the original typed columns, not the VARCHAR aliases
    sql.push_str(&format!(
        " ORDER BY src.{}, src.{} LIMIT {limit}",
        quote_ident(creation_key)?,
        quote_ident(primary_key)?
    ));

    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &duckdb::Row<'_>| {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(row.get::<_, Option<String>>(i)?);
        }
        Ok(values)
    };

    let rows = match checkpoint {
        Some(cp) => stmt
            .query_map([cp], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    Ok(SourceBatch {
        columns: columns.into_iter().map(|(n, _)| n).collect(),
        rows,
    })
}

/// The warehouse database.
#[derive(Debug, Clone)]
pub struct Warehouse {
    path: PathBuf,
}

impl Warehouse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open an in-memory connection with the warehouse file attached as
    /// `warehouse` and selected as the default database.
    pub fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("cannot create warehouse dir: {e}")))?;
        }

        let conn = Connection::open_in_memory()?;
        let path = self.path.to_string_lossy().replace('\'', "''");
        conn.execute_batch(&format!(
            "ATTACH IF NOT EXISTS '{path}' AS warehouse; USE warehouse;"
        ))?;
        Ok(conn)
    }

    /// Whether `table` exists in the warehouse.
    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM duckdb_tables()
             WHERE database_name = 'warehouse' AND table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create `table` with a schema derived from a sample batch: columns
    /// whose sampled values all read as timestamps become TIMESTAMP,
    /// everything else VARCHAR (nullable values default to empty strings
    /// for the derivation).
    pub fn create_table_from_sample(
        conn: &Connection,
        table: &str,
        sample: &SourceBatch,
    ) -> Result<()> {
        if sample.columns.is_empty() {
            return Err(Error::Config(format!(
                "cannot derive schema for {table}: empty sample"
            )));
        }

        let mut defs = Vec::with_capacity(sample.columns.len());
        for (idx, column) in sample.columns.iter().enumerate() {
            let values: Vec<&str> = sample
                .rows
                .iter()
                .filter_map(|row| row.get(idx).and_then(|v| v.as_deref()))
                .collect();
            let ty = if !values.is_empty() && values.iter().all(|v| looks_like_timestamp(v)) {
                "TIMESTAMP"
            } else {
                "VARCHAR"
            };
            defs.push(format!("{} {ty}", quote_ident(column)?));
        }

        conn.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(table)?,
            defs.join(", ")
        ))?;

        debug!("Created warehouse table {}", table);
        Ok(())
    }

    /// Stage `batch` and insert only the rows whose primary key is not yet
    /// in `table` (anti-join). Returns the number of rows inserted.
    pub fn insert_new_rows(
        conn: &mut Connection,
        table: &str,
        batch: &SourceBatch,
        primary_key: &str,
    ) -> Result<i64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let target_columns = table_columns(conn, table)?;
        let types: HashMap<String, String> = target_columns.iter().cloned().collect();

        // Project onto the target's columns, in target order
        let shared: Vec<(String, usize)> = target_columns
            .iter()
            .filter_map(|(name, _)| batch.column_index(name).map(|idx| (name.clone(), idx)))
            .collect();
        if !shared.iter().any(|(name, _)| name == primary_key) {
            return Err(Error::Config(format!(
                "primary key {primary_key} missing from batch for {table}"
            )));
        }

        let column_list = shared
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let placeholders = shared
            .iter()
            .map(|(name, _)| {
                let ty = types.get(name).map(String::as_str).unwrap_or("VARCHAR");
                Ok(format!("CAST(? AS {ty})"))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let tx = conn.transaction()?;
        let inserted;
        {
            tx.execute_batch(&format!(
                "CREATE TEMP TABLE _sync_staging AS
                 SELECT {column_list} FROM {} LIMIT 0",
                quote_ident(table)?
            ))?;

            let mut stmt = tx.prepare(&format!(
                "INSERT INTO _sync_staging ({column_list}) VALUES ({placeholders})"
            ))?;
            for row in &batch.rows {
                let values: Vec<Option<String>> = shared
                    .iter()
                    .map(|(_, idx)| row.get(*idx).cloned().flatten())
                    .collect();
                stmt.execute(duckdb::params_from_iter(values.iter()))?;
            }

            inserted = tx.execute(
                &format!(
                    "INSERT INTO {table_q} ({column_list})
                     SELECT {column_list} FROM _sync_staging s
                     WHERE NOT EXISTS (
                        SELECT 1 FROM {table_q} t WHERE t.{pk_q} = s.{pk_q}
                     )",
                    table_q = quote_ident(table)?,
                    pk_q = quote_ident(primary_key)?,
                ),
                [],
            )? as i64;

            tx.execute_batch("DROP TABLE _sync_staging")?;
        }
        tx.commit()?;

        Ok(inserted)
    }

    /// Row count of a warehouse table.
    pub fn count(conn: &Connection, table: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)?),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Accept the datetime shapes our sources produce (DuckDB VARCHAR casts and
/// ISO-8601 ingest values).
fn looks_like_timestamp(value: &str) -> bool {
    use chrono::NaiveDateTime;

    if chrono::DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if NaiveDateTime::parse_from_str(value, format).is_ok() {
            return true;
        }
    }
    false
}
