//! SQLite file backend.

use crate::{join_error, BackendFuture, CatalogBackend};
use chrono::{DateTime, SecondsFormat, Utc};
use csvhub_core::{
    CatalogEntry, CatalogError, FileSummary, NewCatalogEntry, Provenance, Result, TabularDataset,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a writer waits for a competing transaction before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the catalog schema. Safe to call on an existing database.
///
/// Creates:
/// - `csv_files`: one row per stored file, rows kept as JSON in `content`
pub fn init_sqlite_schema(conn: &Connection) -> Result<()> {
    let ddl = r#"
    CREATE TABLE IF NOT EXISTS csv_files (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      file_name TEXT UNIQUE NOT NULL,
      created_at TEXT NOT NULL,
      row_count INTEGER NOT NULL,
      column_count INTEGER NOT NULL,
      columns TEXT NOT NULL,
      content TEXT NOT NULL,
      warnings TEXT NOT NULL DEFAULT '[]',
      -- provenance of joined files; source_file_id is informational only
      source_file_id INTEGER,
      remote_address TEXT,
      joined_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_csv_files_created_at ON csv_files(created_at);
    "#;
    conn.execute_batch(ddl)?;
    Ok(())
}

/// Local filesystem SQLite backend
///
/// Each operation opens its own connection inside `spawn_blocking`, so
/// concurrent requests never share a handle. SQLite serializes writers and
/// WAL mode lets readers proceed during a write.
#[derive(Clone, Debug)]
pub struct LocalSqliteBackend {
    path: PathBuf,
}

impl LocalSqliteBackend {
    /// Create a new local SQLite backend
    ///
    /// # Example
    /// ```no_run
    /// use csvhub_storage::LocalSqliteBackend;
    ///
    /// let backend = LocalSqliteBackend::new("csvhub_catalog.db");
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CatalogError::SerializationError(format!("bad timestamp '{}': {}", raw, e)))
}

fn to_sql_count(n: usize) -> Result<i64> {
    i64::try_from(n).map_err(|_| CatalogError::Other(format!("count {} out of range", n)))
}

/// Raw column values of one `csv_files` row.
struct EntryRow {
    id: i64,
    file_name: String,
    created_at: String,
    row_count: i64,
    column_count: i64,
    columns: String,
    warnings: String,
    source_file_id: Option<i64>,
    remote_address: Option<String>,
    joined_at: Option<String>,
}

impl EntryRow {
    const SELECT: &'static str = "SELECT id, file_name, created_at, row_count, column_count, \
         columns, warnings, source_file_id, remote_address, joined_at FROM csv_files";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            created_at: row.get(2)?,
            row_count: row.get(3)?,
            column_count: row.get(4)?,
            columns: row.get(5)?,
            warnings: row.get(6)?,
            source_file_id: row.get(7)?,
            remote_address: row.get(8)?,
            joined_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<CatalogEntry> {
        let provenance = match (self.source_file_id, self.remote_address, self.joined_at) {
            (Some(source_file_id), Some(remote_address), Some(joined_at)) => Some(Provenance {
                source_file_id,
                remote_address,
                joined_at: parse_timestamp(&joined_at)?,
            }),
            _ => None,
        };

        Ok(CatalogEntry {
            id: self.id,
            file_name: self.file_name,
            created_at: parse_timestamp(&self.created_at)?,
            row_count: self.row_count.max(0) as usize,
            column_count: self.column_count.max(0) as usize,
            columns: serde_json::from_str(&self.columns)?,
            provenance,
            warnings: serde_json::from_str(&self.warnings)?,
        })
    }
}

fn insert_blocking(path: &Path, entry: NewCatalogEntry) -> Result<CatalogEntry> {
    let NewCatalogEntry {
        file_name,
        dataset,
        provenance,
        warnings,
    } = entry;

    let columns_json = serde_json::to_string(dataset.columns())?;
    let content_json = serde_json::to_string(&dataset)?;
    let warnings_json = serde_json::to_string(&warnings)?;

    let mut conn = open(path)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // Stamped under the write lock so creation order follows id order.
    let latest: Option<String> =
        tx.query_row("SELECT MAX(created_at) FROM csv_files", [], |row| row.get(0))?;
    let created_at = match latest {
        Some(raw) => Utc::now().max(parse_timestamp(&raw)?),
        None => Utc::now(),
    };
    let inserted = tx.execute(
        "INSERT INTO csv_files (file_name, created_at, row_count, column_count, columns, \
         content, warnings, source_file_id, remote_address, joined_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            file_name,
            format_timestamp(&created_at),
            to_sql_count(dataset.num_rows())?,
            to_sql_count(dataset.num_columns())?,
            columns_json,
            content_json,
            warnings_json,
            provenance.as_ref().map(|p| p.source_file_id),
            provenance.as_ref().map(|p| p.remote_address.as_str()),
            provenance.as_ref().map(|p| format_timestamp(&p.joined_at)),
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            return Err(CatalogError::ConflictError(format!(
                "File with name '{}' already exists",
                file_name
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(CatalogEntry {
        id,
        file_name,
        created_at,
        row_count: dataset.num_rows(),
        column_count: dataset.num_columns(),
        columns: dataset.columns().to_vec(),
        provenance,
        warnings,
    })
}

impl CatalogBackend for LocalSqliteBackend {
    fn initialize(&self) -> BackendFuture<'_, ()> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CatalogError::Other(format!(
                            "Failed to create catalog directory {:?}: {}",
                            parent, e
                        ))
                    })?;
                }
                let conn = open(&path)?;
                // journal_mode returns the resulting mode as a row
                let _mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
                init_sqlite_schema(&conn)?;
                tracing::debug!(path = %path.display(), "SQLite catalog initialized");
                Ok(())
            })
            .await
            .map_err(join_error)?
        })
    }

    fn insert(&self, entry: NewCatalogEntry) -> BackendFuture<'_, CatalogEntry> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || insert_blocking(&path, entry))
                .await
                .map_err(join_error)?
        })
    }

    fn list(&self, skip: usize, limit: usize) -> BackendFuture<'_, Vec<FileSummary>> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let conn = open(&path)?;
                let mut stmt = conn.prepare(
                    "SELECT id, file_name FROM csv_files \
                     ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(
                    params![to_sql_count(limit)?, to_sql_count(skip)?],
                    |row| {
                        Ok(FileSummary {
                            id: row.get(0)?,
                            file_name: row.get(1)?,
                        })
                    },
                )?;
                let summaries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(summaries)
            })
            .await
            .map_err(join_error)?
        })
    }

    fn get_entry(&self, id: i64) -> BackendFuture<'_, CatalogEntry> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let conn = open(&path)?;
                let row = conn
                    .query_row(
                        &format!("{} WHERE id = ?1", EntryRow::SELECT),
                        params![id],
                        EntryRow::from_row,
                    )
                    .optional()?
                    .ok_or(CatalogError::FileNotFound(id))?;
                row.into_entry()
            })
            .await
            .map_err(join_error)?
        })
    }

    fn get_dataset(&self, id: i64) -> BackendFuture<'_, TabularDataset> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let conn = open(&path)?;
                let content: String = conn
                    .query_row(
                        "SELECT content FROM csv_files WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or(CatalogError::FileNotFound(id))?;
                Ok(serde_json::from_str(&content)?)
            })
            .await
            .map_err(join_error)?
        })
    }

    fn count(&self) -> BackendFuture<'_, usize> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let conn = open(&path)?;
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM csv_files", [], |row| row.get(0))?;
                Ok(count.max(0) as usize)
            })
            .await
            .map_err(join_error)?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvhub_core::CellValue;
    use tempfile::TempDir;

    fn sample(name: &str) -> NewCatalogEntry {
        let dataset = TabularDataset::from_rows(
            vec!["id".to_string(), "price".to_string()],
            vec![
                vec![CellValue::from(1i64), CellValue::from(9.5f64)],
                vec![CellValue::from("007"), CellValue::Null],
            ],
        )
        .unwrap();
        NewCatalogEntry::new(name, dataset)
    }

    async fn backend(dir: &TempDir) -> LocalSqliteBackend {
        let backend = LocalSqliteBackend::new(dir.path().join("catalog.db"));
        backend.initialize().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        let original = sample("prices.csv");
        let entry = backend.insert(original.clone()).await.unwrap();
        assert_eq!(entry.file_name, "prices.csv");
        assert_eq!(entry.row_count, 2);
        assert_eq!(entry.columns, vec!["id", "price"]);

        let stored = backend.get_entry(entry.id).await.unwrap();
        assert_eq!(stored, entry);

        let dataset = backend.get_dataset(entry.id).await.unwrap();
        assert_eq!(dataset, original.dataset);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        backend.insert(sample("a.csv")).await.unwrap();
        backend.initialize().await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_initialize_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let backend = LocalSqliteBackend::new(dir.path().join("nested/deeper/catalog.db"));
        backend.initialize().await.unwrap();
        assert!(backend.path().exists());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        backend.insert(sample("dup.csv")).await.unwrap();

        let err = backend.insert(sample("dup.csv")).await.unwrap_err();
        assert!(matches!(err, CatalogError::ConflictError(_)), "got {:?}", err);
        assert_eq!(backend.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_id_not_found() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        assert!(matches!(
            backend.get_entry(99).await,
            Err(CatalogError::FileNotFound(99))
        ));
        assert!(matches!(
            backend.get_dataset(99).await,
            Err(CatalogError::FileNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_provenance_persisted() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        let provenance = Provenance {
            source_file_id: 7,
            remote_address: "https://api.example.com/scores".to_string(),
            joined_at: Utc::now(),
        };
        let entry = backend
            .insert(
                sample("joined.csv")
                    .with_provenance(provenance.clone())
                    .with_warnings(vec!["line 3: expected 2 fields, found 1; padded with nulls".into()]),
            )
            .await
            .unwrap();

        let stored = backend.get_entry(entry.id).await.unwrap();
        let stored_provenance = stored.provenance.unwrap();
        assert_eq!(stored_provenance.source_file_id, 7);
        assert_eq!(stored_provenance.remote_address, provenance.remote_address);
        // Stored with microsecond precision.
        assert_eq!(
            stored_provenance.joined_at.timestamp_micros(),
            provenance.joined_at.timestamp_micros()
        );
        assert_eq!(stored.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;
        for i in 0..5 {
            backend.insert(sample(&format!("f{}.csv", i))).await.unwrap();
        }

        let all = backend.list(0, 100).await.unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["f4.csv", "f3.csv", "f2.csv", "f1.csv", "f0.csv"]);

        let page = backend.list(1, 2).await.unwrap();
        assert_eq!(page, all[1..3].to_vec());
        assert!(backend.list(10, 2).await.unwrap().is_empty());
    }
}
