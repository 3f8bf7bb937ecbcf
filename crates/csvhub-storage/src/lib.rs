//! csvhub Storage
//!
//! Storage backend abstraction for the csvhub file catalog.
//! Supports a local SQLite file and a process-local in-memory store.

use csvhub_core::{
    CatalogEntry, CatalogError, FileSummary, NewCatalogEntry, Result, TabularDataset,
};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

mod memory;
mod sqlite;

pub use memory::InMemoryBackend;
pub use sqlite::{init_sqlite_schema, LocalSqliteBackend};

/// Convenience alias for trait objects.
pub type DynCatalogBackend = dyn CatalogBackend;

/// Boxed future returned by [`CatalogBackend`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Backend abstraction for catalog storage (async)
///
/// The store is the only writer of the id-to-entry mapping. Implementations
/// must make every insert atomic: an entry is either fully visible with its
/// dataset or not visible at all.
///
/// # Safety
///
/// **CRITICAL**: Never hold `rusqlite::Connection` across `.await` points!
/// rusqlite::Connection is !Send and will cause compilation errors.
///
/// Always use `tokio::task::spawn_blocking` for SQLite operations.
///
/// # Manual Async Trait
///
/// This trait uses manual async implementation (`Pin<Box<dyn Future>>`)
/// instead of async-trait crate for explicit Send bounds.
pub trait CatalogBackend: Send + Sync {
    /// Prepare the backend for use (create schema, directories, ...). Idempotent.
    fn initialize(&self) -> BackendFuture<'_, ()>;

    /// Store a new entry and return its metadata with the assigned id.
    ///
    /// Fails with `ConflictError` if the file name is already taken.
    fn insert(&self, entry: NewCatalogEntry) -> BackendFuture<'_, CatalogEntry>;

    /// Page of summaries, newest first (ties broken by id, newest first).
    fn list(&self, skip: usize, limit: usize) -> BackendFuture<'_, Vec<FileSummary>>;

    /// Metadata for one entry, `FileNotFound` if unknown.
    fn get_entry(&self, id: i64) -> BackendFuture<'_, CatalogEntry>;

    /// Rows for one entry, `FileNotFound` if unknown.
    fn get_dataset(&self, id: i64) -> BackendFuture<'_, TabularDataset>;

    /// Number of stored entries.
    fn count(&self) -> BackendFuture<'_, usize>;
}

/// Parsed representation of a catalog URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    Local(PathBuf),
    Memory,
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogLocation::Local(path) => write!(f, "file://{}", path.display()),
            CatalogLocation::Memory => write!(f, "memory://"),
        }
    }
}

/// Parse a catalog URI into a structured location.
///
/// Accepted forms: `memory://`, `:memory:`, `file://<path>` or a bare path.
pub fn parse_catalog_uri(uri: &str) -> Result<CatalogLocation> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(CatalogError::ValidationError(
            "Catalog URI cannot be empty".into(),
        ));
    }

    if uri == ":memory:" || uri.starts_with("memory://") {
        return Ok(CatalogLocation::Memory);
    }

    if let Some(path) = uri.strip_prefix("file://") {
        // Only validate if file:// prefix was present
        csvhub_core::validation::validate_file_uri_path(path)?;
        return Ok(CatalogLocation::Local(PathBuf::from(path)));
    }

    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(CatalogError::ValidationError(format!(
            "Unsupported catalog scheme '{}' (expected file:// or memory://)",
            scheme
        )));
    }

    Ok(CatalogLocation::Local(PathBuf::from(uri)))
}

/// Build a backend from a catalog URI.
pub fn backend_from_uri(uri: &str) -> Result<Box<DynCatalogBackend>> {
    match parse_catalog_uri(uri)? {
        CatalogLocation::Local(path) => Ok(Box::new(LocalSqliteBackend::new(path))),
        CatalogLocation::Memory => Ok(Box::new(InMemoryBackend::new())),
    }
}

/// Map a failed blocking task to a catalog error.
pub(crate) fn join_error(e: tokio::task::JoinError) -> CatalogError {
    CatalogError::Other(format!("Task join error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_uri() {
        assert_eq!(parse_catalog_uri("memory://").unwrap(), CatalogLocation::Memory);
        assert_eq!(parse_catalog_uri(":memory:").unwrap(), CatalogLocation::Memory);
        assert_eq!(
            parse_catalog_uri("file:///var/lib/csvhub.db").unwrap(),
            CatalogLocation::Local(PathBuf::from("/var/lib/csvhub.db"))
        );
        assert_eq!(
            parse_catalog_uri("csvhub_catalog.db").unwrap(),
            CatalogLocation::Local(PathBuf::from("csvhub_catalog.db"))
        );
    }

    #[test]
    fn test_parse_catalog_uri_rejects_bad_input() {
        assert!(parse_catalog_uri("").is_err());
        assert!(parse_catalog_uri("s3://bucket/catalog.db").is_err());
        assert!(parse_catalog_uri("file://../../etc/passwd").is_err());
    }

    #[test]
    fn test_location_display() {
        assert_eq!(CatalogLocation::Memory.to_string(), "memory://");
        assert_eq!(
            CatalogLocation::Local(PathBuf::from("/tmp/c.db")).to_string(),
            "file:///tmp/c.db"
        );
    }
}
