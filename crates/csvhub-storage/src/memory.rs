//! Process-local backend, used for tests and `memory://` catalogs.

use crate::{BackendFuture, CatalogBackend};
use chrono::{DateTime, Utc};
use csvhub_core::{
    CatalogEntry, CatalogError, FileSummary, NewCatalogEntry, Result, TabularDataset,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// Last id handed out and its creation time.
#[derive(Debug, Default)]
struct Sequence {
    last_id: i64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Sequence {
    /// Next id with a creation time never earlier than the previous one.
    fn advance(&mut self) -> (i64, DateTime<Utc>) {
        let now = Utc::now();
        let created_at = self.last_created_at.map_or(now, |last| last.max(now));
        self.last_id += 1;
        self.last_created_at = Some(created_at);
        (self.last_id, created_at)
    }
}

#[derive(Debug)]
struct StoredFile {
    entry: CatalogEntry,
    dataset: Arc<TabularDataset>,
}

/// In-memory catalog backed by concurrent maps.
///
/// A name is reserved before its entry is published, so two concurrent
/// inserts of the same name cannot both succeed.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    sequence: Mutex<Sequence>,
    names: DashMap<String, i64>,
    files: DashMap<i64, Arc<StoredFile>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_sync(&self, entry: NewCatalogEntry) -> Result<CatalogEntry> {
        let NewCatalogEntry {
            file_name,
            dataset,
            provenance,
            warnings,
        } = entry;

        let (id, created_at) = match self.names.entry(file_name.clone()) {
            Entry::Occupied(_) => {
                return Err(CatalogError::ConflictError(format!(
                    "File with name '{}' already exists",
                    file_name
                )))
            }
            Entry::Vacant(slot) => {
                let (id, created_at) = self
                    .sequence
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .advance();
                slot.insert(id);
                (id, created_at)
            }
        };

        let entry = CatalogEntry {
            id,
            file_name,
            created_at,
            row_count: dataset.num_rows(),
            column_count: dataset.num_columns(),
            columns: dataset.columns().to_vec(),
            provenance,
            warnings,
        };
        self.files.insert(
            id,
            Arc::new(StoredFile {
                entry: entry.clone(),
                dataset: Arc::new(dataset),
            }),
        );
        Ok(entry)
    }

    fn list_sync(&self, skip: usize, limit: usize) -> Vec<FileSummary> {
        let mut entries: Vec<Arc<StoredFile>> =
            self.files.iter().map(|item| Arc::clone(item.value())).collect();
        entries.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then(b.entry.id.cmp(&a.entry.id))
        });
        entries
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|file| file.entry.summary())
            .collect()
    }

    fn lookup(&self, id: i64) -> Result<Arc<StoredFile>> {
        self.files
            .get(&id)
            .map(|item| Arc::clone(item.value()))
            .ok_or(CatalogError::FileNotFound(id))
    }
}

impl CatalogBackend for InMemoryBackend {
    fn initialize(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn insert(&self, entry: NewCatalogEntry) -> BackendFuture<'_, CatalogEntry> {
        Box::pin(async move { self.insert_sync(entry) })
    }

    fn list(&self, skip: usize, limit: usize) -> BackendFuture<'_, Vec<FileSummary>> {
        Box::pin(async move { Ok(self.list_sync(skip, limit)) })
    }

    fn get_entry(&self, id: i64) -> BackendFuture<'_, CatalogEntry> {
        Box::pin(async move { Ok(self.lookup(id)?.entry.clone()) })
    }

    fn get_dataset(&self, id: i64) -> BackendFuture<'_, TabularDataset> {
        Box::pin(async move { Ok(self.lookup(id)?.dataset.as_ref().clone()) })
    }

    fn count(&self) -> BackendFuture<'_, usize> {
        Box::pin(async move { Ok(self.files.len()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> NewCatalogEntry {
        let dataset = TabularDataset::new(vec!["a".to_string()]).unwrap();
        NewCatalogEntry::new(name, dataset)
    }

    #[tokio::test]
    async fn test_ids_start_at_one() {
        let backend = InMemoryBackend::new();
        let first = backend.insert(entry("a.csv")).await.unwrap();
        let second = backend.insert(entry("b.csv")).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
    }

    #[tokio::test]
    async fn test_conflict_keeps_original() {
        let backend = InMemoryBackend::new();
        let original = backend.insert(entry("a.csv")).await.unwrap();
        let err = backend.insert(entry("a.csv")).await.unwrap_err();
        assert!(matches!(err, CatalogError::ConflictError(_)));
        assert_eq!(backend.count().await.unwrap(), 1);
        assert_eq!(backend.get_entry(original.id).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_list_ties_broken_by_id() {
        let backend = InMemoryBackend::new();
        for name in ["x", "y", "z"] {
            backend.insert(entry(name)).await.unwrap();
        }
        let ids: Vec<i64> = backend
            .list(0, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
