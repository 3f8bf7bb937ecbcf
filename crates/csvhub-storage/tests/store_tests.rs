//! Concurrency tests shared by every backend.

use csvhub_core::{CatalogError, CellValue, NewCatalogEntry, TabularDataset};
use csvhub_storage::{backend_from_uri, CatalogBackend, InMemoryBackend, LocalSqliteBackend};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const WRITERS: usize = 16;

fn entry(name: String, n: i64) -> NewCatalogEntry {
    let dataset = TabularDataset::from_rows(
        vec!["n".to_string()],
        vec![vec![CellValue::from(n)]],
    )
    .unwrap();
    NewCatalogEntry::new(name, dataset)
}

async fn concurrent_inserts_get_unique_ids(backend: Arc<dyn CatalogBackend>) {
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            backend.insert(entry(format!("file_{}.csv", i), i as i64)).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let stored = handle.await.unwrap().unwrap();
        assert!(ids.insert(stored.id), "id {} assigned twice", stored.id);

        // Every entry is readable with its own rows once insert returns.
        let dataset = backend.get_dataset(stored.id).await.unwrap();
        let expected: i64 = stored.file_name
            .trim_start_matches("file_")
            .trim_end_matches(".csv")
            .parse()
            .unwrap();
        assert_eq!(dataset.row(0).unwrap().get("n"), Some(&CellValue::from(expected)));
    }

    assert_eq!(backend.count().await.unwrap(), WRITERS);

    // Newest-first listing follows insert order even under contention.
    let listed: Vec<i64> = backend
        .list(0, 1000)
        .await
        .unwrap()
        .iter()
        .map(|file| file.id)
        .collect();
    let mut by_id = listed.clone();
    by_id.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(listed.len(), WRITERS);
    assert_eq!(listed, by_id);

    let mut previous = None;
    for id in by_id.iter().rev() {
        let created_at = backend.get_entry(*id).await.unwrap().created_at;
        if let Some(earlier) = previous {
            assert!(created_at >= earlier, "id {} created before its predecessor", id);
        }
        previous = Some(created_at);
    }
}

async fn concurrent_same_name_has_one_winner(backend: Arc<dyn CatalogBackend>) {
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            backend.insert(entry("contested.csv".to_string(), i as i64)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CatalogError::ConflictError(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(backend.count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_inserts() {
    concurrent_inserts_get_unique_ids(Arc::new(InMemoryBackend::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_name_conflict() {
    concurrent_same_name_has_one_winner(Arc::new(InMemoryBackend::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_inserts() {
    let dir = TempDir::new().unwrap();
    let backend = LocalSqliteBackend::new(dir.path().join("catalog.db"));
    backend.initialize().await.unwrap();
    concurrent_inserts_get_unique_ids(Arc::new(backend)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_name_conflict() {
    let dir = TempDir::new().unwrap();
    let backend = LocalSqliteBackend::new(dir.path().join("catalog.db"));
    backend.initialize().await.unwrap();
    concurrent_same_name_has_one_winner(Arc::new(backend)).await;
}

#[tokio::test]
async fn test_backend_from_uri_file_scheme() {
    let dir = TempDir::new().unwrap();
    let uri = format!("file://{}", dir.path().join("catalog.db").display());
    let backend = backend_from_uri(&uri).unwrap();
    backend.initialize().await.unwrap();
    assert_eq!(backend.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_backend_from_uri_memory() {
    let backend = backend_from_uri("memory://").unwrap();
    backend.initialize().await.unwrap();
    backend.insert(entry("m.csv".to_string(), 1)).await.unwrap();
    assert_eq!(backend.count().await.unwrap(), 1);
}
