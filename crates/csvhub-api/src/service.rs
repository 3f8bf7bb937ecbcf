//! Catalog service: upload, list, retrieve, export and join.
//!
//! Every operation follows the same lifecycle, logged as it goes:
//! received, validated, processing, then stored or failed.

use crate::tracker::{JoinTask, JoinTracker};
use chrono::Utc;
use csvhub_core::validation::{self, DEFAULT_LIST_LIMIT};
use csvhub_core::{
    csv, join, CatalogEntry, CatalogError, FetchError, FileSummary, JoinRequest,
    NewCatalogEntry, Provenance, Result, TabularDataset,
};
use csvhub_fetch::Fetcher;
use csvhub_storage::DynCatalogBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub id: i64,
    pub file_name: String,
    pub row_count: usize,
    pub warnings: Vec<String>,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub id: i64,
    pub file_name: String,
    pub task_id: Uuid,
    pub row_count: usize,
}

/// A stored file rendered as CSV
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Join parameters after validation
struct ValidatedJoin {
    source_file_id: i64,
    remote: Url,
    new_file_name: String,
    left_key: String,
    right_key: String,
}

/// Shared catalog service. Cloning is cheap and shares the store,
/// fetcher and task registry.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<DynCatalogBackend>,
    fetcher: Fetcher,
    tracker: JoinTracker,
}

impl CatalogService {
    pub fn new(store: Arc<DynCatalogBackend>, fetcher: Fetcher) -> Self {
        Self::with_tracker(store, fetcher, JoinTracker::default())
    }

    pub fn with_tracker(store: Arc<DynCatalogBackend>, fetcher: Fetcher, tracker: JoinTracker) -> Self {
        Self {
            store,
            fetcher,
            tracker,
        }
    }

    pub fn store(&self) -> &DynCatalogBackend {
        self.store.as_ref()
    }

    pub fn tracker(&self) -> &JoinTracker {
        &self.tracker
    }

    /// Parse uploaded CSV bytes and store them under `file_name`.
    pub async fn upload(&self, file_name: &str, content: &[u8]) -> Result<UploadOutcome> {
        let start = Instant::now();
        tracing::info!(file_name = %file_name, bytes = content.len(), "Upload received");

        let result = self.store_upload(file_name, content).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    file_id = %outcome.id,
                    file_name = %outcome.file_name,
                    rows = outcome.row_count,
                    duration_ms = %start.elapsed().as_millis(),
                    "Upload stored"
                );
                observe::operation("upload", "success");
            }
            Err(e) => {
                log_failure("upload", e);
                observe::operation("upload", "error");
            }
        }
        result
    }

    /// Page of file summaries, newest first.
    pub async fn list(&self, skip: Option<i64>, limit: Option<i64>) -> Result<Vec<FileSummary>> {
        let (skip, limit) =
            validation::validate_page(skip.unwrap_or(0), limit.unwrap_or(DEFAULT_LIST_LIMIT))?;
        let files = self.store.list(skip, limit).await?;
        tracing::debug!(skip, limit, returned = files.len(), "Listed files");
        Ok(files)
    }

    /// Rows of a stored file.
    pub async fn get_dataset(&self, id: i64) -> Result<TabularDataset> {
        self.store.get_dataset(id).await
    }

    /// Metadata of a stored file.
    pub async fn get_entry(&self, id: i64) -> Result<CatalogEntry> {
        self.store.get_entry(id).await
    }

    /// A stored file serialized back to CSV.
    pub async fn export_csv(&self, id: i64) -> Result<ExportedFile> {
        let entry = self.store.get_entry(id).await?;
        let dataset = self.store.get_dataset(id).await?;
        Ok(ExportedFile {
            file_name: entry.file_name,
            content: csv::serialize(&dataset),
        })
    }

    /// Join a stored file with records from a remote API and store the result.
    ///
    /// The work runs in a detached task registered with the tracker; it
    /// finishes and stores its result even if the caller goes away.
    pub async fn join(&self, request: JoinRequest) -> Result<JoinOutcome> {
        tracing::info!(
            file_id = %request.source_file_id,
            api_address = %request.remote_address,
            new_file_name = %request.new_file_name,
            "Join received"
        );

        let validated = match validate_join(&request) {
            Ok(v) => v,
            Err(e) => {
                log_failure("join", &e);
                observe::operation("join", "error");
                return Err(e);
            }
        };

        let task_id = self
            .tracker
            .register(validated.source_file_id, &validated.new_file_name);
        tracing::debug!(task_id = %task_id, "Join validated");

        let service = self.clone();
        let handle = tokio::spawn(async move { service.run_join(task_id, validated).await });
        handle
            .await
            .map_err(|e| CatalogError::Other(format!("Task join error: {}", e)))?
    }

    /// Current state of a join task.
    pub fn task_status(&self, task_id: &str) -> Result<JoinTask> {
        let id = Uuid::parse_str(task_id.trim())
            .map_err(|_| CatalogError::TaskNotFound(task_id.to_string()))?;
        self.tracker
            .get(&id)
            .ok_or_else(|| CatalogError::TaskNotFound(task_id.to_string()))
    }

    async fn store_upload(&self, file_name: &str, content: &[u8]) -> Result<UploadOutcome> {
        let file_name = validation::validate_file_name(file_name)?;
        if content.is_empty() {
            return Err(CatalogError::ValidationError(
                "Uploaded file is empty".to_string(),
            ));
        }
        tracing::debug!(file_name = %file_name, "Upload validated");

        let parsed = csv::parse(content)?;
        tracing::debug!(
            file_name = %file_name,
            rows = parsed.dataset.num_rows(),
            columns = parsed.dataset.num_columns(),
            warnings = parsed.warnings.len(),
            "Upload parsed"
        );

        let entry = self
            .store
            .insert(NewCatalogEntry::new(file_name, parsed.dataset).with_warnings(parsed.warnings))
            .await?;
        Ok(UploadOutcome {
            id: entry.id,
            file_name: entry.file_name,
            row_count: entry.row_count,
            warnings: entry.warnings,
        })
    }

    async fn run_join(&self, task_id: Uuid, request: ValidatedJoin) -> Result<JoinOutcome> {
        let start = Instant::now();
        let result = self.execute_join(task_id, &request).await;

        match &result {
            Ok(outcome) => {
                self.tracker.complete(task_id, outcome.id);
                tracing::info!(
                    task_id = %task_id,
                    file_id = %outcome.id,
                    file_name = %outcome.file_name,
                    rows = outcome.row_count,
                    duration_ms = %start.elapsed().as_millis(),
                    "Join stored"
                );
                observe::operation("join", "success");
            }
            Err(e) => {
                self.tracker.fail(task_id, e.to_string());
                log_failure("join", e);
                observe::operation("join", "error");
            }
        }
        result
    }

    async fn execute_join(&self, task_id: Uuid, request: &ValidatedJoin) -> Result<JoinOutcome> {
        let left = self.store.get_dataset(request.source_file_id).await?;
        tracing::debug!(task_id = %task_id, rows = left.num_rows(), "Join source loaded");

        let fetch_start = Instant::now();
        let fetched = self.fetcher.fetch(&request.remote).await;
        observe::fetch(fetch_outcome(&fetched), fetch_start.elapsed());
        let right = fetched?;
        tracing::debug!(task_id = %task_id, rows = right.num_rows(), "Join remote fetched");

        let joined = join::join(&left, &right, &request.left_key, &request.right_key)?;
        let joined_rows = joined.num_rows();

        let provenance = Provenance {
            source_file_id: request.source_file_id,
            remote_address: request.remote.to_string(),
            joined_at: Utc::now(),
        };
        let entry = self
            .store
            .insert(
                NewCatalogEntry::new(request.new_file_name.clone(), joined)
                    .with_provenance(provenance),
            )
            .await?;
        observe::join_rows(joined_rows);

        Ok(JoinOutcome {
            id: entry.id,
            file_name: entry.file_name,
            task_id,
            row_count: entry.row_count,
        })
    }
}

fn validate_join(request: &JoinRequest) -> Result<ValidatedJoin> {
    let new_file_name = validation::validate_file_name(&request.new_file_name)?.to_string();
    let remote = validation::validate_remote_address(&request.remote_address)?;
    validation::validate_key_column(&request.left_key, "column1")?;
    validation::validate_key_column(&request.right_key, "column2")?;

    Ok(ValidatedJoin {
        source_file_id: request.source_file_id,
        remote,
        new_file_name,
        left_key: request.left_key.clone(),
        right_key: request.right_key.clone(),
    })
}

fn log_failure(operation: &str, err: &CatalogError) {
    if err.is_client_error() {
        tracing::warn!(operation, kind = err.kind(), error = %err, "Request failed");
    } else {
        tracing::error!(operation, kind = err.kind(), error = %err, "Request failed");
    }
}

fn fetch_outcome<T>(result: &std::result::Result<T, FetchError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(FetchError::Timeout(_)) => "timeout",
        Err(_) => "error",
    }
}

#[cfg(feature = "metrics")]
mod observe {
    pub(super) use crate::metrics::{
        observe_fetch as fetch, observe_join_rows as join_rows, record_operation as operation,
    };
}

#[cfg(not(feature = "metrics"))]
mod observe {
    use std::time::Duration;

    pub(super) fn operation(_operation: &str, _status: &str) {}
    pub(super) fn fetch(_outcome: &str, _elapsed: Duration) {}
    pub(super) fn join_rows(_rows: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvhub_fetch::FetcherConfig;
    use csvhub_storage::InMemoryBackend;

    fn service() -> CatalogService {
        CatalogService::new(
            Arc::new(InMemoryBackend::new()),
            Fetcher::new(FetcherConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_upload_reports_rows_and_warnings() {
        let svc = service();
        let outcome = svc
            .upload("  people.csv ", b"id,name\n1,a\n2\n")
            .await
            .unwrap();
        assert_eq!(outcome.file_name, "people.csv");
        assert_eq!(outcome.row_count, 2);
        assert_eq!(outcome.warnings.len(), 1);

        let entry = svc.get_entry(outcome.id).await.unwrap();
        assert_eq!(entry.warnings, outcome.warnings);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_content() {
        let err = service().upload("a.csv", b"").await.unwrap_err();
        assert!(matches!(err, CatalogError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_upload_rejects_blank_name() {
        let err = service().upload("   ", b"a\n1\n").await.unwrap_err();
        assert!(matches!(err, CatalogError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_list_defaults_and_range_checks() {
        let svc = service();
        for i in 0..3 {
            svc.upload(&format!("f{}.csv", i), b"a\n1\n").await.unwrap();
        }
        assert_eq!(svc.list(None, None).await.unwrap().len(), 3);
        assert!(matches!(
            svc.list(Some(0), Some(0)).await,
            Err(CatalogError::InvalidRange { .. })
        ));
        assert!(matches!(
            svc.list(Some(-1), None).await,
            Err(CatalogError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_round_trips_values() {
        let svc = service();
        let outcome = svc
            .upload("q.csv", b"name,zip\n\"Smith, J\",\"02134\"\n")
            .await
            .unwrap();
        let exported = svc.export_csv(outcome.id).await.unwrap();
        assert_eq!(exported.file_name, "q.csv");

        let reparsed = csv::parse(&exported.content).unwrap().dataset;
        assert_eq!(reparsed, svc.get_dataset(outcome.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_join_validation_happens_before_any_work() {
        let svc = service();
        let request = JoinRequest {
            source_file_id: 1,
            remote_address: "ftp://example.com/data".to_string(),
            new_file_name: "out.csv".to_string(),
            left_key: "id".to_string(),
            right_key: "uid".to_string(),
        };
        let err = svc.join(request).await.unwrap_err();
        assert!(matches!(err, CatalogError::ValidationError(_)));
        assert!(svc.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_join_unknown_source_marks_task_failed() {
        let svc = service();
        let request = JoinRequest {
            source_file_id: 404,
            remote_address: "http://127.0.0.1:9/never-called".to_string(),
            new_file_name: "out.csv".to_string(),
            left_key: "id".to_string(),
            right_key: "uid".to_string(),
        };
        let err = svc.join(request).await.unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound(404)));
        assert_eq!(svc.tracker().len(), 1);
    }

    #[tokio::test]
    async fn test_join_completes_after_caller_gives_up() {
        use crate::tracker::TaskStatus;
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scores"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"uid": 1, "score": 9}]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let svc = service();
        let source = svc.upload("left.csv", b"id,name\n1,a\n").await.unwrap();
        let request = JoinRequest {
            source_file_id: source.id,
            remote_address: format!("{}/scores", server.uri()),
            new_file_name: "joined.csv".to_string(),
            left_key: "id".to_string(),
            right_key: "uid".to_string(),
        };

        // Dropping the caller's future must not cancel the join.
        let abandoned = tokio::time::timeout(Duration::from_millis(50), svc.join(request)).await;
        assert!(abandoned.is_err());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let task = loop {
            let task = svc.tracker().tasks().pop().unwrap();
            if task.status != TaskStatus::Pending {
                break task;
            }
            assert!(tokio::time::Instant::now() < deadline, "join never finished");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert_eq!(task.status, TaskStatus::Completed);

        let files = svc.list(None, None).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["joined.csv", "left.csv"]);
        assert_eq!(task.file_id, Some(files[0].id));
        assert_eq!(
            svc.task_status(&task.task_id.to_string()).unwrap().status,
            TaskStatus::Completed
        );

        let joined = svc.get_dataset(files[0].id).await.unwrap();
        assert_eq!(joined.columns(), ["id", "name", "score"]);
    }

    #[test]
    fn test_task_status_unknown_id() {
        let svc = service();
        assert!(matches!(
            svc.task_status("not-a-uuid"),
            Err(CatalogError::TaskNotFound(_))
        ));
        assert!(matches!(
            svc.task_status(&Uuid::new_v4().to_string()),
            Err(CatalogError::TaskNotFound(_))
        ));
    }
}
