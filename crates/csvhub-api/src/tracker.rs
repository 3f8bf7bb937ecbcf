//! Join task registry.
//!
//! Every join runs in its own detached task and is registered here under a
//! UUID, so callers that lost their connection can still find the result via
//! `GET /task-status/{task_id}`. Finished records are kept for a retention
//! window and capped in number.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default time a finished task stays queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Default number of finished tasks kept before the oldest are dropped.
pub const DEFAULT_MAX_FINISHED: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

/// Public view of a join task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTask {
    pub task_id: Uuid,
    pub status: TaskStatus,
    /// Id of the stored result, once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    /// Failure message, once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source_file_id: i64,
    pub new_file_name: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TaskRecord {
    task: JoinTask,
    finished: Option<Instant>,
}

/// Concurrent map of join tasks. Cloning shares the same registry.
#[derive(Debug, Clone)]
pub struct JoinTracker {
    tasks: Arc<DashMap<Uuid, TaskRecord>>,
    retention: Duration,
    max_finished: usize,
}

impl Default for JoinTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_MAX_FINISHED)
    }
}

impl JoinTracker {
    pub fn new(retention: Duration, max_finished: usize) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            retention,
            max_finished,
        }
    }

    /// Register a pending task and return its id.
    pub fn register(&self, source_file_id: i64, new_file_name: &str) -> Uuid {
        self.prune();

        let task_id = Uuid::new_v4();
        self.tasks.insert(
            task_id,
            TaskRecord {
                task: JoinTask {
                    task_id,
                    status: TaskStatus::Pending,
                    file_id: None,
                    error: None,
                    source_file_id,
                    new_file_name: new_file_name.to_string(),
                    submitted_at: Utc::now(),
                    finished_at: None,
                },
                finished: None,
            },
        );
        task_id
    }

    pub fn complete(&self, task_id: Uuid, file_id: i64) {
        self.finish(task_id, TaskStatus::Completed, Some(file_id), None);
    }

    pub fn fail(&self, task_id: Uuid, error: String) {
        self.finish(task_id, TaskStatus::Failed, None, Some(error));
    }

    pub fn get(&self, task_id: &Uuid) -> Option<JoinTask> {
        self.tasks.get(task_id).map(|record| record.task.clone())
    }

    /// Every tracked task, oldest submission first.
    pub fn tasks(&self) -> Vec<JoinTask> {
        let mut tasks: Vec<JoinTask> = self
            .tasks
            .iter()
            .map(|item| item.value().task.clone())
            .collect();
        tasks.sort_by_key(|task| task.submitted_at);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn finish(&self, task_id: Uuid, status: TaskStatus, file_id: Option<i64>, error: Option<String>) {
        if let Some(mut record) = self.tasks.get_mut(&task_id) {
            record.task.status = status;
            record.task.file_id = file_id;
            record.task.error = error;
            record.task.finished_at = Some(Utc::now());
            record.finished = Some(Instant::now());
        }
    }

    /// Drop expired finished tasks, then the oldest ones beyond the cap.
    /// Pending tasks are never pruned.
    pub fn prune(&self) {
        let retention = self.retention;
        self.tasks
            .retain(|_, record| record.finished.map_or(true, |at| at.elapsed() < retention));

        let mut finished: Vec<(Instant, Uuid)> = self
            .tasks
            .iter()
            .filter_map(|item| item.value().finished.map(|at| (at, *item.key())))
            .collect();
        if finished.len() <= self.max_finished {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.max_finished;
        for (_, task_id) in finished.into_iter().take(excess) {
            self.tasks.remove(&task_id);
        }
        tracing::debug!(removed = excess, "Pruned finished join tasks");
    }
}
