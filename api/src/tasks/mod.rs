//! Resumable playlist tasks.
//!
//! A task is created once and then driven by repeated [`TaskManager::advance_one_step`]
//! calls, each running exactly one step and persisting the result. Pollers read
//! a published snapshot, so they never wait on a running step.

mod steps;

use chrono::{DateTime, Utc};
use cratedigger::{CredentialStore, Orchestrator, Services};
use shared::task::{Task, TaskParams, TaskSnapshot, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::models::{CustomSourceStore, TaskStore};

const DEFAULT_DEADLINE_SECS: i64 = 1800;

/// In-memory handle on one task. The mutex is only ever taken with
/// `try_lock`, so a second advance on the same task is a no-op.
pub(crate) struct TaskSlot {
    task: Mutex<Task>,
    view: watch::Sender<TaskSnapshot>,
    cancel: CancellationToken,
}

impl TaskSlot {
    fn new(task: Task) -> Self {
        let (view, _) = watch::channel(TaskSnapshot::from(&task));
        Self {
            task: Mutex::new(task),
            view,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn publish(&self, task: &Task) {
        self.view.send_replace(TaskSnapshot::from(task));
    }

    /// Update the polled view only, the task itself is written at step end.
    pub(crate) fn publish_progress(&self, progress: u8, message: String) {
        self.view.send_modify(|view| {
            view.progress = progress;
            view.message = message;
        });
    }

    fn snapshot(&self) -> TaskSnapshot {
        self.view.borrow().clone()
    }
}

pub struct TaskManager {
    slots: RwLock<HashMap<String, Arc<TaskSlot>>>,
    store: Arc<dyn TaskStore>,
    custom_sources: Arc<dyn CustomSourceStore>,
    credentials: Arc<dyn CredentialStore>,
    services: Arc<Services>,
    orchestrator: Orchestrator,
    deadline: chrono::Duration,
}

impl TaskManager {
    pub fn new(
        services: Arc<Services>,
        store: Arc<dyn TaskStore>,
        custom_sources: Arc<dyn CustomSourceStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            store,
            custom_sources,
            credentials,
            services,
            orchestrator: Orchestrator::default(),
            deadline: chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Tasks older than `deadline` are failed on their next advance.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = chrono::Duration::from_std(deadline).unwrap_or(chrono::Duration::MAX);
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn custom_sources(&self) -> &Arc<dyn CustomSourceStore> {
        &self.custom_sources
    }

    fn validate(&self, params: &TaskParams) -> Result<()> {
        if params.name.trim().is_empty() {
            return Err(TaskError::Invalid("name must not be empty".to_string()));
        }
        if params.limit == 0 {
            return Err(TaskError::Invalid("limit must be greater than 0".to_string()));
        }
        if params.days == 0 {
            return Err(TaskError::Invalid("days must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&params.min_match_score) {
            return Err(TaskError::Invalid(
                "min_match_score must be between 0 and 1".to_string(),
            ));
        }
        if let Some(id) = &params.destination {
            if self.services.destination(Some(id)).is_none() {
                return Err(TaskError::Invalid(format!("Unknown destination: {id}")));
            }
        }
        Ok(())
    }

    pub async fn create_new_task(&self, owner_id: &str, params: TaskParams) -> Result<String> {
        self.validate(&params)?;
        let id = Uuid::new_v4().to_string();
        let task = Task::new(id.clone(), owner_id.to_string(), params);
        self.store.save(&task).await?;
        self.slots
            .write()
            .await
            .insert(id.clone(), Arc::new(TaskSlot::new(task)));
        info!(task_id = %id, owner_id, "Created playlist task");
        Ok(id)
    }

    /// In-memory slot, reloading from the store after a restart.
    async fn slot(&self, id: &str) -> Result<Option<Arc<TaskSlot>>> {
        if let Some(slot) = self.slots.read().await.get(id) {
            return Ok(Some(slot.clone()));
        }
        let Some(task) = self.store.load(id).await? else {
            return Ok(None);
        };
        debug!(task_id = %id, step = task.step, "Resuming task from store");
        let mut slots = self.slots.write().await;
        let slot = slots
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(TaskSlot::new(task)));
        Ok(Some(slot.clone()))
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<TaskSnapshot>> {
        Ok(self.slot(id).await?.map(|slot| slot.snapshot()))
    }

    /// The task's latest CSV export, if any.
    pub async fn csv(&self, id: &str) -> Result<Option<String>> {
        let Some(slot) = self.slot(id).await? else {
            return Ok(None);
        };
        if let Ok(task) = slot.task.try_lock() {
            return Ok(task.csv_data.clone());
        }
        // a step is running, serve what it last persisted
        Ok(self.store.load(id).await?.and_then(|t| t.csv_data))
    }

    /// Run the next step of a task. Returns `false` without touching anything
    /// for an unknown or terminal task, or while another advance is running.
    pub async fn advance_one_step(&self, id: &str) -> Result<bool> {
        let Some(slot) = self.slot(id).await? else {
            return Ok(false);
        };
        let Ok(mut task) = slot.task.try_lock() else {
            debug!(task_id = %id, "Advance already in flight");
            return Ok(false);
        };
        if task.status.is_terminal() {
            return Ok(false);
        }

        if slot.cancel.is_cancelled() {
            task.fail("Task cancelled");
        } else if Utc::now() - task.created_at > self.deadline {
            warn!(task_id = %id, "Task deadline exceeded");
            task.fail("Task deadline exceeded");
        } else {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Running;
            }
            let step = task.step;
            let outcome = tokio::select! {
                _ = slot.cancel.cancelled() => None,
                result = self.run_step(&slot, &mut task) => Some(result),
            };
            match outcome {
                None => {
                    info!(task_id = %id, step, "Task cancelled mid-step");
                    task.fail("Task cancelled");
                }
                Some(Ok(())) => debug!(task_id = %id, step = task.step, "Step done"),
                Some(Err(e)) => {
                    error!(task_id = %id, step, "Task failed: {}", e);
                    task.fail(e.to_string());
                }
            }
        }

        task.touch();
        slot.publish(&task);
        self.store.save(&task).await?;
        Ok(true)
    }

    /// Cancel a task. A step in flight is abandoned; an idle task is failed
    /// right away.
    pub async fn cancel_task(&self, id: &str) -> Result<bool> {
        let Some(slot) = self.slot(id).await? else {
            return Ok(false);
        };
        if slot.snapshot().status.is_terminal() {
            return Ok(false);
        }
        slot.cancel.cancel();
        if let Ok(mut task) = slot.task.try_lock() {
            if !task.status.is_terminal() {
                task.fail("Task cancelled");
                slot.publish(&task);
                self.store.save(&task).await?;
            }
        }
        info!(task_id = %id, "Task cancellation requested");
        Ok(true)
    }

    /// Forget tasks created more than `max_age` ago, in memory and in the store.
    pub async fn cleanup_old_tasks(&self, max_age: Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(max_age)
            .map_err(|e| TaskError::Invalid(format!("max age out of range: {e}")))?;
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let stale: Vec<String> = self
            .slots
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.snapshot().created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        {
            let mut slots = self.slots.write().await;
            for id in &stale {
                if let Some(slot) = slots.remove(id) {
                    slot.cancel.cancel();
                }
            }
        }

        let removed = self.store.delete_created_before(cutoff).await?;
        if removed > 0 || !stale.is_empty() {
            info!(
                "Cleaned up {} tasks ({} in memory)",
                removed.max(stale.len() as u64),
                stale.len()
            );
        }
        Ok(removed.max(stale.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, params};
    use shared::task::SourceSelection;

    #[tokio::test]
    async fn runs_to_completion_without_destination() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let id = manager
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();

        let created = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.message, "Initializing playlist creation...");

        let mut steps = Vec::new();
        while manager.advance_one_step(&id).await.unwrap() {
            steps.push(manager.get_task(&id).await.unwrap().unwrap().step);
        }
        assert_eq!(steps, vec![1, 2, 3]);

        let done = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.has_csv);
        let result = done.result.unwrap();
        assert_eq!(result.track_count, 4);
        assert!(result.playlist_url.is_none());

        let csv = manager.csv(&id).await.unwrap().unwrap();
        assert!(csv.starts_with("Title,Artist,Remix,Source,URL"));
    }

    #[tokio::test]
    async fn unknown_tasks_are_ignored() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        assert!(!manager.advance_one_step("nope").await.unwrap());
        assert!(manager.get_task("nope").await.unwrap().is_none());
        assert!(!manager.cancel_task("nope").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_advance_is_a_no_op() {
        let manager =
            test_support::manager(test_support::services(Duration::from_millis(100))).await;
        let id = manager
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();
        assert!(manager.advance_one_step(&id).await.unwrap());

        let (first, second) = tokio::join!(
            manager.advance_one_step(&id),
            manager.advance_one_step(&id)
        );
        assert!(first.unwrap());
        assert!(!second.unwrap());
        assert_eq!(manager.get_task(&id).await.unwrap().unwrap().step, 2);
    }

    #[tokio::test]
    async fn commits_to_destination() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let id = manager
            .create_new_task("alice", params(SourceSelection::Both, Some("static")))
            .await
            .unwrap();
        while manager.advance_one_step(&id).await.unwrap() {}

        let done = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed, "{}", done.message);
        let result = done.result.unwrap();
        assert_eq!(result.playlist_url.as_deref(), Some("https://static/playlist/1"));
        assert_eq!(result.tracks_added, Some(result.track_count));
        assert!(done.sources.iter().any(|s| s.custom));

        let csv = manager.csv(&id).await.unwrap().unwrap();
        assert!(csv.contains("Matched"));
    }

    #[tokio::test]
    async fn rejected_credentials_fail_the_task() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let id = manager
            .create_new_task("alice", params(SourceSelection::Predefined, Some("locked")))
            .await
            .unwrap();
        while manager.advance_one_step(&id).await.unwrap() {}

        let done = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Error);
        assert!(done.message.contains("Please re-authenticate"));
    }

    #[tokio::test]
    async fn no_sources_fails_the_task() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let id = manager
            .create_new_task("nobody", params(SourceSelection::Custom, None))
            .await
            .unwrap();
        assert!(manager.advance_one_step(&id).await.unwrap());
        let task = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("No sources provided"));
    }

    #[tokio::test]
    async fn cancelled_task_stops() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let id = manager
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();
        assert!(manager.cancel_task(&id).await.unwrap());
        assert!(!manager.advance_one_step(&id).await.unwrap());
        let task = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.message, "Task cancelled");
        assert!(!manager.cancel_task(&id).await.unwrap());
    }

    #[tokio::test]
    async fn deadline_fails_old_tasks() {
        let manager = test_support::manager(test_support::services(Duration::ZERO))
            .await
            .with_deadline(Duration::ZERO);
        let id = manager
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(manager.advance_one_step(&id).await.unwrap());
        let task = manager.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.message, "Task deadline exceeded");
    }

    #[tokio::test]
    async fn resumes_from_persisted_step() {
        let services = test_support::services(Duration::ZERO);
        let stores = test_support::stores().await;
        let first = test_support::manager_with(services.clone(), &stores);
        let id = first
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();
        assert!(first.advance_one_step(&id).await.unwrap());
        drop(first);

        let second = test_support::manager_with(services, &stores);
        assert_eq!(second.get_task(&id).await.unwrap().unwrap().step, 1);
        assert!(second.advance_one_step(&id).await.unwrap());
        let task = second.get_task(&id).await.unwrap().unwrap();
        assert_eq!(task.step, 2);
        assert_eq!(task.track_count, 4);
    }

    #[tokio::test]
    async fn unknown_step_is_an_error() {
        let services = test_support::services(Duration::ZERO);
        let stores = test_support::stores().await;
        let mut task = Task::new(
            "odd".into(),
            "alice".into(),
            params(SourceSelection::Predefined, None),
        );
        task.status = TaskStatus::Running;
        task.step = 7;
        stores.tasks.save(&task).await.unwrap();

        let manager = test_support::manager_with(services, &stores);
        assert!(manager.advance_one_step("odd").await.unwrap());
        let task = manager.get_task("odd").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.message, "Unknown task step: 7");
    }

    #[tokio::test]
    async fn cleanup_drops_old_tasks() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let id = manager
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(manager.cleanup_old_tasks(Duration::ZERO).await.unwrap(), 1);
        assert!(manager.get_task(&id).await.unwrap().is_none());

        let fresh = manager
            .create_new_task("alice", params(SourceSelection::Predefined, None))
            .await
            .unwrap();
        assert_eq!(
            manager.cleanup_old_tasks(Duration::from_secs(3600)).await.unwrap(),
            0
        );
        assert!(manager.get_task(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalid_params_are_rejected() {
        let manager = test_support::manager(test_support::services(Duration::ZERO)).await;
        let mut bad = params(SourceSelection::Predefined, None);
        bad.limit = 0;
        assert!(matches!(
            manager.create_new_task("alice", bad).await,
            Err(TaskError::Invalid(_))
        ));
        let unknown = params(SourceSelection::Predefined, Some("nowhere"));
        assert!(manager.create_new_task("alice", unknown).await.is_err());
    }
}
