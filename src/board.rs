//! Task board facade.
//!
//! Ties the gateway, the task cache, and the reorder coordinator together
//! and reports the result of every mutation through a [`Notifier`].
//! Mutations never touch the cache directly; a successful one triggers a
//! reload and the reload is what the board then shows.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::cache::{TaskListCache, TaskSnapshot};
use crate::error::{BoardError, BoardResult, GatewayError};
use crate::gateway::TaskGateway;
use crate::notification::{Notice, Notifier};
use crate::projector::{BoardStats, Column, project_board, summarize};
use crate::reorder::{ReorderCoordinator, ReorderOutcome};
use crate::session::SessionContext;
use crate::types::{CreateTaskRequest, Task, TaskId, TaskStatus, UpdateTaskRequest};

const LOAD_FAILED: &str = "Could not load tasks";
const CREATE_FAILED: &str = "Could not create the task";
const UPDATE_FAILED: &str = "Could not update the task";
const MOVE_FAILED: &str = "Could not move the task";
const DELETE_FAILED: &str = "Could not delete the task";
const EXPORT_FAILED: &str = "Could not export tasks";

pub struct TaskBoard {
    gateway: Arc<dyn TaskGateway>,
    cache: Arc<TaskListCache>,
    coordinator: ReorderCoordinator,
    notifier: Arc<dyn Notifier>,
}

impl TaskBoard {
    pub fn new(
        gateway: Arc<dyn TaskGateway>,
        session: Arc<SessionContext>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cache = TaskListCache::new(Arc::clone(&gateway), session);
        let coordinator = ReorderCoordinator::new(Arc::clone(&gateway), Arc::clone(&cache));
        Self {
            gateway,
            cache,
            coordinator,
            notifier,
        }
    }

    pub fn cache(&self) -> &Arc<TaskListCache> {
        &self.cache
    }

    /// Explicit user refresh.
    pub async fn refresh(&self) -> BoardResult<Arc<TaskSnapshot>> {
        self.cache
            .invalidate_and_reload()
            .await
            .inspect_err(|err| self.report_failure(err, LOAD_FAILED))
    }

    /// Current snapshot, loading it first if the cache is empty.
    pub async fn snapshot(&self) -> BoardResult<Arc<TaskSnapshot>> {
        match self.cache.get().snapshot() {
            Some(snapshot) => Ok(Arc::clone(snapshot)),
            None => self.refresh().await,
        }
    }

    pub async fn columns(&self) -> BoardResult<Vec<Column>> {
        let snapshot = self.snapshot().await?;
        Ok(project_board(&snapshot.tasks))
    }

    pub async fn stats(&self, today: NaiveDate, due_soon_days: u32) -> BoardResult<BoardStats> {
        let snapshot = self.snapshot().await?;
        Ok(summarize(&snapshot.tasks, today, due_soon_days))
    }

    /// One column straight from the server, ordered by position.
    pub async fn tasks_with_status(&self, status: TaskStatus) -> BoardResult<Vec<Task>> {
        let mut tasks = self
            .gateway
            .list_by_status(status)
            .await
            .map_err(BoardError::from)
            .inspect_err(|err| self.report_failure(err, LOAD_FAILED))?;
        tasks.sort_by_key(|task| task.position);
        Ok(tasks)
    }

    pub async fn create(&self, request: CreateTaskRequest) -> BoardResult<Task> {
        self.check_input(request.validate(), CREATE_FAILED)?;

        let created = self
            .gateway
            .create(&request)
            .await
            .map_err(BoardError::from)
            .inspect_err(|err| self.report_failure(err, CREATE_FAILED))?;

        info!(task_id = created.id, "task created");
        self.reload_after_mutation().await;
        self.notifier.notify(Notice::success("Task created"));
        Ok(created)
    }

    pub async fn update(&self, id: TaskId, patch: UpdateTaskRequest) -> BoardResult<Task> {
        let checked = patch.validate().and_then(|()| {
            if patch.is_empty() {
                Err("nothing to update".to_string())
            } else {
                Ok(())
            }
        });
        self.check_input(checked, UPDATE_FAILED)?;

        let updated = self
            .gateway
            .update(id, &patch)
            .await
            .map_err(BoardError::from)
            .inspect_err(|err| self.report_failure(err, UPDATE_FAILED))?;

        info!(task_id = id, "task updated");
        self.reload_after_mutation().await;
        self.notifier.notify(Notice::success("Task updated"));
        Ok(updated)
    }

    pub async fn delete(&self, id: TaskId) -> BoardResult<()> {
        self.gateway
            .remove(id)
            .await
            .map_err(BoardError::from)
            .inspect_err(|err| self.report_failure(err, DELETE_FAILED))?;

        info!(task_id = id, "task deleted");
        self.reload_after_mutation().await;
        self.notifier.notify(Notice::success("Task deleted"));
        Ok(())
    }

    /// Moves a task to `position` in `status`, or to the end of that column
    /// when no position is given.
    pub async fn move_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        position: Option<usize>,
    ) -> BoardResult<ReorderOutcome> {
        if position.is_some() {
            // The no-op check needs the current column layout.
            self.snapshot().await?;
        }
        let outcome = match position {
            Some(index) => self.coordinator.reorder_by_drag(id, status, index).await,
            None => self.coordinator.move_to_end(id, status).await,
        };
        self.report_move(outcome)
    }

    /// Moves a task one column forward. Done tasks are left alone.
    pub async fn advance(&self, id: TaskId) -> BoardResult<ReorderOutcome> {
        let snapshot = self.snapshot().await?;
        let Some(task) = snapshot.task(id).cloned() else {
            let err = BoardError::from(GatewayError::NotFound(format!("task {id} not found")));
            self.report_failure(&err, MOVE_FAILED);
            return Err(err);
        };
        let outcome = self.coordinator.advance(&task).await;
        self.report_move(outcome)
    }

    pub async fn export_pdf(&self) -> BoardResult<Vec<u8>> {
        self.gateway
            .export_pdf()
            .await
            .map_err(BoardError::from)
            .inspect_err(|err| self.report_failure(err, EXPORT_FAILED))
    }

    fn report_move(&self, outcome: BoardResult<ReorderOutcome>) -> BoardResult<ReorderOutcome> {
        match &outcome {
            Ok(ReorderOutcome::Moved { task, .. }) => {
                info!(task_id = task.id, status = %task.status, "task moved");
                self.notifier
                    .notify(Notice::success(format!("Task moved to {}", task.status)));
            }
            Ok(ReorderOutcome::Unchanged) => debug!("move left the board unchanged"),
            Err(err) => self.report_failure(err, MOVE_FAILED),
        }
        outcome
    }

    fn check_input(&self, checked: Result<(), String>, fallback: &str) -> BoardResult<()> {
        checked.map_err(|message| {
            let err = BoardError::from(GatewayError::InvalidInput(message));
            self.report_failure(&err, fallback);
            err
        })
    }

    async fn reload_after_mutation(&self) {
        if let Err(err) = self.cache.invalidate_and_reload().await {
            warn!(error = %err, "task list reload after mutation failed");
        }
    }

    fn report_failure(&self, err: &BoardError, fallback: &str) {
        let message = match err {
            BoardError::Gateway(gateway) => gateway.user_message(fallback),
            BoardError::SessionChanged | BoardError::ReloadAborted => None,
        };
        if let Some(message) = message {
            self.notifier.notify(Notice::error(message));
        }
    }
}
