//! Turns drag/drop and advance gestures into move requests.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::TaskListCache;
use crate::error::{BoardError, BoardResult};
use crate::gateway::TaskGateway;
use crate::projector::{Column, column_for, locate, project_board};
use crate::types::{Task, TaskId, TaskStatus};

/// A completed drop: which task, and the column slot it landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropEvent {
    pub task_id: TaskId,
    pub destination_status: TaskStatus,
    pub destination_index: usize,
}

/// Raw gesture as a drag-and-drop layer reports it. A drop outside any
/// column has no destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragGesture {
    pub task_id: TaskId,
    pub source: (TaskStatus, usize),
    pub destination: Option<(TaskStatus, usize)>,
}

impl DragGesture {
    /// `None` when the card was dropped nowhere or back where it started.
    pub fn into_drop(self) -> Option<DropEvent> {
        let (destination_status, destination_index) = self.destination?;
        if (destination_status, destination_index) == self.source {
            return None;
        }
        Some(DropEvent {
            task_id: self.task_id,
            destination_status,
            destination_index,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// Nothing to do; no request was sent.
    Unchanged,
    /// The server accepted the move. `refreshed` is false when the follow-up
    /// reload failed and the cache still shows the previous list.
    Moved { task: Task, refreshed: bool },
}

pub struct ReorderCoordinator {
    gateway: Arc<dyn TaskGateway>,
    cache: Arc<TaskListCache>,
}

impl ReorderCoordinator {
    pub fn new(gateway: Arc<dyn TaskGateway>, cache: Arc<TaskListCache>) -> Self {
        Self { gateway, cache }
    }

    pub async fn handle_drop(&self, event: DropEvent) -> BoardResult<ReorderOutcome> {
        self.reorder_by_drag(
            event.task_id,
            event.destination_status,
            event.destination_index,
        )
        .await
    }

    /// Moves a task to `destination_index` in the `destination_status`
    /// column. Dropping a task on its own slot sends nothing.
    pub async fn reorder_by_drag(
        &self,
        task_id: TaskId,
        destination_status: TaskStatus,
        destination_index: usize,
    ) -> BoardResult<ReorderOutcome> {
        let columns = self.columns();
        if locate(&columns, task_id) == Some((destination_status, destination_index)) {
            debug!(task_id, "drop on origin slot; skipping move");
            return Ok(ReorderOutcome::Unchanged);
        }

        let position = u32::try_from(destination_index).unwrap_or(u32::MAX);
        self.submit_move(task_id, destination_status, Some(position))
            .await
    }

    /// Moves a task to the end of `status`; the server picks the slot.
    pub async fn move_to_end(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> BoardResult<ReorderOutcome> {
        self.submit_move(task_id, status, None).await
    }

    /// Moves a task one column forward, appended at the end. Done tasks stay.
    pub async fn advance(&self, task: &Task) -> BoardResult<ReorderOutcome> {
        let Some(next) = task.status.next() else {
            debug!(task_id = task.id, "task already done; nothing to advance");
            return Ok(ReorderOutcome::Unchanged);
        };

        let columns = self.columns();
        let end = column_for(&columns, next).map(Column::len).unwrap_or(0);
        let position = u32::try_from(end).unwrap_or(u32::MAX);
        self.submit_move(task.id, next, Some(position)).await
    }

    /// The reload is only issued once the move response is in. A failed
    /// move leaves the cache untouched.
    async fn submit_move(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        position: Option<u32>,
    ) -> BoardResult<ReorderOutcome> {
        debug!(task_id, %status, ?position, "submitting move");
        let moved = self
            .gateway
            .move_task(task_id, status, position)
            .await
            .map_err(|err| {
                warn!(task_id, error = %err, "move failed; keeping cached board");
                BoardError::from(err)
            })?;

        let refreshed = match self.cache.invalidate_and_reload().await {
            Ok(_) => true,
            Err(err) => {
                warn!(task_id, error = %err, "task list reload after move failed");
                false
            }
        };

        Ok(ReorderOutcome::Moved {
            task: moved,
            refreshed,
        })
    }

    fn columns(&self) -> Vec<Column> {
        match self.cache.get().snapshot() {
            Some(snapshot) => project_board(&snapshot.tasks),
            None => project_board(&[]),
        }
    }
}
