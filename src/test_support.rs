//! In-memory gateway used by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::TaskGateway;
use crate::session::{LogoutReason, SessionContext};
use crate::types::{
    CreateTaskRequest, Task, TaskId, TaskPriority, TaskStatus, UpdateTaskRequest,
};

pub(crate) fn task(id: TaskId, status: TaskStatus, position: u32) -> Task {
    let stamp = Utc
        .with_ymd_and_hms(2026, 10, 1, 9, 0, 0)
        .single()
        .expect("fixed timestamp is valid");
    Task {
        id,
        title: format!("Task {id}"),
        description: None,
        status,
        priority: TaskPriority::Medium,
        position,
        due_date: None,
        created_at: stamp,
        updated_at: stamp,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Create(String),
    Update(TaskId, UpdateTaskRequest),
    Move(TaskId, TaskStatus, Option<u32>),
    Remove(TaskId),
    Export,
}

#[derive(Default)]
struct FakeState {
    tasks: Vec<Task>,
    calls: Vec<Call>,
    list_failures: VecDeque<GatewayError>,
    mutation_failures: VecDeque<GatewayError>,
    list_yields: usize,
    next_id: TaskId,
    session: Option<Arc<SessionContext>>,
}

/// Behaves like the task server: keeps positions dense per status and
/// renumbers on move and delete.
#[derive(Default)]
pub(crate) struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub(crate) fn with_tasks(tasks: Vec<Task>) -> Arc<Self> {
        let next_id = tasks.iter().map(|task| task.id).max().unwrap_or(0) + 1;
        Arc::new(Self {
            state: Mutex::new(FakeState {
                tasks,
                next_id,
                ..FakeState::default()
            }),
        })
    }

    /// A 401 injected through `fail_next_mutation` ends this session, the
    /// way the HTTP gateway does.
    pub(crate) fn attach_session(&self, session: Arc<SessionContext>) {
        self.lock().session = Some(session);
    }

    pub(crate) fn set_tasks(&self, tasks: Vec<Task>) {
        self.lock().tasks = tasks;
    }

    pub(crate) fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn mutation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::List)
            .collect()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.calls().iter().filter(|call| **call == Call::List).count()
    }

    pub(crate) fn set_list_yields(&self, yields: usize) {
        self.lock().list_yields = yields;
    }

    pub(crate) fn fail_next_list(&self, err: GatewayError) {
        self.lock().list_failures.push_back(err);
    }

    pub(crate) fn fail_next_mutation(&self, err: GatewayError) {
        self.lock().mutation_failures.push_back(err);
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake gateway mutex should not be poisoned")
    }

    fn record_mutation(&self, call: Call) -> GatewayResult<()> {
        let (failure, session) = {
            let mut state = self.lock();
            state.calls.push(call);
            (state.mutation_failures.pop_front(), state.session.clone())
        };

        match failure {
            Some(GatewayError::Auth(message)) => {
                if let Some(session) = session {
                    session.force_logout(LogoutReason::Unauthorized);
                }
                Err(GatewayError::Auth(message))
            }
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn renumber(tasks: &mut [Task], status: TaskStatus) {
    let mut group: Vec<&mut Task> = tasks.iter_mut().filter(|t| t.status == status).collect();
    group.sort_by_key(|t| t.position);
    for (index, task) in group.into_iter().enumerate() {
        task.position = index as u32;
    }
}

#[async_trait]
impl TaskGateway for FakeGateway {
    /// Answers with the state as of the request; the yields only delay it.
    async fn list(&self) -> GatewayResult<Vec<Task>> {
        let (response, yields) = {
            let mut state = self.lock();
            state.calls.push(Call::List);
            let response = match state.list_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(state.tasks.clone()),
            };
            (response, state.list_yields)
        };
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
        response
    }

    async fn list_by_status(&self, status: TaskStatus) -> GatewayResult<Vec<Task>> {
        let mut tasks = self.list().await?;
        tasks.retain(|task| task.status == status);
        Ok(tasks)
    }

    async fn create(&self, request: &CreateTaskRequest) -> GatewayResult<Task> {
        self.record_mutation(Call::Create(request.title.clone()))?;
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let position = state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Todo)
            .count() as u32;
        let mut created = task(id, TaskStatus::Todo, position);
        created.title = request.title.trim().to_string();
        created.description = request.description.clone();
        created.due_date = request.due_date;
        created.priority = request.priority.unwrap_or_default();
        state.tasks.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: TaskId, patch: &UpdateTaskRequest) -> GatewayResult<Task> {
        let patch = patch.clone().normalized();
        self.record_mutation(Call::Update(id, patch.clone()))?;
        let mut state = self.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| GatewayError::NotFound("Tarefa nao encontrada".to_string()))?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if patch.remove_due_date == Some(true) {
            task.due_date = None;
        } else if patch.due_date.is_some() {
            task.due_date = patch.due_date;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        let previous = task.status;
        let mut updated = task.clone();

        if let Some(status) = patch.status
            && status != previous
        {
            let end = state
                .tasks
                .iter()
                .filter(|t| t.status == status && t.id != id)
                .count() as u32;
            updated.status = status;
            updated.position = end;
            if let Some(entry) = state.tasks.iter_mut().find(|t| t.id == id) {
                *entry = updated.clone();
            }
            renumber(&mut state.tasks, previous);
        }
        Ok(updated)
    }

    async fn move_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        position: Option<u32>,
    ) -> GatewayResult<Task> {
        self.record_mutation(Call::Move(id, status, position))?;
        let mut state = self.lock();
        let Some(current) = state.tasks.iter().find(|t| t.id == id).cloned() else {
            return Err(GatewayError::NotFound("Tarefa nao encontrada".to_string()));
        };

        let mut column: Vec<Task> = state
            .tasks
            .iter()
            .filter(|t| t.status == status && t.id != id)
            .cloned()
            .collect();
        column.sort_by_key(|t| t.position);
        let target = position
            .map(|p| p as usize)
            .unwrap_or(column.len())
            .min(column.len());
        let mut moved = current.clone();
        moved.status = status;
        column.insert(target, moved);

        state.tasks.retain(|t| t.id != id && t.status != status);
        for (index, mut entry) in column.into_iter().enumerate() {
            entry.position = index as u32;
            state.tasks.push(entry);
        }
        renumber(&mut state.tasks, current.status);

        state
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::Decode("moved task vanished".to_string()))
    }

    async fn remove(&self, id: TaskId) -> GatewayResult<()> {
        self.record_mutation(Call::Remove(id))?;
        let mut state = self.lock();
        let Some(index) = state.tasks.iter().position(|t| t.id == id) else {
            return Err(GatewayError::NotFound("Tarefa nao encontrada".to_string()));
        };
        let removed = state.tasks.remove(index);
        renumber(&mut state.tasks, removed.status);
        Ok(())
    }

    async fn export_pdf(&self) -> GatewayResult<Vec<u8>> {
        self.record_mutation(Call::Export)?;
        Ok(b"%PDF-1.4\n%fake\n".to_vec())
    }
}
