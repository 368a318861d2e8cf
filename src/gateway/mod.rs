//! Boundary to the remote task API.

mod http;

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::types::{
    AuthTokens, CreateTaskRequest, Credentials, RegisterPayload, Task, TaskId, TaskStatus,
    UpdateTaskRequest,
};

pub use http::{HttpGateway, HttpGatewayConfig};

/// Task CRUD and move requests. Implementations attach the session token
/// and end the session on a 401.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Full collection, unpaginated.
    async fn list(&self) -> GatewayResult<Vec<Task>>;

    async fn list_by_status(&self, status: TaskStatus) -> GatewayResult<Vec<Task>>;

    async fn create(&self, request: &CreateTaskRequest) -> GatewayResult<Task>;

    async fn update(&self, id: TaskId, patch: &UpdateTaskRequest) -> GatewayResult<Task>;

    /// Changes only status and position. Without a position the server
    /// appends to the end of the target column.
    async fn move_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        position: Option<u32>,
    ) -> GatewayResult<Task>;

    async fn remove(&self, id: TaskId) -> GatewayResult<()>;

    async fn export_pdf(&self) -> GatewayResult<Vec<u8>>;
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> GatewayResult<AuthTokens>;

    async fn register(&self, payload: &RegisterPayload) -> GatewayResult<AuthTokens>;
}
