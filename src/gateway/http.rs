use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::session::{LogoutReason, SessionContext};
use crate::types::{
    AuthTokens, CreateTaskRequest, Credentials, MoveTaskRequest, RegisterPayload, Task, TaskId,
    TaskStatus, UpdateTaskRequest,
};

use super::{AuthGateway, TaskGateway};

#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// reqwest-backed client for the `/api` endpoints.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    session: Arc<SessionContext>,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig, session: Arc<SessionContext>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("taskboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| GatewayError::Network(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Sends an authenticated request. A 401 ends the session the request
    /// was issued under, and only that one.
    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResult<Response> {
        let Some(bearer) = self.session.bearer() else {
            return Err(GatewayError::Auth("not logged in".to_string()));
        };

        debug!(%method, path, epoch = bearer.epoch, "sending task API request");
        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .bearer_auth(&bearer.token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = send(request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let message = error_message(response).await;
            warn!(%method, path, "task API rejected credentials; ending session");
            self.session
                .force_logout_if_current(bearer.epoch, LogoutReason::Unauthorized);
            return Err(GatewayError::Auth(message));
        }
        check_status(response).await
    }

    async fn send_anonymous<B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<Response> {
        debug!(path, "sending auth request");
        let response = send(self.client.post(self.url(path)).json(body)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Auth(error_message(response).await));
        }
        check_status(response).await
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn list(&self) -> GatewayResult<Vec<Task>> {
        let response = self.send_authorized(Method::GET, "/tasks", None).await?;
        decode(response).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> GatewayResult<Vec<Task>> {
        let path = format!("/tasks/status/{}", status.as_str());
        let response = self.send_authorized(Method::GET, &path, None).await?;
        decode(response).await
    }

    async fn create(&self, request: &CreateTaskRequest) -> GatewayResult<Task> {
        let response = self
            .send_authorized(Method::POST, "/tasks", Some(to_json(request)?))
            .await?;
        decode(response).await
    }

    async fn update(&self, id: TaskId, patch: &UpdateTaskRequest) -> GatewayResult<Task> {
        let patch = patch.clone().normalized();
        let path = format!("/tasks/{id}");
        let response = self
            .send_authorized(Method::PUT, &path, Some(to_json(&patch)?))
            .await?;
        decode(response).await
    }

    async fn move_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        position: Option<u32>,
    ) -> GatewayResult<Task> {
        let body = MoveTaskRequest {
            status,
            new_position: position,
        };
        let path = format!("/tasks/{id}/move");
        let response = self
            .send_authorized(Method::PATCH, &path, Some(to_json(&body)?))
            .await?;
        decode(response).await
    }

    async fn remove(&self, id: TaskId) -> GatewayResult<()> {
        let path = format!("/tasks/{id}");
        self.send_authorized(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn export_pdf(&self) -> GatewayResult<Vec<u8>> {
        let response = self
            .send_authorized(Method::GET, "/tasks/export/pdf", None)
            .await?;
        let bytes = response.bytes().await.map_err(GatewayError::from)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AuthGateway for HttpGateway {
    async fn login(&self, credentials: &Credentials) -> GatewayResult<AuthTokens> {
        let response = self.send_anonymous("/auth/login", credentials).await?;
        decode(response).await
    }

    async fn register(&self, payload: &RegisterPayload) -> GatewayResult<AuthTokens> {
        let response = self.send_anonymous("/auth/register", payload).await?;
        decode(response).await
    }
}

fn to_json<T: serde::Serialize>(body: &T) -> GatewayResult<Value> {
    serde_json::to_value(body)
        .map_err(|err| GatewayError::InvalidInput(format!("failed to encode request: {err}")))
}

async fn send(request: RequestBuilder) -> GatewayResult<Response> {
    request.send().await.map_err(|err| {
        if err.is_timeout() {
            GatewayError::Network(format!("request timed out: {err}"))
        } else {
            GatewayError::Network(err.to_string())
        }
    })
}

async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    let message = error_message(response).await;
    Err(match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        _ if status.is_client_error() => GatewayError::Validation {
            status: code,
            message,
        },
        _ => GatewayError::Server {
            status: code,
            message,
        },
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let body = response.bytes().await.map_err(GatewayError::from)?;
    serde_json::from_slice(&body).map_err(|err| GatewayError::Decode(err.to_string()))
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    server_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    })
}

/// Picks the human-readable message out of an error body: a JSON `message`
/// field, then `error`, then the raw text.
fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(payload) = serde_json::from_str::<Value>(trimmed) {
        return ["message", "error"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(str::to_string);
    }

    Some(trimmed.to_string())
}
