//! Error taxonomy for talking to the task API.
//!
//! Every failure a gateway call can produce falls into one of a few
//! categories that decide how the caller reacts: retry hint, forced logout,
//! or showing the server's message verbatim.

use thiserror::Error;

/// Failures surfaced by a gateway call.
///
/// `Clone` so one coalesced reload outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport or connectivity failure; nothing reached the server or
    /// nothing came back.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 401, or no token to send. The session has already been ended by
    /// the time the caller sees this.
    #[error("authentication required: {0}")]
    Auth(String),

    /// 4xx other than 401/404, with the server-supplied message.
    #[error("{message}")]
    Validation { status: u16, message: String },

    #[error("{0}")]
    NotFound(String),

    /// 5xx responses.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body did not match the contract.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Rejected locally before submission.
    #[error("{0}")]
    InvalidInput(String),
}

impl GatewayError {
    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }

    /// Whether a user-initiated retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::Server { .. }
        )
    }

    /// Text to show the user, or `None` when the failure is handled by the
    /// session (forced logout) rather than as a message.
    pub fn user_message(&self, fallback: &str) -> Option<String> {
        match self {
            GatewayError::Auth(_) => None,
            GatewayError::Network(_) | GatewayError::Server { .. } => {
                Some(format!("{fallback}. Check your connection and try again."))
            }
            GatewayError::Validation { message, .. }
            | GatewayError::NotFound(message)
            | GatewayError::InvalidInput(message) => {
                if message.trim().is_empty() {
                    Some(fallback.to_string())
                } else {
                    Some(message.clone())
                }
            }
            GatewayError::Decode(_) => Some(fallback.to_string()),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures from the board layer: a gateway error, or a reload whose
/// result could not be applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The session ended or changed while a reload was in flight; its
    /// result was discarded.
    #[error("session changed while the task list was loading; result discarded")]
    SessionChanged,

    /// The caller driving a coalesced reload went away before it finished.
    #[error("task list reload was abandoned before it completed")]
    ReloadAborted,
}

impl BoardError {
    pub fn as_gateway(&self) -> Option<&GatewayError> {
        match self {
            BoardError::Gateway(err) => Some(err),
            _ => None,
        }
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = GatewayError::Validation {
            status: 400,
            message: "Titulo nao pode ficar vazio".to_string(),
        };
        assert_eq!(err.to_string(), "Titulo nao pode ficar vazio");
        assert_eq!(
            err.user_message("Could not update the task").as_deref(),
            Some("Titulo nao pode ficar vazio")
        );
    }

    #[test]
    fn test_auth_errors_have_no_user_message() {
        let err = GatewayError::Auth("token expired".to_string());
        assert!(err.is_auth());
        assert!(err.user_message("Could not move the task").is_none());
    }

    #[test]
    fn test_network_errors_suggest_retry() {
        let err = GatewayError::Network("connection refused".to_string());
        assert!(err.is_retryable());
        let message = err
            .user_message("Could not create the task")
            .expect("network errors should be reported");
        assert!(message.starts_with("Could not create the task"));
        assert!(message.contains("try again"));
    }

    #[test]
    fn test_blank_server_message_uses_fallback() {
        let err = GatewayError::Validation {
            status: 409,
            message: "  ".to_string(),
        };
        assert_eq!(
            err.user_message("Could not delete the task").as_deref(),
            Some("Could not delete the task")
        );
    }

    #[test]
    fn test_board_error_wraps_gateway_error() {
        let err: BoardError = GatewayError::NotFound("Tarefa nao encontrada".to_string()).into();
        assert_eq!(err.to_string(), "Tarefa nao encontrada");
        assert!(err.as_gateway().is_some());
        assert!(BoardError::SessionChanged.as_gateway().is_none());
    }
}
