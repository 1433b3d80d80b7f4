//! # Error Handling
//!
//! Every failure of the request compiler is a [`QueryError`]. The compiler only
//! *classifies* failures; mapping them to HTTP is left to the caller, with an
//! [`IntoResponse`] implementation provided for Axum handlers:
//!
//! - Client errors (malformed tokens, bad arity, unknown operators in a request,
//!   invalid sort fields, unresolvable joins) → `400 Bad Request`
//! - Configuration and internal errors → `500 Internal Server Error`
//!
//! Internal details are logged with `tracing` and never sent to clients.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crudquery::{QueryError, parse_request};
//!
//! async fn list_users(RawQuery(query): RawQuery) -> Result<Json<Vec<User>>, QueryError> {
//!     let payload = parse_request(query.as_deref().unwrap_or(""), &route, &params, CrudAction::ReadAll)?;
//!     // hand `payload` to the execution layer
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

use crate::validation::ValidationError;

/// Result alias used across the crate
pub type QueryResult<T> = Result<T, QueryError>;

/// Failure raised while decoding, compiling or planning a request.
#[derive(Debug)]
pub enum QueryError {
    /// Malformed token, bad arity, unknown sort field or injection attempt
    Validation(ValidationError),

    /// A join path (or a field referencing one) cannot be resolved
    InvalidJoin {
        /// The dotted relation path that failed
        path: String,
        /// Why it could not be resolved
        reason: String,
    },

    /// Operator name not present in the built-in table or the route overlay
    UnknownOperator {
        /// The operator name as written
        name: String,
    },

    /// Custom operator registered under a built-in name
    OperatorCollision {
        /// The colliding operator name
        name: String,
    },

    /// Route configuration rejected at registration time
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },

    /// Unexpected failure (details logged, not exposed)
    Internal {
        /// User-facing generic message
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },
}

impl QueryError {
    /// Create a validation error for a field or query token
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(field, message))
    }

    /// Create an invalid join error
    pub fn invalid_join(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidJoin {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_operator(name: impl Into<String>) -> Self {
        Self::UnknownOperator { name: name.into() }
    }

    pub fn operator_collision(name: impl Into<String>) -> Self {
        Self::OperatorCollision { name: name.into() }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an internal error with optional details
    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    /// Whether the failure was caused by the request rather than the server
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidJoin { .. })
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Get the user-facing error message (sanitized)
    fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::InvalidJoin { path, reason } => format!("Invalid join '{path}': {reason}"),
            Self::UnknownOperator { .. }
            | Self::OperatorCollision { .. }
            | Self::InvalidConfig { .. } => "Invalid route configuration".to_string(),
            Self::Internal { message, .. } => message.clone(),
        }
    }

    fn log_internal(&self) {
        match self {
            Self::UnknownOperator { name } => {
                tracing::error!(operator = %name, "Unknown operator in route configuration");
            }
            Self::OperatorCollision { name } => {
                tracing::error!(operator = %name, "Custom operator collides with a built-in");
            }
            Self::InvalidConfig { message } => {
                tracing::error!(details = %message, "Invalid route configuration");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "Query error"
                );
            }
        }
    }
}

/// Error response sent to users (sanitized)
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let response = match &self {
            Self::Validation(err) => ErrorResponse {
                error: err.message.clone(),
                field: Some(err.field.clone()),
            },
            _ => ErrorResponse {
                error: self.user_message(),
                field: None,
            },
        };

        (status, Json(response)).into_response()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperator { name } => write!(f, "Unknown operator '{name}'"),
            Self::OperatorCollision { name } => {
                write!(f, "Custom operator '{name}' collides with a built-in operator")
            }
            Self::InvalidConfig { message } => write!(f, "Invalid route configuration: {message}"),
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<ValidationError> for QueryError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<sea_orm::DbErr> for QueryError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::internal("Database error", Some(err.to_string()))
    }
}
