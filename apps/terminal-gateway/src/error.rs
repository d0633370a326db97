//! Gateway errors.
//!
//! Every failure a remote caller can observe is a [`GatewayError`]. Each
//! kind maps to a stable [`ErrorCode`], and from there to a canonical gRPC
//! status code and an HTTP status for the JSON transport.
//!
//! # Error Kinds
//!
//! | Kind | Code | gRPC | HTTP |
//! |------|------|------|------|
//! | Connection | `CONNECTION_FAILED` | `UNAVAILABLE` | 503 |
//! | Authentication | `AUTHENTICATION_FAILED` | `UNAUTHENTICATED` | 401 |
//! | Precondition | `SESSION_NOT_READY` | `FAILED_PRECONDITION` | 412 |
//! | DataUnavailable | `DATA_UNAVAILABLE` | `NOT_FOUND` | 404 |
//! | OrderRejected | `ORDER_REJECTED` | `ABORTED` | 409 |
//! | InvalidArgument | `INVALID_ARGUMENT` | `INVALID_ARGUMENT` | 400 |

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tonic::Code;

use crate::application::ports::NativeError;
use crate::domain::session::SessionState;

/// Stable error codes exposed to remote callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Terminal session could not be established.
    ConnectionFailed,
    /// Credential rejected by the terminal.
    AuthenticationFailed,
    /// Operation invalid in the current session state.
    SessionNotReady,
    /// Terminal query returned nothing.
    DataUnavailable,
    /// Order submission failed or returned a non-success completion code.
    OrderRejected,
    /// Malformed arguments.
    InvalidArgument,
}

impl ErrorCode {
    /// Canonical gRPC status code.
    #[must_use]
    pub const fn grpc_code(&self) -> Code {
        match self {
            Self::ConnectionFailed => Code::Unavailable,
            Self::AuthenticationFailed => Code::Unauthenticated,
            Self::SessionNotReady => Code::FailedPrecondition,
            Self::DataUnavailable => Code::NotFound,
            Self::OrderRejected => Code::Aborted,
            Self::InvalidArgument => Code::InvalidArgument,
        }
    }

    /// HTTP status for the JSON transport.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self.grpc_code() {
            Code::InvalidArgument | Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::Aborted => StatusCode::CONFLICT,
            Code::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::SessionNotReady => "SESSION_NOT_READY",
            Self::DataUnavailable => "DATA_UNAVAILABLE",
            Self::OrderRejected => "ORDER_REJECTED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Failure of a session or terminal operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Terminal session could not be established.
    #[error("initialize failed, error code = {}, description = {}", .0.code, .0.description)]
    Connection(NativeError),

    /// Credential rejected.
    #[error("login to account {account} failed, error code = {}, description = {}", .native.code, .native.description)]
    Authentication {
        /// Account that was rejected.
        account: u64,
        /// Terminal error.
        native: NativeError,
    },

    /// Operation invalid in the current session state.
    #[error("{operation} is not valid in session state {state}")]
    Precondition {
        /// Operation attempted.
        operation: &'static str,
        /// State at the time of the call.
        state: SessionState,
    },

    /// Terminal query returned its null sentinel.
    #[error("{resource} unavailable: {}", .native.description)]
    DataUnavailable {
        /// What was queried.
        resource: String,
        /// Terminal error at the time of the query.
        native: NativeError,
    },

    /// Order submission returned null or a non-success completion code.
    #[error("order rejected (retcode {}): {description}", .retcode.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    OrderRejected {
        /// Completion code, if a result was returned.
        retcode: Option<i64>,
        /// Terminal-provided description.
        description: String,
    },

    /// Malformed arguments.
    #[error("invalid {field}: {message}")]
    InvalidArgument {
        /// Offending argument.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl GatewayError {
    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::ConnectionFailed,
            Self::Authentication { .. } => ErrorCode::AuthenticationFailed,
            Self::Precondition { .. } => ErrorCode::SessionNotReady,
            Self::DataUnavailable { .. } => ErrorCode::DataUnavailable,
            Self::OrderRejected { .. } => ErrorCode::OrderRejected,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
        }
    }

    /// Terminal-native code and description, where the terminal supplied one.
    #[must_use]
    pub fn native(&self) -> Option<(i64, &str)> {
        match self {
            Self::Connection(native)
            | Self::Authentication { native, .. }
            | Self::DataUnavailable { native, .. } => {
                Some((native.code, native.description.as_str()))
            }
            Self::OrderRejected {
                retcode: Some(code),
                description,
            } => Some((*code, description.as_str())),
            Self::OrderRejected { retcode: None, .. }
            | Self::Precondition { .. }
            | Self::InvalidArgument { .. } => None,
        }
    }

    /// Body sent to remote callers.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let native = self.native();
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            native_code: native.map(|(code, _)| code),
            native_description: native.map(|(_, description)| description.to_string()),
        }
    }
}

/// Serialized error as seen by remote callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Terminal-native code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_code: Option<i64>,
    /// Terminal-native description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ErrorCode::ConnectionFailed, StatusCode::SERVICE_UNAVAILABLE)]
    #[test_case(ErrorCode::AuthenticationFailed, StatusCode::UNAUTHORIZED)]
    #[test_case(ErrorCode::SessionNotReady, StatusCode::PRECONDITION_FAILED)]
    #[test_case(ErrorCode::DataUnavailable, StatusCode::NOT_FOUND)]
    #[test_case(ErrorCode::OrderRejected, StatusCode::CONFLICT)]
    #[test_case(ErrorCode::InvalidArgument, StatusCode::BAD_REQUEST)]
    fn http_status_mapping(code: ErrorCode, status: StatusCode) {
        assert_eq!(code.http_status(), status);
    }

    #[test]
    fn connection_error_carries_native_details() {
        let err = GatewayError::Connection(NativeError::new(-10003, "IPC initialize failed"));
        assert_eq!(err.code(), ErrorCode::ConnectionFailed);
        assert_eq!(err.native(), Some((-10003, "IPC initialize failed")));
        assert_eq!(
            err.to_string(),
            "initialize failed, error code = -10003, description = IPC initialize failed"
        );
    }

    #[test]
    fn precondition_has_no_native_details() {
        let err = GatewayError::Precondition {
            operation: "authenticate",
            state: SessionState::Uninitialized,
        };
        assert!(err.native().is_none());
        let body = err.to_body();
        assert_eq!(body.code, ErrorCode::SessionNotReady);
        assert!(body.native_code.is_none());
    }

    #[test]
    fn order_rejected_body() {
        let err = GatewayError::OrderRejected {
            retcode: Some(10006),
            description: "Request rejected".to_string(),
        };
        let json = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(json["code"], "ORDER_REJECTED");
        assert_eq!(json["native_code"], 10006);
        assert_eq!(json["native_description"], "Request rejected");
    }

    #[test]
    fn order_rejected_without_result_omits_native_fields() {
        let err = GatewayError::OrderRejected {
            retcode: None,
            description: "no result".to_string(),
        };
        let json = serde_json::to_value(err.to_body()).unwrap();
        assert!(json.get("native_code").is_none());
        assert!(err.to_string().contains("retcode none"));
    }
}
