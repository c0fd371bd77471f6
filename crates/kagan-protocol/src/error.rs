//! The full error code taxonomy (spec §7), as a closed enum rather than
//! free-form strings so dispatch and tests can match on it exhaustively.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Auth
    AuthFailed,
    InvalidProfile,
    AuthorizationDenied,
    // Session
    SessionOriginMismatch,
    SessionNamespaceDenied,
    SessionScopeDenied,
    InvalidOrigin,
    // Protocol
    UnknownMethod,
    InvalidParams,
    InvalidTimeout,
    NotReady,
    // Resource
    TaskNotFound,
    JobNotFound,
    WorkspaceNotFound,
    TaskTypeMismatch,
    InvalidWorktreePath,
    SessionCreateFailed,
    // State machine
    ReviewNotReady,
    MergeFailed,
    RebaseConflict,
    StopPending,
    JobTimeout,
    WaitTimeout,
    WaitInterrupted,
    TaskDeleted,
    TaskChanged,
    AlreadyAtStatus,
    ChangedSinceCursor,
    // Plugin
    PluginPolicyError,
    // Unexpected
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::InvalidProfile => "INVALID_PROFILE",
            ErrorCode::AuthorizationDenied => "AUTHORIZATION_DENIED",
            ErrorCode::SessionOriginMismatch => "SESSION_ORIGIN_MISMATCH",
            ErrorCode::SessionNamespaceDenied => "SESSION_NAMESPACE_DENIED",
            ErrorCode::SessionScopeDenied => "SESSION_SCOPE_DENIED",
            ErrorCode::InvalidOrigin => "INVALID_ORIGIN",
            ErrorCode::UnknownMethod => "UNKNOWN_METHOD",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InvalidTimeout => "INVALID_TIMEOUT",
            ErrorCode::NotReady => "NOT_READY",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::WorkspaceNotFound => "WORKSPACE_NOT_FOUND",
            ErrorCode::TaskTypeMismatch => "TASK_TYPE_MISMATCH",
            ErrorCode::InvalidWorktreePath => "INVALID_WORKTREE_PATH",
            ErrorCode::SessionCreateFailed => "SESSION_CREATE_FAILED",
            ErrorCode::ReviewNotReady => "REVIEW_NOT_READY",
            ErrorCode::MergeFailed => "MERGE_FAILED",
            ErrorCode::RebaseConflict => "REBASE_CONFLICT",
            ErrorCode::StopPending => "STOP_PENDING",
            ErrorCode::JobTimeout => "JOB_TIMEOUT",
            ErrorCode::WaitTimeout => "WAIT_TIMEOUT",
            ErrorCode::WaitInterrupted => "WAIT_INTERRUPTED",
            ErrorCode::TaskDeleted => "TASK_DELETED",
            ErrorCode::TaskChanged => "TASK_CHANGED",
            ErrorCode::AlreadyAtStatus => "ALREADY_AT_STATUS",
            ErrorCode::ChangedSinceCursor => "CHANGED_SINCE_CURSOR",
            ErrorCode::PluginPolicyError => "PLUGIN_POLICY_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed `{code, message}` pair any layer can raise and the dispatcher
/// translates into a `ResponseError` without losing the code.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
