//! Errors - エラー型と分類
//!
//! - `TaskError` はハンドラの失敗そのもの。`ExecutionResult` に載って保存される
//! - それ以外はワーカー側（broker / result store / middleware / 起動）の失敗

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single task execution.
///
/// This is data, not control flow: the executor stores it in the
/// `ExecutionResult` instead of propagating it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("task failed: {message}")]
    Failed { message: String },

    #[error("invalid argument '{param}': {message}")]
    InvalidArgument { param: String, message: String },

    #[error("task panicked: {message}")]
    Panicked { message: String },

    #[error("middleware '{middleware}' failed: {message}")]
    Middleware { middleware: String, message: String },
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed {
            message: message.into(),
        }
    }

    pub fn invalid_argument(param: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::InvalidArgument {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Short snake_case label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::InvalidArgument { .. } => "task_invalid_argument",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Middleware { .. } => "task_middleware",
        }
    }
}

impl From<MiddlewareError> for TaskError {
    fn from(err: MiddlewareError) -> Self {
        TaskError::Middleware {
            middleware: err.middleware,
            message: err.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce {value} to {expected}")]
pub struct CoercionError {
    pub expected: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed message: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker startup failed: {0}")]
    Startup(String),

    #[error("broker shutdown failed: {0}")]
    Shutdown(String),

    #[error("broker is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ResultStoreError {
    #[error("result backend unavailable: {0}")]
    Unavailable(String),

    #[error("cannot serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A hook failed. Carries the hook name so logs can point at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("middleware '{middleware}' failed: {message}")]
pub struct MiddlewareError {
    pub middleware: String,
    pub message: String,
}

impl MiddlewareError {
    pub fn new(middleware: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            middleware: middleware.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Handler for task '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop the worker before it starts consuming messages.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("cannot install signal handlers: {0}")]
    Signals(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
