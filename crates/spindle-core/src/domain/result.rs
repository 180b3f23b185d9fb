//! ExecutionResult: what one task execution produced.
//!
//! This is the shape that gets handed to middlewares and persisted in the
//! result store. Handler failures are recorded here instead of being
//! propagated, so anyone waiting on the result can observe them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub is_err: bool,

    /// Log lines captured while the handler was running.
    #[serde(default)]
    pub log: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,

    /// Wall-clock seconds spent in the handler call.
    pub execution_time: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl ExecutionResult {
    pub fn success(return_value: Value, log: String, execution_time: f64) -> Self {
        Self {
            is_err: false,
            log,
            return_value: Some(return_value),
            execution_time: execution_time.max(0.0),
            error: None,
        }
    }

    pub fn failure(error: TaskError, log: String, execution_time: f64) -> Self {
        Self {
            is_err: true,
            log,
            return_value: None,
            execution_time: execution_time.max(0.0),
            error: Some(error),
        }
    }

    /// Result for an invocation that never reached its handler.
    pub fn not_executed(error: TaskError) -> Self {
        Self::failure(error, String::new(), 0.0)
    }

    pub fn into_outcome(self) -> Result<Option<Value>, TaskError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.return_value),
        }
    }
}
