//! Middleware port - 実行前後のフック
//!
//! 3 つのフックはすべて省略可能（デフォルトは何もしない）。
//! 登録順に 1 つずつ await される。並行には呼ばれない。

use async_trait::async_trait;

use crate::domain::{ExecutionResult, TaskInvocation};
use crate::error::{MiddlewareError, TaskError};

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs. The pipeline writes it into any `MiddlewareError`
    /// this middleware returns.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// May rewrite the invocation; the returned value is what the next hook
    /// and finally the handler see.
    async fn pre_execute(&self, invocation: TaskInvocation) -> Result<TaskInvocation, MiddlewareError> {
        Ok(invocation)
    }

    /// Called only when the task failed.
    async fn on_error(
        &self,
        _invocation: &TaskInvocation,
        _result: &ExecutionResult,
        _error: &TaskError,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    async fn post_execute(
        &self,
        _invocation: &TaskInvocation,
        _result: &ExecutionResult,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }
}
