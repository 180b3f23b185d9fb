//! MiddlewarePipeline - 登録順にフックを 1 つずつ呼ぶ
//!
//! - `pre_execute`: 戻り値の invocation を次のフックへ渡す。最初の失敗で止まる
//! - `post_execute`: 最初の失敗で止まる。扱いは呼び出し側（WorkerLoop）が決める
//! - `on_error`: 失敗したフックはログに残し、残りのフックも呼ぶ
//!
//! フックが返した `MiddlewareError` の `middleware` は `Middleware::name()` で上書きする。

use std::sync::Arc;

use tracing::warn;

use crate::domain::{ExecutionResult, TaskInvocation};
use crate::error::{MiddlewareError, TaskError};
use crate::ports::Middleware;

#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub async fn pre_execute(
        &self,
        mut invocation: TaskInvocation,
    ) -> Result<TaskInvocation, MiddlewareError> {
        for middleware in &self.middlewares {
            invocation = middleware
                .pre_execute(invocation)
                .await
                .map_err(|err| stamped(middleware.as_ref(), err))?;
        }
        Ok(invocation)
    }

    pub async fn post_execute(
        &self,
        invocation: &TaskInvocation,
        result: &ExecutionResult,
    ) -> Result<(), MiddlewareError> {
        for middleware in &self.middlewares {
            middleware
                .post_execute(invocation, result)
                .await
                .map_err(|err| stamped(middleware.as_ref(), err))?;
        }
        Ok(())
    }

    pub async fn on_error(
        &self,
        invocation: &TaskInvocation,
        result: &ExecutionResult,
        error: &TaskError,
    ) {
        for middleware in &self.middlewares {
            if let Err(err) = middleware.on_error(invocation, result, error).await {
                warn!(
                    task_id = %invocation.task_id,
                    middleware = %middleware.name(),
                    error = %err.message,
                    "on_error hook failed"
                );
            }
        }
    }
}

fn stamped(middleware: &dyn Middleware, mut err: MiddlewareError) -> MiddlewareError {
    err.middleware = middleware.name().to_string();
    err
}
