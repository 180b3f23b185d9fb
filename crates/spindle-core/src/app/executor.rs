//! TaskExecutor - 1 回の呼び出しを実行して ExecutionResult を作る
//!
//! # フロー
//! 1. LogCapture を開く（どの経路でも drop で閉じる）
//! 2. 開始時刻を記録
//! 3. async ハンドラはそのまま await、blocking ハンドラは BlockingPool へ
//! 4. ハンドラの `Err` と panic はここで捕まえる（外には出さない）
//! 5. 経過時間を計算
//! 6. LogCapture を閉じてテキストを取り出す
//! 7. ExecutionResult を組み立てる
//! 8. 失敗なら on_error フックを登録順に呼ぶ

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{Instrument, debug, error};

use crate::app::pipeline::MiddlewarePipeline;
use crate::app::pool::{BlockingPool, PoolError, panic_message};
use crate::domain::{ExecutionResult, TaskInvocation};
use crate::error::TaskError;
use crate::logging::{LogCapture, LogFormat};
use crate::task::{RegisteredTask, TaskArgs, TaskHandler};

pub struct TaskExecutor {
    pool: BlockingPool,
    pipeline: Arc<MiddlewarePipeline>,
    log_format: Arc<LogFormat>,
}

impl TaskExecutor {
    pub fn new(pool: BlockingPool, pipeline: Arc<MiddlewarePipeline>, log_format: LogFormat) -> Self {
        Self {
            pool,
            pipeline,
            log_format: Arc::new(log_format),
        }
    }

    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }

    /// Run `task` with the arguments of `invocation`. Never fails: handler
    /// errors and panics end up in the returned result.
    pub async fn execute(&self, task: &RegisteredTask, invocation: &TaskInvocation) -> ExecutionResult {
        let capture = LogCapture::open(Arc::clone(&self.log_format));
        let args = TaskArgs::from(invocation);

        let start = Instant::now();
        let outcome = match &task.handler {
            TaskHandler::Async(handler) => {
                AssertUnwindSafe(handler.call(args))
                    .catch_unwind()
                    .instrument(capture.span().clone())
                    .await
                    .unwrap_or_else(|payload| {
                        Err(TaskError::Panicked {
                            message: panic_message(&*payload),
                        })
                    })
            }
            TaskHandler::Blocking(handler) => {
                let handler = Arc::clone(handler);
                let span = capture.span().clone();
                // blocking threads have no default subscriber of their own
                let dispatch = tracing::dispatcher::get_default(|d| d.clone());
                debug!(
                    task_id = %invocation.task_id,
                    free_threads = self.pool.available(),
                    "Submitting to blocking pool"
                );
                let run = self.pool.run(move || {
                    tracing::dispatcher::with_default(&dispatch, || span.in_scope(|| handler.call(args)))
                });
                match run.await {
                    Ok(outcome) => outcome,
                    Err(PoolError::Panicked(message)) => Err(TaskError::Panicked { message }),
                    Err(err) => Err(TaskError::failed(err.to_string())),
                }
            }
        };
        let execution_time = start.elapsed().as_secs_f64();

        if let Err(err) = &outcome {
            capture.span().in_scope(|| {
                error!(
                    task_id = %invocation.task_id,
                    task_name = %invocation.task_name,
                    error = %err,
                    "Exception found while executing function"
                );
            });
        }
        let log = capture.finish();

        match outcome {
            Ok(value) => ExecutionResult::success(value, log, execution_time),
            Err(err) => {
                let result = ExecutionResult::failure(err.clone(), log, execution_time);
                self.pipeline.on_error(invocation, &result, &err).await;
                result
            }
        }
    }

    /// Result for an invocation that failed before its handler could run.
    /// `on_error` hooks still fire.
    pub async fn fail_without_running(
        &self,
        invocation: &TaskInvocation,
        error: TaskError,
    ) -> ExecutionResult {
        let result = ExecutionResult::not_executed(error.clone());
        self.pipeline.on_error(invocation, &result, &error).await;
        result
    }
}
