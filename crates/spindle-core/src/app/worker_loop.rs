//! WorkerLoop - メッセージ処理ループ
//!
//! # 起動
//! 1. SignalListener を仕込む（SIGTERM / SIGINT → ShutdownController）
//! 2. `Broker::startup()`
//! 3. `Broker::listen()` でストリームを取る
//!
//! # 1 メッセージの流れ
//! 1. decode（失敗したら warn して捨てる）
//! 2. タスク名を引く（未登録なら warn して捨てる）
//! 3. pre_execute フック
//! 4. 引数の型合わせ（`no_parse` なら飛ばす）
//! 5. TaskExecutor で実行
//! 6. post_execute フック
//! 7. `ResultStore::set_result()`（失敗は error ログだけ）
//!
//! どのステップで失敗してもループは止まらない。
//! 止まるのはストリームが尽きたときか、CancellationToken が cancel されたとき。
//! 終了処理の途中でストリームが尽きた場合は teardown の完了を待って `Cancelled` を返す。
//! 結果は broker から届いたメッセージの task_id で保存する（フックが書き換えても変わらない）。

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::app::coercer::coerce_invocation;
use crate::app::executor::TaskExecutor;
use crate::app::pipeline::MiddlewarePipeline;
use crate::app::pool::BlockingPool;
use crate::app::shutdown::{ShutdownController, ShutdownState};
use crate::app::signals::SignalListener;
use crate::config::WorkerConfig;
use crate::domain::{BrokerMessage, ExecutionResult};
use crate::error::WorkerError;
use crate::logging::LogFormat;
use crate::ports::{Broker, ResultStore};
use crate::task::TaskRegistry;

/// Why [`WorkerLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The broker stream ended.
    StreamClosed,
    /// The shutdown controller finished its teardown.
    Cancelled,
}

pub struct WorkerLoop {
    broker: Arc<dyn Broker>,
    result_store: Arc<dyn ResultStore>,
    registry: Arc<TaskRegistry>,
    pipeline: Arc<MiddlewarePipeline>,
    executor: TaskExecutor,
    controller: ShutdownController,
    config: WorkerConfig,
    install_signals: bool,
}

impl WorkerLoop {
    /// Usually built through [`crate::app::WorkerBuilder`].
    pub fn new(
        broker: Arc<dyn Broker>,
        result_store: Arc<dyn ResultStore>,
        pipeline: MiddlewarePipeline,
        controller: ShutdownController,
        config: WorkerConfig,
    ) -> Self {
        let pipeline = Arc::new(pipeline);
        let executor = TaskExecutor::new(
            BlockingPool::new(config.max_threadpool_threads),
            Arc::clone(&pipeline),
            LogFormat::parse(&config.log_collector_format),
        );
        Self {
            registry: broker.registry(),
            broker,
            result_store,
            pipeline,
            executor,
            controller,
            config,
            install_signals: true,
        }
    }

    /// Leave OS signals alone. Shutdown is then only reachable through
    /// [`ShutdownController::trigger`].
    pub fn without_signals(mut self) -> Self {
        self.install_signals = false;
        self
    }

    pub fn controller(&self) -> &ShutdownController {
        &self.controller
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Consume broker messages until the stream ends or shutdown completes.
    pub async fn run(&self) -> Result<LoopExit, WorkerError> {
        let signals = if self.install_signals {
            Some(SignalListener::new(self.controller.clone()).install()?)
        } else {
            None
        };

        info!("Running startup event.");
        if let Err(err) = self.broker.startup().await {
            if let Some(handle) = signals {
                handle.abort();
            }
            return Err(err.into());
        }

        info!(
            tasks = ?self.registry.task_names(),
            threads = self.executor.pool().size(),
            no_parse = self.config.no_parse,
            "Listening started."
        );

        let token = self.controller.cancellation_token();
        let mut messages = self.broker.listen();
        let mut exit = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break LoopExit::Cancelled,
                next = messages.next() => match next {
                    Some(message) => {
                        self.process_message(message).await;
                    }
                    None => break LoopExit::StreamClosed,
                },
            }
        };

        if self.controller.state() != ShutdownState::Running {
            let status = self.controller.wait_stopped().await;
            debug!(exit_code = status.code(), "Teardown finished");
            exit = LoopExit::Cancelled;
        }

        if let Some(handle) = signals {
            handle.abort();
        }
        info!(exit = ?exit, "Worker loop stopped");
        Ok(exit)
    }

    /// Handle one broker message end to end.
    ///
    /// Returns the computed result, or `None` when the message was dropped
    /// before execution (undecodable payload or unknown task). The result is
    /// stored under `message.task_id` even if a hook rewrote the invocation.
    pub async fn process_message(&self, message: BrokerMessage) -> Option<ExecutionResult> {
        let invocation = match self.broker.decode(&message) {
            Ok(invocation) => invocation,
            Err(err) => {
                warn!(
                    task_id = %message.task_id,
                    task_name = %message.task_name,
                    error = %err,
                    "Cannot parse message. Skipping execution"
                );
                return None;
            }
        };

        let Some(task) = self.registry.get(&invocation.task_name) else {
            warn!(
                task_id = %invocation.task_id,
                "task \"{}\" is not found. Maybe you forgot to register it?",
                invocation.task_name
            );
            return None;
        };
        debug!(task_id = %invocation.task_id, task_name = %task.name, "Received task");

        let (invocation, result) = match self.pipeline.pre_execute(invocation.clone()).await {
            Ok(mut prepared) => {
                if !self.config.no_parse {
                    coerce_invocation(&task.signature, &mut prepared);
                }
                let result = self.executor.execute(task, &prepared).await;
                (prepared, result)
            }
            Err(err) => {
                warn!(
                    task_id = %invocation.task_id,
                    middleware = %err.middleware,
                    error = %err.message,
                    "pre_execute hook failed. Task is not executed"
                );
                let result = self.executor.fail_without_running(&invocation, err.into()).await;
                (invocation, result)
            }
        };

        if let Err(err) = self.pipeline.post_execute(&invocation, &result).await {
            warn!(
                task_id = %invocation.task_id,
                middleware = %err.middleware,
                error = %err.message,
                "post_execute hook failed"
            );
        }

        if let Err(err) = self.result_store.set_result(&message.task_id, &result).await {
            error!(
                task_id = %message.task_id,
                error = %err,
                "Cannot set result in result backend"
            );
        }
        Some(result)
    }
}
