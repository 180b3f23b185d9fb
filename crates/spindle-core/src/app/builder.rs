//! WorkerBuilder - ワーカーの組み立てとワイヤリング
//!
//! # 起動時検証（Fail-fast）
//! - 設定値の検証（`WorkerConfig::validate`）
//! - `expect_tasks()` と設定の `expected_tasks` に挙がったタスク名が
//!   broker のレジストリに全部あるか
//!
//! 足りなければ `build()` が BuildError を返す。

use std::sync::Arc;

use crate::app::pipeline::MiddlewarePipeline;
use crate::app::shutdown::ShutdownController;
use crate::app::worker_loop::WorkerLoop;
use crate::config::WorkerConfig;
use crate::error::ConfigError;
use crate::ports::{Broker, Middleware, ProcessExit, ResultStore, StdProcessExit};

/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new(broker, store)
///     .middleware(Arc::new(AuditMiddleware))
///     .config(cfg)
///     .expect_tasks(&["math.add"])
///     .build()?;
/// worker.run().await?;
/// ```
pub struct WorkerBuilder {
    broker: Arc<dyn Broker>,
    result_store: Arc<dyn ResultStore>,
    pipeline: MiddlewarePipeline,
    config: WorkerConfig,
    exit: Arc<dyn ProcessExit>,
    expected_tasks: Vec<String>,
    install_signals: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing tasks: {0:?}. These tasks were expected but not registered.")]
    MissingTasks(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WorkerBuilder {
    pub fn new(broker: Arc<dyn Broker>, result_store: Arc<dyn ResultStore>) -> Self {
        Self {
            broker,
            result_store,
            pipeline: MiddlewarePipeline::default(),
            config: WorkerConfig::default(),
            exit: Arc::new(StdProcessExit),
            expected_tasks: Vec::new(),
            install_signals: true,
        }
    }

    /// Append a middleware. Hooks run in the order they were added.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.pipeline.push(middleware);
        self
    }

    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    pub fn expect_tasks(mut self, names: &[&str]) -> Self {
        self.expected_tasks
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn install_signals(mut self, install: bool) -> Self {
        self.install_signals = install;
        self
    }

    pub fn build(self) -> Result<WorkerLoop, BuildError> {
        self.config.validate()?;

        let registry = self.broker.registry();
        let mut missing: Vec<String> = self
            .expected_tasks
            .iter()
            .chain(self.config.expected_tasks.iter())
            .filter(|name| !registry.contains(name))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        if !missing.is_empty() {
            return Err(BuildError::MissingTasks(missing));
        }

        let controller = ShutdownController::new(Arc::clone(&self.broker), self.exit);
        let worker = WorkerLoop::new(
            self.broker,
            self.result_store,
            self.pipeline,
            controller,
            self.config,
        );
        Ok(if self.install_signals {
            worker
        } else {
            worker.without_signals()
        })
    }
}
