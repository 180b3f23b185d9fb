//! spindle-worker: runs a worker against the in-memory broker.
//!
//! デモ用のタスク（`math.add`, `text.shout`, `util.sleep`）を登録し、
//! 起動時にいくつか kick してから処理する。
//! `--once` を付けると kick した分を処理し終えたところで終了する。
//! 付けなければ SIGINT / SIGTERM まで待ち続ける。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde_json::{Map, Value, json};
use tracing::info;

use spindle_core::domain::{ExecutionResult, TaskInvocation, TaskSignature, TypeDescriptor};
use spindle_core::error::{MiddlewareError, TaskError};
use spindle_core::impls::{InMemoryBroker, InMemoryResultStore};
use spindle_core::logging::init_logging;
use spindle_core::ports::{Middleware, ResultStore};
use spindle_core::task::{RegisteredTask, TaskArgs, TaskHandler, TaskRegistry};
use spindle_core::{WorkerBuilder, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "spindle-worker", version, about = "Run a Spindle task worker")]
struct Args {
    /// Path to a TOML/YAML/JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Size of the pool running blocking handlers
    #[arg(long)]
    max_threadpool_threads: Option<usize>,

    /// Do not coerce arguments to the declared parameter types
    #[arg(long)]
    no_parse: bool,

    /// Template for captured task logs
    #[arg(long)]
    log_collector_format: Option<String>,

    /// Console log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit console logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Exit once the demo messages are processed
    #[arg(long)]
    once: bool,
}

impl Args {
    fn apply(&self, mut cfg: WorkerConfig) -> WorkerConfig {
        if let Some(threads) = self.max_threadpool_threads {
            cfg.max_threadpool_threads = threads;
        }
        if self.no_parse {
            cfg.no_parse = true;
        }
        if let Some(format) = &self.log_collector_format {
            cfg.log_collector_format = format.clone();
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        if self.log_json {
            cfg.log_json = true;
        }
        cfg
    }
}

/// Logs every invocation and its outcome.
struct AuditMiddleware;

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &str {
        "audit"
    }

    async fn pre_execute(&self, invocation: TaskInvocation) -> Result<TaskInvocation, MiddlewareError> {
        info!(task_id = %invocation.task_id, task_name = %invocation.task_name, "audit: start");
        Ok(invocation)
    }

    async fn on_error(
        &self,
        invocation: &TaskInvocation,
        _result: &ExecutionResult,
        error: &TaskError,
    ) -> Result<(), MiddlewareError> {
        info!(task_id = %invocation.task_id, kind = error.as_label(), "audit: failed");
        Ok(())
    }

    async fn post_execute(
        &self,
        invocation: &TaskInvocation,
        result: &ExecutionResult,
    ) -> Result<(), MiddlewareError> {
        info!(
            task_id = %invocation.task_id,
            is_err = result.is_err,
            execution_time = result.execution_time,
            "audit: done"
        );
        Ok(())
    }
}

fn demo_registry() -> anyhow::Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();

    registry.register(RegisteredTask::new(
        "math.add",
        TaskHandler::from_blocking(|args: TaskArgs| {
            let a: i64 = args.get(0, "a")?;
            let b: i64 = args.get(1, "b")?;
            tracing::info!(a, b, "adding");
            Ok(json!(a + b))
        }),
        TaskSignature::new()
            .param("a", TypeDescriptor::Int)
            .param("b", TypeDescriptor::Int),
    ))?;

    registry.register(RegisteredTask::new(
        "text.shout",
        TaskHandler::from_async(|args: TaskArgs| async move {
            let text: String = args.get(0, "text")?;
            Ok(json!(text.to_uppercase()))
        }),
        TaskSignature::new().param("text", TypeDescriptor::Str),
    ))?;

    registry.register(RegisteredTask::new(
        "util.sleep",
        TaskHandler::from_async(|args: TaskArgs| async move {
            let seconds: f64 = args.get(0, "seconds")?;
            if !(0.0..=60.0).contains(&seconds) {
                return Err(TaskError::invalid_argument("seconds", "must be within 0..=60"));
            }
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            Ok(Value::Null)
        }),
        TaskSignature::new().param("seconds", TypeDescriptor::Float),
    ))?;

    Ok(registry)
}

fn kick_demo(broker: &InMemoryBroker) -> anyhow::Result<Vec<String>> {
    let mut sleep_kwargs = Map::new();
    sleep_kwargs.insert("seconds".to_string(), json!("0.1"));

    Ok(vec![
        broker.kick("math.add", vec![json!("2"), json!("3")], Map::new())?,
        broker.kick("math.add", vec![json!("x"), json!("3")], Map::new())?,
        broker.kick("text.shout", vec![json!(42)], Map::new())?,
        broker.kick("util.sleep", vec![], sleep_kwargs)?,
    ])
}

async fn run(cfg: WorkerConfig, once: bool) -> anyhow::Result<()> {
    let broker = Arc::new(InMemoryBroker::new(demo_registry()?));
    let store = Arc::new(InMemoryResultStore::new());

    let worker = WorkerBuilder::new(broker.clone(), store.clone())
        .middleware(Arc::new(AuditMiddleware))
        .config(cfg)
        .build()
        .context("failed to build worker")?;

    let ids = kick_demo(&broker)?;
    if once {
        broker.close();
    }

    let exit = worker.run().await?;
    info!(exit = ?exit, "worker returned");

    for id in ids {
        match store.get_result(&id).await? {
            Some(result) => {
                let execution_time = result.execution_time;
                match result.into_outcome() {
                    Ok(value) => info!(task_id = %id, execution_time, return_value = ?value, "result"),
                    Err(err) => info!(task_id = %id, execution_time, error = %err, "failed"),
                }
            }
            None => info!(task_id = %id, "no result"),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = args.apply(WorkerConfig::load(args.config.as_deref())?);
    cfg.validate()?;

    init_logging(&cfg.log_level, cfg.log_json).context("failed to install tracing subscriber")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(cfg.max_threadpool_threads)
        .build()
        .context("failed to build tokio runtime")?;

    let once = args.once;
    runtime.block_on(run(cfg, once))
}
