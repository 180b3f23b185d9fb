//! End-to-end behaviour of the worker loop over the in-memory broker.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use spindle_core::app::{ExitStatus, LoopExit, WorkerLoop};
use spindle_core::domain::{BrokerMessage, ExecutionResult, TaskInvocation, TaskSignature, TypeDescriptor};
use spindle_core::error::{MiddlewareError, ResultStoreError, TaskError};
use spindle_core::impls::{InMemoryBroker, InMemoryResultStore};
use spindle_core::ports::{Middleware, ProcessExit, ResultStore};
use spindle_core::task::{RegisteredTask, TaskArgs, TaskHandler, TaskRegistry};
use spindle_core::{WorkerBuilder, WorkerConfig};

type Calls = Arc<Mutex<Vec<String>>>;

struct NoExit;

impl ProcessExit for NoExit {
    fn exit(&self, _status: ExitStatus) {}
}

fn registry(add_calls: Arc<AtomicUsize>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register(RegisteredTask::new(
            "add",
            TaskHandler::from_blocking(move |args: TaskArgs| {
                add_calls.fetch_add(1, Ordering::SeqCst);
                let a: i64 = args.get(0, "a")?;
                let b: i64 = args.get(1, "b")?;
                Ok(json!(a + b))
            }),
            TaskSignature::new()
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int),
        ))
        .unwrap();
    registry
        .register(RegisteredTask::new(
            "echo",
            TaskHandler::from_async(|args: TaskArgs| async move {
                tracing::info!("echoing");
                Ok(args.raw(0, "value").cloned().unwrap_or(Value::Null))
            }),
            TaskSignature::new().untyped("value"),
        ))
        .unwrap();
    registry
}

struct Harness {
    broker: Arc<InMemoryBroker>,
    store: Arc<InMemoryResultStore>,
    add_calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let add_calls = Arc::new(AtomicUsize::new(0));
        Self {
            broker: Arc::new(InMemoryBroker::new(registry(Arc::clone(&add_calls)))),
            store: Arc::new(InMemoryResultStore::new()),
            add_calls,
        }
    }

    fn worker(&self, config: WorkerConfig, middlewares: Vec<Arc<dyn Middleware>>) -> WorkerLoop {
        let mut builder = WorkerBuilder::new(self.broker.clone(), self.store.clone())
            .config(config)
            .exit(Arc::new(NoExit))
            .install_signals(false);
        for middleware in middlewares {
            builder = builder.middleware(middleware);
        }
        builder.build().unwrap()
    }

    async fn result(&self, task_id: &str) -> Option<ExecutionResult> {
        self.store.get_result(task_id).await.unwrap()
    }
}

/// Records hook calls and the arguments seen by `pre_execute` / `post_execute`.
struct Recorder {
    tag: &'static str,
    calls: Calls,
    seen_args: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl Recorder {
    fn new(tag: &'static str, calls: &Calls) -> Self {
        Self {
            tag,
            calls: Arc::clone(calls),
            seen_args: Arc::default(),
        }
    }
}

#[async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        self.tag
    }

    async fn pre_execute(&self, invocation: TaskInvocation) -> Result<TaskInvocation, MiddlewareError> {
        self.calls.lock().unwrap().push(format!("pre:{}", self.tag));
        Ok(invocation)
    }

    async fn on_error(
        &self,
        _invocation: &TaskInvocation,
        _result: &ExecutionResult,
        error: &TaskError,
    ) -> Result<(), MiddlewareError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("err:{}:{}", self.tag, error.as_label()));
        Ok(())
    }

    async fn post_execute(
        &self,
        invocation: &TaskInvocation,
        _result: &ExecutionResult,
    ) -> Result<(), MiddlewareError> {
        self.calls.lock().unwrap().push(format!("post:{}", self.tag));
        self.seen_args.lock().unwrap().push(invocation.args.clone());
        Ok(())
    }
}

struct Gatekeeper;

#[async_trait]
impl Middleware for Gatekeeper {
    fn name(&self) -> &str {
        "gatekeeper"
    }

    async fn pre_execute(&self, _invocation: TaskInvocation) -> Result<TaskInvocation, MiddlewareError> {
        Err(MiddlewareError::new("gatekeeper", "not allowed"))
    }
}

struct BrokenPost;

#[async_trait]
impl Middleware for BrokenPost {
    async fn post_execute(
        &self,
        _invocation: &TaskInvocation,
        _result: &ExecutionResult,
    ) -> Result<(), MiddlewareError> {
        Err(MiddlewareError::new("broken_post", "disk full"))
    }
}

#[tokio::test]
async fn string_arguments_are_coerced_before_execution() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![]);
    let id = h.broker.kick("add", vec![json!("2"), json!("3")], Map::new()).unwrap();
    h.broker.close();

    assert_eq!(worker.run().await.unwrap(), LoopExit::StreamClosed);

    let result = h.result(&id).await.unwrap();
    assert!(!result.is_err);
    assert_eq!(result.return_value, Some(json!(5)));
    assert!(result.execution_time >= 0.0);
}

#[tokio::test]
async fn uncoercible_argument_is_left_as_is_and_the_task_fails() {
    let h = Harness::new();
    let calls = Calls::default();
    let recorder = Arc::new(Recorder::new("rec", &calls));
    let worker = h.worker(WorkerConfig::default(), vec![recorder.clone() as Arc<dyn Middleware>]);
    let id = h.broker.kick("add", vec![json!("x"), json!("3")], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();

    assert_eq!(*recorder.seen_args.lock().unwrap(), vec![vec![json!("x"), json!(3)]]);
    let result = h.result(&id).await.unwrap();
    assert!(result.is_err);
    assert_eq!(result.return_value, None);
    assert!(matches!(result.error, Some(TaskError::InvalidArgument { ref param, .. }) if param == "a"));
}

#[tokio::test]
async fn keyword_arguments_are_coerced_by_name() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![]);
    let mut kwargs = Map::new();
    kwargs.insert("b".into(), json!("40"));
    let id = h.broker.kick("add", vec![json!(2)], kwargs).unwrap();
    h.broker.close();

    worker.run().await.unwrap();
    assert_eq!(h.result(&id).await.unwrap().return_value, Some(json!(42)));
}

#[tokio::test]
async fn no_parse_disables_coercion() {
    let h = Harness::new();
    let config = WorkerConfig {
        no_parse: true,
        ..WorkerConfig::default()
    };
    let worker = h.worker(config, vec![]);
    let id = h.broker.kick("add", vec![json!("2"), json!("3")], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();

    let result = h.result(&id).await.unwrap();
    assert!(result.is_err);
    assert_eq!(h.add_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_task_is_skipped_and_the_loop_continues() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![]);
    let ghost = h.broker.kick("ghost", vec![], Map::new()).unwrap();
    let next = h.broker.kick("echo", vec![json!("hi")], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();

    assert_eq!(h.result(&ghost).await, None);
    assert_eq!(h.result(&next).await.unwrap().return_value, Some(json!("hi")));
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn undecodable_message_is_skipped() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![]);
    h.broker
        .kick_message(BrokerMessage::new("bad", "add", b"{not json".to_vec()))
        .unwrap();
    let good = h.broker.kick("add", vec![json!(1), json!(1)], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();

    assert_eq!(h.result("bad").await, None);
    assert_eq!(h.result(&good).await.unwrap().return_value, Some(json!(2)));
    assert_eq!(h.add_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hooks_run_in_registration_order() {
    let h = Harness::new();
    let calls = Calls::default();
    let worker = h.worker(
        WorkerConfig::default(),
        vec![
            Arc::new(Recorder::new("a", &calls)),
            Arc::new(Recorder::new("b", &calls)),
        ],
    );
    h.broker.kick("add", vec![json!(1), json!(2)], Map::new()).unwrap();
    h.broker.kick("add", vec![json!("x"), json!(2)], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "pre:a",
            "pre:b",
            "post:a",
            "post:b",
            "pre:a",
            "pre:b",
            "err:a:task_invalid_argument",
            "err:b:task_invalid_argument",
            "post:a",
            "post:b",
        ]
    );
}

#[tokio::test]
async fn failing_pre_execute_skips_the_handler_but_persists_a_failure() {
    let h = Harness::new();
    let calls = Calls::default();
    let worker = h.worker(
        WorkerConfig::default(),
        vec![Arc::new(Gatekeeper), Arc::new(Recorder::new("rec", &calls))],
    );
    let id = h.broker.kick("add", vec![json!(1), json!(2)], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();

    assert_eq!(h.add_calls.load(Ordering::SeqCst), 0);
    let result = h.result(&id).await.unwrap();
    assert!(result.is_err);
    assert_eq!(result.execution_time, 0.0);
    assert!(matches!(
        result.error,
        Some(TaskError::Middleware { ref middleware, .. }) if middleware == "gatekeeper"
    ));
    assert_eq!(*calls.lock().unwrap(), vec!["err:rec:task_middleware", "post:rec"]);
}

#[tokio::test]
async fn failing_post_execute_still_persists_the_result() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![Arc::new(BrokenPost)]);
    let id = h.broker.kick("add", vec![json!(4), json!(5)], Map::new()).unwrap();
    h.broker.close();

    worker.run().await.unwrap();
    assert_eq!(h.result(&id).await.unwrap().return_value, Some(json!(9)));
}

/// Fails the first write, then accepts.
#[derive(Default)]
struct FlakyStore {
    failed_once: AtomicBool,
    results: Mutex<Vec<String>>,
}

#[async_trait]
impl ResultStore for FlakyStore {
    async fn set_result(&self, task_id: &str, _result: &ExecutionResult) -> Result<(), ResultStoreError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(ResultStoreError::Unavailable("connection refused".into()));
        }
        self.results.lock().unwrap().push(task_id.to_string());
        Ok(())
    }

    async fn get_result(&self, _task_id: &str) -> Result<Option<ExecutionResult>, ResultStoreError> {
        Ok(None)
    }
}

#[tokio::test]
async fn result_store_failure_does_not_stop_the_loop() {
    let h = Harness::new();
    let store = Arc::new(FlakyStore::default());
    let worker = WorkerBuilder::new(h.broker.clone(), store.clone())
        .exit(Arc::new(NoExit))
        .install_signals(false)
        .build()
        .unwrap();
    let first = h.broker.kick("add", vec![json!(1), json!(1)], Map::new()).unwrap();
    let second = h.broker.kick("add", vec![json!(2), json!(2)], Map::new()).unwrap();
    h.broker.close();

    assert_eq!(worker.run().await.unwrap(), LoopExit::StreamClosed);
    assert_eq!(*store.results.lock().unwrap(), vec![second]);
    assert_ne!(first, store.results.lock().unwrap()[0]);
    assert_eq!(h.add_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_cancels_a_waiting_loop() {
    let h = Harness::new();
    let worker = Arc::new(h.worker(WorkerConfig::default(), vec![]));

    let running = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };
    let id = h.broker.kick("add", vec![json!(3), json!(4)], Map::new()).unwrap();

    // wait until the first message went through, then stop
    while h.result(&id).await.is_none() {
        tokio::task::yield_now().await;
    }
    assert!(worker.controller().trigger("SIGTERM"));
    assert_eq!(worker.controller().wait_stopped().await, ExitStatus::Clean);

    let exit = running.await.unwrap().unwrap();
    assert_eq!(exit, LoopExit::Cancelled);
    assert!(h.broker.is_closed());
}

#[tokio::test]
async fn process_message_returns_the_computed_result_and_stores_it() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![]);
    let payload = serde_json::to_vec(&json!({ "args": ["7"], "kwargs": { "b": 8 } })).unwrap();

    let result = worker
        .process_message(BrokerMessage::new("direct", "add", payload))
        .await
        .unwrap();

    assert_eq!(result.return_value, Some(json!(15)));
    assert_eq!(h.result("direct").await, Some(result));
}

/// Sleeps in both hooks around the handler.
struct SlowHooks;

#[async_trait]
impl Middleware for SlowHooks {
    async fn pre_execute(&self, invocation: TaskInvocation) -> Result<TaskInvocation, MiddlewareError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(invocation)
    }

    async fn post_execute(
        &self,
        _invocation: &TaskInvocation,
        _result: &ExecutionResult,
    ) -> Result<(), MiddlewareError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

#[tokio::test]
async fn execution_time_covers_only_the_handler() {
    let h = Harness::new();
    let worker = h.worker(WorkerConfig::default(), vec![Arc::new(SlowHooks)]);
    let id = h.broker.kick("echo", vec![json!("hi")], Map::new()).unwrap();
    h.broker.close();

    assert_eq!(worker.run().await.unwrap(), LoopExit::StreamClosed);

    let result = h.result(&id).await.unwrap();
    assert_eq!(result.return_value, Some(json!("hi")));
    assert!(
        result.execution_time < 0.05,
        "hook time leaked into execution_time: {}",
        result.execution_time
    );
}
