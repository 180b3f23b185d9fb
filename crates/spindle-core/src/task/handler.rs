//! Handler traits - タスク本体の定義
//!
//! # 使用例
//! ```ignore
//! let add = TaskHandler::from_blocking(|args: TaskArgs| {
//!     let a: i64 = args.get(0, "a")?;
//!     let b: i64 = args.get(1, "b")?;
//!     Ok(json!(a + b))
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::domain::TaskInvocation;
use crate::error::TaskError;

/// Call arguments handed to a handler.
///
/// Owned copy of the invocation's args, so a blocking handler can take it
/// to another thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    /// Deserialize the parameter at `index` named `name`, positional first.
    pub fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, TaskError> {
        let value = self
            .raw(index, name)
            .ok_or_else(|| TaskError::invalid_argument(name, "missing required argument"))?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskError::invalid_argument(name, e.to_string()))
    }

    /// Like [`TaskArgs::get`], but a missing or null argument gives `None`.
    pub fn get_opt<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, TaskError> {
        match self.raw(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(index, name).map(Some),
        }
    }

    pub fn raw(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }
}

impl From<&TaskInvocation> for TaskArgs {
    fn from(invocation: &TaskInvocation) -> Self {
        Self {
            args: invocation.args.clone(),
            kwargs: invocation.kwargs.clone(),
        }
    }
}

/// Natively asynchronous handler, awaited on the worker's scheduler.
#[async_trait]
pub trait AsyncHandler: Send + Sync {
    async fn call(&self, args: TaskArgs) -> Result<Value, TaskError>;
}

/// Synchronous handler. Runs on the blocking pool, never on the scheduler.
pub trait BlockingHandler: Send + Sync {
    fn call(&self, args: TaskArgs) -> Result<Value, TaskError>;
}

/// Type-erased handler as stored in the registry.
#[derive(Clone)]
pub enum TaskHandler {
    Async(Arc<dyn AsyncHandler>),
    Blocking(Arc<dyn BlockingHandler>),
}

impl TaskHandler {
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        TaskHandler::Async(Arc::new(AsyncFn::new(f)))
    }

    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn(TaskArgs) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        TaskHandler::Blocking(Arc::new(BlockingFn::new(f)))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, TaskHandler::Async(_))
    }
}

impl fmt::Debug for TaskHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskHandler::Async(_) => f.write_str("TaskHandler::Async"),
            TaskHandler::Blocking(_) => f.write_str("TaskHandler::Blocking"),
        }
    }
}

/// Adapter from an async closure to [`AsyncHandler`].
pub struct AsyncFn<F> {
    f: F,
}

impl<F> AsyncFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AsyncHandler for AsyncFn<F>
where
    F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn call(&self, args: TaskArgs) -> Result<Value, TaskError> {
        (self.f)(args).await
    }
}

/// Adapter from a plain closure to [`BlockingHandler`].
pub struct BlockingFn<F> {
    f: F,
}

impl<F> BlockingFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> BlockingHandler for BlockingFn<F>
where
    F: Fn(TaskArgs) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    fn call(&self, args: TaskArgs) -> Result<Value, TaskError> {
        (self.f)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn async_closure_handler_is_called() {
        let handler = TaskHandler::from_async(|args: TaskArgs| async move {
            let name: String = args.get(0, "name")?;
            Ok(json!(format!("hello {name}")))
        });
        let TaskHandler::Async(h) = handler else {
            panic!("expected async handler");
        };
        let out = h
            .call(TaskArgs::new(vec![json!("bob")], Map::new()))
            .await
            .unwrap();
        assert_eq!(out, json!("hello bob"));
    }

    #[test]
    fn blocking_handler_reports_invalid_argument() {
        let handler = TaskHandler::from_blocking(|args: TaskArgs| {
            let a: i64 = args.get(0, "a")?;
            Ok(json!(a))
        });
        let TaskHandler::Blocking(h) = handler else {
            panic!("expected blocking handler");
        };
        let err = h
            .call(TaskArgs::new(vec![json!("x")], Map::new()))
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidArgument { ref param, .. } if param == "a"));
    }

    #[test]
    fn get_opt_treats_null_as_missing() {
        let mut kwargs = Map::new();
        kwargs.insert("limit".into(), Value::Null);
        let args = TaskArgs::new(vec![], kwargs);
        assert_eq!(args.get_opt::<i64>(0, "limit").unwrap(), None);
        assert!(args.get::<i64>(0, "limit").is_err());
    }
}
