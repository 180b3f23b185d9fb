use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw unit handed over by a broker.
///
/// `task_id` / `task_name` / `labels` are readable without decoding; the
/// arguments live in `payload` and only the broker knows its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub task_id: String,
    pub task_name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    pub fn new(
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            labels: HashMap::new(),
            payload: payload.into(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Decoded message: a task name bound to its call arguments.
///
/// The coercer rewrites `args` / `kwargs` in place, so this is owned and
/// mutable for the duration of one message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub task_id: String,
    pub task_name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskInvocation {
    pub fn new(task_id: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invocation_fields_default_when_missing() {
        let inv: TaskInvocation =
            serde_json::from_value(json!({"task_id": "1", "task_name": "t"})).unwrap();
        assert!(inv.args.is_empty());
        assert!(inv.kwargs.is_empty());
        assert!(inv.labels.is_empty());
    }
}
