//! Broker port - メッセージの供給元
//!
//! `listen()` は遅延・無限・再開不可のストリームを返す。
//! ペイロードの形式は broker ごとに違ってよいので `decode` も broker が持つ。
//! デフォルトは JSON: `{"args": [...], "kwargs": {...}}`

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{BrokerMessage, TaskInvocation};
use crate::error::{BrokerError, DecodeError};
use crate::task::TaskRegistry;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Called once before the worker starts listening.
    async fn startup(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    /// Release broker resources. A returned value is logged by the worker.
    async fn shutdown(&self) -> Result<Option<String>, BrokerError> {
        Ok(None)
    }

    fn listen(&self) -> BoxStream<'static, BrokerMessage>;

    /// Tasks this broker can execute.
    fn registry(&self) -> Arc<TaskRegistry>;

    fn decode(&self, message: &BrokerMessage) -> Result<TaskInvocation, DecodeError> {
        decode_json(message)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonPayload {
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Map<String, Value>,
}

/// Default payload format.
pub fn decode_json(message: &BrokerMessage) -> Result<TaskInvocation, DecodeError> {
    if message.payload.is_empty() {
        return Err(DecodeError::Malformed("empty payload".to_string()));
    }
    let payload: JsonPayload = serde_json::from_slice(&message.payload)?;
    Ok(TaskInvocation {
        task_id: message.task_id.clone(),
        task_name: message.task_name.clone(),
        labels: message.labels.clone(),
        args: payload.args,
        kwargs: payload.kwargs,
    })
}

/// Inverse of [`decode_json`], used by producers.
pub fn encode_json(args: &[Value], kwargs: &Map<String, Value>) -> Vec<u8> {
    // a Vec<Value> and a string-keyed map always serialize
    serde_json::to_vec(&serde_json::json!({ "args": args, "kwargs": kwargs }))
        .unwrap_or_default()
}
