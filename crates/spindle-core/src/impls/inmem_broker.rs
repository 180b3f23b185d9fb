//! InMemoryBroker - 開発用・テスト用の broker
//!
//! # 実装詳細
//! - `tokio::sync::mpsc` の unbounded チャネル
//! - `kick()` が送信側、`listen()` が受信側をストリームとして取り出す
//! - 受信側は 1 つしかないので `listen()` が有効なのは最初の 1 回だけ
//! - `close()` で送信側を捨てると、溜まっている分を流し切ってからストリームが終わる

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::domain::{BrokerMessage, TaskInvocation};
use crate::error::BrokerError;
use crate::ports::{Broker, encode_json};
use crate::task::TaskRegistry;

/// # 使用例
/// ```ignore
/// let broker = InMemoryBroker::new(registry);
/// let task_id = broker.kick("math.add", vec![json!("2"), json!(3)], Map::new())?;
/// broker.close();
/// ```
pub struct InMemoryBroker {
    registry: Arc<TaskRegistry>,
    tx: Mutex<Option<mpsc::UnboundedSender<BrokerMessage>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<BrokerMessage>>>,
}

impl InMemoryBroker {
    pub fn new(registry: TaskRegistry) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry: Arc::new(registry),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Enqueue a call of `task_name` with a fresh ULID as task id.
    pub fn kick(
        &self,
        task_name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<String, BrokerError> {
        let task_id = Ulid::new().to_string();
        self.kick_message(BrokerMessage::new(
            task_id.clone(),
            task_name,
            encode_json(&args, &kwargs),
        ))?;
        Ok(task_id)
    }

    /// Enqueue an already built invocation, keeping its id and labels.
    pub fn kick_invocation(&self, invocation: &TaskInvocation) -> Result<(), BrokerError> {
        let mut message = BrokerMessage::new(
            invocation.task_id.clone(),
            invocation.task_name.clone(),
            encode_json(&invocation.args, &invocation.kwargs),
        );
        message.labels = invocation.labels.clone();
        self.kick_message(message)
    }

    /// Enqueue a raw message as is. The payload is not validated.
    pub fn kick_message(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let tx = lock(&self.tx);
        let Some(tx) = tx.as_ref() else {
            return Err(BrokerError::Closed);
        };
        debug!(task_id = %message.task_id, task_name = %message.task_name, "Kicking task");
        tx.send(message).map_err(|_| BrokerError::Closed)
    }

    /// Stop accepting messages. The listen stream ends once drained.
    pub fn close(&self) {
        lock(&self.tx).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn shutdown(&self) -> Result<Option<String>, BrokerError> {
        self.close();
        Ok(None)
    }

    fn listen(&self) -> BoxStream<'static, BrokerMessage> {
        match lock(&self.rx).take() {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|message| (message, rx))
            })
            .boxed(),
            None => {
                warn!("InMemoryBroker can be listened only once");
                futures::stream::empty().boxed()
            }
        }
    }

    fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }
}

// the guarded Options stay consistent even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
