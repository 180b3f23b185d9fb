//! InMemoryResultStore - 開発用の結果ストア
//!
//! `capacity` を指定すると、溢れた分は古い task_id から捨てる。
//! 同じ task_id への再書き込みは上書きで、順序は最初の書き込みのまま。

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ExecutionResult;
use crate::error::ResultStoreError;
use crate::ports::ResultStore;

#[derive(Default)]
struct Entries {
    results: HashMap<String, ExecutionResult>,
    order: VecDeque<String>,
}

#[derive(Default)]
pub struct InMemoryResultStore {
    entries: RwLock<Entries>,
    capacity: Option<usize>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::default(),
            capacity: Some(capacity.max(1)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.results.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.results.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn set_result(
        &self,
        task_id: &str,
        result: &ExecutionResult,
    ) -> Result<(), ResultStoreError> {
        let mut entries = self.entries.write().await;
        if entries
            .results
            .insert(task_id.to_string(), result.clone())
            .is_none()
        {
            entries.order.push_back(task_id.to_string());
        }
        if let Some(capacity) = self.capacity {
            while entries.order.len() > capacity {
                if let Some(oldest) = entries.order.pop_front() {
                    entries.results.remove(&oldest);
                }
            }
        }
        Ok(())
    }

    async fn get_result(&self, task_id: &str) -> Result<Option<ExecutionResult>, ResultStoreError> {
        Ok(self.entries.read().await.results.get(task_id).cloned())
    }
}
