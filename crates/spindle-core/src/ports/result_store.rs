//! ResultStore port - 実行結果の保存先
//!
//! 書き込み失敗はワーカー側でログに残して握りつぶす（ループは止めない）。

use async_trait::async_trait;

use crate::domain::ExecutionResult;
use crate::error::ResultStoreError;

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn set_result(
        &self,
        task_id: &str,
        result: &ExecutionResult,
    ) -> Result<(), ResultStoreError>;

    async fn get_result(&self, task_id: &str) -> Result<Option<ExecutionResult>, ResultStoreError>;

    async fn is_result_ready(&self, task_id: &str) -> Result<bool, ResultStoreError> {
        Ok(self.get_result(task_id).await?.is_some())
    }
}
