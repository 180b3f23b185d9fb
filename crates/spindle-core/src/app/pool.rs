//! BlockingPool - 同期ハンドラ用の固定サイズのスレッドプール
//!
//! # 実装詳細
//! - `Semaphore` の permit 数 = プールサイズ（`max_threadpool_threads`）
//! - permit を取れた仕事だけ `spawn_blocking` に渡す。溢れた仕事は permit 待ちで並ぶ
//! - permit はクロージャに move するので、呼び出し側の future が drop されても
//!   実際の処理が終わるまで枠は返らない

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("blocking task panicked: {0}")]
    Panicked(String),

    #[error("blocking task was cancelled")]
    Cancelled,

    #[error("blocking pool is closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by running work.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `f` on a blocking thread once a slot is free.
    pub async fn run<F, R>(&self, f: F) -> Result<R, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|err| {
            if err.is_panic() {
                PoolError::Panicked(panic_message(&*err.into_panic()))
            } else {
                PoolError::Cancelled
            }
        })
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
