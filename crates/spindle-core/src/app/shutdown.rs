//! ShutdownController - シグナル駆動の終了処理
//!
//! # 状態遷移
//! ```text
//! Running ──trigger()──► ShuttingDown ──teardown 完了──► Stopped
//! ```
//! - `Running → ShuttingDown` は `compare_exchange` 1 回。勝った呼び出しだけが teardown する
//! - 2 回目以降の trigger（シグナル連打、teardown 中のシグナル）は何もしない
//! - teardown 完了後に CancellationToken を cancel し、最後に 1 度だけ exit する

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::pool::panic_message;
use crate::ports::{Broker, ProcessExit};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl From<u8> for ShutdownState {
    fn from(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::ShuttingDown,
            _ => ShutdownState::Stopped,
        }
    }
}

/// Process exit status computed by the teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Clean,
    TeardownFailed,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::TeardownFailed => 1,
        }
    }
}

struct Inner {
    state: AtomicU8,
    broker: Arc<dyn Broker>,
    exit: Arc<dyn ProcessExit>,
    token: CancellationToken,
    stopped_tx: watch::Sender<Option<ExitStatus>>,
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    pub fn new(broker: Arc<dyn Broker>, exit: Arc<dyn ProcessExit>) -> Self {
        let (stopped_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(ShutdownState::Running as u8),
                broker,
                exit,
                token: CancellationToken::new(),
                stopped_tx,
            }),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from(self.inner.state.load(Ordering::Acquire))
    }

    /// Cancelled once the broker teardown has finished.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Start the shutdown sequence. Returns `false` if it was already started.
    ///
    /// Must be called from within a tokio runtime: the teardown runs as a
    /// spawned task so the caller (usually the signal listener) never waits.
    pub fn trigger(&self, reason: &str) -> bool {
        let won = self
            .inner
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            debug!(reason = %reason, state = ?self.state(), "Shutdown already in progress");
            return false;
        }

        info!(reason = %reason, "Shutting down worker process.");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.teardown().await });
        true
    }

    /// Resolves with the exit status once the teardown has completed.
    pub async fn wait_stopped(&self) -> ExitStatus {
        let mut rx = self.inner.stopped_tx.subscribe();
        let status = match rx.wait_for(Option::is_some).await {
            Ok(status) => *status,
            // the sender lives as long as `self`
            Err(_) => None,
        };
        status.unwrap_or(ExitStatus::Clean)
    }
}

impl Inner {
    async fn teardown(&self) {
        let outcome = AssertUnwindSafe(self.broker.shutdown()).catch_unwind().await;
        let status = match outcome {
            Ok(Ok(Some(value))) => {
                info!(value = %value, "Broker returned value on shutdown");
                ExitStatus::Clean
            }
            Ok(Ok(None)) => ExitStatus::Clean,
            Ok(Err(err)) => {
                warn!(error = %err, "Exception was found while shutting down!");
                ExitStatus::TeardownFailed
            }
            Err(payload) => {
                warn!(panic = %panic_message(&*payload), "Broker shutdown panicked");
                ExitStatus::TeardownFailed
            }
        };

        self.state.store(ShutdownState::Stopped as u8, Ordering::Release);
        self.token.cancel();
        info!(exit_code = status.code(), "Worker process killed.");
        self.exit.exit(status);
        // wait_stopped() resolves only after the exit hook ran
        self.stopped_tx.send_replace(Some(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerError;
    use crate::task::TaskRegistry;
    use crate::domain::BrokerMessage;
    use async_trait::async_trait;
    use futures::StreamExt;
    use futures::stream::BoxStream;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct SlowBroker {
        shutdowns: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Broker for SlowBroker {
        async fn shutdown(&self) -> Result<Option<String>, BrokerError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(BrokerError::Shutdown("connection reset".into()))
            } else {
                Ok(Some("bye".into()))
            }
        }

        fn listen(&self) -> BoxStream<'static, BrokerMessage> {
            futures::stream::empty().boxed()
        }

        fn registry(&self) -> Arc<TaskRegistry> {
            Arc::new(TaskRegistry::new())
        }
    }

    #[derive(Default)]
    struct RecordingExit(Mutex<Vec<ExitStatus>>);

    impl ProcessExit for RecordingExit {
        fn exit(&self, status: ExitStatus) {
            self.0.lock().unwrap().push(status);
        }
    }

    fn setup(fail: bool) -> (ShutdownController, Arc<SlowBroker>, Arc<RecordingExit>) {
        let broker = Arc::new(SlowBroker {
            shutdowns: AtomicUsize::new(0),
            fail,
        });
        let exit = Arc::new(RecordingExit::default());
        let ctl = ShutdownController::new(broker.clone(), exit.clone());
        (ctl, broker, exit)
    }

    #[tokio::test]
    async fn double_trigger_runs_one_teardown_and_one_exit() {
        let (ctl, broker, exit) = setup(false);

        assert!(ctl.trigger("SIGTERM"));
        assert!(!ctl.trigger("SIGINT"));
        assert_eq!(ctl.state(), ShutdownState::ShuttingDown);

        let status = ctl.wait_stopped().await;
        assert!(!ctl.trigger("SIGTERM"));

        assert_eq!(status, ExitStatus::Clean);
        assert_eq!(ctl.state(), ShutdownState::Stopped);
        assert_eq!(broker.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(*exit.0.lock().unwrap(), vec![ExitStatus::Clean]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_have_a_single_winner() {
        let (ctl, broker, exit) = setup(false);

        let mut joins = Vec::new();
        for i in 0..8 {
            let ctl = ctl.clone();
            joins.push(tokio::spawn(async move { ctl.trigger(&format!("signal-{i}")) }));
        }
        let mut winners = 0;
        for j in joins {
            if j.await.unwrap() {
                winners += 1;
            }
        }
        ctl.wait_stopped().await;

        assert_eq!(winners, 1);
        assert_eq!(broker.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(exit.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn teardown_error_exits_with_failure() {
        let (ctl, _broker, exit) = setup(true);
        ctl.trigger("SIGTERM");

        assert_eq!(ctl.wait_stopped().await, ExitStatus::TeardownFailed);
        assert_eq!(*exit.0.lock().unwrap(), vec![ExitStatus::TeardownFailed]);
        assert_eq!(ExitStatus::TeardownFailed.code(), 1);
    }

    #[tokio::test]
    async fn token_is_cancelled_only_after_teardown() {
        let (ctl, _broker, _exit) = setup(false);
        let token = ctl.cancellation_token();

        ctl.trigger("SIGINT");
        assert!(!token.is_cancelled());

        token.cancelled().await;
        assert_eq!(ctl.state(), ShutdownState::Stopped);
    }
}
