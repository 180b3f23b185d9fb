//! SignalListener - OS シグナルを ShutdownController に橋渡しする
//!
//! ## Unix
//! - **SIGTERM**（kill のデフォルト、systemd / Kubernetes）
//! - **SIGINT**（ターミナルの Ctrl-C）
//!
//! どちらも同じ `ShutdownController::trigger` に入る。
//! 受信はループし続けるので、2 回目以降のシグナルも trigger に届く（そこで無視される）。
//!
//! ## Windows
//! `tokio::signal::ctrl_c` のみ。

use tokio::task::JoinHandle;
use tracing::info;

use crate::app::shutdown::ShutdownController;

pub struct SignalListener {
    controller: ShutdownController,
}

impl SignalListener {
    pub fn new(controller: ShutdownController) -> Self {
        Self { controller }
    }

    /// Forward one received signal to the controller.
    pub fn on_signal(&self, signal: &str) {
        info!(signal = %signal, "Received signal");
        self.controller.trigger(signal);
    }

    /// Register the OS handlers and forward signals until the runtime stops.
    ///
    /// Registration happens before this returns, so a signal arriving right
    /// after `install` is not lost.
    #[cfg(unix)]
    pub fn install(self) -> std::io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = sigterm.recv() => match received {
                        Some(()) => self.on_signal("SIGTERM"),
                        None => break,
                    },
                    received = sigint.recv() => match received {
                        Some(()) => self.on_signal("SIGINT"),
                        None => break,
                    },
                }
            }
        }))
    }

    #[cfg(not(unix))]
    pub fn install(self) -> std::io::Result<JoinHandle<()>> {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                self.on_signal("CTRL_C");
            }
        }))
    }
}
