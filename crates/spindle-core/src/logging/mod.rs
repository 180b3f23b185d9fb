//! Logging - tracing の初期化とログ収集
//!
//! - コンソール出力は `EnvFilter`（`RUST_LOG` が設定値より優先）
//! - `CaptureLayer` はフィルタなしで積む。タスク実行中のログを漏らさないため

pub mod capture;

pub use self::capture::{CAPTURE_SPAN_NAME, CaptureLayer, DEFAULT_LOG_FORMAT, LogCapture, LogFormat};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Install the global subscriber: console (text or JSON) plus log capture.
///
/// Fails only if a global subscriber is already set.
pub fn init_logging(level: &str, json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(console.with_filter(filter))
        .with(CaptureLayer::new())
        .try_init()
}
