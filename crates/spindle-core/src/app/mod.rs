//! App - アプリケーション層
//!
//! ports を組み合わせてワーカーの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **WorkerBuilder**: ワーカーの構築とワイヤリング
//! - **WorkerLoop**: メッセージ処理ループ（decode→lookup→pre→coerce→execute→post→store）
//! - **TaskExecutor**: 1 回の実行と ExecutionResult の組み立て
//! - **MiddlewarePipeline**: フックの順次実行
//! - **ShutdownController / SignalListener**: シグナル駆動の終了処理
//! - **BlockingPool**: 同期ハンドラ用のスレッドプール

pub mod builder;
pub mod coercer;
pub mod executor;
pub mod pipeline;
pub mod pool;
pub mod shutdown;
pub mod signals;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, WorkerBuilder};
pub use self::coercer::coerce_invocation;
pub use self::executor::TaskExecutor;
pub use self::pipeline::MiddlewarePipeline;
pub use self::pool::{BlockingPool, PoolError};
pub use self::shutdown::{ExitStatus, ShutdownController, ShutdownState};
pub use self::signals::SignalListener;
pub use self::worker_loop::{LoopExit, WorkerLoop};
