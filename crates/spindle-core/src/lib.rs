//! spindle-core
//!
//! Core building blocks for the Spindle task worker.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（BrokerMessage, TaskInvocation, TaskSignature, ExecutionResult）
//! - **task**: ハンドラとレジストリ（async / blocking の二系統）
//! - **ports**: 抽象化レイヤー（Broker, ResultStore, Middleware, ProcessExit）
//! - **app**: アプリケーションロジック（WorkerBuilder, WorkerLoop, TaskExecutor, ShutdownController など）
//! - **impls**: 実装（InMemoryBroker, InMemoryResultStore）
//! - **logging**: tracing の初期化とタスク実行中のログ収集
//! - **config**: ワーカー設定（ファイル + 環境変数）
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod logging;
pub mod ports;
pub mod task;

pub use crate::app::{LoopExit, WorkerBuilder, WorkerLoop};
pub use crate::config::WorkerConfig;
pub use crate::domain::{BrokerMessage, ExecutionResult, TaskInvocation, TaskSignature, TypeDescriptor};
pub use crate::error::{TaskError, WorkerError};
pub use crate::task::{RegisteredTask, TaskArgs, TaskHandler, TaskRegistry};
