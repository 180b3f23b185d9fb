//! Ports - 抽象化レイヤー
//!
//! ワーカーが外部に求める能力だけを trait で定義する。
//! 配送の仕組み（Redis, AMQP …）や結果の保存先はここでは決めない。
//!
//! # 含まれる port
//! - **Broker**: startup / shutdown / listen / decode + タスクレジストリ
//! - **ResultStore**: 実行結果の保存
//! - **Middleware**: 実行前後とエラー時のフック
//! - **ProcessExit**: プロセス終了（テストでは差し替える）

pub mod broker;
pub mod exit;
pub mod middleware;
pub mod result_store;

// 主要な trait を再エクスポート
pub use self::broker::{Broker, decode_json, encode_json};
pub use self::exit::{ProcessExit, StdProcessExit};
pub use self::middleware::Middleware;
pub use self::result_store::ResultStore;
