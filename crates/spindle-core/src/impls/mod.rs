//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryBroker**: mpsc チャネルを使う broker
//! - **InMemoryResultStore**: HashMap に結果を置くストア
//!
//! # 本番用実装
//! Redis / AMQP などの broker や永続化ストアは別クレートに置きます。

pub mod inmem_broker;
pub mod inmem_result;

// 主要な型を再エクスポート
pub use self::inmem_broker::InMemoryBroker;
pub use self::inmem_result::InMemoryResultStore;
