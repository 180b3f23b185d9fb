//! Task - ハンドラとレジストリ
//!
//! # 二層構造
//! - **表層**: クロージャや構造体で書いたハンドラ（async / blocking）
//! - **内部**: `TaskHandler` enum に型消去して `TaskRegistry` に格納
//!
//! async ハンドラはスケジューラ上でそのまま await し、
//! blocking ハンドラはスレッドプールに逃がす。どちらかは登録時に決まる。

pub mod handler;
pub mod registry;

pub use self::handler::{AsyncFn, AsyncHandler, BlockingFn, BlockingHandler, TaskArgs, TaskHandler};
pub use self::registry::{RegisteredTask, TaskRegistry};
