//! ProcessExit port - プロセス終了の抽象化
//!
//! # テスト容易性
//! - 本番は `StdProcessExit`（`std::process::exit`）
//! - テストでは呼び出し回数と終了コードを記録する実装に差し替える

use crate::app::shutdown::ExitStatus;

pub trait ProcessExit: Send + Sync {
    fn exit(&self, status: ExitStatus);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, status: ExitStatus) {
        std::process::exit(status.code());
    }
}
