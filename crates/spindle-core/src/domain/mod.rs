//! Domain model (messages, invocations, signatures, results).
//!
//! ここにある型は broker や result store の実装を前提にしない。
//! ワーカーが受け取り、変換し、返す「形」だけを定義する。

pub mod message;
pub mod result;
pub mod signature;

pub use self::message::{BrokerMessage, TaskInvocation};
pub use self::result::ExecutionResult;
pub use self::signature::{Param, TaskSignature, TypeDescriptor, coerce};
