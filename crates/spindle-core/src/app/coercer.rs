//! ParameterCoercer - 引数をシグネチャの型に寄せる
//!
//! 例: `add(a: int, b: int)` に `["2", "3"]` が届いたら `[2, 3]` にする。
//! `["x", "3"]` なら `["x", 3]`（変換できない値はそのまま残す）。
//!
//! `--no-parse` / `no_parse = true` でワーカーごと無効化できる。

use tracing::debug;

use crate::domain::{TaskInvocation, TaskSignature, coerce};

/// Coerce `invocation` in place against `signature`. Never fails.
///
/// The positional index of a parameter is its index in the signature;
/// when no positional argument sits there the keyword argument of the same
/// name is used instead.
pub fn coerce_invocation(signature: &TaskSignature, invocation: &mut TaskInvocation) {
    for (index, param) in signature.params().iter().enumerate() {
        let Some(ty) = param.coercible_type() else {
            continue;
        };
        debug!(param = %param.name, ty = %ty, "Trying to parse parameter");

        let slot = if index < invocation.args.len() {
            invocation.args.get_mut(index)
        } else {
            invocation.kwargs.get_mut(&param.name)
        };
        let Some(value) = slot else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        match coerce(ty, value) {
            Ok(coerced) => *value = coerced,
            Err(err) => {
                debug!(
                    task_name = %invocation.task_name,
                    param = %param.name,
                    error = %err,
                    "Parameter left as is"
                );
            }
        }
    }
}
