//! TaskSignature - ハンドラの引数宣言と型の強制変換
//!
//! JSON のような緩い型のペイロードから、宣言された型へ「自明な」変換だけを行う。
//! 変換は純粋関数 `coerce(descriptor, value)` で、リフレクションには依存しない。
//!
//! # 設計原則
//! - 変換できなければ `CoercionError` を返すだけ（呼び出し側で元の値を残す）
//! - 厳密なバリデーションはしない。ハンドラ側が最終的に判断する

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::CoercionError;

/// Declared type of a task parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Any,
    Bool,
    Int,
    Float,
    Str,
    List(Box<TypeDescriptor>),
    Dict(Box<TypeDescriptor>),
    Optional(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn list(inner: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(inner))
    }

    pub fn dict(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Dict(Box::new(inner))
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Any => f.write_str("any"),
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::Int => f.write_str("int"),
            TypeDescriptor::Float => f.write_str("float"),
            TypeDescriptor::Str => f.write_str("str"),
            TypeDescriptor::List(inner) => write!(f, "list[{inner}]"),
            TypeDescriptor::Dict(inner) => write!(f, "dict[str, {inner}]"),
            TypeDescriptor::Optional(inner) => write!(f, "optional[{inner}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// `None` means the parameter is untyped and never coerced.
    #[serde(default)]
    pub ty: Option<TypeDescriptor>,
}

impl Param {
    /// Typed parameters other than `Any` take part in coercion.
    pub fn coercible_type(&self) -> Option<&TypeDescriptor> {
        match &self.ty {
            Some(TypeDescriptor::Any) | None => None,
            Some(ty) => Some(ty),
        }
    }
}

/// Ordered parameter list of a task handler.
///
/// # 使用例
/// ```ignore
/// let sig = TaskSignature::new()
///     .param("a", TypeDescriptor::Int)
///     .param("b", TypeDescriptor::Int)
///     .untyped("ctx");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskSignature {
    params: Vec<Param>,
}

impl TaskSignature {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty: Some(ty),
        });
        self
    }

    pub fn untyped(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty: None,
        });
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Convert `value` toward `ty`.
///
/// Only self-evident conversions are made: `"2"` becomes `2` for an int,
/// `3` becomes `"3"` for a str. `null` is returned as is for every type.
pub fn coerce(ty: &TypeDescriptor, value: &Value) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        TypeDescriptor::Any => Ok(value.clone()),
        TypeDescriptor::Optional(inner) => coerce(inner, value),
        TypeDescriptor::Int => coerce_int(value).ok_or_else(|| mismatch(ty, value)),
        TypeDescriptor::Float => coerce_float(value).ok_or_else(|| mismatch(ty, value)),
        TypeDescriptor::Bool => coerce_bool(value).ok_or_else(|| mismatch(ty, value)),
        TypeDescriptor::Str => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch(ty, value)),
        },
        TypeDescriptor::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
                .map_err(|_| mismatch(ty, value)),
            _ => Err(mismatch(ty, value)),
        },
        TypeDescriptor::Dict(inner) => match value {
            Value::Object(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    let coerced = coerce(inner, item).map_err(|_| mismatch(ty, value))?;
                    out.insert(key.clone(), coerced);
                }
                Ok(Value::Object(out))
            }
            _ => Err(mismatch(ty, value)),
        },
    }
}

fn mismatch(ty: &TypeDescriptor, value: &Value) -> CoercionError {
    CoercionError {
        expected: ty.to_string(),
        value: value.to_string(),
    }
}

fn whole_float_to_int(f: f64) -> Option<Value> {
    // i64::MAX as f64 rounds up, so the upper bound is exclusive
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn coerce_int(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().and_then(whole_float_to_int),
        Value::Bool(b) => Some(Value::from(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_float_to_int))
        }
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Number::from_f64(f).map(Value::Number)
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" | "y" | "t" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" | "n" | "f" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}
