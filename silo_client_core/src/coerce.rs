use snafu::Snafu;

use crate::value::{DataType, Value};

/// Errors produced when a caller-supplied value cannot be converted to its
/// declared column type.
///
/// The message is forwarded to the caller's failure callback, so it should
/// name both sides of the failed conversion.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum CoerceError {
    #[snafu(display("cannot convert {from} to {to}"))]
    Incompatible { from: &'static str, to: DataType },
    #[snafu(display("value {value} out of range for {to}"))]
    OutOfRange { value: String, to: DataType },
    #[snafu(display("cannot parse {value:?} as {to}"))]
    Parse { value: String, to: DataType },
}

pub type Result<T, E = CoerceError> = std::result::Result<T, E>;

/// Convert `value` to the declared `target` column type using the same rules
/// the database applies to stored-procedure parameters.
///
/// Integers widen freely and narrow when the value fits; strings parse into
/// any scalar type; hex strings convert to binary. `Null` passes through
/// unchanged.
pub fn coerce(value: Value, target: DataType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match target {
        DataType::Boolean => coerce_boolean(value),
        DataType::Int8 => {
            coerce_integer(value, target)?.map_int(|v| i8::try_from(v).map(Value::Int8))
        }
        DataType::Int16 => {
            coerce_integer(value, target)?.map_int(|v| i16::try_from(v).map(Value::Int16))
        }
        DataType::Int32 => {
            coerce_integer(value, target)?.map_int(|v| i32::try_from(v).map(Value::Int32))
        }
        DataType::Int64 => coerce_integer(value, target)?.map_int(|v| Ok(Value::Int64(v))),
        DataType::Timestamp => coerce_integer(value, target)?.map_int(|v| Ok(Value::Timestamp(v))),
        DataType::Float64 => coerce_float(value),
        DataType::Utf8 => match value {
            Value::Utf8(v) => Ok(Value::Utf8(v)),
            other => IncompatibleSnafu {
                from: other.type_name(),
                to: target,
            }
            .fail(),
        },
        DataType::Binary => coerce_binary(value),
    }
}

/// An integer together with the target it narrows into, so narrowing
/// failures can report the original rendering of the value.
struct WideInt {
    value: i64,
    target: DataType,
}

impl WideInt {
    fn map_int(
        self,
        narrow: impl FnOnce(i64) -> std::result::Result<Value, std::num::TryFromIntError>,
    ) -> Result<Value> {
        narrow(self.value).map_err(|_| CoerceError::OutOfRange {
            value: self.value.to_string(),
            to: self.target,
        })
    }
}

fn coerce_integer(value: Value, target: DataType) -> Result<WideInt> {
    let wide = match value {
        Value::Int8(v) => v as i64,
        Value::Int16(v) => v as i64,
        Value::Int32(v) => v as i64,
        Value::Int64(v) => v,
        Value::Timestamp(v) if target == DataType::Timestamp || target == DataType::Int64 => v,
        Value::Utf8(v) => v.trim().parse::<i64>().map_err(|_| CoerceError::Parse {
            value: v,
            to: target,
        })?,
        other => {
            return IncompatibleSnafu {
                from: other.type_name(),
                to: target,
            }
            .fail();
        }
    };

    Ok(WideInt {
        value: wide,
        target,
    })
}

fn coerce_float(value: Value) -> Result<Value> {
    match value {
        Value::Float64(v) => Ok(Value::Float64(v)),
        Value::Int8(v) => Ok(Value::Float64(v as f64)),
        Value::Int16(v) => Ok(Value::Float64(v as f64)),
        Value::Int32(v) => Ok(Value::Float64(v as f64)),
        Value::Int64(v) => Ok(Value::Float64(v as f64)),
        Value::Utf8(v) => v
            .trim()
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| CoerceError::Parse {
                value: v,
                to: DataType::Float64,
            }),
        other => IncompatibleSnafu {
            from: other.type_name(),
            to: DataType::Float64,
        }
        .fail(),
    }
}

fn coerce_boolean(value: Value) -> Result<Value> {
    match value {
        Value::Boolean(v) => Ok(Value::Boolean(v)),
        Value::Utf8(v) => match v.trim() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => ParseSnafu {
                value: v,
                to: DataType::Boolean,
            }
            .fail(),
        },
        other => IncompatibleSnafu {
            from: other.type_name(),
            to: DataType::Boolean,
        }
        .fail(),
    }
}

fn coerce_binary(value: Value) -> Result<Value> {
    match value {
        Value::Binary(v) => Ok(Value::Binary(v)),
        Value::Utf8(v) => hex::decode(&v)
            .map(Value::Binary)
            .map_err(|_| CoerceError::Parse {
                value: v,
                to: DataType::Binary,
            }),
        other => IncompatibleSnafu {
            from: other.type_name(),
            to: DataType::Binary,
        }
        .fail(),
    }
}
