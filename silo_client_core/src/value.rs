use std::fmt;

/// Column types understood by the silo wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// A boolean datatype representing the values `true` and `false`.
    Boolean,
    /// A signed 8-bit integer.
    Int8,
    /// A signed 16-bit integer.
    Int16,
    /// A signed 32-bit integer.
    Int32,
    /// A signed 64-bit integer.
    Int64,
    /// A 64-bit floating point number.
    Float64,
    /// A UTF-8 string.
    Utf8,
    /// Variable-length binary data.
    Binary,
    /// Microseconds since the Unix epoch, as a signed 64-bit integer.
    Timestamp,
}

impl DataType {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Utf8 => "utf8",
            DataType::Binary => "binary",
            DataType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A single column value, as supplied by callers and as sent on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    Timestamp(i64),
}

impl Value {
    pub fn bool(val: bool) -> Self {
        Self::Boolean(val)
    }

    pub fn i8(val: i8) -> Self {
        Self::Int8(val)
    }

    pub fn i16(val: i16) -> Self {
        Self::Int16(val)
    }

    pub fn i32(val: i32) -> Self {
        Self::Int32(val)
    }

    pub fn i64(val: i64) -> Self {
        Self::Int64(val)
    }

    pub fn f64(val: f64) -> Self {
        Self::Float64(val)
    }

    pub fn utf8(val: impl Into<String>) -> Self {
        Self::Utf8(val.into())
    }

    pub fn binary(val: Vec<u8>) -> Self {
        Self::Binary(val)
    }

    pub fn timestamp(val: i64) -> Self {
        Self::Timestamp(val)
    }

    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The wire type this value carries, or `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int8(_) => Some(DataType::Int8),
            Value::Int16(_) => Some(DataType::Int16),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Utf8(_) => Some(DataType::Utf8),
            Value::Binary(_) => Some(DataType::Binary),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.data_type() {
            None => "null",
            Some(data_type) => data_type.type_name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Utf8(v) => write!(f, "{}", v),
            Value::Binary(v) => write!(f, "{}", hex::encode(v)),
            Value::Timestamp(v) => write!(f, "{}", v),
        }
    }
}
