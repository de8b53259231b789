use snafu::Snafu;
use twox_hash::XxHash64;

use crate::value::Value;

const PARTITION_HASH_SEED: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum PartitionKeyError {
    #[snafu(display("null is not a valid partition key"))]
    NullPartitionKey,
}

/// Serializes a value to the cluster's standard wire bytes, used both for
/// partition hashing and as the routing parameter of single-partition
/// bulk-load invocations.
///
/// Fixed-width values are big-endian; strings are their UTF-8 bytes; binary
/// passes through.
pub fn value_to_bytes(value: &Value) -> Result<Vec<u8>, PartitionKeyError> {
    match value {
        Value::Null => NullPartitionKeySnafu.fail(),
        Value::Boolean(v) => Ok(vec![*v as u8]),
        Value::Int8(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Int16(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Int32(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Int64(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Float64(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Utf8(v) => Ok(v.as_bytes().to_vec()),
        Value::Binary(v) => Ok(v.clone()),
        Value::Timestamp(v) => Ok(v.to_be_bytes().to_vec()),
    }
}

/// Maps a partition-key value, already coerced to the partition column's
/// declared type, to a logical partition id. A cluster has at least one
/// partition.
pub fn partition_for_value(
    value: &Value,
    partition_count: u32,
) -> Result<u32, PartitionKeyError> {
    let bytes = value_to_bytes(value)?;
    let hash = XxHash64::oneshot(PARTITION_HASH_SEED, &bytes);
    Ok((hash % u64::from(partition_count.max(1))) as u32)
}
