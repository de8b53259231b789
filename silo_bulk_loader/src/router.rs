use silo_client_core::{DataType, Value, coerce, partition_for_value};

use crate::error::{BulkLoaderError, Result};

/// Maps a row to the index of the shard that owns its partition.
pub(crate) struct PartitionRouter {
    partition_column: Option<(usize, DataType)>,
    partition_count: u32,
}

impl PartitionRouter {
    pub fn new(partition_column: Option<(usize, DataType)>, partition_count: u32) -> Self {
        Self {
            partition_column,
            partition_count,
        }
    }

    /// The target shard index: always 0 for replicated tables, otherwise
    /// the hashed partition of the row's partition-key value coerced to the
    /// partition column's declared type.
    pub fn route(&self, values: &[Value]) -> Result<usize> {
        let Some((index, data_type)) = self.partition_column else {
            return Ok(0);
        };

        let value = values.get(index).cloned().unwrap_or(Value::Null);
        let key = coerce(value, data_type).map_err(|err| BulkLoaderError::InvalidPartitionKey {
            message: err.to_string(),
        })?;
        let partition = partition_for_value(&key, self.partition_count).map_err(|err| {
            BulkLoaderError::InvalidPartitionKey {
                message: err.to_string(),
            }
        })?;

        Ok(partition as usize)
    }
}
