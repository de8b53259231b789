use snafu::Snafu;

/// Bulk loader error types.
///
/// Everything recoverable is handled inside the shards; these errors are the
/// synchronous failures surfaced to callers of the loader API.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BulkLoaderError {
    /// The row's partition-key value could not be coerced to the partition
    /// column's type, or is not a valid key.
    #[snafu(display("invalid partition key: {message}"))]
    InvalidPartitionKey { message: String },
    /// The row does not have one value per table column.
    #[snafu(display("row has {got} values but table {table} has {expected} columns"))]
    WrongColumnCount {
        table: String,
        expected: usize,
        got: usize,
    },
    /// The loader has been closed; no further rows are accepted.
    #[snafu(display("bulk loader for table {table} is closed"))]
    LoaderClosed { table: String },
    /// Another loader already established an incompatible configuration for
    /// the table.
    #[snafu(display("table {table} is already being loaded with a different configuration"))]
    SchemaMismatch { table: String },
    /// The supplied table descriptor is unusable.
    #[snafu(display("invalid schema for table {table}: {message}"))]
    InvalidSchema { table: String, message: String },
    /// A shard worker is gone; the loader can no longer reach it.
    #[snafu(display("shard worker for table {table} terminated"))]
    ShardTerminated { table: String },
}

pub type Result<T, E = BulkLoaderError> = std::result::Result<T, E>;
