pub mod client;
pub mod coerce;
pub mod partition;
pub mod response;
pub mod schema;
pub mod table;
pub mod value;

pub use client::{CallError, ProcParam, ProcedureClient, ResponseFuture};
pub use coerce::{CoerceError, coerce};
pub use partition::{PartitionKeyError, partition_for_value, value_to_bytes};
pub use response::{ClientResponse, ResponseStatus};
pub use schema::{ColumnInfo, TableSchema};
pub use table::{RowBatch, RowBatchError};
pub use value::{DataType, Value};
