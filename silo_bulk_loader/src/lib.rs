pub mod error;
pub mod loader;
pub mod manager;
mod router;
mod row;
mod shard;

pub use error::{BulkLoaderError, Result};
pub use loader::{BulkLoader, BulkLoaderOptions, DEFAULT_BATCH_TRIGGER_SIZE};
pub use manager::IngestManager;
pub use row::{FailureCallback, RowHandle, SuccessCallback};
