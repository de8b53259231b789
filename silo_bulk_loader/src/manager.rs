use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use silo_client_core::{ColumnInfo, DataType, ProcedureClient, TableSchema};
use snafu::ensure;
use tracing::{debug, warn};

use crate::error::{InvalidSchemaSnafu, Result, SchemaMismatchSnafu};
use crate::loader::{BulkLoader, BulkLoaderOptions};
use crate::row::{FailureCallback, LoaderShared, SuccessCallback};
use crate::shard::{ShardConfig, ShardHandle};

/// Everything the loaders of one table share: the canonical column layout
/// and the shard handles.
pub(crate) struct TableHandle {
    pub name: String,
    pub columns: Arc<[ColumnInfo]>,
    /// `(column index, declared type)`; `None` for replicated tables.
    pub partition_column: Option<(usize, DataType)>,
    /// One handle per logical partition, or a single handle for the
    /// replicated shard.
    pub shards: Vec<ShardHandle>,
}

struct TableEntry {
    handle: Arc<TableHandle>,
    upsert: bool,
    owners: Vec<u64>,
}

/// Registry of ingest shards, one set per table, shared by every
/// [`BulkLoader`] created from the same manager.
///
/// Loaders targeting the same table feed the same shards, so their rows
/// coalesce into shared batches and the shard trigger size is the minimum
/// across all of them.
pub struct IngestManager {
    client: Arc<dyn ProcedureClient>,
    next_loader_id: AtomicU64,
    tables: Mutex<HashMap<String, TableEntry>>,
}

impl IngestManager {
    pub fn new(client: Arc<dyn ProcedureClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            next_loader_id: AtomicU64::new(0),
            tables: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a loader for `schema`.
    ///
    /// The first loader for a table fixes its column layout, partition
    /// column, and upsert mode and creates the table's shards; later
    /// loaders must match ([`SchemaMismatch`] otherwise) and join the same
    /// shards, lowering the shared batch trigger size to the minimum.
    ///
    /// [`SchemaMismatch`]: crate::error::BulkLoaderError::SchemaMismatch
    pub async fn bulk_loader(
        self: &Arc<Self>,
        schema: TableSchema,
        options: BulkLoaderOptions,
        failure: FailureCallback,
        success: Option<SuccessCallback>,
    ) -> Result<BulkLoader> {
        let partition_column = validate_schema(&schema)?;

        let loader_id = self.next_loader_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(LoaderShared::new(loader_id, failure, success));
        let (handle, joined) = self.acquire(&schema, partition_column, &options, loader_id)?;

        if joined {
            // Joining loaders can only lower the shared trigger size.
            for shard in &handle.shards {
                let _ = shard.update_trigger_size(options.batch_trigger_size()).await;
            }
        }

        Ok(BulkLoader::new(self.clone(), shared, handle))
    }

    /// Wakes every shard parked on a lost connection so it retries its
    /// submit. Call this from the client's reconnect listener.
    pub fn notify_reconnected(&self) {
        let tables = self.tables.lock();
        for entry in tables.values() {
            for shard in &entry.handle.shards {
                shard.notify_reconnected();
            }
        }
    }

    fn acquire(
        &self,
        schema: &TableSchema,
        partition_column: Option<(usize, DataType)>,
        options: &BulkLoaderOptions,
        loader_id: u64,
    ) -> Result<(Arc<TableHandle>, bool)> {
        let mut tables = self.tables.lock();

        if let Some(entry) = tables.get_mut(&schema.table) {
            let compatible = entry.handle.columns.as_ref() == schema.columns.as_slice()
                && entry.handle.partition_column == partition_column
                && entry.upsert == options.upsert();
            ensure!(
                compatible,
                SchemaMismatchSnafu {
                    table: schema.table.clone(),
                }
            );
            entry.owners.push(loader_id);
            return Ok((entry.handle.clone(), true));
        }

        let columns: Arc<[ColumnInfo]> = schema.columns.clone().into();
        let proc_name = schema.load_procedure();
        let upsert = options.upsert() as u8;
        let trigger_size = options.batch_trigger_size();
        let auto_reconnect = self.client.auto_reconnect();

        let partitions: Vec<Option<u32>> = match partition_column {
            None => vec![None],
            Some(_) => (0..self.client.partition_count().max(1)).map(Some).collect(),
        };

        let shards = partitions
            .into_iter()
            .map(|partition| {
                ShardHandle::spawn(
                    self.client.clone(),
                    ShardConfig {
                        table: schema.table.clone(),
                        proc_name,
                        upsert,
                        columns: columns.clone(),
                        partition_column: partition_column.map(|(index, _)| index),
                        partition,
                        trigger_size,
                        auto_reconnect,
                    },
                )
            })
            .collect::<Vec<_>>();

        debug!(table = %schema.table, shards = shards.len(), "created ingest shards");

        let handle = Arc::new(TableHandle {
            name: schema.table.clone(),
            columns,
            partition_column,
            shards,
        });
        tables.insert(
            schema.table.clone(),
            TableEntry {
                handle: handle.clone(),
                upsert: options.upsert(),
                owners: vec![loader_id],
            },
        );

        Ok((handle, false))
    }

    /// Removes a loader from its table's owner set, shutting the shards
    /// down when the last owner leaves.
    pub(crate) async fn release(&self, table: &str, loader_id: u64) {
        let to_shutdown = {
            let mut tables = self.tables.lock();
            let Some(entry) = tables.get_mut(table) else {
                return;
            };
            entry.owners.retain(|owner| *owner != loader_id);
            if entry.owners.is_empty() {
                tables.remove(table).map(|entry| entry.handle)
            } else {
                None
            }
        };

        if let Some(handle) = to_shutdown {
            debug!(table, "last loader closed, shutting down shards");
            for shard in &handle.shards {
                if shard.shutdown().await.is_err() {
                    warn!(table, "shard worker already stopped");
                }
            }
        }
    }
}

fn validate_schema(schema: &TableSchema) -> Result<Option<(usize, DataType)>> {
    ensure!(
        !schema.columns.is_empty(),
        InvalidSchemaSnafu {
            table: schema.table.clone(),
            message: "table has no columns".to_string(),
        }
    );

    match schema.partition_column {
        None => Ok(None),
        Some(index) => match schema.columns.get(index) {
            Some(column) => Ok(Some((index, column.data_type))),
            None => InvalidSchemaSnafu {
                table: schema.table.clone(),
                message: format!("partition column index {index} out of bounds"),
            }
            .fail(),
        },
    }
}
