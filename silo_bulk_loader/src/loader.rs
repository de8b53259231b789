use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::try_join_all;
use parking_lot::Mutex;
use silo_client_core::{ClientResponse, ResponseStatus, Value};
use snafu::ensure;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{LoaderClosedSnafu, Result, ShardTerminatedSnafu, WrongColumnCountSnafu};
use crate::manager::{IngestManager, TableHandle};
use crate::router::PartitionRouter;
use crate::row::{LoaderShared, PendingRow, RowHandle};

pub const DEFAULT_BATCH_TRIGGER_SIZE: usize = 200;

/// Configuration for a [`BulkLoader`].
#[derive(Debug, Clone)]
pub struct BulkLoaderOptions {
    batch_trigger_size: usize,
    upsert: bool,
}

impl BulkLoaderOptions {
    pub fn new(batch_trigger_size: usize) -> Self {
        Self {
            batch_trigger_size: batch_trigger_size.max(1),
            upsert: false,
        }
    }

    /// Load through the upsert procedure instead of plain insert.
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn batch_trigger_size(&self) -> usize {
        self.batch_trigger_size
    }

    pub fn upsert(&self) -> bool {
        self.upsert
    }
}

impl Default for BulkLoaderOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_TRIGGER_SIZE)
    }
}

/// A handle for bulk-inserting rows into one table.
///
/// Rows are hashed to per-partition shards, coalesced into batches, and
/// submitted as bulk-load procedure invocations. Each row's outcome is
/// reported exactly once, through the loader's failure callback or its
/// optional success callback.
///
/// Loaders created from the same [`IngestManager`] for the same table share
/// shards, so their rows coalesce into common batches.
pub struct BulkLoader {
    manager: Arc<IngestManager>,
    shared: Arc<LoaderShared>,
    table: Arc<TableHandle>,
    router: PartitionRouter,
    closed: AtomicBool,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BulkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkLoader").finish_non_exhaustive()
    }
}

impl BulkLoader {
    pub(crate) fn new(
        manager: Arc<IngestManager>,
        shared: Arc<LoaderShared>,
        table: Arc<TableHandle>,
    ) -> Self {
        let router = PartitionRouter::new(table.partition_column, table.shards.len() as u32);
        Self {
            manager,
            shared,
            table,
            router,
            closed: AtomicBool::new(false),
            flush_task: Mutex::new(None),
        }
    }

    /// Queues one row for ingestion, blocking while the target shard's
    /// queue is full.
    ///
    /// `handle` is handed back through the row's terminal callback. Rows
    /// that cannot be routed (bad arity, unusable partition key) are
    /// reported through the failure callback, counted as failed, and also
    /// surface as the returned error; they are never counted outstanding.
    pub async fn insert(&self, handle: RowHandle, values: Vec<Value>) -> Result<()> {
        ensure!(
            !self.closed.load(Ordering::Acquire),
            LoaderClosedSnafu {
                table: self.table.name.clone(),
            }
        );

        if values.len() != self.table.columns.len() {
            let err = WrongColumnCountSnafu {
                table: self.table.name.clone(),
                expected: self.table.columns.len(),
                got: values.len(),
            }
            .build();
            self.reject(handle, values, &err);
            return Err(err);
        }

        let shard = match self.router.route(&values) {
            Ok(index) => match self.table.shards.get(index) {
                Some(shard) => shard,
                None => {
                    let err = ShardTerminatedSnafu {
                        table: self.table.name.clone(),
                    }
                    .build();
                    self.reject(handle, values, &err);
                    return Err(err);
                }
            },
            Err(err) => {
                self.reject(handle, values, &err);
                return Err(err);
            }
        };

        self.shared.row_enqueued();
        let row = PendingRow {
            handle,
            values,
            loader: self.shared.clone(),
        };
        if let Err(row) = shard.enqueue(row).await {
            // The row was already counted outstanding; settle it through the
            // failure path so its terminal callback still fires.
            self.shared.record_failure(
                row.handle,
                row.values,
                ClientResponse::new(ResponseStatus::ConnectionLost, "shard worker terminated"),
            );
            return ShardTerminatedSnafu {
                table: self.table.name.clone(),
            }
            .fail();
        }

        Ok(())
    }

    /// Flushes every shard of the table, completing when all of them have
    /// drained their queues into submitted batches. Does not wait for the
    /// batch responses; use [`drain`](Self::drain) for that.
    pub async fn flush(&self) -> Result<()> {
        try_join_all(self.table.shards.iter().map(|shard| shard.flush()))
            .await
            .map_err(|_| {
                ShardTerminatedSnafu {
                    table: self.table.name.clone(),
                }
                .build()
            })?;
        Ok(())
    }

    /// Flushes, then waits until every row this loader has accepted has
    /// reached its terminal callback.
    pub async fn drain(&self) -> Result<()> {
        self.flush().await?;
        self.shared.wait_idle().await;
        Ok(())
    }

    /// Drains, then deregisters from the shared shards; a shard whose last
    /// loader closes is shut down.
    ///
    /// Idempotent. `insert` fails with `LoaderClosed` as soon as `close`
    /// begins, including from concurrent producers.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancel_flush_interval();
        self.flush().await?;
        self.shared.wait_idle().await;
        self.manager.release(&self.table.name, self.shared.id).await;
        Ok(())
    }

    /// Starts (or restarts) a background task that flushes this loader's
    /// shards every `period`, so sub-trigger rows don't sit queued
    /// indefinitely under a slow producer.
    pub fn set_flush_interval(&self, period: Duration) {
        let shards = self.table.shards.to_vec();
        let mut slot = self.flush_task.lock();
        if let Some(task) = slot.take() {
            task.abort();
        }
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for shard in &shards {
                    if shard.flush().await.is_err() {
                        return;
                    }
                }
            }
        }));
    }

    pub fn cancel_flush_interval(&self) {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
    }

    /// Rows accepted by `insert` that have not reached a terminal callback.
    pub fn outstanding(&self) -> i64 {
        self.shared.outstanding()
    }

    /// Rows that committed.
    pub fn completed(&self) -> u64 {
        self.shared.completed()
    }

    /// Rows reported through the failure callback.
    pub fn failed(&self) -> u64 {
        self.shared.failed()
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    fn reject(&self, handle: RowHandle, values: Vec<Value>, err: &crate::error::BulkLoaderError) {
        let response = ClientResponse::new(ResponseStatus::GracefulFailure, err.to_string());
        self.shared.record_rejected(handle, values, response);
    }
}

impl Drop for BulkLoader {
    fn drop(&mut self) {
        self.cancel_flush_interval();
    }
}
