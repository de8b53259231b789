use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesOrdered, StreamExt};
use silo_client_core::{
    ClientResponse, ColumnInfo, ProcParam, ProcedureClient, ResponseFuture, ResponseStatus,
    RowBatch, Value, coerce, value_to_bytes,
};
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::row::{LoaderShared, PendingRow};

/// The bounded row queue holds this many batches worth of rows before
/// producers block.
const QUEUE_CAPACITY_BATCHES: usize = 5;

/// Commands processed by a shard's worker task.
pub(crate) enum ShardCommand {
    Enqueue(PendingRow),
    Flush(oneshot::Sender<()>),
    UpdateTriggerSize(usize),
    Shutdown(oneshot::Sender<()>),
}

/// Static configuration of one shard, fixed by the first loader that
/// registers its table.
pub(crate) struct ShardConfig {
    pub table: String,
    pub proc_name: &'static str,
    pub upsert: u8,
    pub columns: Arc<[ColumnInfo]>,
    /// Index of the partition column; `None` for the single shard of a
    /// replicated table.
    pub partition_column: Option<usize>,
    /// Logical partition id; `None` for the replicated shard.
    pub partition: Option<u32>,
    pub trigger_size: usize,
    pub auto_reconnect: bool,
}

/// Handle to a shard worker. Cheap to clone; every loader of the table
/// holds the same handles.
#[derive(Clone)]
pub(crate) struct ShardHandle {
    tx: mpsc::Sender<ShardCommand>,
    reconnected: Arc<Notify>,
}

impl ShardHandle {
    /// Spawns the shard worker and returns its handle. The command channel
    /// is the shard's bounded row queue; `send` on the full channel is the
    /// producer backpressure.
    pub fn spawn(client: Arc<dyn ProcedureClient>, config: ShardConfig) -> Self {
        let capacity = config.trigger_size.max(1) * QUEUE_CAPACITY_BATCHES;
        let (tx, rx) = mpsc::channel(capacity);
        let reconnected = Arc::new(Notify::new());

        let worker = ShardWorker {
            client,
            trigger_size: config.trigger_size.max(1),
            config,
            pending: VecDeque::new(),
            reconnected: reconnected.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self { tx, reconnected }
    }

    /// Queues a row, blocking while the shard's queue is full. Returns the
    /// row if the worker is gone so the caller can fail it terminally.
    pub async fn enqueue(&self, row: PendingRow) -> Result<(), PendingRow> {
        if let Err(mpsc::error::SendError(command)) =
            self.tx.send(ShardCommand::Enqueue(row)).await
            && let ShardCommand::Enqueue(row) = command
        {
            return Err(row);
        }
        Ok(())
    }

    /// Schedules a drain of all queued rows and completes once the drain has
    /// submitted them. Does not wait for their responses.
    pub async fn flush(&self) -> Result<(), ShardGone> {
        self.request(ShardCommand::Flush).await
    }

    /// Lowers the shard's batch trigger size to `min(current, size)`.
    pub async fn update_trigger_size(&self, size: usize) -> Result<(), ShardGone> {
        self.tx
            .send(ShardCommand::UpdateTriggerSize(size))
            .await
            .map_err(|_| ShardGone)
    }

    /// Flushes, waits for in-flight work to resolve, then stops the worker.
    /// Idempotent: a second call observes the closed channel.
    pub async fn shutdown(&self) -> Result<(), ShardGone> {
        self.request(ShardCommand::Shutdown).await
    }

    /// Wakes the worker if it is parked waiting for the connection to come
    /// back. A permit is stored, so a notification racing the park is kept.
    pub fn notify_reconnected(&self) {
        self.reconnected.notify_one();
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<()>) -> ShardCommand,
    ) -> Result<(), ShardGone> {
        let (reply, done) = oneshot::channel();
        self.tx.send(command(reply)).await.map_err(|_| ShardGone)?;
        done.await.map_err(|_| ShardGone)
    }
}

/// The shard worker is no longer running.
#[derive(Debug)]
pub(crate) struct ShardGone;

/// Why a submitted invocation is in flight: a whole batch, or a single row
/// being retried after its batch was rejected.
enum SubmitContext {
    Batch {
        rows: Vec<PendingRow>,
        tally: Vec<(Arc<LoaderShared>, u64)>,
    },
    Retry(PendingRow),
}

type InFlight = FuturesOrdered<BoxFuture<'static, (SubmitContext, ClientResponse)>>;

struct ShardWorker {
    client: Arc<dyn ProcedureClient>,
    config: ShardConfig,
    trigger_size: usize,
    pending: VecDeque<PendingRow>,
    reconnected: Arc<Notify>,
}

impl ShardWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<ShardCommand>) {
        // Responses are processed strictly in submission order so one
        // batch's callbacks all fire before any later batch's.
        let mut in_flight = InFlight::new();

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(ShardCommand::Enqueue(row)) => {
                        self.pending.push_back(row);
                        while self.pending.len() >= self.trigger_size {
                            let trigger_size = self.trigger_size;
                            self.submit_batch(&mut in_flight, trigger_size).await;
                        }
                    }
                    Some(ShardCommand::Flush(reply)) => {
                        self.flush_pending(&mut in_flight).await;
                        let _ = reply.send(());
                    }
                    Some(ShardCommand::UpdateTriggerSize(size)) => {
                        self.trigger_size = self.trigger_size.min(size.max(1));
                    }
                    Some(ShardCommand::Shutdown(reply)) => {
                        self.flush_pending(&mut in_flight).await;
                        self.drain_in_flight(&mut in_flight).await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        // Every handle is gone; settle what we hold and stop.
                        self.flush_pending(&mut in_flight).await;
                        self.drain_in_flight(&mut in_flight).await;
                        break;
                    }
                },
                response = in_flight.next(), if !in_flight.is_empty() => {
                    if let Some((context, response)) = response {
                        self.handle_response(&mut in_flight, context, response).await;
                    }
                }
            }
        }

        debug!(
            table = %self.config.table,
            partition = ?self.config.partition,
            "shard worker stopped"
        );
    }

    /// Builds a batch from up to `limit` queued rows and submits it. Rows
    /// whose values fail coercion are reported individually and the batch
    /// continues without them.
    async fn submit_batch(&mut self, in_flight: &mut InFlight, limit: usize) {
        let take = limit.min(self.pending.len());
        if take == 0 {
            return;
        }

        let mut rows = Vec::with_capacity(take);
        let mut tally: Vec<(Arc<LoaderShared>, u64)> = Vec::new();
        let mut batch = RowBatch::with_capacity(self.config.columns.clone(), take);

        for _ in 0..take {
            let Some(row) = self.pending.pop_front() else {
                break;
            };

            let pushed = self
                .coerce_row(&row.values)
                .and_then(|coerced| batch.push_row(coerced).map_err(|err| err.to_string()));
            match pushed {
                Ok(()) => {
                    match tally.iter_mut().find(|(loader, _)| loader.id == row.loader.id) {
                        Some((_, count)) => *count += 1,
                        None => tally.push((row.loader.clone(), 1)),
                    }
                    rows.push(row);
                }
                Err(message) => {
                    debug!(table = %self.config.table, %message, "dropping row from batch");
                    let response =
                        ClientResponse::new(ResponseStatus::GracefulFailure, message);
                    row.loader.record_failure(row.handle, row.values, response);
                }
            }
        }

        if batch.is_empty() {
            return;
        }

        let batch = Arc::new(batch);
        self.submit(in_flight, batch, SubmitContext::Batch { rows, tally })
            .await;
    }

    async fn flush_pending(&mut self, in_flight: &mut InFlight) {
        while !self.pending.is_empty() {
            let trigger_size = self.trigger_size;
            self.submit_batch(in_flight, trigger_size).await;
        }
    }

    /// Coerces one row to the declared column types, or reports why it
    /// cannot be part of a batch.
    fn coerce_row(&self, values: &[Value]) -> Result<Vec<Value>, String> {
        if values.len() != self.config.columns.len() {
            return Err(format!(
                "row has {} values but table {} has {} columns",
                values.len(),
                self.config.table,
                self.config.columns.len()
            ));
        }

        values
            .iter()
            .zip(self.config.columns.iter())
            .map(|(value, column)| {
                coerce(value.clone(), column.data_type).map_err(|err| {
                    format!("column {}: {}", column.name, err)
                })
            })
            .collect()
    }

    /// Registers the invocation with the client and parks it in the
    /// in-flight queue. On a synchronous connection failure the worker
    /// either waits for the reconnect signal and retries the same batch, or
    /// synthesizes a lost-connection response into the failure path.
    async fn submit(
        &mut self,
        in_flight: &mut InFlight,
        batch: Arc<RowBatch>,
        context: SubmitContext,
    ) {
        let params = match self.invocation_params(&batch) {
            Ok(params) => params,
            Err(message) => {
                error!(table = %self.config.table, %message, "cannot build invocation");
                self.fail_context(
                    context,
                    ClientResponse::new(ResponseStatus::GracefulFailure, message),
                );
                return;
            }
        };

        if self.config.auto_reconnect {
            loop {
                match self
                    .client
                    .call_procedure(self.config.proc_name, params.clone())
                    .await
                {
                    Ok(response) => {
                        in_flight.push_back(with_context(context, response));
                        return;
                    }
                    Err(err) => {
                        warn!(
                            table = %self.config.table,
                            partition = ?self.config.partition,
                            %err,
                            "submit failed, waiting for reconnect"
                        );
                        self.reconnected.notified().await;
                    }
                }
            }
        } else {
            match self
                .client
                .call_procedure(self.config.proc_name, params)
                .await
            {
                Ok(response) => in_flight.push_back(with_context(context, response)),
                Err(_) => in_flight.push_back(with_context(
                    context,
                    futures::future::ready(ClientResponse::connection_lost()).boxed(),
                )),
            }
        }
    }

    /// The invocation parameter list: `(routing, table, upsert, rows)` for a
    /// partitioned shard, `(table, upsert, rows)` for the replicated shard.
    fn invocation_params(&self, batch: &Arc<RowBatch>) -> Result<Vec<ProcParam>, String> {
        let mut params = Vec::with_capacity(4);

        if let Some(index) = self.config.partition_column {
            let key = batch
                .row(0)
                .and_then(|row| row.get(index))
                .unwrap_or(&Value::Null);
            let routing = value_to_bytes(key).map_err(|err| err.to_string())?;
            params.push(ProcParam::Bytes(routing));
        }

        params.push(ProcParam::Utf8(self.config.table.clone()));
        params.push(ProcParam::Byte(self.config.upsert));
        params.push(ProcParam::Table(batch.clone()));
        Ok(params)
    }

    async fn handle_response(
        &mut self,
        in_flight: &mut InFlight,
        context: SubmitContext,
        response: ClientResponse,
    ) {
        match context {
            SubmitContext::Batch { rows, tally } => {
                if response.is_success() {
                    for row in &rows {
                        row.loader.notify_success(row.handle.clone(), &response);
                    }
                    for (loader, count) in tally {
                        loader.add_completed(count);
                    }
                } else {
                    warn!(
                        table = %self.config.table,
                        partition = ?self.config.partition,
                        status = %response.status(),
                        rows = rows.len(),
                        "batch rejected, resubmitting rows individually"
                    );
                    for row in rows {
                        self.resubmit_row(in_flight, row).await;
                    }
                }
            }
            SubmitContext::Retry(row) => {
                if response.status() == ResponseStatus::ConnectionLost
                    && self.config.auto_reconnect
                {
                    self.resubmit_row(in_flight, row).await;
                } else if response.is_success() {
                    row.loader.record_success(row.handle, &response);
                } else {
                    row.loader.record_failure(row.handle, row.values, response);
                }
            }
        }
    }

    /// Re-coerces and submits a single row from a rejected batch, so only
    /// the rows the database actually refuses are reported as failures.
    async fn resubmit_row(&mut self, in_flight: &mut InFlight, row: PendingRow) {
        let mut batch = RowBatch::with_capacity(self.config.columns.clone(), 1);
        let pushed = self
            .coerce_row(&row.values)
            .and_then(|coerced| batch.push_row(coerced).map_err(|err| err.to_string()));

        if let Err(message) = pushed {
            // The row passed coercion when its batch was built.
            error!(table = %self.config.table, %message, "row failed coercion on resubmit");
            let response = ClientResponse::new(ResponseStatus::GracefulFailure, message);
            row.loader.record_failure(row.handle, row.values, response);
            return;
        }

        self.submit(in_flight, Arc::new(batch), SubmitContext::Retry(row))
            .await;
    }

    /// Terminally fails every row in a context without resubmission.
    fn fail_context(&self, context: SubmitContext, response: ClientResponse) {
        match context {
            SubmitContext::Batch { rows, .. } => {
                for row in rows {
                    row.loader
                        .record_failure(row.handle, row.values, response.clone());
                }
            }
            SubmitContext::Retry(row) => {
                row.loader.record_failure(row.handle, row.values, response);
            }
        }
    }

    async fn drain_in_flight(&mut self, in_flight: &mut InFlight) {
        loop {
            let Some((context, response)) = in_flight.next().await else {
                break;
            };
            self.handle_response(in_flight, context, response).await;
        }
    }
}

fn with_context(
    context: SubmitContext,
    response: ResponseFuture,
) -> BoxFuture<'static, (SubmitContext, ClientResponse)> {
    async move { (context, response.await) }.boxed()
}
