use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use silo_client_core::{ClientResponse, Value};
use tokio::sync::Notify;

/// Opaque caller-owned identifier attached to a row, handed back through the
/// row's terminal callback so callers can correlate outcomes with their own
/// bookkeeping.
pub type RowHandle = Arc<dyn Any + Send + Sync>;

/// Invoked exactly once for every row that fails terminally, with the row's
/// handle, its raw values, and the response that failed it.
///
/// Callbacks run on the shard worker and must not block it.
pub type FailureCallback = Arc<dyn Fn(RowHandle, Vec<Value>, ClientResponse) + Send + Sync>;

/// Invoked once for every row that commits. Optional.
pub type SuccessCallback = Arc<dyn Fn(RowHandle, ClientResponse) + Send + Sync>;

/// A row queued for ingestion: the caller's handle, the raw values, and the
/// loader it belongs to.
pub(crate) struct PendingRow {
    pub handle: RowHandle,
    pub values: Vec<Value>,
    pub loader: Arc<LoaderShared>,
}

/// Loader state shared between a `BulkLoader` handle and the shards it
/// feeds: row accounting and the terminal callbacks.
///
/// `outstanding` counts rows accepted by `insert` that have not yet reached
/// a terminal callback, so `outstanding = enqueued - completed - failed`
/// holds at every observable point.
pub(crate) struct LoaderShared {
    pub id: u64,
    outstanding: AtomicI64,
    completed: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
    failure: FailureCallback,
    success: Option<SuccessCallback>,
}

impl LoaderShared {
    pub fn new(id: u64, failure: FailureCallback, success: Option<SuccessCallback>) -> Self {
        Self {
            id,
            outstanding: AtomicI64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            idle: Notify::new(),
            failure,
            success,
        }
    }

    pub fn outstanding(&self) -> i64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Counts a row accepted by `insert`.
    pub fn row_enqueued(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Fires the success callback for one row. Counters are updated
    /// separately: batches account all their rows at once through
    /// `add_completed`.
    pub fn notify_success(&self, handle: RowHandle, response: &ClientResponse) {
        if let Some(success) = &self.success {
            success(handle, response.clone());
        }
    }

    /// Accounts `rows` committed rows.
    pub fn add_completed(&self, rows: u64) {
        self.completed.fetch_add(rows, Ordering::SeqCst);
        self.sub_outstanding(rows as i64);
    }

    /// Terminal success for a single resubmitted row.
    pub fn record_success(&self, handle: RowHandle, response: &ClientResponse) {
        self.notify_success(handle, response);
        self.add_completed(1);
    }

    /// Terminal failure for a row that was counted outstanding.
    pub fn record_failure(&self, handle: RowHandle, values: Vec<Value>, response: ClientResponse) {
        (self.failure)(handle, values, response);
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.sub_outstanding(1);
    }

    /// Terminal failure for a row rejected before it was ever counted
    /// outstanding (routing and arity errors).
    pub fn record_rejected(&self, handle: RowHandle, values: Vec<Value>, response: ClientResponse) {
        (self.failure)(handle, values, response);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Waits until every accepted row has reached its terminal callback.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn sub_outstanding(&self, rows: i64) {
        if self.outstanding.fetch_sub(rows, Ordering::SeqCst) == rows {
            self.idle.notify_waiters();
        }
    }
}
