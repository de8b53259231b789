use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use silo_bulk_loader::{FailureCallback, RowHandle, SuccessCallback};
use silo_client_core::{
    CallError, ClientResponse, ColumnInfo, DataType, ProcParam, ProcedureClient, ResponseFuture,
    ResponseStatus, TableSchema, Value,
};
use tokio::sync::Notify;

/// A scripted in-memory database client.
///
/// Responses are handed out in submission order; an empty script means every
/// call succeeds. `refuse_next_submits` makes the next submits fail
/// synchronously, before anything registers, like a dead network does.
pub struct MockClient {
    partition_count: u32,
    auto_reconnect: bool,
    state: Mutex<MockState>,
    attempted: Notify,
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<ResponseStatus>,
    refuse_submits: usize,
    calls: Vec<RecordedCall>,
    attempts: usize,
}

#[derive(Clone)]
pub struct RecordedCall {
    pub procedure: String,
    pub params: Vec<ProcParam>,
}

impl MockClient {
    pub fn new(partition_count: u32) -> Arc<Self> {
        init_test_logging();
        Arc::new(Self {
            partition_count,
            auto_reconnect: false,
            state: Mutex::default(),
            attempted: Notify::new(),
        })
    }

    pub fn with_auto_reconnect(partition_count: u32) -> Arc<Self> {
        init_test_logging();
        Arc::new(Self {
            partition_count,
            auto_reconnect: true,
            state: Mutex::default(),
            attempted: Notify::new(),
        })
    }

    pub fn script_responses(&self, statuses: impl IntoIterator<Item = ResponseStatus>) {
        self.state.lock().responses.extend(statuses);
    }

    pub fn refuse_next_submits(&self, count: usize) {
        self.state.lock().refuse_submits += count;
    }

    /// Invocations that registered, in order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Waits until the client has seen at least `count` submit attempts,
    /// including refused ones.
    pub async fn wait_for_attempts(&self, count: usize) {
        loop {
            let notified = self.attempted.notified();
            if self.state.lock().attempts >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ProcedureClient for MockClient {
    async fn call_procedure(
        &self,
        name: &str,
        params: Vec<ProcParam>,
    ) -> Result<ResponseFuture, CallError> {
        let status = {
            let mut state = self.state.lock();
            state.attempts += 1;

            if state.refuse_submits > 0 {
                state.refuse_submits -= 1;
                self.attempted.notify_waiters();
                return Err(CallError::Disconnected);
            }

            state.calls.push(RecordedCall {
                procedure: name.to_string(),
                params,
            });
            state.responses.pop_front().unwrap_or(ResponseStatus::Success)
        };

        self.attempted.notify_waiters();

        let response = if status.is_success() {
            ClientResponse::success()
        } else {
            ClientResponse::new(status, "scripted failure")
        };
        Ok(futures::future::ready(response).boxed())
    }

    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }
}

/// Records terminal callbacks keyed by `i64` row handles.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    state: Arc<Mutex<RecorderState>>,
}

#[derive(Default)]
struct RecorderState {
    successes: Vec<i64>,
    failures: Vec<(i64, ResponseStatus)>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_callback(&self) -> FailureCallback {
        let state = self.state.clone();
        Arc::new(move |handle: RowHandle, _values, response: ClientResponse| {
            let id = handle.downcast_ref::<i64>().copied().unwrap_or(-1);
            state.lock().failures.push((id, response.status()));
        })
    }

    pub fn success_callback(&self) -> SuccessCallback {
        let state = self.state.clone();
        Arc::new(move |handle: RowHandle, _response| {
            let id = handle.downcast_ref::<i64>().copied().unwrap_or(-1);
            state.lock().successes.push(id);
        })
    }

    pub fn successes(&self) -> Vec<i64> {
        self.state.lock().successes.clone()
    }

    pub fn failures(&self) -> Vec<(i64, ResponseStatus)> {
        self.state.lock().failures.clone()
    }
}

pub fn replicated_schema(table: &str) -> TableSchema {
    TableSchema::new(
        table,
        vec![
            ColumnInfo::new("a", DataType::Int32),
            ColumnInfo::new("b", DataType::Utf8),
        ],
    )
}

pub fn int_pair_schema(table: &str) -> TableSchema {
    TableSchema::new(
        table,
        vec![
            ColumnInfo::new("a", DataType::Int32),
            ColumnInfo::new("b", DataType::Int32),
        ],
    )
}

pub fn partitioned_schema(table: &str) -> TableSchema {
    TableSchema::new(
        table,
        vec![
            ColumnInfo::new("id", DataType::Int64),
            ColumnInfo::new("payload", DataType::Utf8),
        ],
    )
    .with_partition_column(0)
}

/// The rows of the table parameter of a recorded invocation.
pub fn batch_rows(call: &RecordedCall) -> Vec<Vec<Value>> {
    call.params
        .iter()
        .find_map(|param| param.as_table())
        .map(|table| table.rows().to_vec())
        .unwrap_or_default()
}

pub fn handle(id: i64) -> RowHandle {
    Arc::new(id)
}

/// Opt into shard logs with `RUST_LOG=silo_bulk_loader=debug`.
fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
