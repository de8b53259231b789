use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use snafu::Snafu;

use crate::response::ClientResponse;
use crate::table::RowBatch;

/// Resolves to the asynchronous response of a registered procedure call.
pub type ResponseFuture = BoxFuture<'static, ClientResponse>;

/// Synchronous submit failure: the network path to the cluster was unusable
/// before the invocation could be registered.
#[derive(Debug, Clone, Snafu)]
pub enum CallError {
    #[snafu(display("no connection to the database"))]
    Disconnected,
}

/// A single procedure invocation parameter.
#[derive(Debug, Clone)]
pub enum ProcParam {
    Byte(u8),
    Utf8(String),
    Bytes(Vec<u8>),
    Table(Arc<RowBatch>),
}

impl ProcParam {
    pub fn as_table(&self) -> Option<&RowBatch> {
        match self {
            ProcParam::Table(batch) => Some(batch),
            _ => None,
        }
    }
}

/// The non-blocking procedure invocation surface of the database client.
///
/// `call_procedure` registers the invocation and returns a future resolving
/// to its response. Once a call registers, the response future always
/// resolves; failures after registration are encoded in the response status.
/// The `Err` path signals that the cluster was unreachable at submit time
/// and nothing was registered.
#[async_trait]
pub trait ProcedureClient: Send + Sync {
    async fn call_procedure(
        &self,
        name: &str,
        params: Vec<ProcParam>,
    ) -> Result<ResponseFuture, CallError>;

    /// The number of logical partitions in the cluster's partition map.
    fn partition_count(&self) -> u32;

    /// Whether the client re-establishes lost connections on its own.
    fn auto_reconnect(&self) -> bool {
        false
    }
}
