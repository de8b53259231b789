use std::sync::Arc;

use snafu::{Snafu, ensure};

use crate::schema::ColumnInfo;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum RowBatchError {
    #[snafu(display("row has {got} values but the batch has {expected} columns"))]
    ColumnCountMismatch { expected: usize, got: usize },
}

/// An ordered set of rows keyed by column descriptors, sent as the table
/// parameter of a bulk-load procedure invocation.
///
/// Values are expected to already be coerced to their declared column types.
#[derive(Debug, Clone)]
pub struct RowBatch {
    columns: Arc<[ColumnInfo]>,
    rows: Vec<Vec<Value>>,
}

impl RowBatch {
    pub fn new(columns: Arc<[ColumnInfo]>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_capacity(columns: Arc<[ColumnInfo]>, capacity: usize) -> Self {
        Self {
            columns,
            rows: Vec::with_capacity(capacity),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), RowBatchError> {
        ensure!(
            row.len() == self.columns.len(),
            ColumnCountMismatchSnafu {
                expected: self.columns.len(),
                got: row.len(),
            }
        );
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    fn columns() -> Arc<[ColumnInfo]> {
        vec![
            ColumnInfo::new("a", DataType::Int32),
            ColumnInfo::new("b", DataType::Utf8),
        ]
        .into()
    }

    #[test]
    fn test_push_row() {
        let mut batch = RowBatch::new(columns());
        assert!(batch.is_empty());

        batch
            .push_row(vec![Value::i32(1), Value::utf8("x")])
            .unwrap();
        assert_eq!(batch.row_count(), 1);
        assert_eq!(batch.row(0).unwrap()[0], Value::Int32(1));
    }

    #[test]
    fn test_push_row_wrong_arity() {
        let mut batch = RowBatch::new(columns());
        let err = batch.push_row(vec![Value::i32(1)]).unwrap_err();
        assert_eq!(
            err,
            RowBatchError::ColumnCountMismatch {
                expected: 2,
                got: 1
            }
        );
    }
}
