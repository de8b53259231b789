use crate::value::DataType;

/// System procedure that bulk-loads a batch into one partition of a
/// partitioned table.
pub const LOAD_PARTITIONED_TABLE_PROC: &str = "@LoadPartitionedTable";
/// System procedure that bulk-loads a batch into a replicated table.
pub const LOAD_REPLICATED_TABLE_PROC: &str = "@LoadReplicatedTable";

/// Name and declared type of a single table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Catalog descriptor for a bulk-load target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// The table name.
    pub table: String,
    /// The table's columns, in declaration order.
    pub columns: Vec<ColumnInfo>,
    /// The index of the column the table is partitioned on; `None` for
    /// replicated tables.
    pub partition_column: Option<usize>,
}

impl TableSchema {
    /// Creates a descriptor for a replicated table.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            table: table.into(),
            columns,
            partition_column: None,
        }
    }

    pub fn with_partition_column(mut self, index: usize) -> Self {
        self.partition_column = Some(index);
        self
    }

    pub fn is_replicated(&self) -> bool {
        self.partition_column.is_none()
    }

    /// The declared type of the partition column, if the table is
    /// partitioned and the index is in bounds.
    pub fn partition_column_type(&self) -> Option<DataType> {
        self.partition_column
            .and_then(|idx| self.columns.get(idx))
            .map(|col| col.data_type)
    }

    /// The system procedure used to bulk-load this table.
    pub fn load_procedure(&self) -> &'static str {
        if self.is_replicated() {
            LOAD_REPLICATED_TABLE_PROC
        } else {
            LOAD_PARTITIONED_TABLE_PROC
        }
    }
}
