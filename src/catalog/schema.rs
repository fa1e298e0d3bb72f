use crate::catalog::types::ColumnType;
use crate::catalog::types::Value;
use crate::query::plan::Expr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl TableSchema {
    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Constraint {
    NotNull { column: String },
    Default { column: String, value: Value },
    Check { name: String, expr: Expr },
    /// Integer sequence filled in on insert when the column arrives null.
    Identity { column: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
    UniqueHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDef {
    pub index_name: String,
    pub columns: Vec<String>,
    pub kind: IndexKind,
}

impl IndexDef {
    pub fn is_unique(&self) -> bool {
        matches!(self.kind, IndexKind::UniqueHash)
    }

    /// Whether any of this index's key members is in the given change set.
    pub fn overlaps(&self, changed_columns: &[String]) -> bool {
        self.columns.iter().any(|c| changed_columns.contains(c))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationOptions {
    /// Deleting a primary entity deletes its referring entities instead of
    /// rejecting the delete.
    pub cascaded_deletion: bool,
}

/// A directed foreign-key constraint: rows of `foreign_table` whose
/// `foreign_columns` are all non-null must match some row of `primary_table`
/// on `primary_columns` (the key members of a unique index there).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    pub primary_table: String,
    pub primary_columns: Vec<String>,
    #[serde(default)]
    pub options: RelationOptions,
}
