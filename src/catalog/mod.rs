pub mod schema;
pub mod types;

use crate::catalog::schema::{Constraint, IndexDef, IndexKind, RelationDef, TableSchema};
use crate::catalog::types::ColumnType;
use crate::error::{MemrelError, ResourceType};
use std::collections::HashMap;

/// Name given to the automatically created primary index of every table.
pub const PRIMARY_INDEX: &str = "primary";

/// Schema registry: table definitions, their ordered index lists (position 0
/// is always the primary index) and the declared relations, in registration
/// order. The catalog is fixed by DDL before command execution; commands only
/// read it.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub tables: HashMap<String, TableSchema>,
    pub indexes: HashMap<String, Vec<IndexDef>>,
    pub relations: Vec<RelationDef>,
}

impl Catalog {
    pub fn table(&self, name: &str) -> Result<&TableSchema, MemrelError> {
        self.tables.get(name).ok_or_else(|| MemrelError::NotFound {
            resource_type: ResourceType::Table,
            resource_id: name.to_string(),
        })
    }

    pub fn table_indexes(&self, name: &str) -> &[IndexDef] {
        self.indexes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn relation(&self, name: &str) -> Result<&RelationDef, MemrelError> {
        self.relations
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| MemrelError::NotFound {
                resource_type: ResourceType::Relation,
                resource_id: name.to_string(),
            })
    }

    /// Relations in which `table` is the primary side (others point at it).
    pub fn referring_relations(&self, table: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.primary_table == table)
            .collect()
    }

    /// Relations in which `table` is the foreign side (it points at others).
    pub fn referred_relations(&self, table: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.foreign_table == table)
            .collect()
    }

    pub fn add_table(&mut self, schema: TableSchema) -> Result<(), MemrelError> {
        if self.tables.contains_key(&schema.table_name) {
            return Err(MemrelError::AlreadyExists {
                resource_type: ResourceType::Table,
                resource_id: schema.table_name,
            });
        }
        if schema.columns.is_empty() {
            return Err(MemrelError::Validation(format!(
                "table '{}' must have at least one column",
                schema.table_name
            )));
        }
        for (i, col) in schema.columns.iter().enumerate() {
            if schema.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(MemrelError::Validation(format!(
                    "duplicate column '{}' in table '{}'",
                    col.name, schema.table_name
                )));
            }
        }
        if schema.primary_key.is_empty() {
            return Err(MemrelError::Validation(format!(
                "table '{}' must declare a primary key",
                schema.table_name
            )));
        }
        for col in &schema.primary_key {
            if schema.column_position(col).is_none() {
                return Err(MemrelError::UnknownColumn {
                    table: schema.table_name.clone(),
                    column: col.clone(),
                });
            }
        }
        validate_constraints(&schema)?;

        let primary = IndexDef {
            index_name: PRIMARY_INDEX.to_string(),
            columns: schema.primary_key.clone(),
            kind: IndexKind::UniqueHash,
        };
        self.indexes
            .insert(schema.table_name.clone(), vec![primary]);
        self.tables.insert(schema.table_name.clone(), schema);
        Ok(())
    }

    pub fn add_index(&mut self, table: &str, def: IndexDef) -> Result<(), MemrelError> {
        let schema = self.table(table)?;
        if def.columns.is_empty() {
            return Err(MemrelError::Validation(format!(
                "index '{}' must have at least one key member",
                def.index_name
            )));
        }
        for col in &def.columns {
            if schema.column_position(col).is_none() {
                return Err(MemrelError::UnknownColumn {
                    table: table.to_string(),
                    column: col.clone(),
                });
            }
        }
        let defs = self
            .indexes
            .get_mut(table)
            .ok_or_else(|| MemrelError::NotFound {
                resource_type: ResourceType::Table,
                resource_id: table.to_string(),
            })?;
        if defs.iter().any(|d| d.index_name == def.index_name) {
            return Err(MemrelError::AlreadyExists {
                resource_type: ResourceType::Index,
                resource_id: def.index_name,
            });
        }
        defs.push(def);
        Ok(())
    }

    /// Registers a relation. Both endpoints must already be indexed: the
    /// foreign side by an index over exactly the foreign key members, the
    /// primary side by a unique index over exactly the referenced members.
    pub fn add_relation(&mut self, def: RelationDef) -> Result<(), MemrelError> {
        if self.relations.iter().any(|r| r.name == def.name) {
            return Err(MemrelError::AlreadyExists {
                resource_type: ResourceType::Relation,
                resource_id: def.name,
            });
        }
        if def.foreign_columns.is_empty() || def.foreign_columns.len() != def.primary_columns.len()
        {
            return Err(MemrelError::Validation(format!(
                "relation '{}' must map a non-empty, equal-arity column list",
                def.name
            )));
        }
        let foreign_schema = self.table(&def.foreign_table)?;
        let primary_schema = self.table(&def.primary_table)?;
        for (f_col, p_col) in def.foreign_columns.iter().zip(&def.primary_columns) {
            let f_pos =
                foreign_schema
                    .column_position(f_col)
                    .ok_or_else(|| MemrelError::UnknownColumn {
                        table: def.foreign_table.clone(),
                        column: f_col.clone(),
                    })?;
            let p_pos =
                primary_schema
                    .column_position(p_col)
                    .ok_or_else(|| MemrelError::UnknownColumn {
                        table: def.primary_table.clone(),
                        column: p_col.clone(),
                    })?;
            let f_type = foreign_schema.columns[f_pos].col_type;
            let p_type = primary_schema.columns[p_pos].col_type;
            if f_type != p_type {
                return Err(MemrelError::TypeMismatch {
                    table: def.foreign_table.clone(),
                    column: f_col.clone(),
                    expected: p_type.to_string(),
                    actual: f_type.to_string(),
                });
            }
        }
        if !self
            .table_indexes(&def.foreign_table)
            .iter()
            .any(|i| i.columns == def.foreign_columns)
        {
            return Err(MemrelError::Validation(format!(
                "relation '{}' requires an index over {:?} on table '{}'",
                def.name, def.foreign_columns, def.foreign_table
            )));
        }
        if !self
            .table_indexes(&def.primary_table)
            .iter()
            .any(|i| i.is_unique() && i.columns == def.primary_columns)
        {
            return Err(MemrelError::Validation(format!(
                "relation '{}' requires a unique index over {:?} on table '{}'",
                def.name, def.primary_columns, def.primary_table
            )));
        }
        self.relations.push(def);
        Ok(())
    }
}

fn validate_constraints(schema: &TableSchema) -> Result<(), MemrelError> {
    for constraint in &schema.constraints {
        match constraint {
            Constraint::NotNull { column } | Constraint::Default { column, .. } => {
                if schema.column_position(column).is_none() {
                    return Err(MemrelError::UnknownColumn {
                        table: schema.table_name.clone(),
                        column: column.clone(),
                    });
                }
            }
            Constraint::Identity { column } => {
                let pos =
                    schema
                        .column_position(column)
                        .ok_or_else(|| MemrelError::UnknownColumn {
                            table: schema.table_name.clone(),
                            column: column.clone(),
                        })?;
                if schema.columns[pos].col_type != ColumnType::Integer {
                    return Err(MemrelError::Validation(format!(
                        "identity column '{}' in table '{}' must be integer",
                        column, schema.table_name
                    )));
                }
            }
            Constraint::Check { .. } => {}
        }
    }
    Ok(())
}
