use crate::catalog::schema::{Constraint, TableSchema};
use crate::catalog::types::{Row, Value};
use crate::error::MemrelError;
use crate::query::operators::{compile_expr, eval_compiled_expr};
use crate::storage::table::TableData;

/// Applies the table's constraint list to a candidate row before insert:
/// identity and default fill-in mutate the row in place, then the validators
/// run. Raised errors leave no state behind; nothing has been indexed yet.
pub(crate) fn apply_insert(
    schema: &TableSchema,
    table: &TableData,
    row: &mut Row,
) -> Result<(), MemrelError> {
    check_arity(schema, row)?;
    for constraint in &schema.constraints {
        match constraint {
            Constraint::Identity { column } => {
                let pos = column_pos(schema, column)?;
                if row.values[pos].is_null() {
                    row.values[pos] = Value::Integer(table.next_identity());
                }
            }
            Constraint::Default { column, value } => {
                let pos = column_pos(schema, column)?;
                if row.values[pos].is_null() {
                    row.values[pos] = value.clone();
                }
            }
            Constraint::NotNull { .. } | Constraint::Check { .. } => {}
        }
    }
    validate(schema, row)
}

/// Re-validates a mutated row: types, null rules and check constraints.
/// Generators and defaults are insert-time only.
pub(crate) fn apply_update(schema: &TableSchema, row: &Row) -> Result<(), MemrelError> {
    check_arity(schema, row)?;
    validate(schema, row)
}

fn validate(schema: &TableSchema, row: &Row) -> Result<(), MemrelError> {
    for (pos, column) in schema.columns.iter().enumerate() {
        let value = &row.values[pos];
        if !value.matches_type(column.col_type) {
            return Err(MemrelError::TypeMismatch {
                table: schema.table_name.clone(),
                column: column.name.clone(),
                expected: column.col_type.to_string(),
                actual: value.type_name().to_string(),
            });
        }
        let not_null = !column.nullable || schema.primary_key.contains(&column.name);
        if not_null && value.is_null() {
            return Err(MemrelError::NotNullViolation {
                table: schema.table_name.clone(),
                column: column.name.clone(),
            });
        }
    }
    for constraint in &schema.constraints {
        match constraint {
            Constraint::NotNull { column } => {
                let pos = column_pos(schema, column)?;
                if row.values[pos].is_null() {
                    return Err(MemrelError::NotNullViolation {
                        table: schema.table_name.clone(),
                        column: column.clone(),
                    });
                }
            }
            Constraint::Check { name, expr } => {
                let compiled =
                    compile_expr(expr, &schema.column_names(), &schema.table_name)?;
                if !eval_compiled_expr(&compiled, row) {
                    return Err(MemrelError::CheckConstraintFailed {
                        table: schema.table_name.clone(),
                        constraint: name.clone(),
                    });
                }
            }
            Constraint::Identity { .. } | Constraint::Default { .. } => {}
        }
    }
    Ok(())
}

fn check_arity(schema: &TableSchema, row: &Row) -> Result<(), MemrelError> {
    if row.values.len() != schema.columns.len() {
        return Err(MemrelError::Validation(format!(
            "row for table '{}' has {} values, expected {}",
            schema.table_name,
            row.values.len(),
            schema.columns.len()
        )));
    }
    Ok(())
}

fn column_pos(schema: &TableSchema, column: &str) -> Result<usize, MemrelError> {
    schema
        .column_position(column)
        .ok_or_else(|| MemrelError::UnknownColumn {
            table: schema.table_name.clone(),
            column: column.to_string(),
        })
}
