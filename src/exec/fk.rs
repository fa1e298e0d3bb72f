use crate::catalog::Catalog;
use crate::catalog::schema::RelationDef;
use crate::catalog::types::Row;
use crate::error::MemrelError;
use crate::storage::EntityId;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::index::extract_index_key;
use crate::storage::table::StoreState;

/// Checks that each row satisfies each relation of its (foreign) table: all
/// rows here belong to the relations' foreign side. An empty relation set
/// short-circuits. The first violation is raised; the caller's log scope
/// undoes whatever mutation was tentatively applied.
pub(crate) fn validate_flat(
    catalog: &Catalog,
    state: &StoreState,
    relations: &[&RelationDef],
    rows: &[&Row],
) -> Result<(), MemrelError> {
    if relations.is_empty() {
        return Ok(());
    }
    for relation in relations {
        for row in rows {
            validate_row(catalog, state, relation, row)?;
        }
    }
    Ok(())
}

/// Bucketed form: each relation checks only its own entities, as collected
/// by the referring-entity fan-out. Entities whose rows no longer exist
/// (deleted by an earlier cascade step) are skipped.
pub(crate) fn validate_buckets(
    catalog: &Catalog,
    state: &StoreState,
    relations: &[&RelationDef],
    buckets: &[Vec<EntityId>],
) -> Result<(), MemrelError> {
    for (relation, bucket) in relations.iter().zip(buckets) {
        if bucket.is_empty() {
            continue;
        }
        let foreign_data = state.table(&relation.foreign_table)?;
        for entity in bucket {
            let Some(row) = foreign_data.row(*entity) else {
                continue;
            };
            validate_row(catalog, state, relation, row)?;
        }
    }
    Ok(())
}

/// One row against one relation: a null in any foreign key member exempts
/// the row; otherwise the primary table must hold a matching row.
fn validate_row(
    catalog: &Catalog,
    state: &StoreState,
    relation: &RelationDef,
    row: &Row,
) -> Result<(), MemrelError> {
    let foreign_schema = catalog.table(&relation.foreign_table)?;
    let values = extract_index_key(row, foreign_schema, &relation.foreign_columns)?;
    if values.iter().any(|v| v.is_null()) {
        return Ok(());
    }

    let key = EncodedKey::from_values(&values);
    let primary_data = state.table(&relation.primary_table)?;
    let matched = if let Some(index) = primary_data
        .indexes
        .iter()
        .find(|i| i.def.is_unique() && i.def.columns == relation.primary_columns)
    {
        index.unique_existing(&key).is_some()
    } else {
        // Fallback path if the unique index is not present at runtime.
        let primary_schema = catalog.table(&relation.primary_table)?;
        primary_data.rows.iter().any(|(_, candidate)| {
            extract_index_key(candidate, primary_schema, &relation.primary_columns)
                .map(|candidate_values| candidate_values == values)
                .unwrap_or(false)
        })
    };
    if !matched {
        return Err(MemrelError::ForeignKeyViolation {
            relation: relation.name.clone(),
            table: relation.foreign_table.clone(),
            ref_table: relation.primary_table.clone(),
            ref_key: format!("{values:?}"),
        });
    }
    Ok(())
}
