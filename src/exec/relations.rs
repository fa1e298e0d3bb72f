use crate::catalog::Catalog;
use crate::catalog::schema::{IndexDef, RelationDef};
use crate::error::MemrelError;
use crate::storage::EntityId;
use crate::storage::encoded_key::EncodedKey;
use crate::storage::index::extract_index_key;
use crate::storage::table::StoreState;
use std::collections::{HashSet, VecDeque};

/// Relations gathered for a set of indexes, each listed at most once in
/// first-discovery order. `referring` holds relations where an examined
/// index is the primary side (others point at it); `referred` holds those
/// where it is the foreign side (it points at others).
#[derive(Debug, Default)]
pub(crate) struct RelationGroup<'a> {
    pub referring: Vec<&'a RelationDef>,
    pub referred: Vec<&'a RelationDef>,
}

/// For each (table, index) pair, gathers the relations the index
/// participates in. Callers disable the side they do not need: insert only
/// asks "do I satisfy my FKs" (referred), delete only "who points at me"
/// (referring).
pub(crate) fn find_relations<'a>(
    catalog: &'a Catalog,
    indexes: &[(&str, &IndexDef)],
    include_referring: bool,
    include_referred: bool,
) -> RelationGroup<'a> {
    let mut group = RelationGroup::default();
    let mut seen_referring = HashSet::new();
    let mut seen_referred = HashSet::new();
    for (table, index) in indexes {
        for relation in &catalog.relations {
            if include_referring
                && relation.primary_table == *table
                && relation.primary_columns == index.columns
                && index.is_unique()
                && seen_referring.insert(relation.name.as_str())
            {
                group.referring.push(relation);
            }
            if include_referred
                && relation.foreign_table == *table
                && relation.foreign_columns == index.columns
                && seen_referred.insert(relation.name.as_str())
            {
                group.referred.push(relation);
            }
        }
    }
    group
}

/// Convenience pairing of a table's name with each of its catalog indexes.
pub(crate) fn table_index_pairs<'a>(
    catalog: &'a Catalog,
    table: &'a str,
) -> Vec<(&'a str, &'a IndexDef)> {
    catalog
        .table_indexes(table)
        .iter()
        .map(|def| (table, def))
        .collect()
}

/// Transitive closure of tables reachable from `root` through
/// cascade-delete relations, excluding `root` itself. Breadth-first with a
/// visited set so cyclic schemas terminate; discovery order follows catalog
/// registration order, which keeps lock acquisition order identical for
/// concurrent cascades of the same root.
pub(crate) fn cascaded_tables(catalog: &Catalog, root: &str) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::from([root]);
    let mut queue: VecDeque<&str> = VecDeque::from([root]);
    let mut out = Vec::new();
    while let Some(current) = queue.pop_front() {
        for relation in &catalog.relations {
            if relation.primary_table == current
                && relation.options.cascaded_deletion
                && visited.insert(relation.foreign_table.as_str())
            {
                out.push(relation.foreign_table.clone());
                queue.push_back(relation.foreign_table.as_str());
            }
        }
    }
    out
}

/// For each referring relation, the foreign entities currently pointing at
/// any of the victims: one bucket per relation, aligned with the input
/// slice, deduplicated in victim order. Uses the relation's foreign index
/// when the table still carries it, scanning otherwise.
pub(crate) fn find_referring_entities(
    catalog: &Catalog,
    state: &StoreState,
    victim_table: &str,
    victims: &[EntityId],
    referring: &[&RelationDef],
) -> Result<Vec<Vec<EntityId>>, MemrelError> {
    let mut buckets = Vec::with_capacity(referring.len());
    if referring.is_empty() || victims.is_empty() {
        buckets.resize(referring.len(), Vec::new());
        return Ok(buckets);
    }

    let victim_schema = catalog.table(victim_table)?;
    let victim_data = state.table(victim_table)?;
    for relation in referring {
        let mut victim_keys = Vec::with_capacity(victims.len());
        for victim in victims {
            let Some(row) = victim_data.row(*victim) else {
                continue;
            };
            let key_values = extract_index_key(row, victim_schema, &relation.primary_columns)?;
            if key_values.iter().any(|v| v.is_null()) {
                continue;
            }
            victim_keys.push(EncodedKey::from_values(&key_values));
        }

        let foreign_schema = catalog.table(&relation.foreign_table)?;
        let foreign_data = state.table(&relation.foreign_table)?;
        let mut bucket = Vec::new();
        let mut seen = HashSet::new();
        if let Some(index) = foreign_data
            .indexes
            .iter()
            .find(|i| i.def.columns == relation.foreign_columns)
        {
            for key in &victim_keys {
                for id in index.scan_eq(key) {
                    if seen.insert(id) {
                        bucket.push(id);
                    }
                }
            }
        } else {
            // Fallback path if the foreign index is not present at runtime.
            let keys: HashSet<&EncodedKey> = victim_keys.iter().collect();
            for (id, row) in &foreign_data.rows {
                let values = extract_index_key(row, foreign_schema, &relation.foreign_columns)?;
                if values.iter().any(|v| v.is_null()) {
                    continue;
                }
                let key = EncodedKey::from_values(&values);
                if keys.contains(&key) && seen.insert(*id) {
                    bucket.push(*id);
                }
            }
        }
        buckets.push(bucket);
    }
    Ok(buckets)
}
