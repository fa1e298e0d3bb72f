use crate::catalog::schema::{IndexDef, IndexKind, TableSchema};
use crate::catalog::types::{Row, Value};
use crate::error::MemrelError;
use crate::storage::EntityId;
use crate::storage::encoded_key::EncodedKey;
use im::{HashMap, OrdMap, OrdSet};
use std::ops::Bound;

#[derive(Debug, Clone)]
pub enum IndexStore {
    BTree(OrdMap<EncodedKey, OrdSet<EntityId>>),
    Hash(HashMap<EncodedKey, OrdSet<EntityId>>),
    UniqueHash(HashMap<EncodedKey, EntityId>),
}

/// Rejected unique insert; carries the entity already occupying the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueConflict {
    pub existing: EntityId,
}

/// One index of a table: the definition plus the key → entity-set store.
/// An entity is findable under exactly the key its row had when inserted;
/// mutating key members without delete + re-insert leaves the index stale.
#[derive(Debug, Clone)]
pub struct TableIndex {
    pub def: IndexDef,
    store: IndexStore,
}

impl TableIndex {
    pub fn new(def: IndexDef) -> Self {
        let store = match def.kind {
            IndexKind::BTree => IndexStore::BTree(OrdMap::new()),
            IndexKind::Hash => IndexStore::Hash(HashMap::new()),
            IndexKind::UniqueHash => IndexStore::UniqueHash(HashMap::new()),
        };
        Self { def, store }
    }

    pub fn insert(&mut self, key: EncodedKey, entity: EntityId) -> Result<(), UniqueConflict> {
        match &mut self.store {
            IndexStore::BTree(entries) => {
                let mut ids = entries.get(&key).cloned().unwrap_or_default();
                ids.insert(entity);
                entries.insert(key, ids);
                Ok(())
            }
            IndexStore::Hash(entries) => {
                let mut ids = entries.get(&key).cloned().unwrap_or_default();
                ids.insert(entity);
                entries.insert(key, ids);
                Ok(())
            }
            IndexStore::UniqueHash(entries) => match entries.get(&key) {
                Some(existing) if *existing != entity => {
                    Err(UniqueConflict { existing: *existing })
                }
                _ => {
                    entries.insert(key, entity);
                    Ok(())
                }
            },
        }
    }

    pub fn remove(&mut self, key: &EncodedKey, entity: EntityId) {
        match &mut self.store {
            IndexStore::BTree(entries) => {
                let Some(mut ids) = entries.get(key).cloned() else {
                    return;
                };
                ids.remove(&entity);
                if ids.is_empty() {
                    entries.remove(key);
                } else {
                    entries.insert(key.clone(), ids);
                }
            }
            IndexStore::Hash(entries) => {
                let Some(mut ids) = entries.get(key).cloned() else {
                    return;
                };
                ids.remove(&entity);
                if ids.is_empty() {
                    entries.remove(key);
                } else {
                    entries.insert(key.clone(), ids);
                }
            }
            IndexStore::UniqueHash(entries) => {
                if entries.get(key) == Some(&entity) {
                    entries.remove(key);
                }
            }
        }
    }

    pub fn scan_eq(&self, key: &EncodedKey) -> Vec<EntityId> {
        match &self.store {
            IndexStore::BTree(entries) => entries
                .get(key)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            IndexStore::Hash(entries) => entries
                .get(key)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            IndexStore::UniqueHash(entries) => {
                entries.get(key).map(|id| vec![*id]).unwrap_or_default()
            }
        }
    }

    pub fn scan_range(&self, start: Bound<EncodedKey>, end: Bound<EncodedKey>) -> Vec<EntityId> {
        match &self.store {
            IndexStore::BTree(entries) => entries
                .range((start, end))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect(),
            IndexStore::Hash(_) | IndexStore::UniqueHash(_) => Vec::new(),
        }
    }

    pub fn unique_existing(&self, key: &EncodedKey) -> Option<EntityId> {
        match &self.store {
            IndexStore::UniqueHash(entries) => entries.get(key).copied(),
            _ => None,
        }
    }

    pub fn contains(&self, key: &EncodedKey, entity: EntityId) -> bool {
        self.scan_eq(key).contains(&entity)
    }

    /// Total number of (key, entity) pointers held.
    pub fn entry_count(&self) -> usize {
        match &self.store {
            IndexStore::BTree(entries) => entries.values().map(|ids| ids.len()).sum(),
            IndexStore::Hash(entries) => entries.values().map(|ids| ids.len()).sum(),
            IndexStore::UniqueHash(entries) => entries.len(),
        }
    }
}

pub fn extract_index_key(
    row: &Row,
    schema: &TableSchema,
    indexed_columns: &[String],
) -> Result<Vec<Value>, MemrelError> {
    let mut out = Vec::with_capacity(indexed_columns.len());
    for col in indexed_columns {
        let idx = schema
            .column_position(col)
            .ok_or_else(|| MemrelError::UnknownColumn {
                table: schema.table_name.clone(),
                column: col.clone(),
            })?;
        out.push(row.values[idx].clone());
    }
    Ok(out)
}

pub fn extract_index_key_encoded(
    row: &Row,
    schema: &TableSchema,
    indexed_columns: &[String],
) -> Result<EncodedKey, MemrelError> {
    let values = extract_index_key(row, schema, indexed_columns)?;
    Ok(EncodedKey::from_values(&values))
}
