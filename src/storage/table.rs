use crate::catalog::types::Row;
use crate::error::{MemrelError, ResourceType};
use crate::storage::EntityId;
use crate::storage::index::TableIndex;
use im::OrdMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Copies the persisted members of one row into another. Registered per
/// table at schema time; the update path uses it for backup snapshots and
/// the undo log uses it to restore them.
pub trait EntityCloner: Send + Sync + std::fmt::Debug {
    fn copy(&self, src: &Row, dst: &mut Row);
}

/// Default cloner: every column is a persisted member.
#[derive(Debug, Default)]
pub struct ColumnCloner;

impl EntityCloner for ColumnCloner {
    fn copy(&self, src: &Row, dst: &mut Row) {
        dst.values = src.values.clone();
    }
}

/// Runtime state of one table: rows by stable entity handle plus the ordered
/// index list (position 0 is the primary index).
#[derive(Debug)]
pub struct TableData {
    pub rows: OrdMap<EntityId, Row>,
    pub indexes: Vec<TableIndex>,
    pub cloner: Arc<dyn EntityCloner>,
    next_entity: u64,
    identity_seq: AtomicI64,
}

impl TableData {
    pub fn new(indexes: Vec<TableIndex>, cloner: Arc<dyn EntityCloner>) -> Self {
        Self {
            rows: OrdMap::new(),
            indexes,
            cloner,
            next_entity: 0,
            identity_seq: AtomicI64::new(0),
        }
    }

    pub fn allocate_entity(&mut self) -> EntityId {
        self.next_entity += 1;
        EntityId(self.next_entity)
    }

    /// Next value of the table's identity sequence. Atomic so constraint
    /// application may run before the table's write lock is taken.
    pub fn next_identity(&self) -> i64 {
        self.identity_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn row(&self, entity: EntityId) -> Option<&Row> {
        self.rows.get(&entity)
    }

    pub fn row_mut(&mut self, entity: EntityId) -> Option<&mut Row> {
        self.rows.get_mut(&entity)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index_by_name(&self, name: &str) -> Option<&TableIndex> {
        self.indexes.iter().find(|i| i.def.index_name == name)
    }
}

/// All table runtime state. Guarded by the database's physical state lock;
/// logical isolation comes from the table lock manager, not from this map.
#[derive(Debug, Default)]
pub struct StoreState {
    pub tables: HashMap<String, TableData>,
}

impl StoreState {
    pub fn table(&self, name: &str) -> Result<&TableData, MemrelError> {
        self.tables.get(name).ok_or_else(|| MemrelError::NotFound {
            resource_type: ResourceType::Table,
            resource_id: name.to_string(),
        })
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut TableData, MemrelError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| MemrelError::NotFound {
                resource_type: ResourceType::Table,
                resource_id: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnCloner, EntityCloner, TableData};
    use crate::catalog::schema::{IndexDef, IndexKind};
    use crate::catalog::types::{Row, Value};
    use crate::storage::index::TableIndex;
    use std::sync::Arc;

    #[test]
    fn entity_handles_are_never_reused() {
        let mut table = TableData::new(
            vec![TableIndex::new(IndexDef {
                index_name: "primary".into(),
                columns: vec!["id".into()],
                kind: IndexKind::UniqueHash,
            })],
            Arc::new(ColumnCloner),
        );
        let a = table.allocate_entity();
        let b = table.allocate_entity();
        assert_ne!(a, b);
        table.rows.insert(a, Row::from_values(vec![Value::Integer(1)]));
        table.rows.remove(&a);
        let c = table.allocate_entity();
        assert_ne!(a, c);
    }

    #[test]
    fn column_cloner_copies_all_values() {
        let src = Row::from_values(vec![Value::Integer(1), Value::Text("x".into())]);
        let mut dst = Row::from_values(vec![Value::Integer(2), Value::Text("y".into())]);
        ColumnCloner.copy(&src, &mut dst);
        assert_eq!(dst, src);
    }
}
