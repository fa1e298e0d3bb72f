use crate::catalog::Catalog;
use crate::catalog::schema::TableSchema;
use crate::catalog::types::{Row, Value};
use crate::error::MemrelError;
use crate::query::operators::{compile_expr, eval_compiled_expr};
use crate::storage::EntityId;
use crate::storage::table::StoreState;
use serde::{Deserialize, Serialize};

/// Maximum nesting depth for expressions to prevent stack overflow
const MAX_EXPR_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Calculates the maximum nesting depth of this expression tree.
    pub fn depth(&self) -> usize {
        match self {
            Expr::Eq(_, _)
            | Expr::Ne(_, _)
            | Expr::Lt(_, _)
            | Expr::Lte(_, _)
            | Expr::Gt(_, _)
            | Expr::Gte(_, _)
            | Expr::In(_, _)
            | Expr::Between(_, _, _)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::Like(_, _) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    /// Validates that the expression depth does not exceed MAX_EXPR_DEPTH.
    pub fn validate_depth(&self) -> Result<(), MemrelError> {
        let depth = self.depth();
        if depth > MAX_EXPR_DEPTH {
            return Err(MemrelError::Validation(format!(
                "expression depth {depth} exceeds maximum allowed depth of {MAX_EXPR_DEPTH}"
            )));
        }
        Ok(())
    }
}

/// Read view a plan executes against: schemas plus the current row state of
/// every table, snapshot-stable for the duration of the drain because the
/// runner holds the source tables' read locks.
pub struct PlanView<'a> {
    catalog: &'a Catalog,
    state: &'a StoreState,
}

impl<'a> PlanView<'a> {
    pub(crate) fn new(catalog: &'a Catalog, state: &'a StoreState) -> Self {
        Self { catalog, state }
    }

    pub fn schema(&self, table: &str) -> Result<&'a TableSchema, MemrelError> {
        self.catalog.table(table)
    }

    pub fn row(&self, table: &str, entity: EntityId) -> Option<&'a Row> {
        self.state.tables.get(table)?.row(entity)
    }

    pub fn rows(
        &self,
        table: &str,
    ) -> Result<impl Iterator<Item = (EntityId, &'a Row)>, MemrelError> {
        let data = self.state.table(table)?;
        Ok(data.rows.iter().map(|(id, row)| (*id, row)))
    }
}

/// A precompiled query yielding entities of its base table. Opaque to the
/// executor: only the declared sources and the execute entry point matter.
pub trait SequencePlan: Send + Sync {
    /// Declared source tables. The first entry is the base table whose
    /// entities the plan yields.
    fn tables(&self) -> Vec<String>;

    fn execute(&self, view: &PlanView<'_>) -> Result<Vec<EntityId>, MemrelError>;
}

/// A precompiled query yielding a single value.
pub trait ScalarPlan: Send + Sync {
    fn tables(&self) -> Vec<String>;

    fn execute(&self, view: &PlanView<'_>) -> Result<Value, MemrelError>;
}

/// Predicate-filtered scan of one table, with optional ordering and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub table: String,
    pub predicate: Option<Expr>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl FilterPlan {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn where_(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matching(&self, view: &PlanView<'_>) -> Result<Vec<(EntityId, Row)>, MemrelError> {
        let schema = view.schema(&self.table)?;
        let compiled = match &self.predicate {
            Some(expr) => {
                expr.validate_depth()?;
                Some(compile_expr(expr, &schema.column_names(), &self.table)?)
            }
            None => None,
        };
        let mut out = Vec::new();
        for (id, row) in view.rows(&self.table)? {
            if compiled
                .as_ref()
                .is_none_or(|expr| eval_compiled_expr(expr, row))
            {
                out.push((id, row.clone()));
            }
        }
        if let Some((column, order)) = &self.order_by {
            let idx = schema
                .column_position(column)
                .ok_or_else(|| MemrelError::UnknownColumn {
                    table: self.table.clone(),
                    column: column.clone(),
                })?;
            out.sort_by(|(_, a), (_, b)| {
                let cmp = a.values[idx].cmp(&b.values[idx]);
                match order {
                    Order::Asc => cmp,
                    Order::Desc => cmp.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

impl SequencePlan for FilterPlan {
    fn tables(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    fn execute(&self, view: &PlanView<'_>) -> Result<Vec<EntityId>, MemrelError> {
        Ok(self.matching(view)?.into_iter().map(|(id, _)| id).collect())
    }
}

/// Row count of a predicate-filtered scan.
#[derive(Debug, Clone, PartialEq)]
pub struct CountPlan {
    pub table: String,
    pub predicate: Option<Expr>,
}

impl CountPlan {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
        }
    }

    pub fn where_(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl ScalarPlan for CountPlan {
    fn tables(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    fn execute(&self, view: &PlanView<'_>) -> Result<Value, MemrelError> {
        let filter = FilterPlan {
            table: self.table.clone(),
            predicate: self.predicate.clone(),
            order_by: None,
            limit: None,
        };
        let count = filter.execute(view)?.len();
        Ok(Value::Integer(count as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::{Expr, MAX_EXPR_DEPTH};
    use crate::catalog::types::Value;

    #[test]
    fn expr_depth_counts_nesting() {
        let leaf = Expr::Eq("a".into(), Value::Integer(1));
        assert_eq!(leaf.depth(), 1);
        let nested = leaf.clone().and(leaf.clone().or(leaf.clone().not()));
        assert_eq!(nested.depth(), 4);
    }

    #[test]
    fn expr_depth_guard_rejects_deep_trees() {
        let mut expr = Expr::IsNull("a".into());
        for _ in 0..MAX_EXPR_DEPTH {
            expr = expr.not();
        }
        assert!(expr.validate_depth().is_err());
    }
}
