use crate::catalog::types::{Row, Value};
use crate::error::MemrelError;
use crate::query::plan::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Eq(usize, Value),
    Ne(usize, Value),
    Lt(usize, Value),
    Lte(usize, Value),
    Gt(usize, Value),
    Gte(usize, Value),
    In(usize, Vec<Value>),
    Between(usize, Value, Value),
    IsNull(usize),
    IsNotNull(usize),
    Like(usize, String),
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
}

/// Resolves column names to row positions once, so evaluation is a pure
/// positional walk.
pub fn compile_expr(
    expr: &Expr,
    columns: &[String],
    table: &str,
) -> Result<CompiledExpr, MemrelError> {
    match expr {
        Expr::Eq(c, v) => Ok(CompiledExpr::Eq(
            find_col_idx(columns, c, table)?,
            v.clone(),
        )),
        Expr::Ne(c, v) => Ok(CompiledExpr::Ne(
            find_col_idx(columns, c, table)?,
            v.clone(),
        )),
        Expr::Lt(c, v) => Ok(CompiledExpr::Lt(
            find_col_idx(columns, c, table)?,
            v.clone(),
        )),
        Expr::Lte(c, v) => Ok(CompiledExpr::Lte(
            find_col_idx(columns, c, table)?,
            v.clone(),
        )),
        Expr::Gt(c, v) => Ok(CompiledExpr::Gt(
            find_col_idx(columns, c, table)?,
            v.clone(),
        )),
        Expr::Gte(c, v) => Ok(CompiledExpr::Gte(
            find_col_idx(columns, c, table)?,
            v.clone(),
        )),
        Expr::In(c, values) => Ok(CompiledExpr::In(
            find_col_idx(columns, c, table)?,
            values.clone(),
        )),
        Expr::Between(c, lo, hi) => Ok(CompiledExpr::Between(
            find_col_idx(columns, c, table)?,
            lo.clone(),
            hi.clone(),
        )),
        Expr::IsNull(c) => Ok(CompiledExpr::IsNull(find_col_idx(columns, c, table)?)),
        Expr::IsNotNull(c) => Ok(CompiledExpr::IsNotNull(find_col_idx(columns, c, table)?)),
        Expr::Like(c, pattern) => Ok(CompiledExpr::Like(
            find_col_idx(columns, c, table)?,
            pattern.clone(),
        )),
        Expr::And(a, b) => Ok(CompiledExpr::And(
            Box::new(compile_expr(a, columns, table)?),
            Box::new(compile_expr(b, columns, table)?),
        )),
        Expr::Or(a, b) => Ok(CompiledExpr::Or(
            Box::new(compile_expr(a, columns, table)?),
            Box::new(compile_expr(b, columns, table)?),
        )),
        Expr::Not(inner) => Ok(CompiledExpr::Not(Box::new(compile_expr(
            inner, columns, table,
        )?))),
    }
}

pub fn eval_compiled_expr(expr: &CompiledExpr, row: &Row) -> bool {
    match expr {
        CompiledExpr::Eq(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_eq()))
        }
        CompiledExpr::Ne(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| !o.is_eq()))
        }
        CompiledExpr::Lt(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_lt()))
        }
        CompiledExpr::Lte(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_le()))
        }
        CompiledExpr::Gt(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_gt()))
        }
        CompiledExpr::Gte(idx, v) => {
            get_col(row, *idx).is_some_and(|rv| compare_values(rv, v).is_some_and(|o| o.is_ge()))
        }
        CompiledExpr::In(idx, values) => get_col(row, *idx).is_some_and(|rv| {
            values
                .iter()
                .any(|v| compare_values(rv, v).is_some_and(|o| o.is_eq()))
        }),
        CompiledExpr::Between(idx, lo, hi) => get_col(row, *idx).is_some_and(|rv| {
            compare_values(rv, lo).is_some_and(|o| o.is_ge())
                && compare_values(rv, hi).is_some_and(|o| o.is_le())
        }),
        CompiledExpr::IsNull(idx) => get_col(row, *idx).is_some_and(|rv| matches!(rv, Value::Null)),
        CompiledExpr::IsNotNull(idx) => {
            get_col(row, *idx).is_some_and(|rv| !matches!(rv, Value::Null))
        }
        CompiledExpr::Like(idx, pattern) => get_col(row, *idx).is_some_and(|rv| match rv {
            Value::Text(s) => like_match(s, pattern),
            _ => false,
        }),
        CompiledExpr::And(a, b) => eval_compiled_expr(a, row) && eval_compiled_expr(b, row),
        CompiledExpr::Or(a, b) => eval_compiled_expr(a, row) || eval_compiled_expr(b, row),
        CompiledExpr::Not(inner) => !eval_compiled_expr(inner, row),
    }
}

fn find_col_idx(columns: &[String], col: &str, table: &str) -> Result<usize, MemrelError> {
    columns
        .iter()
        .position(|c| c == col)
        .ok_or_else(|| MemrelError::UnknownColumn {
            table: table.to_string(),
            column: col.to_string(),
        })
}

fn get_col(row: &Row, idx: usize) -> Option<&Value> {
    row.values.get(idx)
}

fn like_match(value: &str, pattern: &str) -> bool {
    let text = value.as_bytes();
    let pat = pattern.as_bytes();
    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < text.len() {
        if pi < pat.len() && (pat[pi] == b'_' || pat[pi] == text[ti]) {
            ti += 1;
            pi += 1;
            continue;
        }
        if pi < pat.len() && pat[pi] == b'%' {
            star_pi = Some(pi);
            pi += 1;
            star_ti = ti;
            continue;
        }
        if let Some(saved_pi) = star_pi {
            pi = saved_pi + 1;
            star_ti += 1;
            ti = star_ti;
            continue;
        }
        return false;
    }

    while pi < pat.len() && pat[pi] == b'%' {
        pi += 1;
    }

    pi == pat.len()
}

/// Three-valued comparison: any null operand compares as unknown, which
/// every predicate treats as non-matching.
fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Timestamp(a), Value::Integer(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Timestamp(b)) => a.partial_cmp(b),
        (Value::Timestamp(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Timestamp(b)) => a.partial_cmp(&(*b as f64)),
        _ => Some(left.cmp(right)),
    }
}
