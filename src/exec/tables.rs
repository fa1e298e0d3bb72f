use crate::catalog::Catalog;
use crate::error::MemrelError;

/// Resolves a plan's declared source names against the catalog: every table
/// it will read, deduplicated in first-seen order. Pure; the same plan
/// always yields the same set.
pub(crate) fn affected_tables(
    catalog: &Catalog,
    declared: &[String],
) -> Result<Vec<String>, MemrelError> {
    if declared.is_empty() {
        return Err(MemrelError::Validation(
            "plan declares no source tables".into(),
        ));
    }
    let mut out: Vec<String> = Vec::with_capacity(declared.len());
    for name in declared {
        catalog.table(name)?;
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    Ok(out)
}
