//! Input checks shared by the service operations.

use std::collections::BTreeSet;

use crate::service::RlsError;

/// Session property names are referenced from policy conditions, so they
/// must look like identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn property_name(name: &str) -> Result<(), RlsError> {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(RlsError::Validation(format!(
            "session property name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
            name
        )))
    }
}

pub fn non_empty(field: &str, value: &str) -> Result<(), RlsError> {
    if value.trim().is_empty() {
        return Err(RlsError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Sorted, duplicate-free copy of an id list.
pub fn id_set(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}
