//! SQL adapters over [`datasec_sql::SQLStore`].

mod catalog;
mod policy;
mod property;
mod value;

pub use catalog::SqlModelStore;
pub use policy::{SqlPolicyStore, SqlPolicyTransaction};
pub use property::SqlSessionPropertyStore;
pub use value::SqlUserValueStore;

use datasec_sql::Row;

use crate::store::StoreError;

fn col_i64(row: &Row, name: &str) -> Result<i64, StoreError> {
    row.get_i64(name)
        .ok_or_else(|| StoreError::Internal(format!("missing integer column {}", name)))
}

fn col_str(row: &Row, name: &str) -> Result<String, StoreError> {
    row.get_str(name)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Internal(format!("missing text column {}", name)))
}

fn col_opt_str(row: &Row, name: &str) -> Result<Option<String>, StoreError> {
    row.get_opt_str(name)
        .map(|v| v.map(str::to_string))
        .ok_or_else(|| StoreError::Internal(format!("missing column {}", name)))
}

fn col_bool(row: &Row, name: &str) -> Result<bool, StoreError> {
    row.get_bool(name)
        .ok_or_else(|| StoreError::Internal(format!("missing boolean column {}", name)))
}

/// Collect the single integer column of each row, sorted.
fn id_column(rows: &[Row], name: &str) -> Result<Vec<i64>, StoreError> {
    let mut ids = rows
        .iter()
        .map(|r| col_i64(r, name))
        .collect::<Result<Vec<_>, _>>()?;
    ids.sort_unstable();
    Ok(ids)
}
