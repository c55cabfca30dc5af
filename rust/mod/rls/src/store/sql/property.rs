use std::sync::Arc;

use datasec_core::now_rfc3339;
use datasec_sql::{Row, SQLExecutor, SQLStore, Value};

use super::{col_bool, col_i64, col_opt_str, col_str};
use crate::model::{
    NewSessionProperty, ProjectId, SessionProperty, SessionPropertyId, UpdateSessionProperty,
};
use crate::store::{SessionPropertyStore, StoreError};

const COLUMNS: &str =
    "id, project_id, name, type, required, default_expr, created_at, updated_at";

/// Session property definitions in the `session_property` table.
pub struct SqlSessionPropertyStore {
    db: Arc<dyn SQLStore>,
}

impl SqlSessionPropertyStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }
}

fn row_to_property(row: &Row) -> Result<SessionProperty, StoreError> {
    let type_str = col_str(row, "type")?;
    Ok(SessionProperty {
        id: col_i64(row, "id")?,
        project_id: col_i64(row, "project_id")?,
        name: col_str(row, "name")?,
        property_type: type_str.parse().map_err(StoreError::Internal)?,
        required: col_bool(row, "required")?,
        default_expr: col_opt_str(row, "default_expr")?,
        created_at: col_str(row, "created_at")?,
        updated_at: col_str(row, "updated_at")?,
    })
}

impl SessionPropertyStore for SqlSessionPropertyStore {
    fn insert(
        &self,
        project_id: ProjectId,
        input: &NewSessionProperty,
    ) -> Result<SessionProperty, StoreError> {
        let now = now_rfc3339();
        let sql = format!(
            "INSERT INTO session_property \
             (project_id, name, type, required, default_expr, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {}",
            COLUMNS
        );
        let rows = self.db.query(
            &sql,
            &[
                Value::Integer(project_id),
                Value::from(input.name.as_str()),
                Value::from(input.property_type.as_str()),
                Value::from(input.required),
                Value::from(input.default_expr.clone()),
                Value::Text(now),
            ],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::Internal("insert returned no row".into()))?;
        row_to_property(row)
    }

    fn update(
        &self,
        id: SessionPropertyId,
        project_id: ProjectId,
        patch: &UpdateSessionProperty,
    ) -> Result<Option<SessionProperty>, StoreError> {
        let mut sets = Vec::new();
        let mut params = Vec::new();

        if let Some(name) = &patch.name {
            params.push(Value::from(name.as_str()));
            sets.push(format!("name = ?{}", params.len()));
        }
        if let Some(t) = patch.property_type {
            params.push(Value::from(t.as_str()));
            sets.push(format!("type = ?{}", params.len()));
        }
        if let Some(required) = patch.required {
            params.push(Value::from(required));
            sets.push(format!("required = ?{}", params.len()));
        }
        if let Some(default_expr) = &patch.default_expr {
            params.push(Value::from(default_expr.clone()));
            sets.push(format!("default_expr = ?{}", params.len()));
        }
        params.push(Value::Text(now_rfc3339()));
        sets.push(format!("updated_at = ?{}", params.len()));

        params.push(Value::Integer(id));
        let id_idx = params.len();
        params.push(Value::Integer(project_id));
        let project_idx = params.len();

        let sql = format!(
            "UPDATE session_property SET {} WHERE id = ?{} AND project_id = ?{} RETURNING {}",
            sets.join(", "),
            id_idx,
            project_idx,
            COLUMNS,
        );
        let rows = self.db.query(&sql, &params)?;
        rows.first().map(row_to_property).transpose()
    }

    fn delete(&self, id: SessionPropertyId, project_id: ProjectId) -> Result<u64, StoreError> {
        Ok(self.db.exec(
            "DELETE FROM session_property WHERE id = ?1 AND project_id = ?2",
            &[Value::Integer(id), Value::Integer(project_id)],
        )?)
    }

    fn find_by_id(&self, id: SessionPropertyId) -> Result<Option<SessionProperty>, StoreError> {
        let sql = format!("SELECT {} FROM session_property WHERE id = ?1", COLUMNS);
        let rows = self.db.query(&sql, &[Value::Integer(id)])?;
        rows.first().map(row_to_property).transpose()
    }

    fn find_all_by_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<SessionProperty>, StoreError> {
        let sql = format!(
            "SELECT {} FROM session_property WHERE project_id = ?1 ORDER BY created_at, id",
            COLUMNS
        );
        let rows = self.db.query(&sql, &[Value::Integer(project_id)])?;
        rows.iter().map(row_to_property).collect()
    }
}
