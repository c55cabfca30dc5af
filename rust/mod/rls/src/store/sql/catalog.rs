use std::sync::Arc;

use datasec_core::now_rfc3339;
use datasec_sql::{Row, SQLExecutor, SQLStore, Value};

use super::{col_i64, col_str};
use crate::model::{Model, ModelId, ProjectId};
use crate::store::{ModelStore, StoreError};

pub struct SqlModelStore {
    db: Arc<dyn SQLStore>,
}

impl SqlModelStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }
}

fn row_to_model(row: &Row) -> Result<Model, StoreError> {
    Ok(Model {
        id: col_i64(row, "id")?,
        project_id: col_i64(row, "project_id")?,
        name: col_str(row, "name")?,
    })
}

impl ModelStore for SqlModelStore {
    fn insert(&self, project_id: ProjectId, name: &str) -> Result<Model, StoreError> {
        let rows = self.db.query(
            "INSERT INTO model (project_id, name, created_at) VALUES (?1, ?2, ?3) \
             RETURNING id, project_id, name",
            &[
                Value::Integer(project_id),
                Value::from(name),
                Value::Text(now_rfc3339()),
            ],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::Internal("insert returned no row".into()))?;
        row_to_model(row)
    }

    fn delete(&self, id: ModelId, project_id: ProjectId) -> Result<u64, StoreError> {
        Ok(self.db.exec(
            "DELETE FROM model WHERE id = ?1 AND project_id = ?2",
            &[Value::Integer(id), Value::Integer(project_id)],
        )?)
    }

    fn find_all_by_project(&self, project_id: ProjectId) -> Result<Vec<Model>, StoreError> {
        let rows = self.db.query(
            "SELECT id, project_id, name FROM model WHERE project_id = ?1 ORDER BY id",
            &[Value::Integer(project_id)],
        )?;
        rows.iter().map(row_to_model).collect()
    }
}
