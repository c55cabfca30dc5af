use std::sync::Arc;

use datasec_core::now_rfc3339;
use datasec_sql::{Row, SQLExecutor, SQLStore, SQLTransaction, Value};

use super::{col_i64, col_str, id_column};
use crate::model::{ModelId, PolicyId, ProjectId, RlsPolicy, SessionPropertyId};
use crate::store::{PolicyChanges, PolicyStore, PolicyTransaction, StoreError};

const COLUMNS: &str = "id, project_id, name, condition, version, created_at, updated_at";

/// Policies in `rls_policy`, joins in `rls_policy_model` and
/// `rls_policy_session_property`.
pub struct SqlPolicyStore {
    db: Arc<dyn SQLStore>,
}

impl SqlPolicyStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }
}

fn row_to_policy(row: &Row) -> Result<RlsPolicy, StoreError> {
    Ok(RlsPolicy {
        id: col_i64(row, "id")?,
        project_id: col_i64(row, "project_id")?,
        name: col_str(row, "name")?,
        condition: col_str(row, "condition")?,
        version: col_i64(row, "version")?,
        created_at: col_str(row, "created_at")?,
        updated_at: col_str(row, "updated_at")?,
    })
}

/// How one join relation is laid out.
struct JoinTable {
    table: &'static str,
    column: &'static str,
    /// Relation the joined id must exist in, within the policy's project.
    target: &'static str,
    /// Noun used in error messages.
    kind: &'static str,
}

const MODEL_JOIN: JoinTable = JoinTable {
    table: "rls_policy_model",
    column: "model_id",
    target: "model",
    kind: "model",
};

const PROPERTY_JOIN: JoinTable = JoinTable {
    table: "rls_policy_session_property",
    column: "session_property_id",
    target: "session_property",
    kind: "session property",
};

fn find_joined_ids<E: SQLExecutor + ?Sized>(
    db: &E,
    join: &JoinTable,
    policy_id: PolicyId,
) -> Result<Vec<i64>, StoreError> {
    let sql = format!(
        "SELECT {col} FROM {table} WHERE rls_policy_id = ?1",
        col = join.column,
        table = join.table,
    );
    let rows = db.query(&sql, &[Value::Integer(policy_id)])?;
    id_column(&rows, join.column)
}

/// Delete every join row of the policy, then insert one per id.
///
/// Each insert only succeeds when the target row exists in `project_id`,
/// so a foreign or missing id fails the whole replacement.
fn replace_joined_ids<E: SQLExecutor + ?Sized>(
    db: &E,
    join: &JoinTable,
    policy_id: PolicyId,
    project_id: ProjectId,
    ids: &[i64],
) -> Result<(), StoreError> {
    db.exec(
        &format!("DELETE FROM {} WHERE rls_policy_id = ?1", join.table),
        &[Value::Integer(policy_id)],
    )?;

    let insert = format!(
        "INSERT INTO {table} (rls_policy_id, {col}) \
         SELECT ?1, id FROM {target} WHERE id = ?2 AND project_id = ?3",
        table = join.table,
        col = join.column,
        target = join.target,
    );
    for &id in ids {
        let affected = db.exec(
            &insert,
            &[
                Value::Integer(policy_id),
                Value::Integer(id),
                Value::Integer(project_id),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::InvalidReference(format!(
                "{} {} not found in project {}",
                join.kind, id, project_id
            )));
        }
    }
    Ok(())
}

impl PolicyStore for SqlPolicyStore {
    fn find_by_id(&self, id: PolicyId) -> Result<Option<RlsPolicy>, StoreError> {
        let sql = format!("SELECT {} FROM rls_policy WHERE id = ?1", COLUMNS);
        let rows = self.db.query(&sql, &[Value::Integer(id)])?;
        rows.first().map(row_to_policy).transpose()
    }

    fn find_all_by_project(&self, project_id: ProjectId) -> Result<Vec<RlsPolicy>, StoreError> {
        let sql = format!(
            "SELECT {} FROM rls_policy WHERE project_id = ?1 ORDER BY created_at, id",
            COLUMNS
        );
        let rows = self.db.query(&sql, &[Value::Integer(project_id)])?;
        rows.iter().map(row_to_policy).collect()
    }

    fn find_all_by_model(
        &self,
        project_id: ProjectId,
        model_id: ModelId,
    ) -> Result<Vec<RlsPolicy>, StoreError> {
        let rows = self.db.query(
            "SELECT p.id AS id, p.project_id AS project_id, p.name AS name, \
                    p.condition AS condition, p.version AS version, \
                    p.created_at AS created_at, p.updated_at AS updated_at \
             FROM rls_policy p \
             JOIN rls_policy_model pm ON pm.rls_policy_id = p.id \
             WHERE pm.model_id = ?1 AND p.project_id = ?2 \
             ORDER BY p.created_at, p.id",
            &[Value::Integer(model_id), Value::Integer(project_id)],
        )?;
        rows.iter().map(row_to_policy).collect()
    }

    fn find_model_ids(&self, policy_id: PolicyId) -> Result<Vec<ModelId>, StoreError> {
        find_joined_ids(self.db.as_ref(), &MODEL_JOIN, policy_id)
    }

    fn find_session_property_ids(
        &self,
        policy_id: PolicyId,
    ) -> Result<Vec<SessionPropertyId>, StoreError> {
        find_joined_ids(self.db.as_ref(), &PROPERTY_JOIN, policy_id)
    }

    fn delete(&self, id: PolicyId, project_id: ProjectId) -> Result<u64, StoreError> {
        Ok(self.db.exec(
            "DELETE FROM rls_policy WHERE id = ?1 AND project_id = ?2",
            &[Value::Integer(id), Value::Integer(project_id)],
        )?)
    }

    fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError> {
        let tx = self.db.begin()?;
        Ok(Box::new(SqlPolicyTransaction { tx }))
    }
}

/// A policy write running inside one SQL transaction.
pub struct SqlPolicyTransaction<'a> {
    tx: Box<dyn SQLTransaction + 'a>,
}

impl PolicyTransaction for SqlPolicyTransaction<'_> {
    fn insert(
        &mut self,
        project_id: ProjectId,
        name: &str,
        condition: &str,
    ) -> Result<RlsPolicy, StoreError> {
        let sql = format!(
            "INSERT INTO rls_policy (project_id, name, condition, version, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 1, ?4, ?4) RETURNING {}",
            COLUMNS
        );
        let rows = self.tx.query(
            &sql,
            &[
                Value::Integer(project_id),
                Value::from(name),
                Value::from(condition),
                Value::Text(now_rfc3339()),
            ],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::Internal("insert returned no row".into()))?;
        row_to_policy(row)
    }

    fn update(
        &mut self,
        id: PolicyId,
        project_id: ProjectId,
        changes: &PolicyChanges<'_>,
    ) -> Result<u64, StoreError> {
        Ok(self.tx.exec(
            "UPDATE rls_policy SET \
                name = COALESCE(?1, name), \
                condition = COALESCE(?2, condition), \
                version = version + 1, \
                updated_at = ?3 \
             WHERE id = ?4 AND project_id = ?5 AND (?6 IS NULL OR version = ?6)",
            &[
                Value::from(changes.name),
                Value::from(changes.condition),
                Value::Text(now_rfc3339()),
                Value::Integer(id),
                Value::Integer(project_id),
                Value::from(changes.expected_version),
            ],
        )?)
    }

    fn set_model_ids(
        &mut self,
        policy_id: PolicyId,
        project_id: ProjectId,
        model_ids: &[ModelId],
    ) -> Result<(), StoreError> {
        replace_joined_ids(self.tx.as_ref(), &MODEL_JOIN, policy_id, project_id, model_ids)
    }

    fn set_session_property_ids(
        &mut self,
        policy_id: PolicyId,
        project_id: ProjectId,
        ids: &[SessionPropertyId],
    ) -> Result<(), StoreError> {
        replace_joined_ids(self.tx.as_ref(), &PROPERTY_JOIN, policy_id, project_id, ids)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit()?)
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.rollback()?)
    }
}
