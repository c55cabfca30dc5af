use std::sync::Arc;

use datasec_core::now_rfc3339;
use datasec_sql::{Row, SQLError, SQLExecutor, SQLStore, Value};

use super::{col_i64, col_str};
use crate::model::{
    AssignSessionPropertyValue, SessionPropertyId, UserId, UserSessionPropertyValue,
};
use crate::store::{StoreError, UserValueStore};

const COLUMNS: &str = "id, user_id, session_property_id, value, created_at, updated_at";

pub struct SqlUserValueStore {
    db: Arc<dyn SQLStore>,
}

impl SqlUserValueStore {
    pub fn new(db: Arc<dyn SQLStore>) -> Self {
        Self { db }
    }
}

fn row_to_value(row: &Row) -> Result<UserSessionPropertyValue, StoreError> {
    Ok(UserSessionPropertyValue {
        id: col_i64(row, "id")?,
        user_id: col_i64(row, "user_id")?,
        session_property_id: col_i64(row, "session_property_id")?,
        value: col_str(row, "value")?,
        created_at: col_str(row, "created_at")?,
        updated_at: col_str(row, "updated_at")?,
    })
}

fn upsert_on<E: SQLExecutor + ?Sized>(
    db: &E,
    user_id: UserId,
    session_property_id: SessionPropertyId,
    value: &str,
) -> Result<UserSessionPropertyValue, StoreError> {
    let sql = format!(
        "INSERT INTO user_session_property_value \
            (user_id, session_property_id, value, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4) \
         ON CONFLICT(user_id, session_property_id) \
         DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at \
         RETURNING {}",
        COLUMNS
    );
    let rows = db
        .query(
            &sql,
            &[
                Value::Integer(user_id),
                Value::Integer(session_property_id),
                Value::from(value),
                Value::Text(now_rfc3339()),
            ],
        )
        .map_err(|e| match e {
            SQLError::ForeignKeyViolation(_) => StoreError::InvalidReference(format!(
                "session property {} does not exist",
                session_property_id
            )),
            other => other.into(),
        })?;
    let row = rows
        .first()
        .ok_or_else(|| StoreError::Internal("upsert returned no row".into()))?;
    row_to_value(row)
}

impl UserValueStore for SqlUserValueStore {
    fn upsert(
        &self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
        value: &str,
    ) -> Result<UserSessionPropertyValue, StoreError> {
        upsert_on(self.db.as_ref(), user_id, session_property_id, value)
    }

    fn upsert_many(
        &self,
        values: &[AssignSessionPropertyValue],
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError> {
        let tx = self.db.begin()?;
        let mut out = Vec::with_capacity(values.len());
        for v in values {
            // An early return drops `tx`, which rolls back.
            out.push(upsert_on(tx.as_ref(), v.user_id, v.session_property_id, &v.value)?);
        }
        tx.commit()?;
        Ok(out)
    }

    fn find_all_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError> {
        let sql = format!(
            "SELECT {} FROM user_session_property_value WHERE user_id = ?1 \
             ORDER BY session_property_id",
            COLUMNS
        );
        let rows = self.db.query(&sql, &[Value::Integer(user_id)])?;
        rows.iter().map(row_to_value).collect()
    }

    fn find_all_by_property(
        &self,
        session_property_id: SessionPropertyId,
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError> {
        let sql = format!(
            "SELECT {} FROM user_session_property_value WHERE session_property_id = ?1 \
             ORDER BY user_id",
            COLUMNS
        );
        let rows = self.db.query(&sql, &[Value::Integer(session_property_id)])?;
        rows.iter().map(row_to_value).collect()
    }

    fn delete_by_user_and_property(
        &self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
    ) -> Result<u64, StoreError> {
        Ok(self.db.exec(
            "DELETE FROM user_session_property_value \
             WHERE user_id = ?1 AND session_property_id = ?2",
            &[Value::Integer(user_id), Value::Integer(session_property_id)],
        )?)
    }
}
