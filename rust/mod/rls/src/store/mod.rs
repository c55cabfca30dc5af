//! Storage contracts for the RLS module.
//!
//! Each relation sits behind its own trait so the service and resolver can
//! run against either the SQL adapters in [`sql`] or the in-memory fake in
//! [`memory`].

pub mod memory;
pub mod schema;
pub mod sql;

use std::sync::Arc;

use thiserror::Error;

use datasec_sql::{SQLError, SQLStore};

use crate::config::RlsConfig;
use crate::model::{
    AssignSessionPropertyValue, Model, ModelId, NewSessionProperty, PolicyId, ProjectId,
    RlsPolicy, SessionProperty, SessionPropertyId, UpdateSessionProperty, UserId,
    UserSessionPropertyValue,
};

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist, or belongs to another project.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("storage: {0}")]
    Storage(#[source] SQLError),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<SQLError> for StoreError {
    fn from(e: SQLError) -> Self {
        match e {
            SQLError::UniqueViolation(m) => StoreError::Conflict(m),
            SQLError::ForeignKeyViolation(m) => StoreError::InvalidReference(m),
            other => StoreError::Storage(other),
        }
    }
}

/// Session property definitions.
pub trait SessionPropertyStore: Send + Sync {
    fn insert(
        &self,
        project_id: ProjectId,
        input: &NewSessionProperty,
    ) -> Result<SessionProperty, StoreError>;

    /// Apply the fields present in `patch` to the row matching both `id` and
    /// `project_id`. Returns `None` when no such row exists.
    fn update(
        &self,
        id: SessionPropertyId,
        project_id: ProjectId,
        patch: &UpdateSessionProperty,
    ) -> Result<Option<SessionProperty>, StoreError>;

    /// Delete the row matching both `id` and `project_id`; joins and user
    /// values referencing it go with it.
    fn delete(&self, id: SessionPropertyId, project_id: ProjectId) -> Result<u64, StoreError>;

    fn find_by_id(&self, id: SessionPropertyId) -> Result<Option<SessionProperty>, StoreError>;

    /// All properties of a project, oldest first.
    fn find_all_by_project(&self, project_id: ProjectId)
        -> Result<Vec<SessionProperty>, StoreError>;
}

/// RLS policy rows and their two join relations.
pub trait PolicyStore: Send + Sync {
    fn find_by_id(&self, id: PolicyId) -> Result<Option<RlsPolicy>, StoreError>;

    /// All policies of a project, oldest first.
    fn find_all_by_project(&self, project_id: ProjectId) -> Result<Vec<RlsPolicy>, StoreError>;

    /// Policies of a project joined to the given model.
    fn find_all_by_model(
        &self,
        project_id: ProjectId,
        model_id: ModelId,
    ) -> Result<Vec<RlsPolicy>, StoreError>;

    fn find_model_ids(&self, policy_id: PolicyId) -> Result<Vec<ModelId>, StoreError>;

    fn find_session_property_ids(
        &self,
        policy_id: PolicyId,
    ) -> Result<Vec<SessionPropertyId>, StoreError>;

    /// Delete the row matching both `id` and `project_id`. Join rows are
    /// removed by cascade.
    fn delete(&self, id: PolicyId, project_id: ProjectId) -> Result<u64, StoreError>;

    /// Open a write transaction over the policy relations.
    fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError>;
}

/// Scalar policy changes applied inside a [`PolicyTransaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyChanges<'a> {
    pub name: Option<&'a str>,
    pub condition: Option<&'a str>,
    pub expected_version: Option<i64>,
}

/// An open policy write. Nothing is visible to readers before `commit`;
/// dropping without `commit` discards every change.
pub trait PolicyTransaction {
    fn insert(
        &mut self,
        project_id: ProjectId,
        name: &str,
        condition: &str,
    ) -> Result<RlsPolicy, StoreError>;

    /// Write the present fields and bump the version. Returns the number of
    /// rows touched: zero when the row is gone or `expected_version` did
    /// not match.
    fn update(
        &mut self,
        id: PolicyId,
        project_id: ProjectId,
        changes: &PolicyChanges<'_>,
    ) -> Result<u64, StoreError>;

    /// Replace the policy's model joins with exactly `model_ids`.
    fn set_model_ids(
        &mut self,
        policy_id: PolicyId,
        project_id: ProjectId,
        model_ids: &[ModelId],
    ) -> Result<(), StoreError>;

    /// Replace the policy's session-property joins with exactly `ids`.
    fn set_session_property_ids(
        &mut self,
        policy_id: PolicyId,
        project_id: ProjectId,
        ids: &[SessionPropertyId],
    ) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Per-user assigned values. Keyed by user and property, not by project.
pub trait UserValueStore: Send + Sync {
    /// Insert or overwrite the value of a (user, property) pair.
    fn upsert(
        &self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
        value: &str,
    ) -> Result<UserSessionPropertyValue, StoreError>;

    /// Upsert a batch; either every assignment lands or none does.
    fn upsert_many(
        &self,
        values: &[AssignSessionPropertyValue],
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError>;

    fn find_all_by_user(&self, user_id: UserId)
        -> Result<Vec<UserSessionPropertyValue>, StoreError>;

    fn find_all_by_property(
        &self,
        session_property_id: SessionPropertyId,
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError>;

    fn delete_by_user_and_property(
        &self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
    ) -> Result<u64, StoreError>;
}

/// The model relation policy joins point at.
pub trait ModelStore: Send + Sync {
    fn insert(&self, project_id: ProjectId, name: &str) -> Result<Model, StoreError>;

    /// Delete the row matching both `id` and `project_id`; policy joins
    /// referencing it go with it.
    fn delete(&self, id: ModelId, project_id: ProjectId) -> Result<u64, StoreError>;

    fn find_all_by_project(&self, project_id: ProjectId) -> Result<Vec<Model>, StoreError>;
}

/// One instance of every store, shared by the service and the resolver.
#[derive(Clone)]
pub struct Stores {
    pub properties: Arc<dyn SessionPropertyStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub values: Arc<dyn UserValueStore>,
    pub models: Arc<dyn ModelStore>,
}

impl Stores {
    /// SQL-backed stores. Initializes the schema first.
    pub fn sql(db: Arc<dyn SQLStore>, config: &RlsConfig) -> Result<Self, StoreError> {
        schema::init_schema(db.as_ref(), config)?;
        Ok(Self {
            properties: Arc::new(sql::SqlSessionPropertyStore::new(db.clone())),
            policies: Arc::new(sql::SqlPolicyStore::new(db.clone())),
            values: Arc::new(sql::SqlUserValueStore::new(db.clone())),
            models: Arc::new(sql::SqlModelStore::new(db)),
        })
    }

    /// All four stores over one shared in-memory state.
    pub fn memory(config: &RlsConfig) -> Self {
        let store = Arc::new(memory::MemoryStore::new(config));
        Self {
            properties: store.clone(),
            policies: store.clone(),
            values: store.clone(),
            models: store,
        }
    }
}
