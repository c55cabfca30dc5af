//! In-memory implementation of every store trait.
//!
//! All four relations live in one [`MemoryState`] behind a single mutex, so
//! cascades and cross-relation checks see a consistent picture. A policy
//! transaction holds the lock for its whole lifetime and restores a snapshot
//! unless it commits.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use datasec_core::now_rfc3339;

use crate::config::RlsConfig;
use crate::model::{
    AssignSessionPropertyValue, Model, ModelId, NewSessionProperty, PolicyId, ProjectId,
    RlsPolicy, SessionProperty, SessionPropertyId, UpdateSessionProperty, UserId,
    UserSessionPropertyValue,
};
use crate::store::{
    ModelStore, PolicyChanges, PolicyStore, PolicyTransaction, SessionPropertyStore, StoreError,
    UserValueStore,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    models: BTreeMap<ModelId, Model>,
    properties: BTreeMap<SessionPropertyId, SessionProperty>,
    policies: BTreeMap<PolicyId, RlsPolicy>,
    policy_models: BTreeSet<(PolicyId, ModelId)>,
    policy_properties: BTreeSet<(PolicyId, SessionPropertyId)>,
    values: BTreeMap<(UserId, SessionPropertyId), UserSessionPropertyValue>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn name_taken(&self, project_id: ProjectId, name: &str, except: Option<SessionPropertyId>) -> bool {
        self.properties
            .values()
            .any(|p| p.project_id == project_id && p.name == name && Some(p.id) != except)
    }

    fn upsert_value(
        &mut self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
        value: &str,
    ) -> UserSessionPropertyValue {
        let now = now_rfc3339();
        if let Some(existing) = self.values.get_mut(&(user_id, session_property_id)) {
            existing.value = value.to_string();
            existing.updated_at = now;
            return existing.clone();
        }
        let row = UserSessionPropertyValue {
            id: self.next_id(),
            user_id,
            session_property_id,
            value: value.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.values.insert((user_id, session_property_id), row.clone());
        row
    }
}

fn missing_property(id: SessionPropertyId) -> StoreError {
    StoreError::InvalidReference(format!("session property {} does not exist", id))
}

/// Every store trait over one shared in-memory state.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unique_property_names: bool,
}

impl MemoryStore {
    pub fn new(config: &RlsConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            unique_property_names: config.unique_property_names,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Internal(format!("memory store lock poisoned: {}", e)))
    }

    fn check_name(
        &self,
        state: &MemoryState,
        project_id: ProjectId,
        name: &str,
        except: Option<SessionPropertyId>,
    ) -> Result<(), StoreError> {
        if self.unique_property_names && state.name_taken(project_id, name, except) {
            return Err(StoreError::Conflict(format!(
                "session property {} already exists in project {}",
                name, project_id
            )));
        }
        Ok(())
    }
}

impl SessionPropertyStore for MemoryStore {
    fn insert(
        &self,
        project_id: ProjectId,
        input: &NewSessionProperty,
    ) -> Result<SessionProperty, StoreError> {
        let mut state = self.lock()?;
        self.check_name(&state, project_id, &input.name, None)?;

        let now = now_rfc3339();
        let property = SessionProperty {
            id: state.next_id(),
            project_id,
            name: input.name.clone(),
            property_type: input.property_type,
            required: input.required,
            default_expr: input.default_expr.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        state.properties.insert(property.id, property.clone());
        Ok(property)
    }

    fn update(
        &self,
        id: SessionPropertyId,
        project_id: ProjectId,
        patch: &UpdateSessionProperty,
    ) -> Result<Option<SessionProperty>, StoreError> {
        let mut state = self.lock()?;
        match state.properties.get(&id) {
            Some(p) if p.project_id == project_id => {}
            _ => return Ok(None),
        }
        if let Some(name) = &patch.name {
            self.check_name(&state, project_id, name, Some(id))?;
        }

        let Some(property) = state.properties.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            property.name = name.clone();
        }
        if let Some(t) = patch.property_type {
            property.property_type = t;
        }
        if let Some(required) = patch.required {
            property.required = required;
        }
        if let Some(default_expr) = &patch.default_expr {
            property.default_expr = default_expr.clone();
        }
        property.updated_at = now_rfc3339();
        Ok(Some(property.clone()))
    }

    fn delete(&self, id: SessionPropertyId, project_id: ProjectId) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        match state.properties.get(&id) {
            Some(p) if p.project_id == project_id => {}
            _ => return Ok(0),
        }
        state.properties.remove(&id);
        state.policy_properties.retain(|&(_, prop)| prop != id);
        state.values.retain(|&(_, prop), _| prop != id);
        Ok(1)
    }

    fn find_by_id(&self, id: SessionPropertyId) -> Result<Option<SessionProperty>, StoreError> {
        Ok(self.lock()?.properties.get(&id).cloned())
    }

    fn find_all_by_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<SessionProperty>, StoreError> {
        Ok(self
            .lock()?
            .properties
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect())
    }
}

impl PolicyStore for MemoryStore {
    fn find_by_id(&self, id: PolicyId) -> Result<Option<RlsPolicy>, StoreError> {
        Ok(self.lock()?.policies.get(&id).cloned())
    }

    fn find_all_by_project(&self, project_id: ProjectId) -> Result<Vec<RlsPolicy>, StoreError> {
        Ok(self
            .lock()?
            .policies
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect())
    }

    fn find_all_by_model(
        &self,
        project_id: ProjectId,
        model_id: ModelId,
    ) -> Result<Vec<RlsPolicy>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .policies
            .values()
            .filter(|p| p.project_id == project_id)
            .filter(|p| state.policy_models.contains(&(p.id, model_id)))
            .cloned()
            .collect())
    }

    fn find_model_ids(&self, policy_id: PolicyId) -> Result<Vec<ModelId>, StoreError> {
        Ok(self
            .lock()?
            .policy_models
            .range((policy_id, ModelId::MIN)..=(policy_id, ModelId::MAX))
            .map(|&(_, m)| m)
            .collect())
    }

    fn find_session_property_ids(
        &self,
        policy_id: PolicyId,
    ) -> Result<Vec<SessionPropertyId>, StoreError> {
        Ok(self
            .lock()?
            .policy_properties
            .range((policy_id, SessionPropertyId::MIN)..=(policy_id, SessionPropertyId::MAX))
            .map(|&(_, p)| p)
            .collect())
    }

    fn delete(&self, id: PolicyId, project_id: ProjectId) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        match state.policies.get(&id) {
            Some(p) if p.project_id == project_id => {}
            _ => return Ok(0),
        }
        state.policies.remove(&id);
        state.policy_models.retain(|&(policy, _)| policy != id);
        state.policy_properties.retain(|&(policy, _)| policy != id);
        Ok(1)
    }

    fn begin(&self) -> Result<Box<dyn PolicyTransaction + '_>, StoreError> {
        let state = self.lock()?;
        let snapshot = Some(state.clone());
        Ok(Box::new(MemoryPolicyTransaction { state, snapshot }))
    }
}

/// Holds the state lock; restores `snapshot` unless committed.
struct MemoryPolicyTransaction<'a> {
    state: MutexGuard<'a, MemoryState>,
    snapshot: Option<MemoryState>,
}

impl MemoryPolicyTransaction<'_> {
    fn check_policy(&self, policy_id: PolicyId) -> Result<(), StoreError> {
        if self.state.policies.contains_key(&policy_id) {
            Ok(())
        } else {
            Err(StoreError::InvalidReference(format!(
                "rls policy {} does not exist",
                policy_id
            )))
        }
    }
}

impl PolicyTransaction for MemoryPolicyTransaction<'_> {
    fn insert(
        &mut self,
        project_id: ProjectId,
        name: &str,
        condition: &str,
    ) -> Result<RlsPolicy, StoreError> {
        let now = now_rfc3339();
        let policy = RlsPolicy {
            id: self.state.next_id(),
            project_id,
            name: name.to_string(),
            condition: condition.to_string(),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        };
        self.state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    fn update(
        &mut self,
        id: PolicyId,
        project_id: ProjectId,
        changes: &PolicyChanges<'_>,
    ) -> Result<u64, StoreError> {
        let Some(policy) = self.state.policies.get_mut(&id) else {
            return Ok(0);
        };
        if policy.project_id != project_id {
            return Ok(0);
        }
        if changes.expected_version.is_some_and(|v| v != policy.version) {
            return Ok(0);
        }
        if let Some(name) = changes.name {
            policy.name = name.to_string();
        }
        if let Some(condition) = changes.condition {
            policy.condition = condition.to_string();
        }
        policy.version += 1;
        policy.updated_at = now_rfc3339();
        Ok(1)
    }

    fn set_model_ids(
        &mut self,
        policy_id: PolicyId,
        project_id: ProjectId,
        model_ids: &[ModelId],
    ) -> Result<(), StoreError> {
        self.check_policy(policy_id)?;
        let state = &mut *self.state;
        state.policy_models.retain(|&(policy, _)| policy != policy_id);
        for &id in model_ids {
            match state.models.get(&id) {
                Some(m) if m.project_id == project_id => {
                    state.policy_models.insert((policy_id, id));
                }
                _ => {
                    return Err(StoreError::InvalidReference(format!(
                        "model {} not found in project {}",
                        id, project_id
                    )))
                }
            }
        }
        Ok(())
    }

    fn set_session_property_ids(
        &mut self,
        policy_id: PolicyId,
        project_id: ProjectId,
        ids: &[SessionPropertyId],
    ) -> Result<(), StoreError> {
        self.check_policy(policy_id)?;
        let state = &mut *self.state;
        state.policy_properties.retain(|&(policy, _)| policy != policy_id);
        for &id in ids {
            match state.properties.get(&id) {
                Some(p) if p.project_id == project_id => {
                    state.policy_properties.insert((policy_id, id));
                }
                _ => {
                    return Err(StoreError::InvalidReference(format!(
                        "session property {} not found in project {}",
                        id, project_id
                    )))
                }
            }
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.snapshot = None;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Drop restores the snapshot.
        Ok(())
    }
}

impl Drop for MemoryPolicyTransaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

impl UserValueStore for MemoryStore {
    fn upsert(
        &self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
        value: &str,
    ) -> Result<UserSessionPropertyValue, StoreError> {
        let mut state = self.lock()?;
        if !state.properties.contains_key(&session_property_id) {
            return Err(missing_property(session_property_id));
        }
        Ok(state.upsert_value(user_id, session_property_id, value))
    }

    fn upsert_many(
        &self,
        values: &[AssignSessionPropertyValue],
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError> {
        let mut state = self.lock()?;
        if let Some(bad) = values
            .iter()
            .find(|v| !state.properties.contains_key(&v.session_property_id))
        {
            return Err(missing_property(bad.session_property_id));
        }
        Ok(values
            .iter()
            .map(|v| state.upsert_value(v.user_id, v.session_property_id, &v.value))
            .collect())
    }

    fn find_all_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError> {
        Ok(self
            .lock()?
            .values
            .range((user_id, SessionPropertyId::MIN)..=(user_id, SessionPropertyId::MAX))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn find_all_by_property(
        &self,
        session_property_id: SessionPropertyId,
    ) -> Result<Vec<UserSessionPropertyValue>, StoreError> {
        Ok(self
            .lock()?
            .values
            .values()
            .filter(|v| v.session_property_id == session_property_id)
            .cloned()
            .collect())
    }

    fn delete_by_user_and_property(
        &self,
        user_id: UserId,
        session_property_id: SessionPropertyId,
    ) -> Result<u64, StoreError> {
        let removed = self
            .lock()?
            .values
            .remove(&(user_id, session_property_id));
        Ok(removed.map_or(0, |_| 1))
    }
}

impl ModelStore for MemoryStore {
    fn insert(&self, project_id: ProjectId, name: &str) -> Result<Model, StoreError> {
        let mut state = self.lock()?;
        let model = Model {
            id: state.next_id(),
            project_id,
            name: name.to_string(),
        };
        state.models.insert(model.id, model.clone());
        Ok(model)
    }

    fn delete(&self, id: ModelId, project_id: ProjectId) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        match state.models.get(&id) {
            Some(m) if m.project_id == project_id => {}
            _ => return Ok(0),
        }
        state.models.remove(&id);
        state.policy_models.retain(|&(_, model)| model != id);
        Ok(1)
    }

    fn find_all_by_project(&self, project_id: ProjectId) -> Result<Vec<Model>, StoreError> {
        Ok(self
            .lock()?
            .models
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }
}
