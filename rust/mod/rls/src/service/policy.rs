use tracing::info;

use crate::model::{
    CreateRlsPolicy, ModelId, PolicyId, ProjectId, RlsPolicy, RlsPolicyDetail, UpdateRlsPolicy,
};
use crate::service::guard::{not_found, scoped};
use crate::service::{validate, RlsError, RlsService};
use crate::store::PolicyChanges;

impl RlsService {
    pub fn list_policies(&self, project_id: ProjectId) -> Result<Vec<RlsPolicyDetail>, RlsError> {
        self.stores
            .policies
            .find_all_by_project(project_id)?
            .into_iter()
            .map(|p| self.enrich(p))
            .collect()
    }

    pub fn get_policy(
        &self,
        project_id: ProjectId,
        id: PolicyId,
    ) -> Result<RlsPolicyDetail, RlsError> {
        let policy = scoped(self.stores.policies.find_by_id(id)?, id, project_id)?;
        self.enrich(policy)
    }

    /// Policies of a project that apply to `model_id`.
    pub fn list_policies_for_model(
        &self,
        project_id: ProjectId,
        model_id: ModelId,
    ) -> Result<Vec<RlsPolicyDetail>, RlsError> {
        self.stores
            .policies
            .find_all_by_model(project_id, model_id)?
            .into_iter()
            .map(|p| self.enrich(p))
            .collect()
    }

    /// Create a policy together with both of its join sets, in one
    /// transaction.
    pub fn create_policy(
        &self,
        project_id: ProjectId,
        input: CreateRlsPolicy,
    ) -> Result<RlsPolicyDetail, RlsError> {
        validate::non_empty("policy name", &input.name)?;
        validate::non_empty("policy condition", &input.condition)?;
        let model_ids = validate::id_set(&input.model_ids);
        let property_ids = validate::id_set(&input.session_property_ids);

        let policy = self.in_transaction(|tx| {
            let policy = tx.insert(project_id, &input.name, &input.condition)?;
            tx.set_model_ids(policy.id, project_id, &model_ids)?;
            tx.set_session_property_ids(policy.id, project_id, &property_ids)?;
            Ok(policy)
        })?;

        info!(
            project_id,
            id = policy.id,
            models = model_ids.len(),
            properties = property_ids.len(),
            "rls policy created"
        );
        Ok(RlsPolicyDetail {
            policy,
            model_ids,
            session_property_ids: property_ids,
        })
    }

    /// Update the scalar fields present in `patch`, and replace each join
    /// set the caller supplied. A join set left out of `patch` is untouched.
    ///
    /// With `expected_version` set, the update only applies if the stored
    /// version still matches; otherwise it fails with `Conflict`.
    pub fn update_policy(
        &self,
        project_id: ProjectId,
        id: PolicyId,
        patch: UpdateRlsPolicy,
    ) -> Result<RlsPolicyDetail, RlsError> {
        if let Some(name) = &patch.name {
            validate::non_empty("policy name", name)?;
        }
        if let Some(condition) = &patch.condition {
            validate::non_empty("policy condition", condition)?;
        }
        scoped(self.stores.policies.find_by_id(id)?, id, project_id)?;

        let model_ids = patch.model_ids.as_deref().map(validate::id_set);
        let property_ids = patch.session_property_ids.as_deref().map(validate::id_set);
        let changes = PolicyChanges {
            name: patch.name.as_deref(),
            condition: patch.condition.as_deref(),
            expected_version: patch.expected_version,
        };

        self.in_transaction(|tx| {
            if tx.update(id, project_id, &changes)? == 0 {
                return Err(match changes.expected_version {
                    Some(v) => RlsError::Conflict(format!(
                        "rls policy {} is no longer at version {}",
                        id, v
                    )),
                    None => not_found::<RlsPolicy>(id, project_id),
                });
            }
            if let Some(ids) = &model_ids {
                tx.set_model_ids(id, project_id, ids)?;
            }
            if let Some(ids) = &property_ids {
                tx.set_session_property_ids(id, project_id, ids)?;
            }
            Ok(())
        })?;

        info!(project_id, id, "rls policy updated");
        self.get_policy(project_id, id)
    }

    /// Delete a policy. Both join sets go with it; models and properties
    /// stay.
    pub fn delete_policy(&self, project_id: ProjectId, id: PolicyId) -> Result<(), RlsError> {
        scoped(self.stores.policies.find_by_id(id)?, id, project_id)?;
        if self.stores.policies.delete(id, project_id)? == 0 {
            return Err(not_found::<RlsPolicy>(id, project_id));
        }
        info!(project_id, id, "rls policy deleted");
        Ok(())
    }

    fn enrich(&self, policy: RlsPolicy) -> Result<RlsPolicyDetail, RlsError> {
        let model_ids = self.stores.policies.find_model_ids(policy.id)?;
        let session_property_ids = self.stores.policies.find_session_property_ids(policy.id)?;
        Ok(RlsPolicyDetail {
            policy,
            model_ids,
            session_property_ids,
        })
    }
}
