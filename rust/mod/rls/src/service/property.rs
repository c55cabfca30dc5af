use tracing::info;

use crate::model::{
    NewSessionProperty, ProjectId, SessionProperty, SessionPropertyId, UpdateSessionProperty,
};
use crate::service::guard::{not_found, scoped};
use crate::service::{validate, RlsError, RlsService};

impl RlsService {
    /// All session properties of a project, oldest first.
    pub fn list_session_properties(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<SessionProperty>, RlsError> {
        Ok(self.stores.properties.find_all_by_project(project_id)?)
    }

    pub fn get_session_property(
        &self,
        project_id: ProjectId,
        id: SessionPropertyId,
    ) -> Result<SessionProperty, RlsError> {
        scoped(self.stores.properties.find_by_id(id)?, id, project_id)
    }

    pub fn create_session_property(
        &self,
        project_id: ProjectId,
        input: NewSessionProperty,
    ) -> Result<SessionProperty, RlsError> {
        validate::property_name(&input.name)?;
        self.check_name_free(project_id, &input.name, None)?;

        let property = self.stores.properties.insert(project_id, &input)?;
        info!(
            project_id,
            id = property.id,
            name = %property.name,
            "session property created"
        );
        Ok(property)
    }

    /// Apply the fields present in `patch`; everything else stays as stored.
    pub fn update_session_property(
        &self,
        project_id: ProjectId,
        id: SessionPropertyId,
        patch: UpdateSessionProperty,
    ) -> Result<SessionProperty, RlsError> {
        if let Some(name) = &patch.name {
            validate::property_name(name)?;
        }
        let current = self.get_session_property(project_id, id)?;
        if patch.is_empty() {
            return Ok(current);
        }
        if let Some(name) = &patch.name {
            if *name != current.name {
                self.check_name_free(project_id, name, Some(id))?;
            }
        }

        let updated = self
            .stores
            .properties
            .update(id, project_id, &patch)?
            .ok_or_else(|| not_found::<SessionProperty>(id, project_id))?;
        info!(project_id, id, "session property updated");
        Ok(updated)
    }

    /// Delete a property. Its policy joins and user values go with it.
    pub fn delete_session_property(
        &self,
        project_id: ProjectId,
        id: SessionPropertyId,
    ) -> Result<(), RlsError> {
        self.get_session_property(project_id, id)?;
        if self.stores.properties.delete(id, project_id)? == 0 {
            return Err(not_found::<SessionProperty>(id, project_id));
        }
        info!(project_id, id, "session property deleted");
        Ok(())
    }

    fn check_name_free(
        &self,
        project_id: ProjectId,
        name: &str,
        except: Option<SessionPropertyId>,
    ) -> Result<(), RlsError> {
        if !self.config.unique_property_names {
            return Ok(());
        }
        let taken = self
            .stores
            .properties
            .find_all_by_project(project_id)?
            .iter()
            .any(|p| p.name == name && Some(p.id) != except);
        if taken {
            return Err(RlsError::Conflict(format!(
                "session property '{}' already exists in project {}",
                name, project_id
            )));
        }
        Ok(())
    }
}
