use tracing::info;

use crate::model::{Model, ModelId, NewModel, ProjectId};
use crate::service::guard::not_found;
use crate::service::{validate, RlsError, RlsService};

impl RlsService {
    /// Record a model so policies of this project can reference it.
    pub fn register_model(&self, project_id: ProjectId, input: NewModel) -> Result<Model, RlsError> {
        validate::non_empty("model name", &input.name)?;
        let model = self.stores.models.insert(project_id, &input.name)?;
        info!(project_id, id = model.id, name = %model.name, "model registered");
        Ok(model)
    }

    /// Remove a model; policy joins pointing at it are dropped.
    pub fn delete_model(&self, project_id: ProjectId, id: ModelId) -> Result<(), RlsError> {
        if self.stores.models.delete(id, project_id)? == 0 {
            return Err(not_found::<Model>(id, project_id));
        }
        info!(project_id, id, "model deleted");
        Ok(())
    }

    pub fn list_models(&self, project_id: ProjectId) -> Result<Vec<Model>, RlsError> {
        Ok(self.stores.models.find_all_by_project(project_id)?)
    }
}
