use serde::{Deserialize, Serialize};

use super::{ModelId, ProjectId};

/// The slice of the data-model relation that policy joins reference.
///
/// Models are owned by the modeling layer; only what referential
/// integrity needs is kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: ModelId,
    pub project_id: ProjectId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewModel {
    pub name: String,
}
