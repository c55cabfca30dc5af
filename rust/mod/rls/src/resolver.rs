//! Runtime resolution of session property values.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::model::{ProjectId, UserId};
use crate::service::RlsError;
use crate::store::{SessionPropertyStore, UserValueStore};

/// Computes the property bindings handed to the query engine.
pub struct PropertyValueResolver {
    properties: Arc<dyn SessionPropertyStore>,
    values: Arc<dyn UserValueStore>,
}

impl PropertyValueResolver {
    pub fn new(
        properties: Arc<dyn SessionPropertyStore>,
        values: Arc<dyn UserValueStore>,
    ) -> Self {
        Self { properties, values }
    }

    /// Map each property name of `project_id` to its effective value for
    /// `user_id`: the user's own value if assigned, else the property's
    /// default expression. A property with neither is left out.
    ///
    /// `required` is not checked here; only store failures are errors.
    pub fn resolve(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<BTreeMap<String, String>, RlsError> {
        let mut properties = self.properties.find_all_by_project(project_id)?;
        properties.sort_by_key(|p| p.id);

        let assigned: HashMap<_, _> = self
            .values
            .find_all_by_user(user_id)?
            .into_iter()
            .map(|v| (v.session_property_id, v.value))
            .collect();

        let mut resolved = BTreeMap::new();
        for property in properties {
            let value = assigned
                .get(&property.id)
                .cloned()
                .or(property.default_expr);
            if let Some(value) = value {
                resolved.insert(property.name, value);
            }
        }

        debug!(project_id, user_id, bound = resolved.len(), "session properties resolved");
        Ok(resolved)
    }
}
