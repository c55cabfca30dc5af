//! Project scoping for targeted reads and writes.
//!
//! Every operation that addresses a session property, policy or model by id
//! goes through [`scoped`]. A row that is missing and a row that belongs to
//! another project produce the same error, so callers cannot probe for ids
//! outside their own project.

use crate::model::{Model, ProjectId, RlsPolicy, SessionProperty};
use crate::service::RlsError;

/// A row owned by exactly one project.
pub trait ProjectScoped {
    /// Noun used in not-found messages.
    const KIND: &'static str;

    fn project_id(&self) -> ProjectId;
}

impl ProjectScoped for SessionProperty {
    const KIND: &'static str = "session property";

    fn project_id(&self) -> ProjectId {
        self.project_id
    }
}

impl ProjectScoped for RlsPolicy {
    const KIND: &'static str = "rls policy";

    fn project_id(&self) -> ProjectId {
        self.project_id
    }
}

impl ProjectScoped for Model {
    const KIND: &'static str = "model";

    fn project_id(&self) -> ProjectId {
        self.project_id
    }
}

pub fn not_found<T: ProjectScoped>(id: i64, project_id: ProjectId) -> RlsError {
    RlsError::NotFound(format!("{} {} not found in project {}", T::KIND, id, project_id))
}

/// Keep `row` only if it exists and belongs to `project_id`.
pub fn scoped<T: ProjectScoped>(
    row: Option<T>,
    id: i64,
    project_id: ProjectId,
) -> Result<T, RlsError> {
    match row {
        Some(row) if row.project_id() == project_id => Ok(row),
        _ => Err(not_found::<T>(id, project_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(project_id: ProjectId) -> Model {
        Model {
            id: 4,
            project_id,
            name: "orders".into(),
        }
    }

    #[test]
    fn test_foreign_and_missing_look_the_same() {
        assert_eq!(scoped(Some(model(1)), 4, 1).unwrap().id, 4);

        let foreign = scoped(Some(model(2)), 4, 1).unwrap_err().to_string();
        let missing = scoped::<Model>(None, 4, 1).unwrap_err().to_string();
        assert_eq!(foreign, missing);
        assert_eq!(missing, "not found: model 4 not found in project 1");
    }
}
