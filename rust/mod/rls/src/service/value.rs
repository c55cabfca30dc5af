use std::collections::BTreeSet;

use tracing::info;

use crate::model::{
    AssignSessionPropertyValue, ProjectId, SessionPropertyId, UserId, UserSessionPropertyValue,
};
use crate::service::{RlsError, RlsService};

impl RlsService {
    /// Every value assigned to a user, across projects.
    pub fn list_user_values(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSessionPropertyValue>, RlsError> {
        Ok(self.stores.values.find_all_by_user(user_id)?)
    }

    pub fn list_values_for_property(
        &self,
        project_id: ProjectId,
        session_property_id: SessionPropertyId,
    ) -> Result<Vec<UserSessionPropertyValue>, RlsError> {
        self.get_session_property(project_id, session_property_id)?;
        Ok(self.stores.values.find_all_by_property(session_property_id)?)
    }

    /// Set a user's value for a property of this project, replacing any
    /// earlier value.
    pub fn assign_value(
        &self,
        project_id: ProjectId,
        input: AssignSessionPropertyValue,
    ) -> Result<UserSessionPropertyValue, RlsError> {
        self.get_session_property(project_id, input.session_property_id)?;
        let value = self.stores.values.upsert(
            input.user_id,
            input.session_property_id,
            &input.value,
        )?;
        info!(
            project_id,
            user_id = value.user_id,
            session_property_id = value.session_property_id,
            "session property value assigned"
        );
        Ok(value)
    }

    /// Assign a batch of values. Either all of them land or none do.
    pub fn assign_values(
        &self,
        project_id: ProjectId,
        inputs: Vec<AssignSessionPropertyValue>,
    ) -> Result<Vec<UserSessionPropertyValue>, RlsError> {
        let property_ids: BTreeSet<_> = inputs.iter().map(|v| v.session_property_id).collect();
        for id in property_ids {
            self.get_session_property(project_id, id)?;
        }
        let values = self.stores.values.upsert_many(&inputs)?;
        info!(project_id, count = values.len(), "session property values assigned");
        Ok(values)
    }

    pub fn unassign_value(
        &self,
        project_id: ProjectId,
        user_id: UserId,
        session_property_id: SessionPropertyId,
    ) -> Result<(), RlsError> {
        self.get_session_property(project_id, session_property_id)?;
        let removed = self
            .stores
            .values
            .delete_by_user_and_property(user_id, session_property_id)?;
        if removed == 0 {
            return Err(RlsError::NotFound(format!(
                "no value for user {} and session property {}",
                user_id, session_property_id
            )));
        }
        info!(project_id, user_id, session_property_id, "session property value removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::AssignSessionPropertyValue;
    use crate::service::testing::{add_property, backends};
    use crate::service::RlsError;

    fn assign(user_id: i64, session_property_id: i64, value: &str) -> AssignSessionPropertyValue {
        AssignSessionPropertyValue {
            user_id,
            session_property_id,
            value: value.into(),
        }
    }

    #[test]
    fn test_assign_is_idempotent() {
        for (backend, svc) in backends() {
            let p = add_property(&svc, 1, "region");
            svc.assign_value(1, assign(7, p, "'eu-west'")).unwrap();
            svc.assign_value(1, assign(7, p, "'eu-west'")).unwrap();

            let values = svc.list_user_values(7).unwrap();
            assert_eq!(values.len(), 1, "{}", backend);
            assert_eq!(values[0].value, "'eu-west'");
            assert_eq!(svc.list_values_for_property(1, p).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_foreign_property_rejected() {
        for (backend, svc) in backends() {
            let p = add_property(&svc, 2, "region");
            let err = svc.assign_value(1, assign(7, p, "x")).unwrap_err();
            assert!(matches!(err, RlsError::NotFound(_)), "{}", backend);
            assert!(matches!(
                svc.list_values_for_property(1, p),
                Err(RlsError::NotFound(_))
            ));
            assert!(svc.list_user_values(7).unwrap().is_empty());
        }
    }

    #[test]
    fn test_batch_and_unassign() {
        for (backend, svc) in backends() {
            let a = add_property(&svc, 1, "org_id");
            let b = add_property(&svc, 1, "region");
            let values = svc
                .assign_values(1, vec![assign(7, a, "42"), assign(7, b, "'us'"), assign(8, a, "1")])
                .unwrap();
            assert_eq!(values.len(), 3, "{}", backend);

            let foreign = add_property(&svc, 2, "other");
            assert!(svc
                .assign_values(1, vec![assign(9, a, "x"), assign(9, foreign, "y")])
                .is_err());
            assert!(svc.list_user_values(9).unwrap().is_empty());

            svc.unassign_value(1, 7, a).unwrap();
            assert!(matches!(
                svc.unassign_value(1, 7, a),
                Err(RlsError::NotFound(_))
            ));
            assert_eq!(svc.list_user_values(7).unwrap().len(), 1);
        }
    }
}
