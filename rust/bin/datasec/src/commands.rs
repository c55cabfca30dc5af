//! Glue between parsed arguments and the RLS service.

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use datasec_core::ServiceError;
use rls::model::{AssignSessionPropertyValue, ProjectId};
use rls::service::{RlsError, RlsService};

/// Serialize a service result, turning service errors into [`ServiceError`].
pub fn json<T: Serialize>(result: Result<T, RlsError>) -> anyhow::Result<serde_json::Value> {
    let value = result.map_err(ServiceError::from)?;
    Ok(serde_json::to_value(value)?)
}

pub fn deleted(result: Result<(), RlsError>, id: i64) -> anyhow::Result<serde_json::Value> {
    result.map_err(ServiceError::from)?;
    Ok(serde_json::json!({ "deleted": id }))
}

/// Parse a `--json` body.
pub fn parse<T: DeserializeOwned>(body: &str) -> anyhow::Result<T> {
    serde_json::from_str(body).context("invalid --json body")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Assignments {
    One(AssignSessionPropertyValue),
    Many(Vec<AssignSessionPropertyValue>),
}

/// A single object goes through `assign_value`, an array through the
/// all-or-nothing `assign_values`.
pub fn assign(svc: &RlsService, project_id: ProjectId, body: &str) -> anyhow::Result<serde_json::Value> {
    match parse::<Assignments>(body)? {
        Assignments::One(input) => json(svc.assign_value(project_id, input)),
        Assignments::Many(inputs) => json(svc.assign_values(project_id, inputs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rls::config::RlsConfig;
    use rls::model::NewSessionProperty;
    use rls::RlsModule;

    #[test]
    fn test_assign_accepts_object_or_array() {
        let module = RlsModule::in_memory(RlsConfig::default());
        let svc = module.service();
        let p = svc
            .create_session_property(1, NewSessionProperty::named("region"))
            .unwrap()
            .id;

        let one = format!(r#"{{"userId": 1, "sessionPropertyId": {}, "value": "'us'"}}"#, p);
        let out = assign(&svc, 1, &one).unwrap();
        assert_eq!(out["value"], "'us'");

        let many = format!(
            r#"[{{"userId": 2, "sessionPropertyId": {p}, "value": "a"}},
                {{"userId": 3, "sessionPropertyId": {p}, "value": "b"}}]"#,
            p = p
        );
        let out = assign(&svc, 1, &many).unwrap();
        assert_eq!(out.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_errors_carry_service_codes() {
        let module = RlsModule::in_memory(RlsConfig::default());
        let svc = module.service();

        let err = json(svc.get_policy(1, 99)).unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert_eq!(service.error_code(), "NOT_FOUND");
        assert_eq!(
            service.to_json()["message"],
            "rls policy 99 not found in project 1"
        );

        assert!(parse::<NewSessionProperty>("{").is_err());
    }
}
