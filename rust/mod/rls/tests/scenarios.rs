//! End-to-end behavior of the RLS module over a SQLite file.

use std::sync::Arc;

use datasec_sql::{SQLStore, SqliteStore};
use rls::config::RlsConfig;
use rls::model::{
    AssignSessionPropertyValue, CreateRlsPolicy, NewModel, NewSessionProperty, UpdateRlsPolicy,
};
use rls::service::{RlsError, RlsService};
use rls::RlsModule;
use tempfile::TempDir;

struct Env {
    _dir: TempDir,
    module: RlsModule,
}

fn env() -> Env {
    let dir = TempDir::new().unwrap();
    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open(&dir.path().join("rls.db")).unwrap());
    let module = RlsModule::new(sql, RlsConfig::default()).unwrap();
    Env { _dir: dir, module }
}

fn region(svc: &RlsService, default: Option<&str>) -> i64 {
    let mut input = NewSessionProperty::named("region");
    input.default_expr = default.map(str::to_string);
    svc.create_session_property(1, input).unwrap().id
}

fn assign(svc: &RlsService, user_id: i64, session_property_id: i64, value: &str) {
    svc.assign_value(
        1,
        AssignSessionPropertyValue {
            user_id,
            session_property_id,
            value: value.into(),
        },
    )
    .unwrap();
}

#[test]
fn scenario_a_required_unset_property_is_absent() {
    let env = env();
    let svc = env.module.service();
    region(&svc, None);

    let resolved = env.module.resolver().resolve(1, 100).unwrap();
    assert!(!resolved.contains_key("region"));
}

#[test]
fn scenario_b_default_applies() {
    let env = env();
    let svc = env.module.service();
    region(&svc, Some("'us-east'"));

    let resolved = svc.resolve_session_properties(1, 100).unwrap();
    assert_eq!(resolved.get("region").map(String::as_str), Some("'us-east'"));
}

#[test]
fn scenario_c_user_value_beats_default() {
    let env = env();
    let svc = env.module.service();
    let id = region(&svc, Some("'us-east'"));
    assign(&svc, 100, id, "'eu-west'");

    let resolved = svc.resolve_session_properties(1, 100).unwrap();
    assert_eq!(resolved.get("region").map(String::as_str), Some("'eu-west'"));
}

#[test]
fn scenario_d_update_touches_only_supplied_set() {
    let env = env();
    let svc = env.module.service();
    let m10 = svc.register_model(1, NewModel { name: "orders".into() }).unwrap().id;
    let m11 = svc.register_model(1, NewModel { name: "customers".into() }).unwrap().id;
    let p5 = svc.create_session_property(1, NewSessionProperty::named("org_id")).unwrap().id;
    let p6 = region(&svc, None);

    let created = svc
        .create_policy(
            1,
            CreateRlsPolicy {
                name: "org-scope".into(),
                condition: "org_id = @org_id".into(),
                model_ids: vec![m11, m10],
                session_property_ids: vec![p5],
            },
        )
        .unwrap();

    svc.update_policy(
        1,
        created.policy.id,
        UpdateRlsPolicy {
            session_property_ids: Some(vec![p6, p5]),
            ..Default::default()
        },
    )
    .unwrap();

    let fetched = svc.get_policy(1, created.policy.id).unwrap();
    let mut models = vec![m10, m11];
    models.sort();
    let mut props = vec![p5, p6];
    props.sort();
    assert_eq!(fetched.model_ids, models);
    assert_eq!(fetched.session_property_ids, props);
    assert_eq!(fetched.policy.name, "org-scope");
}

#[test]
fn scenario_e_failed_update_rolls_back_scalars() {
    let env = env();
    let svc = env.module.service();
    let p5 = region(&svc, None);
    let created = svc
        .create_policy(
            1,
            CreateRlsPolicy {
                name: "org-scope".into(),
                condition: "org_id = @org_id".into(),
                model_ids: vec![],
                session_property_ids: vec![p5],
            },
        )
        .unwrap();

    let err = svc
        .update_policy(
            1,
            created.policy.id,
            UpdateRlsPolicy {
                name: Some("renamed".into()),
                condition: Some("1 = 1".into()),
                session_property_ids: Some(vec![p5, 99_999]),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, RlsError::Validation(_)));

    let after = svc.get_policy(1, created.policy.id).unwrap();
    assert_eq!(after.policy.name, "org-scope");
    assert_eq!(after.policy.condition, "org_id = @org_id");
    assert_eq!(after.session_property_ids, vec![p5]);
    assert_eq!(after, created);
}

#[test]
fn enriched_reads_are_stable() {
    let env = env();
    let svc = env.module.service();
    let models: Vec<i64> = ["a", "b", "c"]
        .iter()
        .map(|n| svc.register_model(1, NewModel { name: n.to_string() }).unwrap().id)
        .collect();
    let created = svc
        .create_policy(
            1,
            CreateRlsPolicy {
                name: "p".into(),
                condition: "true".into(),
                model_ids: models.iter().rev().copied().collect(),
                session_property_ids: vec![],
            },
        )
        .unwrap();

    let first = svc.get_policy(1, created.policy.id).unwrap();
    let second = svc.list_policies(1).unwrap().remove(0);
    assert_eq!(first, second);
    assert_eq!(first.model_ids, models);
}

#[test]
fn deleting_policy_keeps_models_and_properties() {
    let env = env();
    let svc = env.module.service();
    let model = svc.register_model(1, NewModel { name: "orders".into() }).unwrap().id;
    let prop = region(&svc, None);
    let created = svc
        .create_policy(
            1,
            CreateRlsPolicy {
                name: "p".into(),
                condition: "true".into(),
                model_ids: vec![model],
                session_property_ids: vec![prop],
            },
        )
        .unwrap();

    svc.delete_policy(1, created.policy.id).unwrap();
    assert!(svc.list_policies_for_model(1, model).unwrap().is_empty());
    assert_eq!(svc.list_models(1).unwrap().len(), 1);
    assert!(svc.get_session_property(1, prop).is_ok());
}

#[test]
fn cross_project_access_is_not_found() {
    let env = env();
    let svc = env.module.service();
    let prop = region(&svc, Some("'us-east'"));
    let created = svc
        .create_policy(
            1,
            CreateRlsPolicy {
                name: "p".into(),
                condition: "true".into(),
                model_ids: vec![],
                session_property_ids: vec![prop],
            },
        )
        .unwrap();

    let foreign_policy = svc.delete_policy(2, created.policy.id).unwrap_err();
    let missing_policy = svc.delete_policy(2, 123_456).unwrap_err();
    assert!(matches!(foreign_policy, RlsError::NotFound(_)));
    assert!(matches!(missing_policy, RlsError::NotFound(_)));

    assert!(matches!(svc.delete_session_property(2, prop), Err(RlsError::NotFound(_))));
    assert!(svc.resolve_session_properties(2, 1).unwrap().is_empty());

    // A project cannot attach another project's property to its own policy.
    let err = svc
        .create_policy(
            2,
            CreateRlsPolicy {
                name: "theirs".into(),
                condition: "true".into(),
                model_ids: vec![],
                session_property_ids: vec![prop],
            },
        )
        .unwrap_err();
    assert!(matches!(err, RlsError::Validation(_)));
    assert!(svc.list_policies(2).unwrap().is_empty());

    assert_eq!(svc.get_policy(1, created.policy.id).unwrap(), created);
}

#[test]
fn schema_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rls.db");
    {
        let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open(&path).unwrap());
        let module = RlsModule::new(sql, RlsConfig::default()).unwrap();
        let svc = module.service();
        let mut input = NewSessionProperty::named("region");
        input.default_expr = Some("'us-east'".into());
        svc.create_session_property(1, input).unwrap();
    }

    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let module = RlsModule::new(sql, RlsConfig::default()).unwrap();
    let resolved = module.resolver().resolve(1, 1).unwrap();
    assert_eq!(resolved.get("region").map(String::as_str), Some("'us-east'"));
}
