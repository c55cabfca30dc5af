//! Service fixtures over both store backends.

use std::sync::Arc;

use datasec_sql::{SQLStore, SqliteStore};

use crate::config::RlsConfig;
use crate::model::{NewSessionProperty, SessionPropertyId};
use crate::service::RlsService;
use crate::store::Stores;

pub fn backends_with(config: RlsConfig) -> Vec<(&'static str, RlsService)> {
    let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    vec![
        ("sqlite", RlsService::new(Stores::sql(db, &config).unwrap(), config.clone())),
        ("memory", RlsService::new(Stores::memory(&config), config)),
    ]
}

pub fn backends() -> Vec<(&'static str, RlsService)> {
    backends_with(RlsConfig::default())
}

pub fn new_property(name: &str) -> NewSessionProperty {
    NewSessionProperty::named(name)
}

pub fn add_property(svc: &RlsService, project_id: i64, name: &str) -> SessionPropertyId {
    svc.create_session_property(project_id, new_property(name))
        .unwrap()
        .id
}
