//! Row-level security module: project-scoped session properties and RLS
//! policies, plus the resolver that turns them into per-user bindings.
//!
//! # Resources
//!
//! - **SessionProperty**: typed per-project variable with an optional default
//! - **RlsPolicy**: named condition applied to a set of models, referencing a
//!   set of session properties
//! - **UserSessionPropertyValue**: one user's value for one property
//! - **Model**: the models policies apply to
//!
//! # Usage
//!
//! ```ignore
//! use rls::{RlsModule, config::RlsConfig};
//!
//! let module = RlsModule::new(sql, RlsConfig::default())?;
//! let bindings = module.resolver().resolve(project_id, user_id)?;
//! ```

pub mod config;
pub mod model;
pub mod resolver;
pub mod service;
pub mod store;

use std::sync::Arc;

use datasec_sql::SQLStore;

use crate::config::RlsConfig;
use crate::resolver::PropertyValueResolver;
use crate::service::{RlsError, RlsService};
use crate::store::Stores;

/// The wired RLS object graph: one set of stores shared by one service and
/// one resolver.
pub struct RlsModule {
    service: Arc<RlsService>,
    resolver: Arc<PropertyValueResolver>,
}

impl RlsModule {
    /// Wire the module over a SQL store, initializing the schema.
    pub fn new(sql: Arc<dyn SQLStore>, config: RlsConfig) -> Result<Self, RlsError> {
        let stores = Stores::sql(sql, &config)?;
        Ok(Self::from_stores(stores, config))
    }

    /// Wire the module over the in-memory stores.
    pub fn in_memory(config: RlsConfig) -> Self {
        let stores = Stores::memory(&config);
        Self::from_stores(stores, config)
    }

    fn from_stores(stores: Stores, config: RlsConfig) -> Self {
        let service = Arc::new(RlsService::new(stores, config));
        let resolver = service.resolver();
        Self { service, resolver }
    }

    pub fn service(&self) -> Arc<RlsService> {
        self.service.clone()
    }

    pub fn resolver(&self) -> Arc<PropertyValueResolver> {
        self.resolver.clone()
    }
}
