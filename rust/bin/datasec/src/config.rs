//! `datasec.toml`: storage location plus RLS settings.
//!
//! ```toml
//! [service]
//! data_dir = "/var/lib/datasec"
//!
//! [rls]
//! unique_property_names = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use datasec_core::{load_toml, ServiceConfig};
use rls::config::RlsConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub service: ServiceConfig,
    pub rls: RlsConfig,
}

impl CliConfig {
    /// Default config file: `./datasec.toml`.
    pub fn default_path() -> PathBuf {
        PathBuf::from("datasec.toml")
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(load_toml(path)?)
    }
}
