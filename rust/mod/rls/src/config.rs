use serde::Deserialize;

/// Configuration for the RLS module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RlsConfig {
    /// Reject a session property whose name is already used in the same
    /// project. When on, the SQL schema also carries a unique
    /// `(project_id, name)` index; when off, that index is dropped.
    pub unique_property_names: bool,
}

impl Default for RlsConfig {
    fn default() -> Self {
        Self {
            unique_property_names: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert!(RlsConfig::default().unique_property_names);

        let config: RlsConfig = serde_json::from_str("{}").unwrap();
        assert!(config.unique_property_names);

        let config: RlsConfig =
            serde_json::from_str(r#"{"unique_property_names": false}"#).unwrap();
        assert!(!config.unique_property_names);
    }
}
