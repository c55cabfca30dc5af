use datasec_sql::{SQLExecutor, SQLStore};

use crate::config::RlsConfig;
use crate::store::StoreError;

const PROPERTY_NAME_INDEX: &str = "uq_session_property_project_name";

/// Initialize the SQLite schema for the RLS relations.
pub fn init_schema(sql: &dyn SQLStore, config: &RlsConfig) -> Result<(), StoreError> {
    let statements = [
        // Models: the slice of the modeling layer's relation that policies join to
        "CREATE TABLE IF NOT EXISTS model (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_model_project ON model(project_id)",

        // Session properties: typed per-project variables
        "CREATE TABLE IF NOT EXISTS session_property (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'string',
            required INTEGER NOT NULL DEFAULT 1,
            default_expr TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_session_property_project ON session_property(project_id)",

        // Policies: name + opaque condition
        "CREATE TABLE IF NOT EXISTS rls_policy (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            condition TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_rls_policy_project ON rls_policy(project_id)",

        // Policy <-> model
        "CREATE TABLE IF NOT EXISTS rls_policy_model (
            rls_policy_id INTEGER NOT NULL,
            model_id INTEGER NOT NULL,
            PRIMARY KEY (rls_policy_id, model_id),
            FOREIGN KEY (rls_policy_id) REFERENCES rls_policy(id) ON DELETE CASCADE,
            FOREIGN KEY (model_id) REFERENCES model(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_rls_policy_model_model ON rls_policy_model(model_id)",

        // Policy <-> session property
        "CREATE TABLE IF NOT EXISTS rls_policy_session_property (
            rls_policy_id INTEGER NOT NULL,
            session_property_id INTEGER NOT NULL,
            PRIMARY KEY (rls_policy_id, session_property_id),
            FOREIGN KEY (rls_policy_id) REFERENCES rls_policy(id) ON DELETE CASCADE,
            FOREIGN KEY (session_property_id) REFERENCES session_property(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_rls_policy_session_property_prop
            ON rls_policy_session_property(session_property_id)",

        // Per-user values
        "CREATE TABLE IF NOT EXISTS user_session_property_value (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            session_property_id INTEGER NOT NULL,
            value TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, session_property_id),
            FOREIGN KEY (session_property_id) REFERENCES session_property(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_user_value_property
            ON user_session_property_value(session_property_id)",
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])?;
    }

    let name_index = if config.unique_property_names {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON session_property(project_id, name)",
            PROPERTY_NAME_INDEX
        )
    } else {
        format!("DROP INDEX IF EXISTS {}", PROPERTY_NAME_INDEX)
    };
    sql.exec(&name_index, &[])?;

    Ok(())
}
