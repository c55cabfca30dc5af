use serde::{Deserialize, Serialize};

use super::{ModelId, PolicyId, ProjectId, SessionPropertyId};

/// A bare RLS policy row.
///
/// `condition` is opaque here: it is handed verbatim to the query engine,
/// which owns the variable-reference syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlsPolicy {
    pub id: PolicyId,
    pub project_id: ProjectId,
    pub name: String,
    pub condition: String,
    /// Bumped by every committed update.
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A policy together with the sets it is joined to.
///
/// Both id lists are sets; they are returned sorted ascending, never null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlsPolicyDetail {
    #[serde(flatten)]
    pub policy: RlsPolicy,
    pub model_ids: Vec<ModelId>,
    pub session_property_ids: Vec<SessionPropertyId>,
}

/// Input for creating a policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRlsPolicy {
    pub name: String,
    pub condition: String,
    #[serde(default)]
    pub model_ids: Vec<ModelId>,
    #[serde(default)]
    pub session_property_ids: Vec<SessionPropertyId>,
}

/// Partial update of a policy.
///
/// Scalar fields are written only when present. Each join set is replaced
/// wholesale only when present; an absent set keeps its current rows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRlsPolicy {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub model_ids: Option<Vec<ModelId>>,
    #[serde(default)]
    pub session_property_ids: Option<Vec<SessionPropertyId>>,
    /// When set, the update only applies if the stored version matches.
    #[serde(default)]
    pub expected_version: Option<i64>,
}
