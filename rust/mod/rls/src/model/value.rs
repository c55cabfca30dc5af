use serde::{Deserialize, Serialize};

use super::{SessionPropertyId, UserId};

/// The value assigned to one user for one session property.
///
/// Always text; the property's declared type is not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSessionPropertyValue {
    pub id: i64,
    pub user_id: UserId,
    pub session_property_id: SessionPropertyId,
    pub value: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One (user, property) = value assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSessionPropertyValue {
    pub user_id: UserId,
    pub session_property_id: SessionPropertyId,
    pub value: String,
}
