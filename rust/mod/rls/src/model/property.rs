use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::{ProjectId, SessionPropertyId};

/// Declared type of a session property.
///
/// Advisory: values are stored and resolved as text regardless of type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Boolean,
    /// Older rows spell this `number`.
    #[serde(alias = "number")]
    Float,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
            PropertyType::Float => "float",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(PropertyType::String),
            "integer" => Ok(PropertyType::Integer),
            "boolean" => Ok(PropertyType::Boolean),
            "float" | "number" => Ok(PropertyType::Float),
            other => Err(format!("unknown session property type '{}'", other)),
        }
    }
}

/// A typed, project-scoped variable whose value is supplied per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProperty {
    pub id: SessionPropertyId,
    pub project_id: ProjectId,
    /// Identifier-shaped name referenced from policy conditions.
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// Advisory only; resolution never enforces it.
    pub required: bool,
    /// Fallback used when the user has no assigned value.
    pub default_expr: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a session property.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionProperty {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub property_type: PropertyType,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub default_expr: Option<String>,
}

impl NewSessionProperty {
    /// A required string property with no default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_type: default_type(),
            required: default_required(),
            default_expr: None,
        }
    }
}

fn default_type() -> PropertyType {
    PropertyType::String
}

fn default_required() -> bool {
    true
}

/// Partial update of a session property. Absent fields are left untouched.
///
/// `default_expr` distinguishes "absent" (`None`) from "clear"
/// (`Some(None)`), so a JSON `null` removes the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionProperty {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub default_expr: Option<Option<String>>,
}

impl UpdateSessionProperty {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.property_type.is_none()
            && self.required.is_none()
            && self.default_expr.is_none()
    }
}

/// Wrap any present value (including `null`) in `Some`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
