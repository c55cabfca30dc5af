mod catalog;
mod policy;
mod property;
mod value;

pub use catalog::{Model, NewModel};
pub use policy::{CreateRlsPolicy, RlsPolicy, RlsPolicyDetail, UpdateRlsPolicy};
pub use property::{
    NewSessionProperty, PropertyType, SessionProperty, UpdateSessionProperty,
};
pub use value::{AssignSessionPropertyValue, UserSessionPropertyValue};

/// Project (tenant) identifier.
pub type ProjectId = i64;
/// Identifier of a row in the external model relation.
pub type ModelId = i64;
pub type PolicyId = i64;
pub type SessionPropertyId = i64;
pub type UserId = i64;
