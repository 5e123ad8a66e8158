//! Permission definitions: resource types, actions and scopes.

use crate::{
    conditions::PermissionConditions,
    error::{Error, Result},
};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Action that implies every other action on the same resource.
pub const MANAGE_ACTION: &str = "MANAGE";

/// Breadth at which a permission applies, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persistence", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Scope {
    /// The actor's own resources.
    User,
    /// Resources of teams the actor can access.
    Team,
    /// Resources of regions the actor can access.
    Region,
    /// Everything inside the actor's organization.
    Organization,
    /// Everything.
    System,
}

impl Scope {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "USER",
            Scope::Team => "TEAM",
            Scope::Region => "REGION",
            Scope::Organization => "ORGANIZATION",
            Scope::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Scope::User),
            "TEAM" => Ok(Scope::Team),
            "REGION" => Ok(Scope::Region),
            "ORGANIZATION" => Ok(Scope::Organization),
            "SYSTEM" => Ok(Scope::System),
            other => Err(Error::InvalidConfiguration(format!("unknown scope '{other}'"))),
        }
    }
}

/// A (resource, action, scope) grant, optionally conditioned.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Permission {
    id: String,
    resource: String,
    action: String,
    scope: Scope,
    conditions: Option<PermissionConditions>,
    active: bool,
}

impl Permission {
    /// Create a permission for an action on a resource type at the given scope.
    ///
    /// Resource types and actions are normalized to upper case.
    pub fn new(resource: impl Into<String>, action: impl Into<String>, scope: Scope) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource: resource.into().trim().to_ascii_uppercase(),
            action: action.into().trim().to_ascii_uppercase(),
            scope,
            conditions: None,
            active: true,
        }
    }

    /// Create a `MANAGE` permission, which implies all actions on the resource.
    pub fn manage(resource: impl Into<String>, scope: Scope) -> Self {
        Self::new(resource, MANAGE_ACTION, scope)
    }

    /// Replace the generated identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach contextual conditions.
    pub fn with_conditions(mut self, conditions: PermissionConditions) -> Self {
        self.conditions = if conditions.is_empty() {
            None
        } else {
            Some(conditions)
        };
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Parse a permission from `resource:action:scope`.
    pub fn parse(permission_str: &str) -> Result<Self> {
        let parts: Vec<&str> = permission_str.split(':').map(str::trim).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidConfiguration(format!(
                "Permission must be in format 'resource:action:scope', got: '{permission_str}'"
            )));
        }
        Ok(Self::new(parts[0], parts[1], parts[2].parse()?))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn conditions(&self) -> Option<&PermissionConditions> {
        self.conditions.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether this is a `MANAGE` grant.
    pub fn is_manage(&self) -> bool {
        self.action == MANAGE_ACTION
    }

    /// Check whether this permission covers the requested resource and action.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.resource.eq_ignore_ascii_case(resource)
            && (self.is_manage() || self.action.eq_ignore_ascii_case(action))
    }

    /// Aggregation key used to deduplicate grants coming from different roles.
    pub fn dedup_key(&self) -> (String, String, Scope) {
        (self.resource.clone(), self.action.clone(), self.scope)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope)
    }
}

/// A permission tagged with the role that granted it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedPermission {
    /// The granted permission.
    pub permission: Permission,
    /// Name of the role that contributed this grant.
    pub granted_by: String,
    /// Hierarchy level of the granting role.
    pub role_level: i32,
    /// Whether the granting role is a cross-team role.
    pub cross_team: bool,
}

impl ResolvedPermission {
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.permission.matches(resource, action)
    }
}
