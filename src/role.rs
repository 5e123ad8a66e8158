//! Role definitions, role assignments and organizational units.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A named bundle of permissions positioned in the role hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Role {
    /// Unique identifier for the role.
    id: String,
    /// Unique, immutable name of the role.
    name: String,
    /// Human-readable name.
    display_name: String,
    /// Hierarchy level; higher is more privileged.
    level: i32,
    /// Whether this is a built-in system role.
    system_role: bool,
    /// Whether this role is active.
    active: bool,
}

impl Role {
    /// Create a new role with the given name and hierarchy level.
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: name.clone(),
            name,
            level,
            system_role: false,
            active: true,
        }
    }

    /// Create a new role with a specific ID.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, level: i32) -> Self {
        let mut role = Self::new(name, level);
        role.id = id.into();
        role
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Mark this role as a built-in system role.
    pub fn system(mut self) -> Self {
        self.system_role = true;
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Get the role's unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the role's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the role's display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Get the hierarchy level.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Check if this is a system role.
    pub fn is_system_role(&self) -> bool {
        self.system_role
    }

    /// Check if this role is active.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Association between a role and a permission.
///
/// The association carries its own active flag so it can be revoked without touching
/// the permission.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct RolePermission {
    pub role_id: String,
    pub permission: crate::permission::Permission,
    pub active: bool,
}

impl RolePermission {
    pub fn new(role_id: impl Into<String>, permission: crate::permission::Permission) -> Self {
        Self {
            role_id: role_id.into(),
            permission,
            active: true,
        }
    }

    /// Both the association and the permission itself must be active.
    pub fn is_effective(&self) -> bool {
        self.active && self.permission.is_active()
    }
}

/// A grant of a role to an actor, optionally pinned to a team, region or organization.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleAssignment {
    id: String,
    actor_id: String,
    role_id: String,
    team_id: Option<String>,
    region_id: Option<String>,
    organization_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    granted_by: Option<String>,
    active: bool,
}

impl RoleAssignment {
    /// Create an active, non-expiring assignment.
    pub fn new(actor_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id: actor_id.into(),
            role_id: role_id.into(),
            team_id: None,
            region_id: None,
            organization_id: None,
            expires_at: None,
            granted_by: None,
            active: true,
        }
    }

    pub fn in_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn in_region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    pub fn in_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn granted_by(mut self, grantor_id: impl Into<String>) -> Self {
        self.granted_by = Some(grantor_id.into());
        self
    }

    /// Soft-deactivate the assignment.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team_id.as_deref()
    }

    pub fn region_id(&self) -> Option<&str> {
        self.region_id.as_deref()
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn grantor(&self) -> Option<&str> {
        self.granted_by.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// An assignment is live only if it is active and not past its expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// Inheritance edge: `child` inherits every permission of `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchyEdge {
    pub child: String,
    pub parent: String,
}

impl HierarchyEdge {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }
}

/// A team as recorded by the organizational directory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Team {
    pub id: String,
    /// The region the team actually belongs to.
    pub region_id: Option<String>,
    pub organization_id: Option<String>,
}

impl Team {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            region_id: None,
            organization_id: None,
        }
    }

    pub fn in_region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    pub fn in_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}
