//! Store abstractions for the role, permission and directory data the engine reads.
//!
//! The engine only reads through [`RoleStore`]. Mutations happen elsewhere; whoever mutates
//! is responsible for invalidating the engine afterwards.

use crate::{
    error::Result,
    role::{HierarchyEdge, Role, RoleAssignment, RolePermission, Team},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Read-only access to role definitions, assignments and the organizational directory.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Assignments for the actor that are live at `now`.
    async fn list_live_assignments(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>>;

    /// Role/permission associations for the given role ids.
    async fn list_permissions_for_roles(&self, role_ids: &[String]) -> Result<Vec<RolePermission>>;

    /// Get a role by name.
    async fn get_role(&self, name: &str) -> Result<Option<Role>>;

    /// Every role definition.
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// The inheritance edge table, by role name.
    async fn hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>>;

    /// A team with its actual region and organization.
    async fn get_team(&self, team_id: &str) -> Result<Option<Team>>;

    /// Teams the actor is a member of, independent of role assignments.
    async fn list_team_memberships(&self, actor_id: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn list_live_assignments(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>> {
        (**self).list_live_assignments(actor_id, now).await
    }

    async fn list_permissions_for_roles(&self, role_ids: &[String]) -> Result<Vec<RolePermission>> {
        (**self).list_permissions_for_roles(role_ids).await
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        (**self).get_role(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        (**self).list_roles().await
    }

    async fn hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>> {
        (**self).hierarchy_edges().await
    }

    async fn get_team(&self, team_id: &str) -> Result<Option<Team>> {
        (**self).get_team(team_id).await
    }

    async fn list_team_memberships(&self, actor_id: &str) -> Result<Vec<String>> {
        (**self).list_team_memberships(actor_id).await
    }
}

/// In-memory store implementation using DashMap for thread safety.
///
/// Clones share the same underlying data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    roles: Arc<DashMap<String, Role>>,
    role_permissions: Arc<DashMap<String, Vec<RolePermission>>>,
    assignments: Arc<DashMap<String, Vec<RoleAssignment>>>,
    edges: Arc<DashMap<String, HashSet<String>>>,
    teams: Arc<DashMap<String, Team>>,
    memberships: Arc<DashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role, keyed by id.
    pub fn upsert_role(&self, role: Role) {
        self.roles.insert(role.id().to_string(), role);
    }

    /// Attach a permission to a role.
    pub fn grant_permission(&self, role_id: &str, permission: crate::permission::Permission) {
        self.role_permissions
            .entry(role_id.to_string())
            .or_default()
            .push(RolePermission::new(role_id, permission));
    }

    /// Soft-revoke a role/permission association. Returns whether one was found.
    pub fn revoke_role_permission(&self, role_id: &str, permission_id: &str) -> bool {
        let Some(mut grants) = self.role_permissions.get_mut(role_id) else {
            return false;
        };
        let mut found = false;
        for grant in grants.iter_mut().filter(|g| g.permission.id() == permission_id) {
            grant.active = false;
            found = true;
        }
        found
    }

    /// Record an assignment. Returns its id.
    pub fn assign_role(&self, assignment: RoleAssignment) -> String {
        let id = assignment.id().to_string();
        self.assignments
            .entry(assignment.actor_id().to_string())
            .or_default()
            .push(assignment);
        id
    }

    /// Soft-deactivate an assignment. Returns whether one was found.
    pub fn revoke_assignment(&self, actor_id: &str, assignment_id: &str) -> bool {
        let Some(mut assignments) = self.assignments.get_mut(actor_id) else {
            return false;
        };
        match assignments.iter_mut().find(|a| a.id() == assignment_id) {
            Some(assignment) => {
                assignment.deactivate();
                true
            }
            None => false,
        }
    }

    /// Add an inheritance edge by role name.
    pub fn add_edge(&self, child: &str, parent: &str) {
        self.edges
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
    }

    /// Remove an inheritance edge.
    pub fn remove_edge(&self, child: &str, parent: &str) {
        if let Some(mut parents) = self.edges.get_mut(child) {
            parents.remove(parent);
        }
    }

    /// Insert or replace a team.
    pub fn upsert_team(&self, team: Team) {
        self.teams.insert(team.id.clone(), team);
    }

    /// Make the actor a member of the team.
    pub fn add_team_member(&self, team_id: &str, actor_id: &str) {
        self.memberships
            .entry(actor_id.to_string())
            .or_default()
            .insert(team_id.to_string());
    }

    /// Get the number of stored roles.
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn list_live_assignments(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .get(actor_id)
            .map(|assignments| {
                assignments
                    .iter()
                    .filter(|a| a.is_live(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_permissions_for_roles(&self, role_ids: &[String]) -> Result<Vec<RolePermission>> {
        let mut grants = Vec::new();
        for role_id in role_ids {
            if let Some(role_grants) = self.role_permissions.get(role_id) {
                grants.extend(role_grants.iter().cloned());
            }
        }
        Ok(grants)
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        Ok(self
            .roles
            .iter()
            .find(|entry| entry.value().name() == name)
            .map(|entry| entry.value().clone()))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.roles.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>> {
        Ok(self
            .edges
            .iter()
            .flat_map(|entry| {
                let child = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|parent| HierarchyEdge::new(child.clone(), parent.clone()))
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    async fn get_team(&self, team_id: &str) -> Result<Option<Team>> {
        Ok(self.teams.get(team_id).map(|t| t.clone()))
    }

    async fn list_team_memberships(&self, actor_id: &str) -> Result<Vec<String>> {
        Ok(self
            .memberships
            .get(actor_id)
            .map(|teams| teams.iter().cloned().collect())
            .unwrap_or_default())
    }
}
