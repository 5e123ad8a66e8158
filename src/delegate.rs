//! Resource types with their own access model layered over roles.
//!
//! A delegate answers "is this actor attached to this resource instance?" either directly
//! or through one of its teams. When it says no, the engine falls back to role-based
//! evaluation, additionally constrained by the instance's own region if it has one.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// How access to a resource was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persistence", serde(rename_all = "lowercase"))]
pub enum AccessType {
    /// The actor is attached to the resource instance.
    Direct,
    /// One of the actor's teams is attached to the resource instance.
    Team,
    /// A role permission.
    Role,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessType::Direct => "direct",
            AccessType::Team => "team",
            AccessType::Role => "role",
        })
    }
}

/// Answer from a delegate's assignment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateAccess {
    pub allowed: bool,
    pub access_type: Option<AccessType>,
    /// Who or what the access came through (actor id or team id).
    pub granted_by: Option<String>,
}

impl DelegateAccess {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            access_type: None,
            granted_by: None,
        }
    }

    pub fn direct(actor_id: impl Into<String>) -> Self {
        Self {
            allowed: true,
            access_type: Some(AccessType::Direct),
            granted_by: Some(actor_id.into()),
        }
    }

    pub fn team(team_id: impl Into<String>) -> Self {
        Self {
            allowed: true,
            access_type: Some(AccessType::Team),
            granted_by: Some(team_id.into()),
        }
    }
}

/// Resource-specific access model consulted before role-based checks.
#[async_trait]
pub trait ResourceDelegate: Send + Sync {
    /// Assignment-based access for the actor on one resource instance.
    async fn check_assignment_access(
        &self,
        actor_id: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<DelegateAccess>;

    /// Region the resource instance belongs to, if it is region-bound.
    async fn resource_region(&self, _resource_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Looks up the delegate registered for a resource type.
#[derive(Clone, Default)]
pub struct DelegateRouter {
    delegates: HashMap<String, Arc<dyn ResourceDelegate>>,
}

impl DelegateRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: &str, delegate: Arc<dyn ResourceDelegate>) {
        self.delegates
            .insert(resource_type.trim().to_ascii_uppercase(), delegate);
    }

    pub fn get(&self, resource_type: &str) -> Option<&Arc<dyn ResourceDelegate>> {
        self.delegates.get(resource_type)
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl fmt::Debug for DelegateRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateRouter")
            .field("resource_types", &self.delegates.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-memory assignment-based delegate, e.g. for project access.
///
/// Attachments grant every action on the instance.
#[derive(Debug, Default, Clone)]
pub struct AssignmentDelegate {
    actor_assignments: Arc<DashMap<String, HashSet<String>>>,
    team_assignments: Arc<DashMap<String, HashSet<String>>>,
    team_members: Arc<DashMap<String, HashSet<String>>>,
    regions: Arc<DashMap<String, String>>,
}

impl AssignmentDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_actor(&self, resource_id: &str, actor_id: &str) {
        self.actor_assignments
            .entry(resource_id.to_string())
            .or_default()
            .insert(actor_id.to_string());
    }

    pub fn unassign_actor(&self, resource_id: &str, actor_id: &str) {
        if let Some(mut actors) = self.actor_assignments.get_mut(resource_id) {
            actors.remove(actor_id);
        }
    }

    pub fn assign_team(&self, resource_id: &str, team_id: &str) {
        self.team_assignments
            .entry(resource_id.to_string())
            .or_default()
            .insert(team_id.to_string());
    }

    pub fn add_team_member(&self, team_id: &str, actor_id: &str) {
        self.team_members
            .entry(team_id.to_string())
            .or_default()
            .insert(actor_id.to_string());
    }

    /// Bind the resource instance to a region.
    pub fn set_region(&self, resource_id: &str, region_id: &str) {
        self.regions
            .insert(resource_id.to_string(), region_id.to_string());
    }
}

#[async_trait]
impl ResourceDelegate for AssignmentDelegate {
    async fn check_assignment_access(
        &self,
        actor_id: &str,
        resource_id: &str,
        _action: &str,
    ) -> Result<DelegateAccess> {
        let direct = self
            .actor_assignments
            .get(resource_id)
            .is_some_and(|actors| actors.contains(actor_id));
        if direct {
            return Ok(DelegateAccess::direct(actor_id));
        }

        let mut teams: Vec<String> = self
            .team_assignments
            .get(resource_id)
            .map(|teams| teams.iter().cloned().collect())
            .unwrap_or_default();
        teams.sort();
        for team_id in teams {
            let member = self
                .team_members
                .get(&team_id)
                .is_some_and(|members| members.contains(actor_id));
            if member {
                return Ok(DelegateAccess::team(team_id));
            }
        }

        Ok(DelegateAccess::denied())
    }

    async fn resource_region(&self, resource_id: &str) -> Result<Option<String>> {
        Ok(self.regions.get(resource_id).map(|r| r.clone()))
    }
}
