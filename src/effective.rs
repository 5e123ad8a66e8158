//! Effective permission sets and the aggregation that produces them.

use crate::{
    hierarchy::RoleGraph,
    permission::{ResolvedPermission, Scope},
    role::RolePermission,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Teams, regions and organizations an actor can reach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorScopes {
    /// Teams from assignments and team memberships.
    pub teams: BTreeSet<String>,
    /// Regions from assignments plus the verified regions of the actor's teams.
    pub regions: BTreeSet<String>,
    /// Regions named directly on the actor's assignments.
    pub assigned_regions: BTreeSet<String>,
    /// Organizations from assignments and the actor's teams.
    pub organizations: BTreeSet<String>,
}

/// The deduplicated union of permissions granted by an actor's live, expanded roles.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectivePermissionSet {
    pub actor_id: String,
    /// Ordered by granting role level, highest first.
    pub permissions: Vec<ResolvedPermission>,
    /// Roles the actor holds directly through live assignments.
    pub direct_roles: BTreeSet<String>,
    /// Direct roles plus everything they inherit.
    pub roles: BTreeSet<String>,
    pub scopes: ActorScopes,
    /// The actor holds an administrative system role, directly or by inheritance.
    pub admin: bool,
    /// The actor holds a cross-team role, directly or by inheritance.
    pub cross_team: bool,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Actor invalidation version this set was computed against.
    pub version: u64,
    /// Engine-wide invalidation generation this set was computed against.
    pub generation: u64,
}

impl EffectivePermissionSet {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }

    /// Permissions covering `resource`/`action`, highest role level first.
    pub fn candidates<'a>(
        &'a self,
        resource: &'a str,
        action: &'a str,
    ) -> impl Iterator<Item = &'a ResolvedPermission> + 'a {
        self.permissions
            .iter()
            .filter(move |p| p.matches(resource, action))
    }
}

/// Maps a resolved role set to deduplicated [`ResolvedPermission`]s.
#[derive(Debug, Clone, Default)]
pub struct PermissionAggregator {
    cross_team_roles: HashSet<String>,
    admin_roles: HashSet<String>,
}

impl PermissionAggregator {
    pub fn new(
        cross_team_roles: impl IntoIterator<Item = String>,
        admin_roles: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            cross_team_roles: cross_team_roles.into_iter().collect(),
            admin_roles: admin_roles.into_iter().collect(),
        }
    }

    /// The administrative bypass needs both the configured name and the system flag.
    pub fn is_admin(&self, role: &crate::role::Role) -> bool {
        role.is_system_role() && self.admin_roles.contains(role.name())
    }

    /// Whether any of the resolved roles is an administrative system role.
    pub fn holds_admin_role(&self, graph: &RoleGraph, resolved_roles: &BTreeSet<String>) -> bool {
        resolved_roles
            .iter()
            .filter_map(|name| graph.role_by_name(name))
            .any(|role| self.is_admin(role))
    }

    /// Whether any of the resolved roles is a cross-team role.
    pub fn holds_cross_team_role(&self, resolved_roles: &BTreeSet<String>) -> bool {
        resolved_roles
            .iter()
            .any(|name| self.cross_team_roles.contains(name))
    }

    /// Deduplicate by (resource, action, scope). When several roles grant the same key the
    /// higher-level role wins; ties keep the first grant seen.
    ///
    /// Grants of one key with different conditions are kept apart, so a conditioned grant
    /// never displaces a less restricted one.
    pub fn aggregate(
        &self,
        graph: &RoleGraph,
        resolved_roles: &BTreeSet<String>,
        grants: &[RolePermission],
    ) -> Vec<ResolvedPermission> {
        let mut index: HashMap<(String, String, Scope), Vec<usize>> = HashMap::new();
        let mut permissions: Vec<ResolvedPermission> = Vec::new();

        for grant in grants.iter().filter(|g| g.is_effective()) {
            let Some(role) = graph.role_by_id(&grant.role_id) else {
                continue;
            };
            if !resolved_roles.contains(role.name()) {
                continue;
            }

            let candidate = ResolvedPermission {
                permission: grant.permission.clone(),
                granted_by: role.name().to_string(),
                role_level: role.level(),
                cross_team: self.cross_team_roles.contains(role.name()),
            };

            let slots = index.entry(grant.permission.dedup_key()).or_default();
            let same = slots.iter().copied().find(|&i| {
                permissions[i].permission.conditions() == candidate.permission.conditions()
            });
            match same {
                Some(i) if permissions[i].role_level < candidate.role_level => {
                    permissions[i] = candidate;
                }
                Some(_) => {}
                None => {
                    slots.push(permissions.len());
                    permissions.push(candidate);
                }
            }
        }

        // Stable: equal levels keep first-seen order.
        permissions.sort_by(|a, b| b.role_level.cmp(&a.role_level));
        permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        permission::Permission,
        role::{HierarchyEdge, Role},
    };

    fn graph() -> RoleGraph {
        RoleGraph::new(
            [
                Role::with_id("r-tm", "TEAM_MEMBER", 10),
                Role::with_id("r-fs", "FIELD_SUPERVISOR", 20),
                Role::with_id("r-sp", "SUPPORT", 25),
            ],
            [HierarchyEdge::new("FIELD_SUPERVISOR", "TEAM_MEMBER")],
            16,
        )
    }

    #[test]
    fn test_higher_level_role_wins_duplicate_key() {
        let graph = graph();
        let roles = graph.resolve(["FIELD_SUPERVISOR"]);
        let grants = vec![
            RolePermission::new("r-tm", Permission::new("DEVICES", "READ", Scope::Team)),
            RolePermission::new("r-fs", Permission::new("DEVICES", "READ", Scope::Team)),
            RolePermission::new("r-tm", Permission::new("REPORTS", "READ", Scope::Team)),
        ];

        let permissions = PermissionAggregator::default().aggregate(&graph, &roles, &grants);
        assert_eq!(permissions.len(), 2);
        assert_eq!(permissions[0].granted_by, "FIELD_SUPERVISOR");
        assert_eq!(permissions[0].permission.resource(), "DEVICES");
        assert_eq!(permissions[1].granted_by, "TEAM_MEMBER");
    }

    #[test]
    fn test_different_scopes_are_distinct_keys() {
        let graph = graph();
        let roles = graph.resolve(["TEAM_MEMBER"]);
        let grants = vec![
            RolePermission::new("r-tm", Permission::new("DEVICES", "READ", Scope::Team)),
            RolePermission::new("r-tm", Permission::new("DEVICES", "READ", Scope::User)),
        ];
        let permissions = PermissionAggregator::default().aggregate(&graph, &roles, &grants);
        assert_eq!(permissions.len(), 2);
    }

    #[test]
    fn test_revoked_and_foreign_grants_are_skipped() {
        let graph = graph();
        let roles = graph.resolve(["TEAM_MEMBER"]);
        let mut revoked =
            RolePermission::new("r-tm", Permission::new("DEVICES", "DELETE", Scope::Team));
        revoked.active = false;
        let grants = vec![
            revoked,
            RolePermission::new("r-fs", Permission::new("DEVICES", "UPDATE", Scope::Team)),
            RolePermission::new("r-missing", Permission::new("DEVICES", "READ", Scope::Team)),
        ];
        assert!(
            PermissionAggregator::default()
                .aggregate(&graph, &roles, &grants)
                .is_empty()
        );
    }

    #[test]
    fn test_cross_team_roles_are_tagged() {
        let graph = graph();
        let roles = graph.resolve(["SUPPORT"]);
        let grants = vec![RolePermission::new(
            "r-sp",
            Permission::new("DEVICES", "READ", Scope::Organization),
        )];
        let permissions = PermissionAggregator::new(["SUPPORT".to_string()], Vec::new())
            .aggregate(&graph, &roles, &grants);
        assert!(permissions[0].cross_team);
    }

    #[test]
    fn test_actor_flags_follow_inherited_roles() {
        let graph = RoleGraph::new(
            [
                Role::with_id("r-tm", "TEAM_MEMBER", 10),
                Role::with_id("r-sp", "SUPPORT", 25),
                Role::with_id("r-sa", "SUPER_ADMIN", 100).system(),
                Role::with_id("r-lead", "SUPPORT_LEAD", 30),
                Role::with_id("r-root", "ROOT", 200),
            ],
            [
                HierarchyEdge::new("SUPPORT_LEAD", "SUPPORT"),
                HierarchyEdge::new("ROOT", "SUPER_ADMIN"),
            ],
            16,
        );
        let aggregator =
            PermissionAggregator::new(["SUPPORT".to_string()], ["SUPER_ADMIN".to_string()]);

        let lead = graph.resolve(["SUPPORT_LEAD"]);
        assert!(aggregator.holds_cross_team_role(&lead));
        assert!(!aggregator.holds_admin_role(&graph, &lead));

        let root = graph.resolve(["ROOT"]);
        assert!(aggregator.holds_admin_role(&graph, &root));
        assert!(!aggregator.holds_admin_role(&graph, &graph.resolve(["TEAM_MEMBER"])));
    }

    #[test]
    fn test_conditioned_grant_does_not_displace_unconditioned() {
        let graph = graph();
        let roles = graph.resolve(["FIELD_SUPERVISOR"]);
        let windowed = Permission::new("DEVICES", "READ", Scope::Team).with_conditions(
            crate::conditions::PermissionConditions::new()
                .with_time_window(crate::conditions::TimeWindow::business_hours()),
        );
        let grants = vec![
            RolePermission::new("r-tm", Permission::new("DEVICES", "READ", Scope::Team)),
            RolePermission::new("r-fs", windowed),
        ];

        let permissions = PermissionAggregator::default().aggregate(&graph, &roles, &grants);
        assert_eq!(permissions.len(), 2);
        assert_eq!(permissions[0].granted_by, "FIELD_SUPERVISOR");
        assert!(permissions[0].permission.conditions().is_some());
        assert_eq!(permissions[1].granted_by, "TEAM_MEMBER");
        assert!(permissions[1].permission.conditions().is_none());
    }
}
