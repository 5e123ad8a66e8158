//! Boundary enforcement between an actor's reach and a request's target.
//!
//! Role carve-outs run before generic scope logic. They follow the roles the actor holds,
//! directly or by inheritance, whichever role contributed the matching grant:
//!
//! - an actor holding the administrative role bypasses every boundary;
//! - an actor holding a cross-team role reaches every team and region but never a
//!   protected resource type;
//! - an actor holding a region-manager role reaches teams outside their memberships only
//!   if the team's *recorded* region is one of their assigned regions, whatever region the
//!   caller claims.
//!
//! Regions are always verified through the directory's team record. A region supplied in
//! the request context is only trusted when no team is targeted.

use crate::{
    context::AccessContext,
    effective::EffectivePermissionSet,
    error::DenyReason,
    permission::{ResolvedPermission, Scope},
    role::Team,
};
use std::collections::{BTreeSet, HashSet};

/// Result of evaluating one candidate permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryOutcome {
    Allow,
    Deny(DenyReason),
}

impl BoundaryOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, BoundaryOutcome::Allow)
    }
}

/// Facts about the request target, resolved before candidates are evaluated.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryRequest<'a> {
    /// Upper-cased resource type.
    pub resource: &'a str,
    pub context: &'a AccessContext,
    /// Directory record for `context.team_id()`, `None` if unknown or not targeted.
    pub target_team: Option<&'a Team>,
    /// Region the targeted resource instance belongs to, if region-bound.
    pub resource_region: Option<&'a str>,
}

/// Evaluates scope constraints and role carve-outs.
#[derive(Debug, Clone, Default)]
pub struct BoundaryEnforcer {
    protected_resources: HashSet<String>,
    region_manager_roles: HashSet<String>,
}

impl BoundaryEnforcer {
    pub fn new(
        protected_resources: impl IntoIterator<Item = String>,
        region_manager_roles: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            protected_resources: protected_resources
                .into_iter()
                .map(|r| r.trim().to_ascii_uppercase())
                .collect(),
            region_manager_roles: region_manager_roles.into_iter().collect(),
        }
    }

    /// Whether the resource type is reserved for the administrative role.
    pub fn is_protected(&self, resource: &str) -> bool {
        self.protected_resources.contains(resource)
    }

    pub fn evaluate(
        &self,
        candidate: &ResolvedPermission,
        set: &EffectivePermissionSet,
        request: &BoundaryRequest<'_>,
    ) -> BoundaryOutcome {
        if set.admin {
            return BoundaryOutcome::Allow;
        }

        // Takes precedence over any allowing match below.
        if self.is_protected(request.resource) {
            return BoundaryOutcome::Deny(DenyReason::ProtectedResourceDenied(
                request.resource.to_string(),
            ));
        }

        let scope = candidate.permission.scope();
        if set.cross_team {
            return match scope {
                Scope::System => BoundaryOutcome::Allow,
                _ => to_outcome(self.check_organization(set, request)),
            };
        }

        let verdict = match self.check_scope(scope, set, request) {
            Err(_) if self.is_region_manager(set) => self.check_region_manager(set, request, scope),
            other => other,
        };

        to_outcome(
            verdict
                .and_then(|()| self.check_resource_region(scope, set, request))
                .and_then(|()| match scope {
                    Scope::System => Ok(()),
                    _ => self.check_organization(set, request),
                }),
        )
    }

    fn check_scope(
        &self,
        scope: Scope,
        set: &EffectivePermissionSet,
        request: &BoundaryRequest<'_>,
    ) -> Result<(), DenyReason> {
        match scope {
            Scope::User | Scope::Organization | Scope::System => Ok(()),
            Scope::Team => match request.context.team_id() {
                Some(team_id) if !set.scopes.teams.contains(team_id) => {
                    Err(DenyReason::TeamBoundaryViolation)
                }
                _ => Ok(()),
            },
            Scope::Region => self.check_target_region(&set.scopes.regions, request),
        }
    }

    fn is_region_manager(&self, set: &EffectivePermissionSet) -> bool {
        set.roles
            .iter()
            .any(|role| self.region_manager_roles.contains(role))
    }

    /// Region managers reach a non-member team when the team's verified region is one of
    /// their assigned regions.
    fn check_region_manager(
        &self,
        set: &EffectivePermissionSet,
        request: &BoundaryRequest<'_>,
        scope: Scope,
    ) -> Result<(), DenyReason> {
        match scope {
            Scope::User | Scope::Organization | Scope::System => Ok(()),
            Scope::Team | Scope::Region => {
                self.check_target_region(&set.scopes.assigned_regions, request)
            }
        }
    }

    fn check_target_region(
        &self,
        regions: &BTreeSet<String>,
        request: &BoundaryRequest<'_>,
    ) -> Result<(), DenyReason> {
        if request.context.team_id().is_some() {
            // Never the caller's region claim: only the directory's record counts.
            let verified = request.target_team.and_then(|t| t.region_id.as_deref());
            return match verified {
                Some(region) if regions.contains(region) => Ok(()),
                _ => Err(DenyReason::RegionBoundaryViolation),
            };
        }
        match request.context.region_id() {
            Some(region) if !regions.contains(region) => Err(DenyReason::RegionBoundaryViolation),
            _ => Ok(()),
        }
    }

    /// A region-bound resource instance is reachable only from a matching region.
    fn check_resource_region(
        &self,
        scope: Scope,
        set: &EffectivePermissionSet,
        request: &BoundaryRequest<'_>,
    ) -> Result<(), DenyReason> {
        let Some(resource_region) = request.resource_region else {
            return Ok(());
        };
        if matches!(scope, Scope::Organization | Scope::System) {
            return Ok(());
        }
        if set.scopes.regions.contains(resource_region) {
            Ok(())
        } else {
            Err(DenyReason::RegionBoundaryViolation)
        }
    }

    /// Only enforced when the actor is pinned to at least one organization.
    fn check_organization(
        &self,
        set: &EffectivePermissionSet,
        request: &BoundaryRequest<'_>,
    ) -> Result<(), DenyReason> {
        let organizations = &set.scopes.organizations;
        if organizations.is_empty() {
            return Ok(());
        }
        let targets = request
            .context
            .organization_id()
            .into_iter()
            .chain(request.target_team.and_then(|t| t.organization_id.as_deref()));
        for target in targets {
            if !organizations.contains(target) {
                return Err(DenyReason::OrganizationBoundaryViolation);
            }
        }
        Ok(())
    }
}

fn to_outcome(result: Result<(), DenyReason>) -> BoundaryOutcome {
    match result {
        Ok(()) => BoundaryOutcome::Allow,
        Err(reason) => BoundaryOutcome::Deny(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{effective::ActorScopes, permission::Permission};
    use chrono::Utc;

    fn enforcer() -> BoundaryEnforcer {
        BoundaryEnforcer::new(
            ["SYSTEM_CONFIG".to_string(), "ROLES".to_string()],
            ["REGIONAL_MANAGER".to_string()],
        )
    }

    fn effective(scopes: ActorScopes) -> EffectivePermissionSet {
        let now = Utc::now();
        EffectivePermissionSet {
            actor_id: "alice".to_string(),
            permissions: Vec::new(),
            direct_roles: BTreeSet::new(),
            roles: BTreeSet::new(),
            scopes,
            admin: false,
            cross_team: false,
            computed_at: now,
            expires_at: now,
            version: 0,
            generation: 0,
        }
    }

    fn scopes(teams: &[&str], regions: &[&str], assigned: &[&str], orgs: &[&str]) -> ActorScopes {
        let collect = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        ActorScopes {
            teams: collect(teams),
            regions: collect(regions),
            assigned_regions: collect(assigned),
            organizations: collect(orgs),
        }
    }

    fn candidate(role: &str, scope: Scope) -> ResolvedPermission {
        ResolvedPermission {
            permission: Permission::new("DEVICES", "READ", scope),
            granted_by: role.to_string(),
            role_level: 10,
            cross_team: false,
        }
    }

    fn request<'a>(ctx: &'a AccessContext, team: Option<&'a Team>) -> BoundaryRequest<'a> {
        BoundaryRequest {
            resource: "DEVICES",
            context: ctx,
            target_team: team,
            resource_region: None,
        }
    }

    #[test]
    fn test_team_scope_requires_membership() {
        let set = effective(scopes(&["T1"], &[], &[], &[]));
        let perm = candidate("TEAM_MEMBER", Scope::Team);

        let ctx = AccessContext::new().team("T1");
        assert!(enforcer().evaluate(&perm, &set, &request(&ctx, None)).is_allowed());

        let ctx = AccessContext::new().team("T2");
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, None)),
            BoundaryOutcome::Deny(DenyReason::TeamBoundaryViolation)
        );
    }

    #[test]
    fn test_user_scope_is_always_satisfied() {
        let set = effective(ActorScopes::default());
        let perm = candidate("TEAM_MEMBER", Scope::User);
        let ctx = AccessContext::new().team("T9").region("R9");
        assert!(enforcer().evaluate(&perm, &set, &request(&ctx, None)).is_allowed());
    }

    #[test]
    fn test_region_scope_uses_recorded_team_region() {
        let set = effective(scopes(&[], &["R1"], &["R1"], &[]));
        let perm = candidate("FIELD_SUPERVISOR", Scope::Region);
        let team_in_r2 = Team::new("T2").in_region("R2");

        // The caller claims R1, but T2 is recorded in R2
        let ctx = AccessContext::new().team("T2").region("R1");
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, Some(&team_in_r2))),
            BoundaryOutcome::Deny(DenyReason::RegionBoundaryViolation)
        );

        // Unknown team cannot be verified
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, None)),
            BoundaryOutcome::Deny(DenyReason::RegionBoundaryViolation)
        );

        let team_in_r1 = Team::new("T1").in_region("R1");
        let ctx = AccessContext::new().team("T1");
        assert!(
            enforcer()
                .evaluate(&perm, &set, &request(&ctx, Some(&team_in_r1)))
                .is_allowed()
        );
    }

    #[test]
    fn test_region_manager_carve_out() {
        let mut set = effective(scopes(&[], &["R1"], &["R1"], &[]));
        set.roles.insert("REGIONAL_MANAGER".to_string());
        // Inherited from a lower role, still covered by the carve-out
        let perm = candidate("TEAM_MEMBER", Scope::Team);

        // Not a member of T1, but T1 is recorded in the manager's region
        let team_in_r1 = Team::new("T1").in_region("R1");
        let ctx = AccessContext::new().team("T1");
        assert!(
            enforcer()
                .evaluate(&perm, &set, &request(&ctx, Some(&team_in_r1)))
                .is_allowed()
        );

        let team_in_r2 = Team::new("T2").in_region("R2");
        let ctx = AccessContext::new().team("T2").region("R1");
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, Some(&team_in_r2))),
            BoundaryOutcome::Deny(DenyReason::RegionBoundaryViolation)
        );

        // Without the role, the same scopes only reach member teams
        set.roles.clear();
        let ctx = AccessContext::new().team("T1");
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, Some(&team_in_r1))),
            BoundaryOutcome::Deny(DenyReason::TeamBoundaryViolation)
        );
    }

    #[test]
    fn test_cross_team_role_reaches_any_team_but_not_protected() {
        let mut set = effective(ActorScopes::default());
        set.cross_team = true;
        // Granted by a role the support role inherits from
        let perm = candidate("TEAM_MEMBER", Scope::Team);

        let ctx = AccessContext::new().team("T7");
        let team = Team::new("T7").in_region("R5");
        assert!(
            enforcer()
                .evaluate(&perm, &set, &request(&ctx, Some(&team)))
                .is_allowed()
        );

        let req = BoundaryRequest {
            resource: "ROLES",
            ..request(&ctx, None)
        };
        assert_eq!(
            enforcer().evaluate(&perm, &set, &req),
            BoundaryOutcome::Deny(DenyReason::ProtectedResourceDenied("ROLES".to_string()))
        );
    }

    #[test]
    fn test_cross_team_reach_is_never_narrower() {
        let mut set = effective(scopes(&["T1"], &["R1"], &[], &["O1"]));
        let ctx = AccessContext::new().organization("O2");
        let system = candidate("AUDITOR", Scope::System);
        assert!(enforcer().evaluate(&system, &set, &request(&ctx, None)).is_allowed());

        set.cross_team = true;
        assert!(enforcer().evaluate(&system, &set, &request(&ctx, None)).is_allowed());

        // Organization pinning still holds below system scope
        let team = candidate("TEAM_MEMBER", Scope::Team);
        assert_eq!(
            enforcer().evaluate(&team, &set, &request(&ctx, None)),
            BoundaryOutcome::Deny(DenyReason::OrganizationBoundaryViolation)
        );
    }

    #[test]
    fn test_admin_bypasses_everything() {
        let mut set = effective(scopes(&[], &[], &[], &["O1"]));
        set.admin = true;
        let perm = candidate("TEAM_MEMBER", Scope::Team);

        let ctx = AccessContext::new().team("T9").organization("O9");
        let req = BoundaryRequest {
            resource: "SYSTEM_CONFIG",
            ..request(&ctx, None)
        };
        assert!(enforcer().evaluate(&perm, &set, &req).is_allowed());
    }

    #[test]
    fn test_organization_boundary() {
        let set = effective(scopes(&["T1"], &[], &[], &["O1"]));
        let perm = candidate("ORG_VIEWER", Scope::Organization);

        let ctx = AccessContext::new().organization("O1");
        assert!(enforcer().evaluate(&perm, &set, &request(&ctx, None)).is_allowed());

        let ctx = AccessContext::new().organization("O2");
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, None)),
            BoundaryOutcome::Deny(DenyReason::OrganizationBoundaryViolation)
        );

        // A team recorded in another organization is outside as well
        let foreign = Team::new("T5").in_organization("O2");
        let ctx = AccessContext::new().team("T5");
        assert_eq!(
            enforcer().evaluate(&perm, &set, &request(&ctx, Some(&foreign))),
            BoundaryOutcome::Deny(DenyReason::OrganizationBoundaryViolation)
        );

        // Unpinned actors are not organization-bound
        let unpinned = effective(ActorScopes::default());
        assert!(
            enforcer()
                .evaluate(&perm, &unpinned, &request(&ctx, Some(&foreign)))
                .is_allowed()
        );
    }

    #[test]
    fn test_resource_region_constraint() {
        let set = effective(scopes(&["T1"], &["R1"], &[], &[]));
        let ctx = AccessContext::new().resource("P1");

        let perm = candidate("TEAM_MEMBER", Scope::Team);
        let req = BoundaryRequest {
            resource_region: Some("R2"),
            ..request(&ctx, None)
        };
        assert_eq!(
            enforcer().evaluate(&perm, &set, &req),
            BoundaryOutcome::Deny(DenyReason::RegionBoundaryViolation)
        );

        let req = BoundaryRequest {
            resource_region: Some("R1"),
            ..request(&ctx, None)
        };
        assert!(enforcer().evaluate(&perm, &set, &req).is_allowed());

        let org_wide = candidate("DIRECTOR", Scope::Organization);
        let req = BoundaryRequest {
            resource_region: Some("R2"),
            ..request(&ctx, None)
        };
        assert!(enforcer().evaluate(&org_wide, &set, &req).is_allowed());
    }
}
