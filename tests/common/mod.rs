//! Shared fixtures for the integration test crates.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scoped_rbac::{
    Error, HierarchyEdge, MemoryStore, Permission, Result, Role, RoleAssignment,
    RolePermission, RoleStore, Scope, Team,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A small field-operations organization:
///
/// ```text
/// REGIONAL_MANAGER -> FIELD_SUPERVISOR -> TEAM_MEMBER
/// T1, T2 in R1; T3 in R2; all in O1
/// ```
pub fn field_ops_store() -> MemoryStore {
    let store = MemoryStore::new();

    store.upsert_role(Role::with_id("r-tm", "TEAM_MEMBER", 10));
    store.upsert_role(Role::with_id("r-fs", "FIELD_SUPERVISOR", 20));
    store.upsert_role(Role::with_id("r-rm", "REGIONAL_MANAGER", 30));
    store.upsert_role(Role::with_id("r-oa", "ORG_ADMIN", 40));
    store.upsert_role(Role::with_id("r-sp", "SUPPORT", 25));
    store.upsert_role(Role::with_id("r-sa", "SUPER_ADMIN", 100).system());
    store.upsert_role(Role::with_id("r-empty", "OBSERVER", 5));
    store.upsert_role(Role::with_id("r-trainee", "TRAINEE", 1));

    store.add_edge("REGIONAL_MANAGER", "FIELD_SUPERVISOR");
    store.add_edge("FIELD_SUPERVISOR", "TEAM_MEMBER");

    store.grant_permission("r-tm", Permission::new("DEVICES", "READ", Scope::Team));
    store.grant_permission("r-tm", Permission::new("REPORTS", "READ", Scope::User));
    store.grant_permission("r-tm", Permission::new("PROJECTS", "READ", Scope::Team));
    store.grant_permission("r-fs", Permission::new("DEVICES", "UPDATE", Scope::Team));
    store.grant_permission("r-fs", Permission::new("INSPECTIONS", "APPROVE", Scope::Region));
    store.grant_permission("r-rm", Permission::new("SCHEDULES", "UPDATE", Scope::Team));
    store.grant_permission("r-oa", Permission::manage("DEVICES", Scope::Organization));

    store.grant_permission("r-sp", Permission::new("DEVICES", "READ", Scope::Team));
    store.grant_permission("r-sp", Permission::new("DEVICES", "UPDATE", Scope::Region));
    store.grant_permission("r-sp", Permission::manage("ROLES", Scope::System));
    store.grant_permission("r-sp", Permission::new("SYSTEM_CONFIG", "READ", Scope::System));
    store.grant_permission("r-sp", Permission::new("PERMISSIONS", "READ", Scope::System));

    store.grant_permission("r-sa", Permission::new("DEVICES", "READ", Scope::Team));

    store.upsert_team(Team::new("T1").in_region("R1").in_organization("O1"));
    store.upsert_team(Team::new("T2").in_region("R1").in_organization("O1"));
    store.upsert_team(Team::new("T3").in_region("R2").in_organization("O1"));

    store
}

/// Wraps a [`MemoryStore`] with injectable failures and latency.
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    failing: AtomicBool,
    delay_ms: AtomicUsize,
    assignment_reads: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every read by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Number of assignment reads that reached the store.
    pub fn assignment_reads(&self) -> usize {
        self.assignment_reads.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage(
                "connection to db-primary.internal:5432 refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for FaultyStore {
    async fn list_live_assignments(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>> {
        self.assignment_reads.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.list_live_assignments(actor_id, now).await
    }

    async fn list_permissions_for_roles(&self, role_ids: &[String]) -> Result<Vec<RolePermission>> {
        self.gate().await?;
        self.inner.list_permissions_for_roles(role_ids).await
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        self.gate().await?;
        self.inner.get_role(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.gate().await?;
        self.inner.list_roles().await
    }

    async fn hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>> {
        self.gate().await?;
        self.inner.hierarchy_edges().await
    }

    async fn get_team(&self, team_id: &str) -> Result<Option<Team>> {
        self.gate().await?;
        self.inner.get_team(team_id).await
    }

    async fn list_team_memberships(&self, actor_id: &str) -> Result<Vec<String>> {
        self.gate().await?;
        self.inner.list_team_memberships(actor_id).await
    }
}
