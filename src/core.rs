//! The access engine.
//!
//! [`AccessEngine`] is the public entry point. A check runs through these stages:
//!
//! 1. protected resource types take the administrative-only path, never cached;
//! 2. resource types with a registered [`ResourceDelegate`] consult it first;
//! 3. the decision cache is consulted;
//! 4. the actor's effective permissions are loaded from cache or computed once per actor,
//!    with concurrent callers coalesced onto the same computation;
//! 5. matching candidates are evaluated highest role level first, boundaries before
//!    conditions, and the first allow wins.
//!
//! Every decision is logged, counted and sent to the audit sink.
//!
//! # Failure handling
//!
//! Store faults and timeouts never reach the caller of [`AccessEngine::check_permission`].
//! They are logged at error level and turned into a [`DenyReason::SystemError`] denial.
//!
//! # Caching
//!
//! Effective permission sets and decisions live for the configured TTL, or until the
//! earliest expiry among the assignments they were built from. Mutations made through the
//! store are not observed until [`AccessEngine::invalidate_cache`] or
//! [`AccessEngine::invalidate_all`] is called.

use crate::{
    audit::{AuditRecord, AuditSink, LogAuditSink},
    boundary::{BoundaryEnforcer, BoundaryOutcome, BoundaryRequest},
    cache::{DecisionKey, PermissionCache},
    clock::{Clock, SystemClock},
    conditions::ConditionEvaluator,
    config::EngineConfig,
    context::AccessContext,
    delegate::{AccessType, DelegateAccess, DelegateRouter, ResourceDelegate},
    effective::{ActorScopes, EffectivePermissionSet, PermissionAggregator},
    error::{DenyReason, Error, Result},
    hierarchy::RoleGraph,
    metrics::EngineMetrics,
    permission::Scope,
    role::{HierarchyEdge, Role, RoleAssignment},
    single_flight::SingleFlight,
    storage::RoleStore,
};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Outcome of a permission check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    /// Why access was denied. `None` on allow.
    pub reason: Option<DenyReason>,
    /// Roles (or, for delegate access, the actor or team) the access came through.
    pub granted_by: Vec<String>,
    /// Role whose grant was refused last, or the actor's highest role.
    pub denied_by: Option<String>,
    /// Scope of the permission that allowed the request.
    pub scope: Option<Scope>,
    pub access_type: Option<AccessType>,
    pub evaluation_time: Duration,
}

impl Decision {
    /// Allow through a role permission.
    pub fn allow(role: impl Into<String>, scope: Scope) -> Self {
        Self {
            allowed: true,
            reason: None,
            granted_by: vec![role.into()],
            denied_by: None,
            scope: Some(scope),
            access_type: Some(AccessType::Role),
            evaluation_time: Duration::ZERO,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            granted_by: Vec::new(),
            denied_by: None,
            scope: None,
            access_type: None,
            evaluation_time: Duration::ZERO,
        }
    }

    /// Allow through a resource delegate's assignment.
    pub fn delegated(access: DelegateAccess) -> Self {
        Self {
            allowed: true,
            reason: None,
            granted_by: access.granted_by.into_iter().collect(),
            denied_by: None,
            scope: None,
            access_type: access.access_type,
            evaluation_time: Duration::ZERO,
        }
    }

    pub fn with_denied_by(mut self, role: impl Into<String>) -> Self {
        self.denied_by = Some(role.into());
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Machine-readable reason code, `None` on allow.
    pub fn reason_code(&self) -> Option<String> {
        self.reason.as_ref().map(DenyReason::code)
    }
}

// Evaluation time differs between otherwise identical decisions.
impl PartialEq for Decision {
    fn eq(&self, other: &Self) -> bool {
        self.allowed == other.allowed
            && self.reason == other.reason
            && self.granted_by == other.granted_by
            && self.denied_by == other.denied_by
            && self.scope == other.scope
            && self.access_type == other.access_type
    }
}

/// Role-based access decision engine over a [`RoleStore`].
pub struct AccessEngine<S>
where
    S: RoleStore,
{
    store: S,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<EngineMetrics>,
    cache: PermissionCache,
    in_flight: SingleFlight<String, Arc<EffectivePermissionSet>>,
    // Loaded role graph, tagged with the cache generation it was loaded under
    graph: RwLock<Option<(u64, Arc<RoleGraph>)>>,
    graph_loads: SingleFlight<u64, Arc<RoleGraph>>,
    aggregator: PermissionAggregator,
    boundary: BoundaryEnforcer,
    conditions: ConditionEvaluator,
    delegates: DelegateRouter,
}

impl<S> AccessEngine<S>
where
    S: RoleStore,
{
    /// Create an engine with the given configuration and default collaborators.
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(store).config(config).build()
    }

    /// Start building an engine over `store`.
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder::new(store)
    }

    /// Decide whether `actor_id` may perform `action` on `resource`.
    ///
    /// Never fails: faults become a `SYSTEM_ERROR` denial.
    pub async fn check_permission(
        &self,
        actor_id: &str,
        resource: &str,
        action: &str,
        context: &AccessContext,
    ) -> Decision {
        let started = Instant::now();
        let resource = resource.trim().to_ascii_uppercase();
        let action = action.trim().to_ascii_uppercase();

        let mut decision = match self.evaluate(actor_id, &resource, &action, context).await {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    "Permission check failed for actor '{actor_id}' on {resource}:{action} \
                     (context {:?}): {err}",
                    context.fingerprint()
                );
                self.metrics.record_error(err.kind());
                Decision::deny(DenyReason::SystemError)
            }
        };
        decision.evaluation_time = started.elapsed();

        self.log_decision(actor_id, &resource, &action, &decision);
        self.metrics.record_decision(
            decision.allowed,
            decision.reason_code().as_deref(),
            decision.evaluation_time,
        );
        self.emit_audit(actor_id, &resource, &action, &decision);

        decision
    }

    /// Check several `(resource, action)` pairs for one actor in one context.
    ///
    /// The first check populates the cache for the rest.
    pub async fn check_permissions(
        &self,
        actor_id: &str,
        requests: &[(&str, &str)],
        context: &AccessContext,
    ) -> Vec<Decision> {
        let mut decisions = Vec::with_capacity(requests.len());
        for (resource, action) in requests {
            decisions.push(
                self.check_permission(actor_id, resource, action, context)
                    .await,
            );
        }
        decisions
    }

    /// The actor's effective permissions, from cache or computed.
    ///
    /// Concurrent callers for the same actor share one computation. A failed computation
    /// is never cached.
    pub async fn compute_effective_permissions(
        &self,
        actor_id: &str,
    ) -> Result<Arc<EffectivePermissionSet>> {
        if self.config.enable_caching {
            if let Some(set) = self.cache.get(actor_id, self.clock.now()) {
                self.metrics.record_cache_hit();
                return Ok(set);
            }
            self.metrics.record_cache_miss();
        }

        let flight = self
            .in_flight
            .run(actor_id.to_string(), || self.compute_and_store(actor_id))
            .await;
        if !flight.led {
            self.metrics.record_coalesced_wait();
        }
        flight.result
    }

    /// Whether the actor holds any of the named roles, directly or by inheritance.
    ///
    /// Returns `false` if the actor's roles cannot be determined.
    pub async fn has_any_role(&self, actor_id: &str, role_names: &[&str]) -> bool {
        match self.compute_effective_permissions(actor_id).await {
            Ok(set) => role_names.iter().any(|name| set.has_role(name)),
            Err(err) => {
                error!("Role lookup failed for actor '{actor_id}': {err}");
                self.metrics.record_error(err.kind());
                false
            }
        }
    }

    /// Look up a role definition by name.
    pub async fn role(&self, name: &str) -> Result<Role> {
        self.with_timeout("get_role", self.store.get_role(name))
            .await?
            .ok_or_else(|| Error::RoleNotFound(name.to_string()))
    }

    /// Drop the actor's cached permissions and decisions.
    ///
    /// Call after any mutation affecting the actor. Checks started afterwards never see
    /// pre-mutation state.
    pub fn invalidate_cache(&self, actor_id: &str) {
        self.cache.invalidate(actor_id);
        self.in_flight.forget(&actor_id.to_string());
        self.metrics.record_invalidation();
        info!("Invalidated cached permissions for actor '{actor_id}'");
    }

    /// Make every cached set and decision stale, and reload the role graph on next use.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.in_flight.forget_all();
        self.metrics.record_invalidation();
        info!(
            "Invalidated all cached permissions (generation {})",
            self.cache.generation()
        );
    }

    /// Drop the in-memory role graph after role or hierarchy edits.
    pub fn reload_hierarchy(&self) {
        *self.graph.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.invalidate_all();
        info!("Role hierarchy will be reloaded on next use");
    }

    /// Whether a set is unexpired and no invalidation happened since it was computed.
    pub fn is_valid(&self, set: &EffectivePermissionSet) -> bool {
        self.cache.is_valid(set, self.clock.now())
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    async fn evaluate(
        &self,
        actor_id: &str,
        resource: &str,
        action: &str,
        context: &AccessContext,
    ) -> Result<Decision> {
        if self.boundary.is_protected(resource) {
            return self.evaluate_protected(actor_id, resource).await;
        }

        let mut resource_region = None;
        if let Some(delegate) = self.delegates.get(resource)
            && let Some(resource_id) = context.resource_id()
        {
            let access = self
                .with_timeout(
                    "check_assignment_access",
                    delegate.check_assignment_access(actor_id, resource_id, action),
                )
                .await?;
            if access.allowed {
                return Ok(Decision::delegated(access));
            }
            resource_region = self
                .with_timeout("resource_region", delegate.resource_region(resource_id))
                .await?;
        }

        let now = self.clock.now();
        let key = self
            .config
            .enable_caching
            .then(|| DecisionKey::new(actor_id, resource, action, context.fingerprint()));
        if let Some(key) = &key
            && let Some(decision) = self.cache.get_decision(key, now)
        {
            self.metrics.record_decision_cache_hit();
            return Ok(decision);
        }

        let stamp = self.cache.stamp(actor_id);
        let set = self.compute_effective_permissions(actor_id).await?;
        let (decision, time_dependent) = self
            .decide(&set, resource, action, context, resource_region.as_deref(), now)
            .await?;

        if let Some(key) = key
            && !time_dependent
            && set.version == stamp.version
            && set.generation == stamp.generation
        {
            let expires_at = set.expires_at.min(self.cache.expiry_from(now));
            self.cache
                .put_decision(key, decision.clone(), stamp, expires_at);
        }

        Ok(decision)
    }

    /// Protected resource types: only the administrative role passes.
    async fn evaluate_protected(&self, actor_id: &str, resource: &str) -> Result<Decision> {
        let now = self.clock.now();
        let graph = self.role_graph().await?;
        let assignments = self
            .with_timeout(
                "list_live_assignments",
                self.store.list_live_assignments(actor_id, now),
            )
            .await?;

        let roles = graph.resolve(
            assignments
                .iter()
                .filter(|a| a.is_live(now))
                .filter_map(|a| graph.role_by_id(a.role_id()))
                .map(Role::name),
        );
        let held: Vec<&Role> = roles.iter().filter_map(|n| graph.role_by_name(n)).collect();
        if held.is_empty() {
            return Ok(Decision::deny(DenyReason::NoRoles));
        }

        if let Some(admin) = held.iter().find(|role| self.aggregator.is_admin(role)) {
            return Ok(Decision::allow(admin.name(), Scope::System));
        }

        let mut decision = Decision::deny(DenyReason::ProtectedResourceDenied(resource.to_string()));
        if let Some(highest) = held.iter().max_by_key(|role| role.level()) {
            decision = decision.with_denied_by(highest.name());
        }
        Ok(decision)
    }

    /// Match candidates against boundaries and conditions. Also reports whether any
    /// evaluated candidate carried clock-dependent conditions.
    async fn decide(
        &self,
        set: &EffectivePermissionSet,
        resource: &str,
        action: &str,
        context: &AccessContext,
        resource_region: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Decision, bool)> {
        if set.roles.is_empty() {
            return Ok((Decision::deny(DenyReason::NoRoles), false));
        }
        if set.permissions.is_empty() {
            return Ok((Decision::deny(DenyReason::NoPermissions), false));
        }

        let candidates: Vec<_> = set.candidates(resource, action).collect();
        if candidates.is_empty() {
            return Ok((Decision::deny(DenyReason::NoPermission), false));
        }

        let target_team = match context.team_id() {
            Some(team_id) => {
                self.with_timeout("get_team", self.store.get_team(team_id))
                    .await?
            }
            None => None,
        };
        let request = BoundaryRequest {
            resource,
            context,
            target_team: target_team.as_ref(),
            resource_region,
        };
        let at = context.request_time().unwrap_or(now);

        let mut time_dependent = false;
        let mut last_denial: Option<(DenyReason, &str)> = None;
        for candidate in candidates {
            if let BoundaryOutcome::Deny(reason) = self.boundary.evaluate(candidate, set, &request) {
                last_denial = Some((reason, candidate.granted_by.as_str()));
                continue;
            }

            if let Some(conditions) = candidate.permission.conditions() {
                time_dependent |= conditions.is_time_dependent();
                if let Err(failure) =
                    self.conditions
                        .evaluate(conditions, at, context.network_origin())
                {
                    last_denial = Some((
                        DenyReason::ContextDenied(failure),
                        candidate.granted_by.as_str(),
                    ));
                    continue;
                }
            }

            let decision = Decision::allow(&candidate.granted_by, candidate.permission.scope());
            return Ok((decision, time_dependent));
        }

        let decision = match last_denial {
            Some((reason, role)) => Decision::deny(reason).with_denied_by(role),
            None => Decision::deny(DenyReason::NoPermission),
        };
        Ok((decision, time_dependent))
    }

    async fn compute_and_store(&self, actor_id: &str) -> Result<Arc<EffectivePermissionSet>> {
        // Taken first: an invalidation during the computation makes the result stale.
        let stamp = self.cache.stamp(actor_id);
        let now = self.clock.now();
        self.metrics.record_computation();

        let graph = self.role_graph().await?;
        let assignments: Vec<RoleAssignment> = self
            .with_timeout(
                "list_live_assignments",
                self.store.list_live_assignments(actor_id, now),
            )
            .await?
            .into_iter()
            .filter(|a| a.is_live(now))
            .collect();

        let direct_roles: BTreeSet<String> = assignments
            .iter()
            .filter_map(|a| graph.role_by_id(a.role_id()))
            .map(|role| role.name().to_string())
            .collect();
        let roles = graph.resolve(direct_roles.iter().map(String::as_str));

        let role_ids: Vec<String> = roles
            .iter()
            .filter_map(|name| graph.role_by_name(name))
            .map(|role| role.id().to_string())
            .collect();
        let grants = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.with_timeout(
                "list_permissions_for_roles",
                self.store.list_permissions_for_roles(&role_ids),
            )
            .await?
        };
        let permissions = self.aggregator.aggregate(&graph, &roles, &grants);
        let admin = self.aggregator.holds_admin_role(&graph, &roles);
        let cross_team = self.aggregator.holds_cross_team_role(&roles);
        let scopes = self.collect_scopes(actor_id, &assignments).await?;

        // A lapsing assignment must stop contributing when it expires, not at TTL.
        let expires_at = assignments
            .iter()
            .filter_map(RoleAssignment::expiry)
            .fold(self.cache.expiry_from(now), |earliest, expiry| earliest.min(expiry));

        let set = Arc::new(EffectivePermissionSet {
            actor_id: actor_id.to_string(),
            permissions,
            direct_roles,
            roles,
            scopes,
            admin,
            cross_team,
            computed_at: now,
            expires_at,
            version: stamp.version,
            generation: stamp.generation,
        });

        debug!(
            "Computed effective permissions for actor '{actor_id}': {} roles, {} permissions",
            set.roles.len(),
            set.permissions.len()
        );

        if self.config.enable_caching && !self.cache.put(set.clone(), now) {
            debug!("Discarded stale effective permissions for actor '{actor_id}'");
        }
        Ok(set)
    }

    /// Teams, regions and organizations reachable from assignments and memberships.
    /// Team regions and organizations come from the directory, never from the request.
    async fn collect_scopes(
        &self,
        actor_id: &str,
        assignments: &[RoleAssignment],
    ) -> Result<ActorScopes> {
        let mut scopes = ActorScopes::default();
        for assignment in assignments {
            if let Some(team) = assignment.team_id() {
                scopes.teams.insert(team.to_string());
            }
            if let Some(region) = assignment.region_id() {
                scopes.regions.insert(region.to_string());
                scopes.assigned_regions.insert(region.to_string());
            }
            if let Some(organization) = assignment.organization_id() {
                scopes.organizations.insert(organization.to_string());
            }
        }

        let memberships = self
            .with_timeout(
                "list_team_memberships",
                self.store.list_team_memberships(actor_id),
            )
            .await?;
        scopes.teams.extend(memberships);

        for team_id in &scopes.teams {
            let Some(team) = self
                .with_timeout("get_team", self.store.get_team(team_id))
                .await?
            else {
                continue;
            };
            if let Some(region) = team.region_id {
                scopes.regions.insert(region);
            }
            if let Some(organization) = team.organization_id {
                scopes.organizations.insert(organization);
            }
        }

        Ok(scopes)
    }

    async fn role_graph(&self) -> Result<Arc<RoleGraph>> {
        let generation = self.cache.generation();
        if let Some(graph) = self.loaded_graph(generation) {
            return Ok(graph);
        }
        self.graph_loads
            .run(generation, || self.load_graph(generation))
            .await
            .result
    }

    fn loaded_graph(&self, generation: u64) -> Option<Arc<RoleGraph>> {
        let slot = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|(loaded, _)| *loaded == generation)
            .map(|(_, graph)| graph.clone())
    }

    async fn load_graph(&self, generation: u64) -> Result<Arc<RoleGraph>> {
        let roles = self
            .with_timeout("list_roles", self.store.list_roles())
            .await?;
        let mut edges: Vec<HierarchyEdge> = self
            .with_timeout("hierarchy_edges", self.store.hierarchy_edges())
            .await?;
        edges.extend(self.config.hierarchy_edges.iter().cloned());

        let graph = RoleGraph::new(roles, edges, self.config.max_hierarchy_depth);
        let cycles = graph.roles_in_cycles();
        if !cycles.is_empty() {
            warn!("Role hierarchy contains cycles through {cycles:?}");
        }
        info!("Loaded role hierarchy with {} roles", graph.role_count());

        let graph = Arc::new(graph);
        let mut slot = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_none_or(|(loaded, _)| *loaded <= generation) {
            *slot = Some((generation, graph.clone()));
        }
        Ok(graph)
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout(), future).await {
            Ok(result) => result,
            Err(_) => Err(Error::StoreTimeout {
                operation,
                timeout_ms: self.config.store_timeout_ms,
            }),
        }
    }

    fn log_decision(&self, actor_id: &str, resource: &str, action: &str, decision: &Decision) {
        match &decision.reason {
            None => debug!(
                "Access granted: actor '{actor_id}' {resource}:{action} via {:?}",
                decision.granted_by
            ),
            Some(reason) if reason.is_boundary_violation() => warn!(
                "Access denied: actor '{actor_id}' {resource}:{action} ({reason}, role {})",
                decision.denied_by.as_deref().unwrap_or("-")
            ),
            // Already logged with the underlying fault.
            Some(DenyReason::SystemError) => {}
            Some(reason) => debug!("Access denied: actor '{actor_id}' {resource}:{action} ({reason})"),
        }
    }

    fn emit_audit(&self, actor_id: &str, resource: &str, action: &str, decision: &Decision) {
        let mut record = AuditRecord::new(actor_id, resource, action, decision.allowed);
        record.timestamp = self.clock.now();
        record.reason = decision.reason.as_ref().map(ToString::to_string);
        record.role = decision
            .granted_by
            .first()
            .cloned()
            .or_else(|| decision.denied_by.clone());
        record.granted_by = decision.granted_by.clone();
        record.access_type = decision.access_type;
        record.evaluation_time_ms = decision.evaluation_time.as_secs_f64() * 1000.0;
        record.flagged_for_review = decision
            .reason
            .as_ref()
            .is_some_and(DenyReason::is_boundary_violation);
        self.audit.record(record);
    }
}

/// Builder for [`AccessEngine`].
pub struct EngineBuilder<S>
where
    S: RoleStore,
{
    store: S,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<EngineMetrics>,
    delegates: DelegateRouter,
}

impl<S> EngineBuilder<S>
where
    S: RoleStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            audit: Arc::new(LogAuditSink),
            metrics: Arc::new(EngineMetrics::new()),
            delegates: DelegateRouter::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.config.enable_caching = enabled;
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.config.max_hierarchy_depth = depth;
        self
    }

    pub fn protected_resources<I, T>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.protected_resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn admin_roles<I, T>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.admin_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn cross_team_roles<I, T>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.cross_team_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn region_manager_roles<I, T>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.region_manager_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Add a `child -> parent` inheritance edge on top of the store's edge table.
    pub fn hierarchy_edge(mut self, child: &str, parent: &str) -> Self {
        self.config
            .hierarchy_edges
            .push(HierarchyEdge::new(child, parent));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Share a metrics collector with other components.
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Consult `delegate` before role-based checks for `resource_type`.
    pub fn register_delegate(
        mut self,
        resource_type: &str,
        delegate: Arc<dyn ResourceDelegate>,
    ) -> Self {
        self.delegates.register(resource_type, delegate);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<AccessEngine<S>> {
        self.config.validate()?;
        let config = self.config;

        Ok(AccessEngine {
            store: self.store,
            cache: PermissionCache::new(config.cache_ttl()),
            in_flight: SingleFlight::new(),
            graph: RwLock::new(None),
            graph_loads: SingleFlight::new(),
            aggregator: PermissionAggregator::new(
                config.cross_team_roles.iter().cloned(),
                config.admin_roles.iter().cloned(),
            ),
            boundary: BoundaryEnforcer::new(
                config.protected_resources.iter().cloned(),
                config.region_manager_roles.iter().cloned(),
            ),
            conditions: ConditionEvaluator,
            delegates: self.delegates,
            clock: self.clock,
            audit: self.audit,
            metrics: self.metrics,
            config,
        })
    }
}
