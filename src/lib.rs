//! # Scoped RBAC
//!
//! A role-based access decision engine with hierarchical roles, scoped permissions and
//! team/region/organization boundary enforcement.
//!
//! ## Features
//!
//! - Role inheritance resolved in memory, tolerant of cycles
//! - Permissions scoped to user, team, region, organization or system
//! - Boundary checks verified against the directory, never against caller claims
//! - Administrative, cross-team and region-manager role carve-outs
//! - Time-window, weekday and network-origin conditions
//! - Resource delegates for assignment-based access models
//! - Per-actor caching with explicit invalidation and single-flight computation
//! - Fail-secure: store faults and timeouts deny
//! - Audit trail of every decision
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_rbac::{
//!     AccessContext, AccessEngine, EngineConfig, MemoryStore, Permission, Role,
//!     RoleAssignment, Scope,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), scoped_rbac::Error> {
//! let store = MemoryStore::new();
//! store.upsert_role(Role::with_id("r-tm", "TEAM_MEMBER", 10));
//! store.grant_permission("r-tm", Permission::new("DEVICES", "READ", Scope::Team));
//! store.assign_role(RoleAssignment::new("alice", "r-tm").in_team("T1"));
//!
//! let engine = AccessEngine::new(store, EngineConfig::default())?;
//!
//! let decision = engine
//!     .check_permission("alice", "DEVICES", "READ", &AccessContext::new().team("T1"))
//!     .await;
//! assert!(decision.allowed);
//!
//! let decision = engine
//!     .check_permission("alice", "DEVICES", "READ", &AccessContext::new().team("T2"))
//!     .await;
//! assert_eq!(decision.reason_code().as_deref(), Some("TEAM_BOUNDARY_VIOLATION"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Audit Logging
//!
//! Diagnostics go through the `log` facade and every decision is handed to an
//! [`AuditSink`]. The default sink writes to the `access_audit` log target. With the
//! `audit` feature enabled, a logger can be installed with:
//!
//! ```rust
//! use scoped_rbac::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,access_audit=info,scoped_rbac=debug
//! ```
//!
//! Store faults are logged at error level, boundary violations at warn level and are
//! flagged for review, ordinary decisions at debug level.

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    // A second call is a no-op instead of a panic.
    let _ = env_logger::try_init();
}

pub mod audit;
pub mod boundary;
pub mod cache;
pub mod clock;
pub mod conditions;
pub mod config;
pub mod context;
pub mod core;
pub mod delegate;
pub mod effective;
pub mod error;
pub mod hierarchy;
pub mod metrics;
pub mod permission;
pub mod role;
pub mod single_flight;
pub mod storage;

#[cfg(test)]
mod property_tests;

// Re-export main types for convenience
pub use crate::{
    audit::{AuditRecord, AuditSink, ChannelAuditSink, LogAuditSink, MemoryAuditSink, NoopAuditSink},
    boundary::{BoundaryEnforcer, BoundaryOutcome},
    clock::{Clock, ManualClock, SystemClock},
    conditions::{ConditionEvaluator, OriginRule, PermissionConditions, TimeWindow},
    config::EngineConfig,
    context::{AccessContext, ContextFingerprint},
    core::{AccessEngine, Decision, EngineBuilder},
    delegate::{AccessType, AssignmentDelegate, DelegateAccess, ResourceDelegate},
    effective::{ActorScopes, EffectivePermissionSet},
    error::{ConditionFailure, DenyReason, Error, Result},
    hierarchy::RoleGraph,
    metrics::{EngineMetrics, MetricsSummary},
    permission::{MANAGE_ACTION, Permission, ResolvedPermission, Scope},
    role::{HierarchyEdge, Role, RoleAssignment, RolePermission, Team},
    storage::{MemoryStore, RoleStore},
};
