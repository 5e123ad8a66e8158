//! Error and denial-reason types for the access engine.
//!
//! Two families live here. [`Error`] is a fault: something went wrong while reading the
//! store or computing permissions. [`DenyReason`] is an ordinary outcome of a permission
//! check. Faults never reach callers of [`check_permission`](crate::core::AccessEngine::check_permission);
//! the engine converts them into a [`DenyReason::SystemError`] denial.

use std::fmt;
use thiserror::Error;

/// The main error type for engine and store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Role with the given name or id was not found.
    #[error("Role '{0}' not found")]
    RoleNotFound(String),

    /// A store read failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// A store read did not complete within the configured timeout.
    #[error("Store operation '{operation}' timed out after {timeout_ms}ms")]
    StoreTimeout {
        /// Name of the store operation.
        operation: &'static str,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A permission condition could not be interpreted.
    #[error("Invalid permission condition: {0}")]
    InvalidCondition(String),

    /// Serialization error.
    #[cfg(feature = "persistence")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::RoleNotFound(_) => "role_not_found",
            Error::Storage(_) => "storage",
            Error::StoreTimeout { .. } => "store_timeout",
            Error::InvalidConfiguration(_) => "invalid_configuration",
            Error::InvalidCondition(_) => "invalid_condition",
            #[cfg(feature = "persistence")]
            Error::Serialization(_) => "serialization",
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which contextual condition rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionFailure {
    /// Request time is outside the permission's time-of-day window.
    TimeWindow,
    /// Request day is not one of the allowed weekdays.
    DayOfWeek,
    /// Request origin is not in the allowed network list.
    NetworkOrigin,
    /// The permission restricts origins but the request carried none.
    MissingOrigin,
}

impl ConditionFailure {
    /// Machine-readable detail code.
    pub fn code(&self) -> &'static str {
        match self {
            ConditionFailure::TimeWindow => "TIME_WINDOW",
            ConditionFailure::DayOfWeek => "DAY_OF_WEEK",
            ConditionFailure::NetworkOrigin => "NETWORK_ORIGIN",
            ConditionFailure::MissingOrigin => "MISSING_ORIGIN",
        }
    }
}

/// Reason attached to a denied decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The actor has no live role assignments.
    NoRoles,
    /// The actor's roles grant no permissions at all.
    NoPermissions,
    /// No held permission matches the requested resource and action.
    NoPermission,
    /// Target team is outside the actor's accessible teams.
    TeamBoundaryViolation,
    /// Target region is outside the actor's accessible regions.
    RegionBoundaryViolation,
    /// Target organization is outside the actor's organizations.
    OrganizationBoundaryViolation,
    /// Access to a protected resource type was refused. Holds the resource type.
    ProtectedResourceDenied(String),
    /// A contextual condition failed.
    ContextDenied(ConditionFailure),
    /// Store or internal failure. Never carries the underlying detail.
    SystemError,
}

impl DenyReason {
    /// Machine-readable reason code.
    pub fn code(&self) -> String {
        match self {
            DenyReason::NoRoles => "NO_ROLES".to_string(),
            DenyReason::NoPermissions => "NO_PERMISSIONS".to_string(),
            DenyReason::NoPermission => "NO_PERMISSION".to_string(),
            DenyReason::TeamBoundaryViolation => "TEAM_BOUNDARY_VIOLATION".to_string(),
            DenyReason::RegionBoundaryViolation => "REGION_BOUNDARY_VIOLATION".to_string(),
            DenyReason::OrganizationBoundaryViolation => {
                "ORGANIZATION_BOUNDARY_VIOLATION".to_string()
            }
            DenyReason::ProtectedResourceDenied(resource) => {
                format!("{}_ACCESS_DENIED", resource.to_uppercase())
            }
            DenyReason::ContextDenied(_) => "CONTEXT_DENIED".to_string(),
            DenyReason::SystemError => "SYSTEM_ERROR".to_string(),
        }
    }

    /// Whether this denial crossed a boundary and should be reviewed.
    pub fn is_boundary_violation(&self) -> bool {
        matches!(
            self,
            DenyReason::TeamBoundaryViolation
                | DenyReason::RegionBoundaryViolation
                | DenyReason::OrganizationBoundaryViolation
                | DenyReason::ProtectedResourceDenied(_)
        )
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::ContextDenied(failure) => {
                write!(f, "CONTEXT_DENIED:{}", failure.code())
            }
            other => f.write_str(&other.code()),
        }
    }
}
