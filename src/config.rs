//! Engine configuration.
//!
//! Everything deployment-specific is supplied here at construction time: cache TTL,
//! store timeout, protected resource types, the administrative, cross-team and
//! region-manager role names, and extra hierarchy edges.

use crate::{
    error::{Error, Result},
    role::HierarchyEdge,
};
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the access engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persistence", serde(default))]
pub struct EngineConfig {
    /// Lifetime of cached effective permissions and decisions, in seconds.
    pub cache_ttl_seconds: u64,
    /// Whether to cache effective permissions and decisions.
    pub enable_caching: bool,
    /// Upper bound for a single store read, in milliseconds.
    pub store_timeout_ms: u64,
    /// Maximum inheritance depth followed during role expansion.
    pub max_hierarchy_depth: usize,
    /// Resource types only the administrative role may touch.
    pub protected_resources: Vec<String>,
    /// Top-level administrative role names. The role must also be flagged as a system role.
    pub admin_roles: Vec<String>,
    /// Roles with operational access across all teams and regions.
    pub cross_team_roles: Vec<String>,
    /// Roles whose team access is bound to their assigned regions.
    pub region_manager_roles: Vec<String>,
    /// Inheritance edges merged with the store's edge table.
    pub hierarchy_edges: Vec<HierarchyEdge>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300, // 5 minutes
            enable_caching: true,
            store_timeout_ms: 5_000,
            max_hierarchy_depth: 16,
            protected_resources: vec![
                "SYSTEM_CONFIG".to_string(),
                "ROLES".to_string(),
                "PERMISSIONS".to_string(),
            ],
            admin_roles: vec!["SUPER_ADMIN".to_string()],
            cross_team_roles: vec!["SUPPORT".to_string()],
            region_manager_roles: vec!["REGIONAL_MANAGER".to_string()],
            hierarchy_edges: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Reject configurations the engine cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.enable_caching && self.cache_ttl_seconds == 0 {
            return Err(Error::InvalidConfiguration(
                "cache_ttl_seconds must be positive when caching is enabled".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "store_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_hierarchy_depth == 0 {
            return Err(Error::InvalidConfiguration(
                "max_hierarchy_depth must be positive".to_string(),
            ));
        }

        let names = self
            .protected_resources
            .iter()
            .chain(&self.admin_roles)
            .chain(&self.cross_team_roles)
            .chain(&self.region_manager_roles);
        for name in names {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfiguration(
                    "role and resource names cannot be empty".to_string(),
                ));
            }
        }

        let admins: HashSet<&String> = self.admin_roles.iter().collect();
        if let Some(role) = self.cross_team_roles.iter().find(|r| admins.contains(r)) {
            return Err(Error::InvalidConfiguration(format!(
                "role '{role}' cannot be both administrative and cross-team"
            )));
        }

        for edge in &self.hierarchy_edges {
            if edge.child == edge.parent {
                return Err(Error::InvalidConfiguration(format!(
                    "role '{}' cannot inherit from itself",
                    edge.child
                )));
            }
        }

        Ok(())
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    #[cfg(feature = "persistence")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
