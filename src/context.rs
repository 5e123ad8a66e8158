//! Request context for a permission check.
//!
//! Each scope dimension is an explicit optional field. An absent field means the request
//! does not target anything on that axis.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Target and environment of a permission check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct AccessContext {
    team_id: Option<String>,
    region_id: Option<String>,
    organization_id: Option<String>,
    resource_id: Option<String>,
    network_origin: Option<IpAddr>,
    request_time: Option<DateTime<Utc>>,
}

impl AccessContext {
    /// An empty context: no targets, engine clock time, unknown origin.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Region targeted by the request. When a team is also given, the team's recorded
    /// region is what boundary checks trust.
    pub fn region(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn origin(mut self, origin: IpAddr) -> Self {
        self.network_origin = Some(origin);
        self
    }

    /// Evaluate time conditions at `time` instead of the engine clock.
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.request_time = Some(time);
        self
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

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn network_origin(&self) -> Option<IpAddr> {
        self.network_origin
    }

    pub fn request_time(&self) -> Option<DateTime<Utc>> {
        self.request_time
    }

    /// Decision cache key for this context. Request time is excluded; time-dependent
    /// decisions are never cached.
    pub fn fingerprint(&self) -> ContextFingerprint {
        ContextFingerprint {
            team_id: self.team_id.clone(),
            region_id: self.region_id.clone(),
            organization_id: self.organization_id.clone(),
            resource_id: self.resource_id.clone(),
            network_origin: self.network_origin,
        }
    }
}

/// The cache-relevant fields of an [`AccessContext`], compared field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContextFingerprint {
    pub team_id: Option<String>,
    pub region_id: Option<String>,
    pub organization_id: Option<String>,
    pub resource_id: Option<String>,
    pub network_origin: Option<IpAddr>,
}
