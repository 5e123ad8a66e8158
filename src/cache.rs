//! Per-actor caching of effective permissions and decisions.
//!
//! A cached value is valid only while it is unexpired and its stamp matches the latest
//! invalidation stamp: the actor's version and the engine-wide generation. Invalidation
//! bumps the stamp before dropping entries, so a value computed concurrently against the
//! old stamp is stale the moment anybody looks at it.

use crate::{context::ContextFingerprint, core::Decision, effective::EffectivePermissionSet};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key of a single cached decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub actor_id: String,
    pub resource: String,
    pub action: String,
    pub context: ContextFingerprint,
}

impl DecisionKey {
    pub fn new(actor_id: &str, resource: &str, action: &str, context: ContextFingerprint) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            context,
        }
    }
}

/// Invalidation stamp a cached value was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStamp {
    pub version: u64,
    pub generation: u64,
}

/// A cached decision with its own expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub decision: Decision,
    pub stamp: CacheStamp,
    pub expires_at: DateTime<Utc>,
}

/// Cache of effective permission sets and decisions, keyed by actor.
#[derive(Debug)]
pub struct PermissionCache {
    ttl: Duration,
    sets: DashMap<String, Arc<EffectivePermissionSet>>,
    decisions: DashMap<DecisionKey, CacheEntry>,
    versions: DashMap<String, u64>,
    generation: AtomicU64,
}

impl PermissionCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            sets: DashMap::new(),
            decisions: DashMap::new(),
            versions: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When a value computed at `now` expires.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Current invalidation stamp for the actor.
    pub fn stamp(&self, actor_id: &str) -> CacheStamp {
        CacheStamp {
            version: self.versions.get(actor_id).map(|v| *v).unwrap_or(0),
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    /// Whether a set is unexpired and computed against the current stamp.
    pub fn is_valid(&self, set: &EffectivePermissionSet, now: DateTime<Utc>) -> bool {
        !set.is_expired(now)
            && self.stamp(&set.actor_id)
                == CacheStamp {
                    version: set.version,
                    generation: set.generation,
                }
    }

    pub fn get(&self, actor_id: &str, now: DateTime<Utc>) -> Option<Arc<EffectivePermissionSet>> {
        let set = self.sets.get(actor_id).map(|entry| entry.value().clone())?;
        if self.is_valid(&set, now) {
            return Some(set);
        }
        self.sets
            .remove_if(actor_id, |_, current| Arc::ptr_eq(current, &set));
        None
    }

    /// Store a set unless it is already stale.
    pub fn put(&self, set: Arc<EffectivePermissionSet>, now: DateTime<Utc>) -> bool {
        if !self.is_valid(&set, now) {
            return false;
        }
        self.sets.insert(set.actor_id.clone(), set);
        true
    }

    pub fn get_decision(&self, key: &DecisionKey, now: DateTime<Utc>) -> Option<Decision> {
        let entry = self.decisions.get(key).map(|entry| entry.value().clone())?;
        if now < entry.expires_at && entry.stamp == self.stamp(&key.actor_id) {
            return Some(entry.decision);
        }
        self.decisions.remove(key);
        None
    }

    pub fn put_decision(
        &self,
        key: DecisionKey,
        decision: Decision,
        stamp: CacheStamp,
        expires_at: DateTime<Utc>,
    ) {
        if stamp != self.stamp(&key.actor_id) {
            return;
        }
        self.decisions.insert(
            key,
            CacheEntry {
                decision,
                stamp,
                expires_at,
            },
        );
    }

    /// Drop the actor's cached values and make any copy held elsewhere stale.
    pub fn invalidate(&self, actor_id: &str) {
        self.versions
            .entry(actor_id.to_string())
            .and_modify(|v| *v += 1)
            .or_insert(1);
        self.sets.remove(actor_id);
        self.decisions.retain(|key, _| key.actor_id != actor_id);
    }

    /// Make every cached value stale.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.sets.clear();
        self.decisions.clear();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) {
        self.sets.retain(|_, set| !set.is_expired(now));
        self.decisions.retain(|_, entry| now < entry.expires_at);
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_sets: self.sets.len(),
            cached_decisions: self.decisions.len(),
            tracked_actors: self.versions.len(),
            generation: self.generation(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_sets: usize,
    pub cached_decisions: usize,
    /// Actors that have been invalidated at least once.
    pub tracked_actors: usize,
    pub generation: u64,
}
