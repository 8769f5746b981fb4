//! Last-known-good instance snapshot.
//!
//! # Responsibilities
//! - Hold the current instance snapshot and publish replacements atomically
//! - Filter instances by status and heartbeat age on every resolution
//! - Track staleness when the registry cannot be reached
//! - Broadcast change events to subscribers
//!
//! # Design Decisions
//! - Snapshots are immutable and swapped through ArcSwap (no torn reads)
//! - Instances are ordered by id so the resolved set is stable across syncs

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use crate::registry::{
    RegistryClient, RegistryEvent, RegistryStatus, Resolution, ServiceInstance,
};

/// An immutable view of every known instance, grouped by service.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub version: u64,
    pub services: HashMap<String, Arc<[Arc<ServiceInstance>]>>,
    /// When this snapshot was fetched; None before the first sync.
    pub synced_at: Option<Instant>,
}

/// Registry client backed by a swappable snapshot.
#[derive(Debug)]
pub struct InstanceCache {
    snapshot: ArcSwap<Snapshot>,
    stale: AtomicBool,
    versions: AtomicU64,
    missed_heartbeats: u32,
    events: broadcast::Sender<RegistryEvent>,
}

impl InstanceCache {
    pub fn new(missed_heartbeats: u32) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            stale: AtomicBool::new(false),
            versions: AtomicU64::new(0),
            missed_heartbeats: missed_heartbeats.max(1),
            events,
        }
    }

    /// Replace the snapshot with a freshly fetched instance list.
    pub fn replace(&self, instances: Vec<ServiceInstance>) {
        let mut grouped: HashMap<String, Vec<Arc<ServiceInstance>>> = HashMap::new();
        for instance in instances {
            grouped
                .entry(instance.service.clone())
                .or_default()
                .push(Arc::new(instance));
        }

        let services: HashMap<String, Arc<[Arc<ServiceInstance>]>> = grouped
            .into_iter()
            .map(|(service, mut list)| {
                list.sort_by(|a, b| a.id.cmp(&b.id));
                list.dedup_by(|a, b| a.id == b.id);
                (service, Arc::from(list))
            })
            .collect();

        let version = self.versions.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.snapshot.swap(Arc::new(Snapshot {
            version,
            services,
            synced_at: Some(Instant::now()),
        }));
        let was_stale = self.stale.swap(false, Ordering::Relaxed);
        if was_stale {
            tracing::info!(version, "Registry reachable again, snapshot refreshed");
        }

        let current = self.snapshot.load();
        let (changed, removed) = diff(&previous, &current);
        if !changed.is_empty() {
            tracing::debug!(version, services = ?changed, "Registry snapshot changed");
        }
        // No subscribers is fine.
        let _ = self.events.send(RegistryEvent::Synced {
            version,
            changed_services: changed,
            removed_instances: removed,
        });
    }

    /// Keep serving the current snapshot but flag it as stale.
    pub fn mark_stale(&self) {
        if !self.stale.swap(true, Ordering::Relaxed) {
            tracing::warn!("Registry unreachable, serving last-known-good snapshot");
            let _ = self.events.send(RegistryEvent::Stale);
        }
    }

    /// Resolution evaluated against an explicit wall-clock time.
    pub fn resolve_at(&self, service: &str, now: SystemTime) -> Resolution {
        let snapshot = self.snapshot.load();
        let instances = snapshot
            .services
            .get(service)
            .map(|list| {
                list.iter()
                    .filter(|i| i.is_routable(now, self.missed_heartbeats))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let stale_for = if self.stale.load(Ordering::Relaxed) {
            Some(snapshot.synced_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX))
        } else {
            None
        };

        Resolution { instances, stale_for }
    }
}

impl RegistryClient for InstanceCache {
    fn resolve(&self, service: &str) -> Resolution {
        self.resolve_at(service, SystemTime::now())
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn status(&self) -> RegistryStatus {
        let snapshot = self.snapshot.load();
        RegistryStatus {
            synced: snapshot.synced_at.is_some(),
            stale: self.stale.load(Ordering::Relaxed),
            version: snapshot.version,
            last_sync_age: snapshot.synced_at.map(|t| t.elapsed()),
            services: snapshot.services.len(),
        }
    }
}

/// Services whose instance set changed, and instance keys that vanished.
fn diff(previous: &Snapshot, current: &Snapshot) -> (Vec<String>, Vec<String>) {
    let names: BTreeSet<&String> = previous.services.keys().chain(current.services.keys()).collect();
    let mut changed = Vec::new();
    let mut removed = Vec::new();

    for name in names {
        let before = previous.services.get(name);
        let after = current.services.get(name);
        let same = match (before, after) {
            (Some(a), Some(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y),
            (None, None) => true,
            _ => false,
        };
        if same {
            continue;
        }
        changed.push(name.clone());

        if let Some(before) = before {
            for instance in before.iter() {
                let still_there = after
                    .map(|list| list.iter().any(|i| i.id == instance.id))
                    .unwrap_or(false);
                if !still_there {
                    removed.push(instance.key());
                }
            }
        }
    }

    (changed, removed)
}
