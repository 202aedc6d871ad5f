//! Slot ownership cache.
//!
//! The shard map answers "which backend owns slot `s`" and "give me any
//! live master" under concurrent access. Internally it is an immutable
//! snapshot behind a copy-on-write handle: readers clone an `Arc` and work
//! against a consistent view; a refresh builds the next snapshot off-line
//! and publishes it with one pointer swap, so a concurrent reader sees the
//! whole old topology or the whole new one, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use shoal_core::{SlotId, SLOT_COUNT};

use crate::slot::key_slot;
use crate::topology::ClusterNode;

/// Aggregate topology counters for logging and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyStats {
    /// Total nodes known, masters and replicas.
    pub total_nodes: usize,
    /// Slot-owning masters.
    pub masters: usize,
    /// Replicas.
    pub replicas: usize,
    /// Age of the last successful refresh, `None` before the first one.
    pub last_refresh_age: Option<Duration>,
}

/// One immutable view of the cluster.
struct Snapshot {
    /// Nodes by cluster identifier.
    nodes: HashMap<String, ClusterNode>,
    /// Owning master address per slot; empty string means unknown.
    slot_owner: Vec<String>,
    /// When this snapshot was installed, `None` for the boot placeholder.
    refreshed_at: Option<Instant>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            nodes: HashMap::new(),
            slot_owner: vec![String::new(); SLOT_COUNT],
            refreshed_at: None,
        }
    }

    fn from_nodes(nodes: Vec<ClusterNode>) -> Self {
        let mut slot_owner = vec![String::new(); SLOT_COUNT];
        let mut by_id = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if node.is_master {
                for range in &node.slots {
                    for slot in range.start..=range.end {
                        // Duplicate claims should not occur; last one wins.
                        slot_owner[usize::from(slot)] = node.addr.clone();
                    }
                }
            }
            by_id.insert(node.id.clone(), node);
        }

        Self {
            nodes: by_id,
            slot_owner,
            refreshed_at: Some(Instant::now()),
        }
    }
}

/// Concurrent slot-to-backend cache.
pub struct ShardMap {
    /// Seed addresses from configuration, the routing fallback of last
    /// resort before any refresh has succeeded.
    seeds: Vec<String>,
    /// Staleness threshold for [`ShardMap::is_stale`].
    staleness: Duration,
    /// The current snapshot handle.
    current: RwLock<Arc<Snapshot>>,
}

impl ShardMap {
    /// Creates a shard map that routes everything to the seeds until the
    /// first topology refresh lands.
    ///
    /// # Panics
    /// Panics if `seeds` is empty; configuration validation guarantees at
    /// least one seed.
    #[must_use]
    pub fn new(seeds: Vec<String>, staleness: Duration) -> Self {
        assert!(!seeds.is_empty(), "seed node list cannot be empty");
        Self {
            seeds,
            staleness,
            current: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Loads the current snapshot handle.
    fn snapshot(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock only means a panic elsewhere; the snapshot
            // itself is immutable and still valid.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Returns the backend that owns the given key's slot, falling back to
    /// the first seed when ownership is unknown.
    #[must_use]
    pub fn addr_for_key(&self, key: &[u8]) -> String {
        self.addr_for_slot(key_slot(key))
            .unwrap_or_else(|| self.seeds[0].clone())
    }

    /// Returns the backend that owns the given slot, or `None` when
    /// ownership is unknown.
    #[must_use]
    pub fn addr_for_slot(&self, slot: SlotId) -> Option<String> {
        let snapshot = self.snapshot();
        let owner = &snapshot.slot_owner[usize::from(slot)];
        if owner.is_empty() {
            None
        } else {
            Some(owner.clone())
        }
    }

    /// Returns any healthy master, falling back to the first seed.
    ///
    /// Iteration order over the node table is arbitrary, which spreads
    /// keyless commands across masters well enough for their purpose.
    #[must_use]
    pub fn any_master(&self) -> String {
        let snapshot = self.snapshot();
        snapshot
            .nodes
            .values()
            .find(|node| node.is_master && node.healthy)
            .map_or_else(|| self.seeds[0].clone(), |node| node.addr.clone())
    }

    /// Returns the configured fallback backend (the first seed).
    #[must_use]
    pub fn first_seed(&self) -> String {
        self.seeds[0].clone()
    }

    /// Returns the configured seed list.
    #[must_use]
    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    /// Atomically installs a new topology.
    ///
    /// The slot-owner table is recomputed from each master's ranges; if
    /// several masters claim one slot the last record wins.
    pub fn replace(&self, nodes: Vec<ClusterNode>) {
        let next = Arc::new(Snapshot::from_nodes(nodes));
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Returns true when the topology is older than the staleness
    /// threshold. A map that has never been refreshed is stale.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.snapshot()
            .refreshed_at
            .map_or(true, |at| at.elapsed() > self.staleness)
    }

    /// Returns aggregate counters over the current snapshot.
    #[must_use]
    pub fn stats(&self) -> TopologyStats {
        let snapshot = self.snapshot();
        let masters = snapshot.nodes.values().filter(|n| n.is_master).count();
        TopologyStats {
            total_nodes: snapshot.nodes.len(),
            masters,
            replicas: snapshot.nodes.len() - masters,
            last_refresh_age: snapshot.refreshed_at.map(|at| at.elapsed()),
        }
    }
}
