//! Cluster node records and the topology query grammar.
//!
//! The topology query returns one bulk string whose body is a newline
//! separated list of node records:
//!
//! ```text
//! <id> <addr>[@<bus-port>] <flags> <master-id|-> <ping> <pong> <epoch> <state> [<slot-spec> ...]
//! ```
//!
//! Flags are comma separated (`master` marks a slot owner). Slot specs are
//! `<slot>` or `<start>-<end>` in decimal; bracketed migration markers are
//! skipped. Records that do not parse are skipped with a warning rather
//! than failing the whole refresh, because one broken line must not take
//! the topology cache down.

use std::time::Instant;

use tracing::warn;

use shoal_core::{SlotId, SLOT_MAX};

use crate::error::{TopologyError, TopologyResult};

/// A closed range of hash slots `[start, end]` owned by one master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    /// First slot of the range.
    pub start: SlotId,
    /// Last slot of the range (inclusive).
    pub end: SlotId,
}

impl SlotRange {
    /// Creates a slot range, validating its bounds.
    ///
    /// # Errors
    /// Returns an error if `start > end` or `end` exceeds the slot space.
    pub fn new(start: SlotId, end: SlotId) -> TopologyResult<Self> {
        if start > end || end > SLOT_MAX {
            return Err(TopologyError::InvalidSlot {
                spec: format!("{start}-{end}"),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns true if this range covers the given slot.
    #[must_use]
    pub const fn contains(self, slot: SlotId) -> bool {
        self.start <= slot && slot <= self.end
    }
}

/// One node of the cluster, as reported by the topology query.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    /// The node's cluster-wide identifier.
    pub id: String,
    /// The node's routable `host:port` (bus port stripped).
    pub addr: String,
    /// True when the node is a slot-owning master.
    pub is_master: bool,
    /// For replicas, the master's identifier.
    pub master_id: Option<String>,
    /// The raw flag tokens from the record.
    pub flags: Vec<String>,
    /// Slot ranges owned by this node (masters only).
    pub slots: Vec<SlotRange>,
    /// Liveness as of the last refresh.
    pub healthy: bool,
    /// When this record was parsed.
    pub last_seen: Instant,
}

/// Parses one node record line.
///
/// # Errors
/// Returns an error when the record has fewer than the 8 required fields
/// or carries an unparsable slot specification.
pub fn parse_node_record(line: &str) -> TopologyResult<ClusterNode> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return Err(TopologyError::MalformedRecord {
            record: line.to_string(),
        });
    }

    // The routable address precedes the optional `@<bus-port>` suffix.
    let addr = fields[1]
        .split_once('@')
        .map_or(fields[1], |(addr, _)| addr)
        .to_string();

    let flags: Vec<String> = fields[2].split(',').map(str::to_string).collect();
    let is_master = flags.iter().any(|flag| flag == "master");

    let master_id = match fields[3] {
        "-" => None,
        id => Some(id.to_string()),
    };

    let mut slots = Vec::new();
    if is_master {
        for spec in &fields[8..] {
            // Migration markers ([slot-><-id] forms) are not ownership.
            if spec.starts_with('[') {
                continue;
            }
            slots.push(parse_slot_spec(spec)?);
        }
    }

    Ok(ClusterNode {
        id: fields[0].to_string(),
        addr,
        is_master,
        master_id,
        flags,
        slots,
        healthy: true,
        last_seen: Instant::now(),
    })
}

/// Parses a `<slot>` or `<start>-<end>` slot specification.
fn parse_slot_spec(spec: &str) -> TopologyResult<SlotRange> {
    let invalid = || TopologyError::InvalidSlot {
        spec: spec.to_string(),
    };

    match spec.split_once('-') {
        Some((start, end)) => {
            let start: SlotId = start.parse().map_err(|_| invalid())?;
            let end: SlotId = end.parse().map_err(|_| invalid())?;
            SlotRange::new(start, end)
        }
        None => {
            let slot: SlotId = spec.parse().map_err(|_| invalid())?;
            SlotRange::new(slot, slot)
        }
    }
}

/// Parses a full topology reply body into node records.
///
/// Unparsable lines are skipped with a warning.
///
/// # Errors
/// Returns [`TopologyError::Empty`] when no line yields a usable node.
pub fn parse_cluster_nodes(body: &str) -> TopologyResult<Vec<ClusterNode>> {
    let mut nodes = Vec::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_node_record(line) {
            Ok(node) => nodes.push(node),
            Err(error) => {
                warn!(%error, line, "skipping unparsable topology record");
            }
        }
    }

    if nodes.is_empty() {
        return Err(TopologyError::Empty);
    }
    Ok(nodes)
}
