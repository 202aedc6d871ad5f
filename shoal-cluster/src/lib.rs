//! Shoal Cluster - hash slot computation and cluster topology.
//!
//! This crate answers the two questions the proxy keeps asking:
//! which slot does a key hash to, and which backend owns that slot.
//!
//! Topology is modeled as an immutable snapshot behind a copy-on-write
//! handle: readers grab an `Arc` and never block writers; a refresh builds
//! the next snapshot off-line and publishes it in one swap.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod shard_map;
mod slot;
mod topology;

pub use error::{TopologyError, TopologyResult};
pub use shard_map::{ShardMap, TopologyStats};
pub use slot::{crc16, hash_tag, key_slot};
pub use topology::{parse_cluster_nodes, parse_node_record, ClusterNode, SlotRange};
