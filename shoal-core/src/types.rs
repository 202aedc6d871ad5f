//! Hash slot vocabulary.
//!
//! The cluster divides its key space into 16384 hash slots. Every key maps
//! to exactly one slot, and every slot is owned by at most one master at a
//! time.

/// A hash slot index in `[0, 16384)`.
///
/// Slots come off the wire in redirection replies and out of the topology
/// query as decimal integers; `u16` covers the full range.
pub type SlotId = u16;

/// Total number of hash slots in the cluster key space.
pub const SLOT_COUNT: usize = 16384;

/// The highest valid slot index.
pub const SLOT_MAX: SlotId = 16383;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_bounds_agree() {
        assert_eq!(usize::from(SLOT_MAX) + 1, SLOT_COUNT);
    }
}
