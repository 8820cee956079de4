//! Position arithmetic for appends, insertions and renumbering.
//!
//! # Invariants
//! - Every value produced here is `>= 1`; `0` is the implicit lower bound
//!   before the first member.
//! - `insert_slot` never returns a value already present in the input.
//! - Renumbering assigns `stride, 2*stride, ..., N*stride` in current order.

use crate::model::hierarchy::EntityId;

/// Where a new or moved member should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A free position exists.
    At(i64),
    /// No integer gap left at the target; the set must be renumbered with the
    /// member already spliced in.
    Renumber,
}

/// Computes positions inside one sibling set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionAssigner {
    stride: i64,
}

impl Default for PositionAssigner {
    fn default() -> Self {
        Self { stride: 1 }
    }
}

impl PositionAssigner {
    /// Creates an assigner whose renumbering leaves `stride - 1` free slots
    /// between neighbours. Values below 1 are treated as 1.
    pub fn new(stride: i64) -> Self {
        Self {
            stride: stride.max(1),
        }
    }

    /// `max + 1` over the existing positions and the set's high-water mark,
    /// or `1` for a set that never held a member.
    ///
    /// The high-water mark keeps positions freed by deletes from being handed
    /// out again until the set is renumbered.
    pub fn append_position(&self, existing: &[i64], high_water: i64) -> Option<i64> {
        let max = existing
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .max(high_water)
            .max(0);
        max.checked_add(1)
    }

    /// Appending as a slot, falling back to renumbering on overflow.
    pub fn append_slot(&self, existing: &[i64], high_water: i64) -> Slot {
        match self.append_position(existing, high_water) {
            Some(position) => Slot::At(position),
            None => Slot::Renumber,
        }
    }

    /// Position placing a member immediately before the one currently at
    /// `target_index` of `ordered` (ascending). An index at or past the end
    /// appends.
    pub fn insert_slot(&self, ordered: &[i64], target_index: usize, high_water: i64) -> Slot {
        let index = target_index.min(ordered.len());
        if index == ordered.len() {
            return self.append_slot(ordered, high_water);
        }

        let previous = if index == 0 { 0 } else { ordered[index - 1] };
        let next = ordered[index];
        match next.checked_sub(previous) {
            Some(gap) if gap >= 2 => Slot::At(previous + gap / 2),
            _ => Slot::Renumber,
        }
    }

    /// Assigns stride multiples to `order`, which must already contain the
    /// inserted member at its target index.
    pub fn renumbered(&self, order: &[EntityId]) -> Vec<(EntityId, i64)> {
        order
            .iter()
            .enumerate()
            .map(|(index, uuid)| (*uuid, (index as i64 + 1).saturating_mul(self.stride)))
            .collect()
    }
}
