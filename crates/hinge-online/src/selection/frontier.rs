//! Priority frontier for relational exploration.
//!
//! Entries are ordered by `score / 2^distance`, ties broken by atom order.
//! Rediscovering a live atom at a strictly smaller distance replaces its
//! entry; the stale heap slot is skipped lazily on pop. A popped atom never
//! re-enters.

use ahash::{AHashMap, AHashSet};
use hinge_model::Atom;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Decayed priority of a score discovered `distance` hops from the seeds.
pub fn decayed_priority(score: f64, distance: u32) -> f64 {
    score / 2f64.powi(distance.min(i32::MAX as u32) as i32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub atom: Atom,
    pub score: f64,
    pub distance: u32,
    pub priority: f64,
}

/// Result of offering an atom to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Inserted,
    /// Replaced a live entry that had a larger distance.
    Replaced,
    /// Already live at an equal or smaller distance, or already popped.
    Ignored,
}

#[derive(Debug)]
struct Slot {
    entry: FrontierEntry,
    generation: u64,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then the smaller atom.
        self.entry
            .priority
            .total_cmp(&other.entry.priority)
            .then_with(|| other.entry.atom.cmp(&self.entry.atom))
            .then_with(|| self.generation.cmp(&other.generation))
    }
}

#[derive(Debug, Default)]
pub struct FrontierQueue {
    heap: BinaryHeap<Slot>,
    /// Live atom -> (distance, generation of its current slot).
    live: AHashMap<Atom, (u32, u64)>,
    consumed: AHashSet<Atom>,
    next_generation: u64,
}

impl FrontierQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, atom: &Atom, score: f64, distance: u32) -> Offer {
        if self.consumed.contains(atom) {
            return Offer::Ignored;
        }
        let outcome = match self.live.get(atom) {
            Some(&(current, _)) if current <= distance => return Offer::Ignored,
            Some(_) => Offer::Replaced,
            None => Offer::Inserted,
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        self.live.insert(atom.clone(), (distance, generation));
        self.heap.push(Slot {
            entry: FrontierEntry {
                atom: atom.clone(),
                score,
                distance,
                priority: decayed_priority(score, distance),
            },
            generation,
        });
        outcome
    }

    /// Remove and return the highest-priority live entry.
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        while let Some(slot) = self.heap.pop() {
            let current = self.live.get(&slot.entry.atom).map(|&(_, g)| g);
            if current != Some(slot.generation) {
                continue;
            }
            self.live.remove(&slot.entry.atom);
            self.consumed.insert(slot.entry.atom.clone());
            return Some(slot.entry);
        }
        None
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hinge_model::atom;

    #[test]
    fn test_decay_orders_by_distance() {
        let mut q = FrontierQueue::new();
        q.offer(&atom!("X", "b"), 10.0, 3);
        q.offer(&atom!("X", "a"), 10.0, 1);
        let first = q.pop().unwrap();
        assert_eq!(first.atom, atom!("X", "a"));
        assert_relative_eq!(first.priority, 5.0);
        let second = q.pop().unwrap();
        assert_relative_eq!(second.priority, 1.25);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_ties_break_by_atom() {
        let mut q = FrontierQueue::new();
        q.offer(&atom!("X", "c"), 4.0, 1);
        q.offer(&atom!("X", "a"), 4.0, 1);
        q.offer(&atom!("X", "b"), 4.0, 1);
        let order: Vec<Atom> = std::iter::from_fn(|| q.pop()).map(|e| e.atom).collect();
        assert_eq!(order, vec![atom!("X", "a"), atom!("X", "b"), atom!("X", "c")]);
    }

    #[test]
    fn test_replacement_only_at_shorter_distance() {
        let mut q = FrontierQueue::new();
        let a = atom!("X", "a");
        assert_eq!(q.offer(&a, 8.0, 3), Offer::Inserted);
        assert_eq!(q.offer(&a, 8.0, 3), Offer::Ignored);
        assert_eq!(q.offer(&a, 8.0, 4), Offer::Ignored);
        assert_eq!(q.offer(&a, 8.0, 1), Offer::Replaced);
        assert_eq!(q.len(), 1);

        let e = q.pop().unwrap();
        assert_eq!(e.distance, 1);
        assert_relative_eq!(e.priority, 4.0);
        // The stale distance-3 slot is discarded.
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_popped_atoms_never_return() {
        let mut q = FrontierQueue::new();
        let a = atom!("X", "a");
        q.offer(&a, 1.0, 2);
        assert_eq!(q.pop().map(|e| e.atom), Some(a.clone()));
        assert_eq!(q.offer(&a, 1.0, 1), Offer::Ignored);
        assert!(q.is_empty());
    }
}
