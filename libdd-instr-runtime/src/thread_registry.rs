// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapping of OS threads to dense trace slots.
//!
//! The first event a thread ever records assigns it the next sequential
//! slot under a short-held lock; the decision is then cached in
//! thread-local storage so the steady-state path never takes the lock
//! again. Slots are never reclaimed: a slot stays bound to its thread for
//! the life of the process.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::info;

/// Upper bound on concurrently traced threads. Threads past this limit
/// are treated as excluded, not as an error.
pub const MAX_THREADS: usize = 128;

/// Dense index of a traced thread, in `[0, MAX_THREADS)`. Doubles as the
/// `thread_id` byte recorded in every trace record and as the suffix of
/// the thread's trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(u8);

impl SlotId {
    pub fn new(raw: u8) -> Self {
        SlotId(raw)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Outcome of resolving the calling thread against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    Traced(SlotId),
    /// Either on the user's exclusion list or past the slot capacity;
    /// every event from this thread is dropped with zero buffer and file
    /// activity.
    Excluded,
}

// Registries hand out monotonically increasing epochs so a cached
// decision is never honored by a different registry in the same thread
// (multiple registries only happen in tests, but the check is cheap).
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CACHED_DECISION: Cell<Option<(u64, SlotDecision)>> = const { Cell::new(None) };
}

/// Assigns trace slots to threads and applies the exclusion list.
#[derive(Debug)]
pub struct ThreadRegistry {
    epoch: u64,
    next_slot: Mutex<u32>,
    excluded: HashSet<u32>,
    over_capacity: AtomicU64,
}

impl ThreadRegistry {
    pub fn new(excluded: HashSet<u32>) -> Self {
        ThreadRegistry {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            next_slot: Mutex::new(0),
            excluded,
            over_capacity: AtomicU64::new(0),
        }
    }

    /// Resolves the calling thread to its slot, assigning one on first
    /// call. Lock-free after the first call from a given thread.
    pub fn slot_for_current(&self) -> SlotDecision {
        if let Some((epoch, decision)) = CACHED_DECISION.get() {
            if epoch == self.epoch {
                return decision;
            }
        }
        let decision = self.assign_slot();
        CACHED_DECISION.set(Some((self.epoch, decision)));
        decision
    }

    /// Number of threads that arrived after every slot was taken.
    pub fn over_capacity(&self) -> u64 {
        self.over_capacity.load(Ordering::Relaxed)
    }

    fn assign_slot(&self) -> SlotDecision {
        let id = {
            let mut next_slot = self.next_slot.lock();
            let id = *next_slot;
            *next_slot += 1;
            id
        };

        if id >= MAX_THREADS as u32 {
            self.over_capacity.fetch_add(1, Ordering::Relaxed);
            return SlotDecision::Excluded;
        }
        if self.excluded.contains(&id) {
            info!("excluding thread {id} from trace");
            return SlotDecision::Excluded;
        }
        SlotDecision::Traced(SlotId(id as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_thread_keeps_its_slot() {
        let registry = ThreadRegistry::new(HashSet::new());
        let first = registry.slot_for_current();
        assert_eq!(first, SlotDecision::Traced(SlotId(0)));
        assert_eq!(registry.slot_for_current(), first);
    }

    #[test]
    fn a_new_registry_does_not_reuse_cached_decisions() {
        let first = ThreadRegistry::new(HashSet::new());
        assert_eq!(first.slot_for_current(), SlotDecision::Traced(SlotId(0)));

        // Same thread, fresh registry: the slot comes from the new
        // counter, not from the cache.
        let second = ThreadRegistry::new(HashSet::new());
        assert_eq!(second.slot_for_current(), SlotDecision::Traced(SlotId(0)));
    }

    #[test]
    fn threads_get_sequential_slots() {
        let registry = ThreadRegistry::new(HashSet::new());
        let mut slots = vec![registry.slot_for_current()];
        std::thread::scope(|scope| {
            for _ in 0..3 {
                slots.push(scope.spawn(|| registry.slot_for_current()).join().unwrap());
            }
        });
        let expected: Vec<SlotDecision> = (0..4)
            .map(|i| SlotDecision::Traced(SlotId(i)))
            .collect();
        assert_eq!(slots, expected);
    }

    #[test]
    fn listed_threads_are_excluded() {
        let registry = ThreadRegistry::new(HashSet::from([1]));
        assert_eq!(registry.slot_for_current(), SlotDecision::Traced(SlotId(0)));
        std::thread::scope(|scope| {
            let decision = scope.spawn(|| registry.slot_for_current()).join().unwrap();
            assert_eq!(decision, SlotDecision::Excluded);
        });
        assert_eq!(registry.over_capacity(), 0);
    }

    #[test]
    fn threads_past_capacity_are_excluded_and_counted() {
        let registry = ThreadRegistry::new(HashSet::new());
        let mut excluded = 0;
        std::thread::scope(|scope| {
            for _ in 0..MAX_THREADS + 2 {
                let decision = scope.spawn(|| registry.slot_for_current()).join().unwrap();
                if decision == SlotDecision::Excluded {
                    excluded += 1;
                }
            }
        });
        assert_eq!(excluded, 2);
        assert_eq!(registry.over_capacity(), 2);
    }
}
