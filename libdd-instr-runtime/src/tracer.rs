// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::buffer::ThreadSlotState;
use crate::clock::monotonic_ns;
use crate::config::TracerConfig;
use crate::events::{AccessValue, FnEventKind, LogEntry};
use crate::thread_registry::{SlotDecision, SlotId, ThreadRegistry, MAX_THREADS};

/// Counters for events the tracer chose to drop; useful to tell capacity
/// exhaustion apart from deliberate exclusion, which is otherwise
/// indistinguishable from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracerStats {
    /// Events lost to buffer allocation or trace file failures.
    pub events_dropped: u64,
    /// Threads that arrived after all slots were taken.
    pub threads_over_capacity: u64,
}

/// The per-process event recorder embedded in an instrumented program.
///
/// Owns one slot state per potential thread; the slot's mutex is
/// uncontended in steady state because only the owning thread appends to
/// it, and the sole cross-thread access is the shutdown flush. No method
/// here returns an error or panics toward the host program: every failure
/// degrades to a dropped event and a logged warning.
#[derive(Debug)]
pub struct Tracer {
    config: TracerConfig,
    registry: ThreadRegistry,
    slots: Vec<Mutex<ThreadSlotState>>,
    events_dropped: AtomicU64,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        let registry = ThreadRegistry::new(config.excluded_threads.clone());
        let slots = (0..MAX_THREADS)
            .map(|_| Mutex::new(ThreadSlotState::default()))
            .collect();
        Tracer {
            config,
            registry,
            slots,
            events_dropped: AtomicU64::new(0),
        }
    }

    pub fn from_env() -> Self {
        Self::new(TracerConfig::from_env())
    }

    pub fn log_fn_begin(&self, function_id: u32) {
        self.append(|thread_id, timestamp_ns| LogEntry::Fn {
            thread_id,
            kind: FnEventKind::Begin,
            function_id,
            timestamp_ns,
        });
    }

    pub fn log_fn_end(&self, function_id: u32) {
        self.append(|thread_id, timestamp_ns| LogEntry::Fn {
            thread_id,
            kind: FnEventKind::End,
            function_id,
            timestamp_ns,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_alloc(
        &self,
        address: u64,
        size: u64,
        count: u64,
        type_id: u16,
        file_id: u16,
        line: u16,
        col: u16,
    ) {
        self.append(|thread_id, timestamp_ns| LogEntry::Alloc {
            thread_id,
            address,
            size,
            count,
            type_id,
            file_id,
            line,
            col,
            timestamp_ns,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_access(
        &self,
        address: u64,
        value: AccessValue,
        access_kind: u8,
        file_id: u16,
        line: u16,
        col: u16,
        type_id: u16,
        var_id: u16,
    ) {
        self.append(|thread_id, timestamp_ns| LogEntry::Access {
            thread_id,
            address,
            value,
            access_kind,
            file_id,
            line,
            col,
            type_id,
            var_id,
            timestamp_ns,
        });
    }

    /// Flushes every slot's partial buffer and closes its file. Called
    /// from the program-exit hook; events recorded after this reopen
    /// their slot's file.
    pub fn shutdown(&self) {
        for (index, slot) in self.slots.iter().enumerate() {
            slot.lock().shutdown(
                &self.config,
                SlotId::new(index as u8),
                &self.events_dropped,
            );
        }
    }

    pub fn stats(&self) -> TracerStats {
        TracerStats {
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            threads_over_capacity: self.registry.over_capacity(),
        }
    }

    fn append(&self, build: impl FnOnce(u8, u64) -> LogEntry) {
        let slot = match self.registry.slot_for_current() {
            SlotDecision::Traced(slot) => slot,
            SlotDecision::Excluded => return,
        };
        let entry = build(slot.as_u8(), monotonic_ns());
        self.slots[slot.index()]
            .lock()
            .append(entry, &self.config, slot, &self.events_dropped);
    }
}
