// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::config::TracerConfig;
use crate::events::LogEntry;
use crate::thread_registry::SlotId;
use crate::writer::TraceWriter;

/// Everything one trace slot owns: its event buffer and its output file.
///
/// In steady state only the slot's own thread touches this; shutdown is
/// the single cross-thread access, serialized by the slot's mutex in
/// [`crate::Tracer`].
#[derive(Debug, Default)]
pub(crate) struct ThreadSlotState {
    buffer: Option<Vec<LogEntry>>,
    alloc_failed: bool,
    writer: Option<TraceWriter>,
}

impl ThreadSlotState {
    /// Appends one entry, flushing first if the buffer is full. Entries
    /// are never lost to overflow: a full buffer always hits the file (or
    /// the drop counter) before the new entry goes in.
    pub(crate) fn append(
        &mut self,
        entry: LogEntry,
        config: &TracerConfig,
        slot: SlotId,
        dropped: &AtomicU64,
    ) {
        if !self.ensure_buffer(config.buffer_capacity, slot) {
            dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let full = self
            .buffer
            .as_ref()
            .is_some_and(|buffer| buffer.len() >= config.buffer_capacity);
        if full {
            self.flush(config, slot, dropped);
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.push(entry);
        }
    }

    /// Flushes whatever the buffer holds and syncs the file; called once
    /// per slot at process exit.
    pub(crate) fn shutdown(
        &mut self,
        config: &TracerConfig,
        slot: SlotId,
        dropped: &AtomicU64,
    ) {
        self.flush(config, slot, dropped);
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                warn!("could not flush trace file for slot {}: {err:#}", slot.index());
            }
        }
    }

    fn ensure_buffer(&mut self, capacity: usize, slot: SlotId) -> bool {
        if self.alloc_failed {
            return false;
        }
        if self.buffer.is_none() {
            let mut buffer = Vec::new();
            if buffer.try_reserve_exact(capacity).is_err() {
                // Warned once; from here on this slot silently drops.
                warn!(
                    "could not allocate the event buffer for thread slot {}, \
                     dropping its events",
                    slot.index()
                );
                self.alloc_failed = true;
                return false;
            }
            self.buffer = Some(buffer);
        }
        true
    }

    fn flush(&mut self, config: &TracerConfig, slot: SlotId, dropped: &AtomicU64) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        if buffer.is_empty() {
            return;
        }
        if self.writer.is_none() {
            match TraceWriter::open(config.trace_prefix.as_deref(), config.format, slot) {
                Ok(writer) => self.writer = Some(writer),
                Err(err) => {
                    warn!(
                        "could not open trace file for slot {}: {err:#}",
                        slot.index()
                    );
                }
            }
        }
        match self.writer.as_mut() {
            Some(writer) => {
                if let Err(err) = writer.write_block(buffer) {
                    warn!(
                        "could not write trace block for slot {}: {err:#}",
                        slot.index()
                    );
                    dropped.fetch_add(buffer.len() as u64, Ordering::Relaxed);
                }
            }
            // This flush's entries are discarded; the next flush retries
            // the open.
            None => {
                dropped.fetch_add(buffer.len() as u64, Ordering::Relaxed);
            }
        }
        buffer.clear();
    }
}
