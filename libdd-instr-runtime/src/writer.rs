// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::config::TraceFormat;
use crate::events::LogEntry;
use crate::thread_registry::SlotId;

/// Appends flushed buffer contents to one thread slot's trace file.
///
/// The file is created lazily on the slot's first flush and truncates any
/// leftover from a previous run. Each flushed buffer is encoded into a
/// reused scratch vector and written with a single bulk write, so the
/// owning thread blocks for one write call per flush.
#[derive(Debug)]
pub struct TraceWriter {
    file: File,
    format: TraceFormat,
    scratch: Vec<u8>,
}

impl TraceWriter {
    pub fn open(prefix: Option<&Path>, format: TraceFormat, slot: SlotId) -> anyhow::Result<Self> {
        let path = trace_file_path(prefix, format, slot);
        let file =
            File::create(&path).with_context(|| format!("opening {}", path.display()))?;
        info!("opened trace file {}", path.display());
        Ok(TraceWriter {
            file,
            format,
            scratch: Vec::new(),
        })
    }

    /// Writes `entries` to the trace file in order, as one bulk write.
    pub fn write_block(&mut self, entries: &[LogEntry]) -> anyhow::Result<()> {
        self.scratch.clear();
        for entry in entries {
            match self.format {
                TraceFormat::Binary => entry.encode(&mut self.scratch)?,
                TraceFormat::Text => entry.write_text(&mut self.scratch)?,
            }
        }
        self.file
            .write_all(&self.scratch)
            .context("writing trace block")
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.file.flush().context("flushing trace file")
    }
}

/// Trace file name for a slot: `trace.bin.<slot>` (or `trace.txt.<slot>`
/// for the text format), under the configured prefix directory.
pub fn trace_file_path(prefix: Option<&Path>, format: TraceFormat, slot: SlotId) -> PathBuf {
    let name = match format {
        TraceFormat::Binary => format!("trace.bin.{}", slot.index()),
        TraceFormat::Text => format!("trace.txt.{}", slot.index()),
    };
    match prefix {
        Some(prefix) => prefix.join(name),
        None => PathBuf::from(name),
    }
}
