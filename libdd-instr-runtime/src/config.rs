// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Selects the directory per-thread trace files are written to.
pub const TRACE_PREFIX_ENV: &str = "DD_INSTR_TRACE_PREFIX";
/// Comma-separated trace thread IDs to exclude from tracing entirely.
pub const EXCLUDE_TID_ENV: &str = "DD_INSTR_EXCLUDE_TID";
/// Selects the trace file format: `binary` (default) or `text`.
pub const TRACE_FORMAT_ENV: &str = "DD_INSTR_TRACE_FORMAT";

/// Number of entries a thread's buffer holds before it is flushed.
pub const BUFFER_SIZE: usize = 16384;

/// On-disk representation of trace records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceFormat {
    /// Fixed-layout binary records (see [`crate::LogEntry::encode`]).
    #[default]
    Binary,
    /// One human-readable line per record, for quick inspection.
    Text,
}

/// Configuration for a [`crate::Tracer`].
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Directory for trace files; `None` means the current directory.
    pub trace_prefix: Option<PathBuf>,
    /// Trace thread IDs whose events are dropped with no buffer or file
    /// activity at all.
    pub excluded_threads: HashSet<u32>,
    pub format: TraceFormat,
    /// Entries per thread buffer. The default suits production; tests
    /// shrink it to exercise flush boundaries.
    pub buffer_capacity: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            trace_prefix: None,
            excluded_threads: HashSet::new(),
            format: TraceFormat::default(),
            buffer_capacity: BUFFER_SIZE,
        }
    }
}

impl TracerConfig {
    /// Builds the configuration from the process environment, falling
    /// back to defaults (with a warning) for anything unset or malformed.
    pub fn from_env() -> Self {
        let trace_prefix = match env::var_os(TRACE_PREFIX_ENV).filter(|v| !v.is_empty()) {
            Some(prefix) => Some(PathBuf::from(prefix)),
            None => {
                warn!("{TRACE_PREFIX_ENV} not set, writing trace files to the current directory");
                None
            }
        };

        let excluded_threads = match env::var(EXCLUDE_TID_ENV) {
            Ok(raw) => parse_excluded_threads(&raw),
            Err(_) => HashSet::new(),
        };

        let format = match env::var(TRACE_FORMAT_ENV) {
            Ok(raw) if raw.eq_ignore_ascii_case("text") => TraceFormat::Text,
            Ok(raw) if raw.eq_ignore_ascii_case("binary") || raw.is_empty() => TraceFormat::Binary,
            Ok(raw) => {
                warn!("unknown {TRACE_FORMAT_ENV} value {raw:?}, using binary");
                TraceFormat::Binary
            }
            Err(_) => TraceFormat::Binary,
        };

        TracerConfig {
            trace_prefix,
            excluded_threads,
            format,
            buffer_capacity: BUFFER_SIZE,
        }
    }
}

/// Parses the comma-separated exclusion list. Tokens that are not
/// non-negative integers are skipped with a warning rather than silently
/// matching thread 0.
fn parse_excluded_threads(raw: &str) -> HashSet<u32> {
    let mut excluded = HashSet::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.parse::<u32>() {
            Ok(tid) => {
                excluded.insert(tid);
            }
            Err(_) => warn!("ignoring non-numeric {EXCLUDE_TID_ENV} entry {token:?}"),
        }
    }
    excluded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_thread_ids() {
        let excluded = parse_excluded_threads("0,3, 17");
        assert_eq!(excluded, HashSet::from([0, 3, 17]));
    }

    #[test]
    fn skips_empty_and_non_numeric_tokens() {
        let excluded = parse_excluded_threads(",x,,2,-1");
        assert_eq!(excluded, HashSet::from([2]));
    }

    #[test]
    fn empty_list_excludes_nothing() {
        assert!(parse_excluded_threads("").is_empty());
    }
}
