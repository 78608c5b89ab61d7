// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flat-document persistence for the ID table and the chunk pool.
//!
//! Both documents are single JSON objects mapping string keys to integers.
//! Mutual exclusion between writers is the caller's job (see
//! [`crate::FileLocker`]); this module only makes individual writes
//! crash-consistent by going through a temporary file and a rename.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

/// Reads a flat string-to-integer document.
///
/// A missing file yields an empty map. So does an unreadable or unparsable
/// one, after a warning: a corrupt table degrades to reinitialized defaults
/// rather than failing the build. Note that this silently forfeits any IDs
/// the document held if the unreadability was transient; callers must not
/// treat a loaded document as the complete history of committed IDs.
pub fn load_document(path: &Path) -> BTreeMap<String, i64> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            warn!("could not read {}: {err}", path.display());
            return BTreeMap::new();
        }
    };
    let parsed: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("discarding unparsable document {}: {err}", path.display());
            return BTreeMap::new();
        }
    };
    let Some(object) = parsed.as_object() else {
        warn!(
            "discarding document {}: expected a JSON object",
            path.display()
        );
        return BTreeMap::new();
    };
    object
        .iter()
        .filter_map(|(key, value)| value.as_i64().map(|n| (key.clone(), n)))
        .collect()
}

/// Writes a flat document, replacing whatever was at `path`.
///
/// The write goes to a process-unique temporary file first and is renamed
/// into place, so a crash mid-write cannot leave a truncated document
/// behind.
pub fn store_document(path: &Path, document: &BTreeMap<String, i64>) -> anyhow::Result<()> {
    let raw = serde_json::to_vec(document).context("serializing document")?;
    let tmp = tmp_path(path);
    fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("moving {} to {}", tmp.display(), path.display()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}", std::process::id()));
    PathBuf::from(tmp)
}
