// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use tracing::warn;

/// Policy applied when an advisory lock cannot be acquired.
///
/// ID bookkeeping must never abort the instrumented program's build, so the
/// default is to continue without the lock's protection and accept the
/// resulting race. Callers that would rather surface contention problems
/// pick [`LockPolicy::Strict`]. One policy is chosen per registry and
/// applied uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Log a warning and proceed unsynchronized.
    #[default]
    BestEffort,
    /// Return the acquisition failure to the caller.
    Strict,
}

/// Scoped exclusive lock over a guarded document.
///
/// The lock lives in a `<document>.lock` sidecar file and is held from
/// acquisition until this guard is dropped, on every exit path. Acquisition
/// blocks until the current holder (typically another build job) releases
/// it.
#[must_use]
pub struct FileLocker {
    lock: Option<Flock<File>>,
}

impl FileLocker {
    /// Acquires the exclusive lock guarding `document`.
    ///
    /// Under [`LockPolicy::BestEffort`] this never fails: an unopenable or
    /// unlockable sidecar file yields a guard that holds nothing, after a
    /// warning.
    pub fn acquire(document: &Path, policy: LockPolicy) -> anyhow::Result<Self> {
        let lock_path = lock_file_path(document);
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) => return Self::unheld(policy, &lock_path, err.into()),
        };
        match Flock::lock(file, FlockArg::LockExclusive) {
            Ok(lock) => Ok(Self { lock: Some(lock) }),
            Err((_, errno)) => Self::unheld(policy, &lock_path, std::io::Error::from(errno).into()),
        }
    }

    /// True when the advisory lock is actually held.
    pub fn is_held(&self) -> bool {
        self.lock.is_some()
    }

    fn unheld(policy: LockPolicy, lock_path: &Path, err: anyhow::Error) -> anyhow::Result<Self> {
        match policy {
            LockPolicy::BestEffort => {
                warn!(
                    "could not lock {}, proceeding unsynchronized: {err:#}",
                    lock_path.display()
                );
                Ok(Self { lock: None })
            }
            LockPolicy::Strict => {
                Err(err.context(format!("locking {}", lock_path.display())))
            }
        }
    }
}

fn lock_file_path(document: &Path) -> PathBuf {
    let mut path: OsString = document.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_creates_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("table.json");
        let guard = FileLocker::acquire(&document, LockPolicy::Strict).unwrap();
        assert!(guard.is_held());
        assert!(dir.path().join("table.json.lock").exists());
    }

    #[test]
    fn reacquire_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("table.json");
        drop(FileLocker::acquire(&document, LockPolicy::Strict).unwrap());
        let again = FileLocker::acquire(&document, LockPolicy::Strict).unwrap();
        assert!(again.is_held());
    }

    #[test]
    fn strict_policy_surfaces_open_failure() {
        let missing = Path::new("/nonexistent-dir/table.json");
        assert!(FileLocker::acquire(missing, LockPolicy::Strict).is_err());
    }

    #[test]
    fn best_effort_policy_degrades_to_unheld() {
        let missing = Path::new("/nonexistent-dir/table.json");
        let guard = FileLocker::acquire(missing, LockPolicy::BestEffort).unwrap();
        assert!(!guard.is_held());
    }
}
