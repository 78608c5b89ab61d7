// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

use crate::chunk::{Chunk, ChunkPool, ChunkStatus, DEFAULT_CHUNK_SIZE};
use crate::flock::{FileLocker, LockPolicy};
use crate::store::{load_document, store_document};

/// Selects the directory holding the persisted ID tables and chunk pools.
pub const MAP_DIR_ENV: &str = "DD_INSTR_MAP_DIR";

/// Configuration for an [`IdRegistry`].
#[derive(Debug, Clone)]
pub struct IdRegistryConfig {
    /// Directory holding the table, its chunk pool, and their lock files.
    pub dir: PathBuf,
    /// Chunk size used when a pool document is first created. An existing
    /// pool's `size_of_each_chunk` always wins.
    pub chunk_size: i64,
    /// What to do when a file lock cannot be acquired.
    pub lock_policy: LockPolicy,
}

impl IdRegistryConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        IdRegistryConfig {
            dir: dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            lock_policy: LockPolicy::default(),
        }
    }

    /// Reads the table directory from [`MAP_DIR_ENV`], falling back to the
    /// current directory with a warning when it is unset or empty.
    pub fn from_env() -> Self {
        match env::var_os(MAP_DIR_ENV).filter(|dir| !dir.is_empty()) {
            Some(dir) => Self::new(PathBuf::from(dir)),
            None => {
                warn!("{MAP_DIR_ENV} not set, falling back to the current directory");
                Self::new(".")
            }
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: i64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_lock_policy(mut self, lock_policy: LockPolicy) -> Self {
        self.lock_policy = lock_policy;
        self
    }
}

/// Hands out stable integer IDs for entity names, coordinating with other
/// uncoordinated processes through two persisted documents.
///
/// The committed table is the cross-invocation source of truth: once a
/// name's ID is flushed there, every later registry returns the same ID
/// for that name. IDs minted in this registry's lifetime live in a pending
/// map until [`IdRegistry::flush`] publishes them. ID capacity comes from
/// a chunk reserved out of the shared pool; while the chunk lasts, ID
/// issuance is a local integer increment with no locking at all.
///
/// Dropping the registry returns the unused remainder of its chunk to the
/// pool. That is deliberately separate from `flush`: releasing capacity
/// does not require re-reading the table, publishing names does.
#[derive(Debug)]
pub struct IdRegistry {
    committed: BTreeMap<String, i64>,
    pending: BTreeMap<String, i64>,
    current: Chunk,
    table_path: PathBuf,
    pool_path: PathBuf,
    chunk_size: i64,
    lock_policy: LockPolicy,
}

impl IdRegistry {
    /// Opens the registry backed by `<dir>/<file_name>`, loading the
    /// committed table and reserving an ID chunk.
    pub fn open(file_name: &str, config: IdRegistryConfig) -> anyhow::Result<Self> {
        let table_path = config.dir.join(file_name);
        let pool_path = pool_path_for(&table_path);

        let committed = {
            let _lock = FileLocker::acquire(&table_path, config.lock_policy)?;
            load_document(&table_path)
        };

        let mut registry = IdRegistry {
            committed,
            pending: BTreeMap::new(),
            current: Chunk::uninitialized(),
            table_path,
            pool_path,
            chunk_size: config.chunk_size,
            lock_policy: config.lock_policy,
        };
        registry.reserve_chunk()?;
        Ok(registry)
    }

    /// Returns the stable ID for `name`, minting one from the current
    /// chunk if the name has never been seen.
    pub fn get_id(&mut self, name: &str) -> anyhow::Result<u32> {
        if let Some(&id) = self.committed.get(name) {
            return id_to_u32(id);
        }
        if let Some(&id) = self.pending.get(name) {
            return id_to_u32(id);
        }

        if self.current.is_exhausted() {
            self.reserve_chunk()?;
        }
        let id = self.current.start;
        self.current.start += 1;
        self.pending.insert(name.to_string(), id);
        id_to_u32(id)
    }

    /// Number of IDs minted by this registry and not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Publishes pending name-to-ID assignments into the committed table.
    ///
    /// The table is re-read under its lock so entries committed by
    /// concurrent invocations since `open` are kept; a pending entry never
    /// overwrites an existing committed mapping for the same name.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        let _lock = FileLocker::acquire(&self.table_path, self.lock_policy)?;
        let mut table = load_document(&self.table_path);
        for (name, &id) in &self.pending {
            table.entry(name.clone()).or_insert(id);
        }
        match store_document(&self.table_path, &table) {
            Ok(()) => {
                self.committed = table;
                self.pending.clear();
                Ok(())
            }
            Err(err) => match self.lock_policy {
                LockPolicy::BestEffort => {
                    warn!(
                        "could not persist ID table {}: {err:#}",
                        self.table_path.display()
                    );
                    Ok(())
                }
                LockPolicy::Strict => {
                    Err(err.context(format!("flushing {}", self.table_path.display())))
                }
            },
        }
    }

    /// Releases the current chunk (if any) and takes a usable one from the
    /// pool: an `Opened` leftover when available, a fresh mint otherwise.
    fn reserve_chunk(&mut self) -> anyhow::Result<()> {
        let _lock = FileLocker::acquire(&self.pool_path, self.lock_policy)?;
        let mut pool = ChunkPool::new(load_document(&self.pool_path), self.chunk_size);

        if self.current.status != ChunkStatus::NotInit {
            self.current.status = release_status(&self.current);
            pool.put_chunk(&self.current);
        }
        self.current = pool
            .take_opened_chunk()
            .unwrap_or_else(|| pool.mint_chunk());

        self.persist_pool(&pool)
    }

    /// Marks the current chunk `Full` or `Opened` in the pool so another
    /// invocation can adopt whatever range is left.
    fn release_chunk(&mut self) -> anyhow::Result<()> {
        if self.current.status == ChunkStatus::NotInit {
            return Ok(());
        }
        let _lock = FileLocker::acquire(&self.pool_path, self.lock_policy)?;
        let mut pool = ChunkPool::new(load_document(&self.pool_path), self.chunk_size);

        self.current.status = release_status(&self.current);
        pool.put_chunk(&self.current);
        self.current.status = ChunkStatus::NotInit;

        self.persist_pool(&pool)
    }

    fn persist_pool(&self, pool: &ChunkPool) -> anyhow::Result<()> {
        match store_document(&self.pool_path, pool.as_document()) {
            Ok(()) => Ok(()),
            Err(err) => match self.lock_policy {
                LockPolicy::BestEffort => {
                    warn!(
                        "could not persist chunk pool {}: {err:#}",
                        self.pool_path.display()
                    );
                    Ok(())
                }
                LockPolicy::Strict => {
                    Err(err.context(format!("persisting {}", self.pool_path.display())))
                }
            },
        }
    }
}

impl Drop for IdRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.release_chunk() {
            warn!("could not release ID chunk {}: {err:#}", self.current.id);
        }
    }
}

fn release_status(chunk: &Chunk) -> ChunkStatus {
    if chunk.is_exhausted() {
        ChunkStatus::Full
    } else {
        ChunkStatus::Opened
    }
}

fn id_to_u32(id: i64) -> anyhow::Result<u32> {
    u32::try_from(id).with_context(|| format!("ID {id} out of range"))
}

fn pool_path_for(table_path: &Path) -> PathBuf {
    let mut path: OsString = table_path.as_os_str().to_os_string();
    path.push(".chunkspool.json");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> IdRegistryConfig {
        IdRegistryConfig::new(dir)
            .with_chunk_size(4)
            .with_lock_policy(LockPolicy::Strict)
    }

    #[test]
    fn distinct_names_get_distinct_ids() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut registry = IdRegistry::open("map_functions.json", test_config(dir.path()))?;
        let a = registry.get_id("a")?;
        let b = registry.get_id("b")?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn repeated_lookups_are_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut registry = IdRegistry::open("map_functions.json", test_config(dir.path()))?;
        let first = registry.get_id("f")?;
        assert_eq!(registry.get_id("f")?, first);
        assert_eq!(registry.get_id("f")?, first);
        assert_eq!(registry.pending_len(), 1);
        Ok(())
    }

    #[test]
    fn ids_cross_the_chunk_boundary_contiguously() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut registry = IdRegistry::open("map_functions.json", test_config(dir.path()))?;
        for (i, name) in ["f1", "f2", "f3", "f4", "f5"].iter().enumerate() {
            assert_eq!(registry.get_id(name)?, i as u32);
        }
        // The fifth ID forced a second chunk.
        let pool = ChunkPool::new(
            load_document(&registry.pool_path),
            registry.chunk_size,
        );
        assert_eq!(pool.latest_chunk_id(), 1);
        Ok(())
    }

    #[test]
    fn flush_then_reopen_returns_committed_id() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let mut registry = IdRegistry::open("map_functions.json", test_config(dir.path()))?;
            assert_eq!(registry.get_id("a")?, 0);
            registry.flush()?;
        }
        let mut registry = IdRegistry::open("map_functions.json", test_config(dir.path()))?;
        assert_eq!(registry.get_id("a")?, 0);
        assert_eq!(registry.pending_len(), 0);
        Ok(())
    }

    #[test]
    fn flush_does_not_overwrite_concurrently_committed_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut registry = IdRegistry::open("map_functions.json", test_config(dir.path()))?;
        let minted = registry.get_id("shared")?;
        assert_eq!(minted, 0);

        // Another invocation commits a different ID for the same name
        // between our open and our flush.
        let table_path = dir.path().join("map_functions.json");
        let mut table = BTreeMap::new();
        table.insert("shared".to_string(), 99);
        store_document(&table_path, &table)?;

        registry.flush()?;
        assert_eq!(load_document(&table_path).get("shared"), Some(&99));
        Ok(())
    }

    #[test]
    fn best_effort_registry_works_without_a_writable_directory() -> anyhow::Result<()> {
        let config = IdRegistryConfig::new("/nonexistent-dir")
            .with_chunk_size(4)
            .with_lock_policy(LockPolicy::BestEffort);
        let mut registry = IdRegistry::open("map_functions.json", config)?;
        assert_eq!(registry.get_id("a")?, 0);
        assert_eq!(registry.get_id("b")?, 1);
        Ok(())
    }

    #[test]
    fn strict_registry_fails_without_a_writable_directory() {
        let config = IdRegistryConfig::new("/nonexistent-dir")
            .with_chunk_size(4)
            .with_lock_policy(LockPolicy::Strict);
        assert!(IdRegistry::open("map_functions.json", config).is_err());
    }
}
