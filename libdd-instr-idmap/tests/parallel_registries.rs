// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cross-invocation behavior of the ID registry: concurrent instances,
//! chunk recycling, and range disjointness, all against one shared table
//! directory.

use std::collections::HashSet;
use std::path::Path;

use libdd_instr_idmap::{
    load_document, ChunkPool, IdRegistry, IdRegistryConfig, LockPolicy, DEFAULT_CHUNK_SIZE,
};

const TABLE: &str = "map_functions.json";

fn config(dir: &Path, chunk_size: i64) -> IdRegistryConfig {
    IdRegistryConfig::new(dir)
        .with_chunk_size(chunk_size)
        .with_lock_policy(LockPolicy::Strict)
}

#[test]
fn concurrent_registries_never_mint_the_same_id() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut first = IdRegistry::open(TABLE, config(dir.path(), 4))?;
    let mut second = IdRegistry::open(TABLE, config(dir.path(), 4))?;

    let mut minted = Vec::new();
    for i in 0..10 {
        minted.push(first.get_id(&format!("first_{i}"))?);
        minted.push(second.get_id(&format!("second_{i}"))?);
    }

    let unique: HashSet<u32> = minted.iter().copied().collect();
    assert_eq!(unique.len(), minted.len());
    Ok(())
}

#[test]
fn released_chunk_is_adopted_before_minting_a_new_one() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let mut first = IdRegistry::open(TABLE, config(dir.path(), 4))?;
        assert_eq!(first.get_id("a")?, 0);
        assert_eq!(first.get_id("b")?, 1);
        first.flush()?;
        // Dropping releases chunk 0 with IDs 2 and 3 still unused.
    }

    let mut second = IdRegistry::open(TABLE, config(dir.path(), 4))?;
    assert_eq!(second.get_id("c")?, 2);
    assert_eq!(second.get_id("d")?, 3);

    let pool_path = dir.path().join(format!("{TABLE}.chunkspool.json"));
    let pool = ChunkPool::new(load_document(&pool_path), 4);
    assert_eq!(pool.latest_chunk_id(), 0, "no new chunk should be minted");
    Ok(())
}

#[test]
fn persisted_chunk_ranges_never_overlap() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    // Three overlapping registry lifetimes, enough to mint several chunks.
    let mut first = IdRegistry::open(TABLE, config(dir.path(), 4))?;
    for i in 0..6 {
        first.get_id(&format!("first_{i}"))?;
    }
    let mut second = IdRegistry::open(TABLE, config(dir.path(), 4))?;
    for i in 0..6 {
        second.get_id(&format!("second_{i}"))?;
    }
    drop(first);
    drop(second);

    let pool_path = dir.path().join(format!("{TABLE}.chunkspool.json"));
    let pool = ChunkPool::new(load_document(&pool_path), 4);
    let chunks: Vec<_> = (0..=pool.latest_chunk_id())
        .map(|id| pool.get_chunk(id))
        .collect();
    assert!(chunks.len() >= 3);

    for (i, a) in chunks.iter().enumerate() {
        let range_a = a.id * 4..=a.id * 4 + 3;
        for b in chunks.iter().skip(i + 1) {
            let range_b = b.id * 4..=b.id * 4 + 3;
            assert!(
                range_a.end() < range_b.start() || range_b.end() < range_a.start(),
                "chunks {} and {} overlap",
                a.id,
                b.id
            );
        }
    }
    Ok(())
}

#[test]
fn sequential_invocations_agree_on_every_name() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let names: Vec<String> = (0..40).map(|i| format!("fn_{i}")).collect();

    let mut original = Vec::new();
    {
        let mut registry = IdRegistry::open(TABLE, config(dir.path(), 16))?;
        for name in &names {
            original.push(registry.get_id(name)?);
        }
        registry.flush()?;
    }

    let mut registry = IdRegistry::open(TABLE, config(dir.path(), 16))?;
    for (name, &expected) in names.iter().zip(&original) {
        assert_eq!(registry.get_id(name)?, expected);
    }
    Ok(())
}

#[test]
fn default_chunk_size_is_used_for_a_fresh_pool() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let registry_config = IdRegistryConfig::new(dir.path()).with_lock_policy(LockPolicy::Strict);
    let mut registry = IdRegistry::open(TABLE, registry_config)?;
    registry.get_id("only")?;
    drop(registry);

    let pool_path = dir.path().join(format!("{TABLE}.chunkspool.json"));
    let pool = ChunkPool::new(load_document(&pool_path), DEFAULT_CHUNK_SIZE);
    assert_eq!(pool.chunk_size(), DEFAULT_CHUNK_SIZE);
    let chunk = pool.get_chunk(0);
    assert_eq!(chunk.end - chunk.start, DEFAULT_CHUNK_SIZE - 2);
    Ok(())
}
