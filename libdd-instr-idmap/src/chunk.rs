// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The chunk pool: partitioned ranges of the global ID space.
//!
//! The pool document records, for every chunk ever minted, who may hand
//! out IDs from it. A chunk is `InUse` by at most one process at a time;
//! a process that exits with IDs left over releases its chunk as `Opened`
//! so a later invocation can adopt the remainder instead of burning a
//! fresh range.

use std::collections::BTreeMap;

/// Number of IDs in a freshly minted chunk, unless the pool document was
/// initialized with a different `size_of_each_chunk`.
pub const DEFAULT_CHUNK_SIZE: i64 = 1024;

const KEY_CHUNK_SIZE: &str = "size_of_each_chunk";
const KEY_LATEST_CHUNK_ID: &str = "latest_chunk_id";

/// Allocation state of one chunk, persisted as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStatus {
    /// Never minted; also what absent pool fields decode to.
    #[default]
    NotInit,
    /// Released with unused IDs remaining; eligible for adoption.
    Opened,
    /// Owned by exactly one live process.
    InUse,
    /// Every ID in the range has been handed out.
    Full,
}

impl ChunkStatus {
    pub fn code(self) -> i64 {
        match self {
            ChunkStatus::NotInit => 0,
            ChunkStatus::Opened => 1,
            ChunkStatus::InUse => 2,
            ChunkStatus::Full => 3,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ChunkStatus::Opened,
            2 => ChunkStatus::InUse,
            3 => ChunkStatus::Full,
            _ => ChunkStatus::NotInit,
        }
    }
}

/// A contiguous range `[start, end]` of the global ID space.
///
/// `start` is the next ID to hand out; it moves past `end` once the range
/// is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: i64,
    pub status: ChunkStatus,
    pub start: i64,
    pub end: i64,
}

impl Chunk {
    pub fn uninitialized() -> Self {
        Chunk {
            id: 0,
            status: ChunkStatus::NotInit,
            start: 0,
            end: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.start > self.end
    }
}

/// In-memory view of the pool document.
///
/// Wraps the flat key-to-integer map and exposes chunk-granular reads and
/// writes over the `chunk_<id>_status/_start/_end` field triples.
#[derive(Debug)]
pub struct ChunkPool {
    document: BTreeMap<String, i64>,
}

impl ChunkPool {
    /// Wraps a loaded pool document, installing defaults for any missing
    /// top-level field. `latest_chunk_id` starts at -1 so the first minted
    /// chunk gets id 0.
    pub fn new(mut document: BTreeMap<String, i64>, default_chunk_size: i64) -> Self {
        document
            .entry(KEY_CHUNK_SIZE.to_string())
            .or_insert(default_chunk_size);
        document.entry(KEY_LATEST_CHUNK_ID.to_string()).or_insert(-1);
        ChunkPool { document }
    }

    pub fn chunk_size(&self) -> i64 {
        self.document.get(KEY_CHUNK_SIZE).copied().unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn latest_chunk_id(&self) -> i64 {
        self.document.get(KEY_LATEST_CHUNK_ID).copied().unwrap_or(-1)
    }

    pub fn get_chunk(&self, id: i64) -> Chunk {
        let field = |suffix: &str| {
            self.document
                .get(&chunk_key(id, suffix))
                .copied()
                .unwrap_or(0)
        };
        Chunk {
            id,
            status: ChunkStatus::from_code(field("status")),
            start: field("start"),
            end: field("end"),
        }
    }

    pub fn put_chunk(&mut self, chunk: &Chunk) {
        self.document
            .insert(chunk_key(chunk.id, "status"), chunk.status.code());
        self.document.insert(chunk_key(chunk.id, "start"), chunk.start);
        self.document.insert(chunk_key(chunk.id, "end"), chunk.end);
    }

    /// Adopts the lowest-numbered chunk a prior holder released with
    /// unused IDs, marking it in use.
    pub fn take_opened_chunk(&mut self) -> Option<Chunk> {
        for id in 0..=self.latest_chunk_id() {
            let mut chunk = self.get_chunk(id);
            if chunk.status == ChunkStatus::Opened {
                chunk.status = ChunkStatus::InUse;
                self.put_chunk(&chunk);
                return Some(chunk);
            }
        }
        None
    }

    /// Mints the next chunk id and takes ownership of its fresh range.
    pub fn mint_chunk(&mut self) -> Chunk {
        let id = self.latest_chunk_id() + 1;
        self.document.insert(KEY_LATEST_CHUNK_ID.to_string(), id);
        let start = id * self.chunk_size();
        let chunk = Chunk {
            id,
            status: ChunkStatus::InUse,
            start,
            end: start + self.chunk_size() - 1,
        };
        self.put_chunk(&chunk);
        chunk
    }

    pub fn as_document(&self) -> &BTreeMap<String, i64> {
        &self.document
    }
}

fn chunk_key(id: i64, suffix: &str) -> String {
    format!("chunk_{id}_{suffix}")
}
