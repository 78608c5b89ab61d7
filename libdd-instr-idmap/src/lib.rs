// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Build-wide stable integer IDs for instrumented source entities.
//!
//! The instrumentation pass refers to functions, types, and files by small
//! dense integers rather than by name. Those integers have to be identical
//! across independently compiled translation units, including units built
//! by concurrent compiler invocations in a parallel build, and there is no
//! coordinator process to ask. [`IdRegistry`] solves this with a persisted
//! name-to-ID table plus a pool of pre-partitioned ID ranges ("chunks"):
//! each invocation reserves a chunk under an advisory file lock and then
//! mints IDs from it with plain in-memory increments, so the cross-process
//! critical section is a rare read-modify-write of one small document
//! instead of a lock around every single ID request.

mod chunk;
mod flock;
mod registry;
mod store;

pub use chunk::{Chunk, ChunkPool, ChunkStatus, DEFAULT_CHUNK_SIZE};
pub use flock::{FileLocker, LockPolicy};
pub use registry::{IdRegistry, IdRegistryConfig, MAP_DIR_ENV};
pub use store::{load_document, store_document};
