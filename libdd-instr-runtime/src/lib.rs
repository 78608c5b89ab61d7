// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run-time trace recorder for instrumented programs.
//!
//! The instrumentation pass inserts calls to the free functions below at
//! function boundaries, allocation sites, and memory accesses. Each thread
//! records into its own fixed-capacity buffer and writes its own binary
//! trace file (`trace.bin.<slot>`), so the hot path is an in-memory append
//! with no cross-thread synchronization; a full buffer is flushed to disk
//! with one bulk write before the append proceeds, so no event is ever
//! lost to overflow. Events within one thread appear in its file in exact
//! append order; correlation across threads is done by timestamp.
//!
//! Nothing in this crate may take the host program down: allocation,
//! file, and clock failures all degrade to dropped events plus a warning
//! through `tracing`.

mod buffer;
mod clock;
mod config;
mod events;
mod thread_registry;
mod tracer;
mod writer;

use std::sync::LazyLock;

pub use clock::monotonic_ns;
pub use config::{
    TraceFormat, TracerConfig, BUFFER_SIZE, EXCLUDE_TID_ENV, TRACE_FORMAT_ENV, TRACE_PREFIX_ENV,
};
pub use events::{
    AccessValue, DecodeError, FnEventKind, LogEntry, ACCESS_RECORD_SIZE, ALLOC_RECORD_SIZE,
    FN_RECORD_SIZE,
};
pub use thread_registry::{SlotDecision, SlotId, ThreadRegistry, MAX_THREADS};
pub use tracer::{Tracer, TracerStats};
pub use writer::{trace_file_path, TraceWriter};

static GLOBAL_TRACER: LazyLock<Tracer> = LazyLock::new(Tracer::from_env);

/// Instrumented-program entry point: called once from `main`'s prologue.
/// Forces tracer initialization so environment parsing happens before the
/// first traced event.
pub fn log_init(_function_id: u32) {
    LazyLock::force(&GLOBAL_TRACER);
}

/// Instrumented-program exit hook: flushes every thread's buffer and
/// closes the trace files. Unflushed buffers are lost if the process dies
/// without reaching this (e.g. `SIGKILL`); that is the accepted data-loss
/// boundary.
pub fn log_exit(_function_id: u32) {
    GLOBAL_TRACER.shutdown();
}

pub fn log_fn_begin(function_id: u32) {
    GLOBAL_TRACER.log_fn_begin(function_id);
}

pub fn log_fn_end(function_id: u32) {
    GLOBAL_TRACER.log_fn_end(function_id);
}

#[allow(clippy::too_many_arguments)]
pub fn log_alloc(
    address: u64,
    size: u64,
    count: u64,
    type_id: u16,
    file_id: u16,
    line: u16,
    col: u16,
) {
    GLOBAL_TRACER.log_alloc(address, size, count, type_id, file_id, line, col);
}

macro_rules! access_entry_points {
    ($($(#[$doc:meta])* $fn_name:ident => $value_type:ty, $variant:ident;)*) => {
        $(
            $(#[$doc])*
            #[allow(clippy::too_many_arguments)]
            pub fn $fn_name(
                address: u64,
                value: $value_type,
                access_kind: u8,
                file_id: u16,
                line: u16,
                col: u16,
                type_id: u16,
                var_id: u16,
            ) {
                GLOBAL_TRACER.log_access(
                    address,
                    AccessValue::$variant(value),
                    access_kind,
                    file_id,
                    line,
                    col,
                    type_id,
                    var_id,
                );
            }
        )*
    };
}

access_entry_points! {
    log_access_ptr => u64, Ptr;
    /// For accesses known to point at static null-terminated strings; the
    /// pointer is recorded like any other, the pointee is not copied.
    log_access_static_string => u64, Ptr;
    log_access_i8 => u8, I8;
    log_access_i16 => u16, I16;
    log_access_i32 => u32, I32;
    log_access_i64 => u64, I64;
    log_access_f32 => f32, F32;
    log_access_f64 => f64, F64;
}
