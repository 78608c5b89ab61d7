// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace record definitions and their binary wire format.
//!
//! Every record is a one-byte discriminant followed by a fixed-size,
//! little-endian, padding-free payload, so trace files need no separators
//! or length prefixes: record boundaries fall out of the discriminant.
//! The value slot of an access record is always eight bytes regardless of
//! the value's type; narrower values are zero-extended and floats are
//! stored as their raw bits.

use std::io::{ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const TAG_FN: u8 = 0;
const TAG_ALLOC: u8 = 1;
const TAG_ACCESS: u8 = 2;

/// Encoded size of a function-boundary record, discriminant included.
pub const FN_RECORD_SIZE: usize = 15;
/// Encoded size of an allocation record, discriminant included.
pub const ALLOC_RECORD_SIZE: usize = 42;
/// Encoded size of a memory-access record, discriminant included.
pub const ACCESS_RECORD_SIZE: usize = 38;

/// Which side of a function boundary an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnEventKind {
    Begin,
    End,
}

impl FnEventKind {
    fn code(self) -> u8 {
        match self {
            FnEventKind::Begin => 0,
            FnEventKind::End => 1,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(FnEventKind::Begin),
            1 => Ok(FnEventKind::End),
            other => Err(DecodeError::UnknownFnEventKind(other)),
        }
    }
}

/// The value observed by a memory access, typed at the instrumentation
/// site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccessValue {
    I8(u8),
    I16(u16),
    I32(u32),
    I64(u64),
    F32(f32),
    F64(f64),
    Ptr(u64),
}

impl AccessValue {
    fn type_code(self) -> u8 {
        match self {
            AccessValue::I8(_) => 0,
            AccessValue::I16(_) => 1,
            AccessValue::I32(_) => 2,
            AccessValue::I64(_) => 3,
            AccessValue::F32(_) => 4,
            AccessValue::F64(_) => 5,
            AccessValue::Ptr(_) => 6,
        }
    }

    fn raw_bits(self) -> u64 {
        match self {
            AccessValue::I8(v) => v as u64,
            AccessValue::I16(v) => v as u64,
            AccessValue::I32(v) => v as u64,
            AccessValue::I64(v) => v,
            AccessValue::F32(v) => v.to_bits() as u64,
            AccessValue::F64(v) => v.to_bits(),
            AccessValue::Ptr(v) => v,
        }
    }

    fn from_raw(type_code: u8, bits: u64) -> Result<Self, DecodeError> {
        match type_code {
            0 => Ok(AccessValue::I8(bits as u8)),
            1 => Ok(AccessValue::I16(bits as u16)),
            2 => Ok(AccessValue::I32(bits as u32)),
            3 => Ok(AccessValue::I64(bits)),
            4 => Ok(AccessValue::F32(f32::from_bits(bits as u32))),
            5 => Ok(AccessValue::F64(f64::from_bits(bits))),
            6 => Ok(AccessValue::Ptr(bits)),
            other => Err(DecodeError::UnknownValueType(other)),
        }
    }
}

/// One trace record, as appended by the instrumented program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogEntry {
    Fn {
        thread_id: u8,
        kind: FnEventKind,
        function_id: u32,
        timestamp_ns: u64,
    },
    Alloc {
        thread_id: u8,
        address: u64,
        size: u64,
        count: u64,
        type_id: u16,
        file_id: u16,
        line: u16,
        col: u16,
        timestamp_ns: u64,
    },
    Access {
        thread_id: u8,
        address: u64,
        value: AccessValue,
        access_kind: u8,
        file_id: u16,
        line: u16,
        col: u16,
        type_id: u16,
        var_id: u16,
        timestamp_ns: u64,
    },
}

/// A trace record that could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown record discriminant {0}")]
    UnknownDiscriminant(u8),
    #[error("unknown function event kind {0}")]
    UnknownFnEventKind(u8),
    #[error("unknown value type code {0}")]
    UnknownValueType(u8),
    #[error("truncated record")]
    Truncated(#[from] std::io::Error),
}

impl LogEntry {
    pub fn thread_id(&self) -> u8 {
        match *self {
            LogEntry::Fn { thread_id, .. }
            | LogEntry::Alloc { thread_id, .. }
            | LogEntry::Access { thread_id, .. } => thread_id,
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        match *self {
            LogEntry::Fn { timestamp_ns, .. }
            | LogEntry::Alloc { timestamp_ns, .. }
            | LogEntry::Access { timestamp_ns, .. } => timestamp_ns,
        }
    }

    /// Appends this record's wire encoding to `out`.
    pub fn encode<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match *self {
            LogEntry::Fn {
                thread_id,
                kind,
                function_id,
                timestamp_ns,
            } => {
                out.write_u8(TAG_FN)?;
                out.write_u8(thread_id)?;
                out.write_u8(kind.code())?;
                out.write_u32::<LittleEndian>(function_id)?;
                out.write_u64::<LittleEndian>(timestamp_ns)?;
            }
            LogEntry::Alloc {
                thread_id,
                address,
                size,
                count,
                type_id,
                file_id,
                line,
                col,
                timestamp_ns,
            } => {
                out.write_u8(TAG_ALLOC)?;
                out.write_u8(thread_id)?;
                out.write_u64::<LittleEndian>(address)?;
                out.write_u64::<LittleEndian>(size)?;
                out.write_u64::<LittleEndian>(count)?;
                out.write_u16::<LittleEndian>(type_id)?;
                out.write_u16::<LittleEndian>(file_id)?;
                out.write_u16::<LittleEndian>(line)?;
                out.write_u16::<LittleEndian>(col)?;
                out.write_u64::<LittleEndian>(timestamp_ns)?;
            }
            LogEntry::Access {
                thread_id,
                address,
                value,
                access_kind,
                file_id,
                line,
                col,
                type_id,
                var_id,
                timestamp_ns,
            } => {
                out.write_u8(TAG_ACCESS)?;
                out.write_u8(thread_id)?;
                out.write_u64::<LittleEndian>(address)?;
                out.write_u8(value.type_code())?;
                out.write_u64::<LittleEndian>(value.raw_bits())?;
                out.write_u8(access_kind)?;
                out.write_u16::<LittleEndian>(file_id)?;
                out.write_u16::<LittleEndian>(line)?;
                out.write_u16::<LittleEndian>(col)?;
                out.write_u16::<LittleEndian>(type_id)?;
                out.write_u16::<LittleEndian>(var_id)?;
                out.write_u64::<LittleEndian>(timestamp_ns)?;
            }
        }
        Ok(())
    }

    /// Reads the next record from `input`.
    ///
    /// Returns `Ok(None)` at a clean end of input (no partial record).
    pub fn decode<R: Read>(input: &mut R) -> Result<Option<Self>, DecodeError> {
        let tag = match input.read_u8() {
            Ok(tag) => tag,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry = match tag {
            TAG_FN => LogEntry::Fn {
                thread_id: input.read_u8()?,
                kind: FnEventKind::from_code(input.read_u8()?)?,
                function_id: input.read_u32::<LittleEndian>()?,
                timestamp_ns: input.read_u64::<LittleEndian>()?,
            },
            TAG_ALLOC => LogEntry::Alloc {
                thread_id: input.read_u8()?,
                address: input.read_u64::<LittleEndian>()?,
                size: input.read_u64::<LittleEndian>()?,
                count: input.read_u64::<LittleEndian>()?,
                type_id: input.read_u16::<LittleEndian>()?,
                file_id: input.read_u16::<LittleEndian>()?,
                line: input.read_u16::<LittleEndian>()?,
                col: input.read_u16::<LittleEndian>()?,
                timestamp_ns: input.read_u64::<LittleEndian>()?,
            },
            TAG_ACCESS => {
                let thread_id = input.read_u8()?;
                let address = input.read_u64::<LittleEndian>()?;
                let type_code = input.read_u8()?;
                let bits = input.read_u64::<LittleEndian>()?;
                LogEntry::Access {
                    thread_id,
                    address,
                    value: AccessValue::from_raw(type_code, bits)?,
                    access_kind: input.read_u8()?,
                    file_id: input.read_u16::<LittleEndian>()?,
                    line: input.read_u16::<LittleEndian>()?,
                    col: input.read_u16::<LittleEndian>()?,
                    type_id: input.read_u16::<LittleEndian>()?,
                    var_id: input.read_u16::<LittleEndian>()?,
                    timestamp_ns: input.read_u64::<LittleEndian>()?,
                }
            }
            other => return Err(DecodeError::UnknownDiscriminant(other)),
        };
        Ok(Some(entry))
    }

    /// Appends this record as one human-readable text line, the format
    /// used by the text trace backend.
    pub fn write_text<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match *self {
            LogEntry::Fn {
                kind: FnEventKind::Begin,
                function_id,
                ..
            } => writeln!(out, "fb {function_id}"),
            LogEntry::Fn {
                kind: FnEventKind::End,
                function_id,
                ..
            } => writeln!(out, "fe {function_id}"),
            LogEntry::Alloc {
                address,
                size,
                count,
                type_id,
                file_id,
                line,
                col,
                ..
            } => writeln!(out, "{address:#x} {size} {count} {type_id} {file_id} {line} {col}"),
            LogEntry::Access {
                address,
                value,
                access_kind,
                file_id,
                line,
                col,
                type_id,
                var_id,
                ..
            } => writeln!(
                out,
                "{address:#x} {:#x} {} {access_kind} {file_id} {line} {col} {type_id} {var_id}",
                value.raw_bits(),
                value.type_code(),
            ),
        }
    }
}
