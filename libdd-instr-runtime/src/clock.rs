// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use nix::time::{clock_gettime, ClockId};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Current monotonic clock reading in nanoseconds.
///
/// Timestamps from one process are mutually comparable, which is all that
/// cross-thread event correlation needs. Returns 0 if the clock cannot be
/// read, so a clock failure degrades timestamps instead of dropping the
/// event.
pub fn monotonic_ns() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * NANOS_PER_SECOND + ts.tv_nsec() as u64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::monotonic_ns;

    #[test]
    fn clock_is_monotonic() {
        let first = monotonic_ns();
        let second = monotonic_ns();
        assert!(first > 0);
        assert!(second >= first);
    }
}
