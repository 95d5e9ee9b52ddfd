// Copyright 2023 The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Controller clock arithmetic.
//!
//! Timestamps handed to the ISO-AL are microsecond readings of the
//! controller ticker, which wraps at [`TIME_WRAPPING_POINT_US`]. All
//! additions and subtractions on such timestamps must go through
//! [`wrapped_time`].

use num_integer::Integer;

use crate::isoal::Role;

#[allow(non_camel_case_types)]
pub type microseconds = u32;

#[allow(non_camel_case_types)]
pub type slots = u16;

/// Duration of one ISO_Interval unit.
pub const ISO_INT_UNIT_US: microseconds = 1250;

// The ticker is a 24-bit counter clocked at 32.768 kHz.
const TICKER_CNTR_MASK: u64 = 0x00ff_ffff;
const TICKER_CLOCK_HZ: u64 = 32768;

const fn ticks_to_us(ticks: u64) -> u64 {
    ticks * 1_000_000_000 / TICKER_CLOCK_HZ / 1000
}

/// Largest timestamp value the controller clock can report.
pub const TIME_WRAPPING_POINT_US: microseconds = ticks_to_us(TICKER_CNTR_MASK) as microseconds;

/// Number of distinct timestamp values, i.e. the modulus of the clock.
pub const TIME_SPAN_FULL_US: u64 = TIME_WRAPPING_POINT_US as u64 + 1;

/// Add a signed difference to a timestamp, wrapping within
/// `0..=TIME_WRAPPING_POINT_US` in both directions.
pub fn wrapped_time(time_now: microseconds, time_diff: i32) -> microseconds {
    debug_assert!(time_now <= TIME_WRAPPING_POINT_US);
    let span = TIME_SPAN_FULL_US as i64;
    (time_now as i64 + time_diff as i64).mod_floor(&span) as microseconds
}

/// Advance a timestamp by `count` periods of `period` microseconds.
pub fn advance_time(time_now: microseconds, count: u64, period: microseconds) -> microseconds {
    let span = TIME_SPAN_FULL_US as u128;
    let diff = (count as u128 * period as u128) % span;
    wrapped_time(time_now, diff as i32)
}

/// Compute the constant part of the SDU synchronization reference, as the
/// offset to add to the reference anchor point of a received PDU.
/// SDU_Interval and the sync delays are provided in microseconds,
/// ISO_Interval in multiple of 1.25ms. For framed streams the
/// Time_Offset of each SDU is subtracted separately.
///
/// Unframed:
/// - C->P (peripheral sink): CIS_Sync_Delay + (FT - 1) * ISO_Interval
/// - P->C (central sink): CIS_Sync_Delay - CIG_Sync_Delay
///   - ((ISO_Interval / SDU_Interval) - 1) * ISO_Interval
/// - BIS: BIG_Sync_Delay
///
/// Framed:
/// - C->P: CIS_Sync_Delay + SDU_Interval + FT * ISO_Interval
/// - P->C: CIS_Sync_Delay - CIG_Sync_Delay
/// - BIS: BIG_Sync_Delay + SDU_Interval + ISO_Interval
pub fn sdu_sync_latency(
    role: Role,
    framed: bool,
    flush_timeout: u8,
    sdu_interval: microseconds,
    iso_interval: slots,
    stream_sync_delay: microseconds,
    group_sync_delay: microseconds,
) -> i32 {
    let iso_interval = iso_interval as i64 * ISO_INT_UNIT_US as i64;
    let sdu_interval = sdu_interval as i64;
    let flush_timeout = flush_timeout as i64;
    let stream_sync_delay = stream_sync_delay as i64;
    let group_sync_delay = group_sync_delay as i64;

    let latency = match (role, framed) {
        (Role::Peripheral, false) => stream_sync_delay + (flush_timeout - 1) * iso_interval,
        (Role::Peripheral, true) => {
            stream_sync_delay + sdu_interval + flush_timeout * iso_interval
        }
        (Role::Central, false) => {
            let sdus_per_interval = iso_interval.checked_div(sdu_interval).unwrap_or(1).max(1);
            stream_sync_delay - group_sync_delay - (sdus_per_interval - 1) * iso_interval
        }
        (Role::Central, true) => stream_sync_delay - group_sync_delay,
        (Role::Broadcast, false) => group_sync_delay,
        (Role::Broadcast, true) => group_sync_delay + sdu_interval + iso_interval,
    };

    latency.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_wrapping_point() {
        assert_eq!(TIME_WRAPPING_POINT_US, 511_999_969);
        assert_eq!(TIME_SPAN_FULL_US, 511_999_970);
    }

    #[test]
    fn test_wrapped_time_without_wrap() {
        assert_eq!(wrapped_time(1000, 250), 1250);
        assert_eq!(wrapped_time(1000, -250), 750);
        assert_eq!(wrapped_time(0, 0), 0);
    }

    #[test]
    fn test_wrapped_time_forward_wrap() {
        assert_eq!(wrapped_time(TIME_WRAPPING_POINT_US, 1), 0);
        assert_eq!(wrapped_time(TIME_WRAPPING_POINT_US - 10, 20), 9);
    }

    #[test]
    fn test_wrapped_time_backward_wrap() {
        assert_eq!(wrapped_time(0, -1), TIME_WRAPPING_POINT_US);
        assert_eq!(wrapped_time(10, -20), TIME_WRAPPING_POINT_US - 9);
    }

    #[test]
    fn test_wrapped_time_round_trip() {
        let mut rng = rand::rng();
        for _ in 0..10_000 {
            let time: microseconds = rng.random_range(0..=TIME_WRAPPING_POINT_US);
            let bound = TIME_WRAPPING_POINT_US as i32;
            let diff: i32 = rng.random_range(-bound..=bound);
            let there = wrapped_time(time, diff);
            assert!(there <= TIME_WRAPPING_POINT_US);
            assert_eq!(wrapped_time(there, -diff), time, "time {} diff {}", time, diff);
        }
    }

    #[test]
    fn test_advance_time() {
        assert_eq!(advance_time(100, 3, 10_000), 30_100);
        assert_eq!(advance_time(TIME_WRAPPING_POINT_US, 2, 10), 19);
        assert_eq!(advance_time(100, TIME_SPAN_FULL_US, 10_000), 100);
    }

    #[test]
    fn test_latency_peripheral() {
        assert_eq!(sdu_sync_latency(Role::Peripheral, false, 1, 10_000, 8, 1_200, 2_000), 1_200);
        assert_eq!(sdu_sync_latency(Role::Peripheral, false, 3, 10_000, 8, 1_200, 2_000), 21_200);
        assert_eq!(sdu_sync_latency(Role::Peripheral, true, 2, 10_000, 8, 1_200, 2_000), 31_200);
    }

    #[test]
    fn test_latency_central() {
        // One SDU per ISO interval.
        assert_eq!(sdu_sync_latency(Role::Central, false, 1, 10_000, 8, 1_200, 2_000), -800);
        // Two SDUs per ISO interval.
        assert_eq!(sdu_sync_latency(Role::Central, false, 1, 5_000, 8, 1_200, 2_000), -10_800);
        assert_eq!(sdu_sync_latency(Role::Central, true, 1, 10_000, 8, 1_200, 2_000), -800);
    }

    #[test]
    fn test_latency_broadcast() {
        assert_eq!(sdu_sync_latency(Role::Broadcast, false, 1, 10_000, 8, 1_200, 2_000), 2_000);
        assert_eq!(sdu_sync_latency(Role::Broadcast, true, 1, 10_000, 8, 1_200, 2_000), 22_000);
    }
}
