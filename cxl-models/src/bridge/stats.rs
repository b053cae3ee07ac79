// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Bridge statistics.

use std::fmt;

use crate::bridge::ports::RejectReason;
use crate::transaction::MemoryResponse;

/// Summary of a set of samples with a power-of-two histogram.
///
/// Bucket 0 counts zeros and bucket `i` counts values in `[2^(i-1), 2^i)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Distribution {
    count: u64,
    sum: u128,
    min: Option<u64>,
    max: Option<u64>,
    buckets: Vec<u64>,
}

impl Distribution {
    pub fn record(&mut self, value: u64) {
        self.count += 1;
        self.sum += u128::from(value);
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));

        let bucket = (u64::BITS - value.leading_zeros()) as usize;
        if self.buckets.len() <= bucket {
            self.buckets.resize(bucket + 1, 0);
        }
        self.buckets[bucket] += 1;
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn min(&self) -> Option<u64> {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Option<u64> {
        self.max
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    #[must_use]
    pub fn histogram(&self) -> &[u64] {
        &self.buckets
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(
                f,
                "n={} min={} max={} mean={:.1}",
                self.count,
                min,
                max,
                self.mean()
            ),
            _ => write!(f, "n=0"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BridgeStats {
    pub accepted: u64,
    pub rejected_out_of_range: u64,
    pub rejected_unsupported: u64,
    pub rejected_busy: u64,
    pub rejected_duplicate: u64,
    pub rejected_faulted: u64,
    /// Number of admissions that filled the tracker.
    pub queue_full_events: u64,
    pub dispatched: u64,
    pub completed_ok: u64,
    pub completed_error: u64,
    pub timeouts: u64,
    pub late_responses_discarded: u64,
    pub protocol_violations: u64,

    /// Ticks from admission to delivery.
    pub round_trip: Distribution,

    /// Tracker entries in use, sampled after each admission.
    pub occupancy: Distribution,
}

impl BridgeStats {
    pub fn record_rejection(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::OutOfRange => self.rejected_out_of_range += 1,
            RejectReason::Unsupported(_) => self.rejected_unsupported += 1,
            RejectReason::Busy => self.rejected_busy += 1,
            RejectReason::DuplicateId => self.rejected_duplicate += 1,
            RejectReason::Faulted => self.rejected_faulted += 1,
        }
    }

    pub fn record_delivery(&mut self, response: &MemoryResponse, round_trip_ticks: u64) {
        if response.status.is_ok() {
            self.completed_ok += 1;
        } else {
            self.completed_error += 1;
        }
        self.round_trip.record(round_trip_ticks);
    }

    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected_out_of_range
            + self.rejected_unsupported
            + self.rejected_busy
            + self.rejected_duplicate
            + self.rejected_faulted
    }

    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.completed_ok + self.completed_error
    }
}

impl fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accepted:           {}", self.accepted)?;
        writeln!(
            f,
            "rejected:           {} (range {}, unsupported {}, busy {}, duplicate {}, faulted {})",
            self.rejected(),
            self.rejected_out_of_range,
            self.rejected_unsupported,
            self.rejected_busy,
            self.rejected_duplicate,
            self.rejected_faulted
        )?;
        writeln!(f, "queue full events:  {}", self.queue_full_events)?;
        writeln!(f, "dispatched:         {}", self.dispatched)?;
        writeln!(
            f,
            "delivered:          {} ok, {} error",
            self.completed_ok, self.completed_error
        )?;
        writeln!(f, "timeouts:           {}", self.timeouts)?;
        writeln!(f, "late responses:     {}", self.late_responses_discarded)?;
        writeln!(f, "protocol errors:    {}", self.protocol_violations)?;
        writeln!(f, "round trip (ticks): {}", self.round_trip)?;
        write!(f, "occupancy:          {}", self.occupancy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution() {
        let mut dist = Distribution::default();
        assert_eq!(dist.mean(), 0.0);
        assert_eq!(format!("{dist}"), "n=0");

        for value in [0, 1, 3, 4, 12] {
            dist.record(value);
        }
        assert_eq!(dist.count(), 5);
        assert_eq!(dist.min(), Some(0));
        assert_eq!(dist.max(), Some(12));
        assert_eq!(dist.mean(), 4.0);
        assert_eq!(dist.histogram(), &[1, 1, 1, 1, 1]);
    }

    #[test]
    fn rejections_by_reason() {
        let mut stats = BridgeStats::default();
        stats.record_rejection(&RejectReason::Busy);
        stats.record_rejection(&RejectReason::Busy);
        stats.record_rejection(&RejectReason::OutOfRange);
        assert_eq!(stats.rejected_busy, 2);
        assert_eq!(stats.rejected_out_of_range, 1);
        assert_eq!(stats.rejected(), 3);
    }
}
