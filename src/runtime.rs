use hifitime::prelude::{Duration, Epoch};

use serde::Serialize;

use crate::{accumulator::Accumulator, fix::ValidationError};

/// Per-cause counters of discarded records
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkipStats {
    /// Payloads that are not JSON objects
    pub decode: u64,
    pub missing_field: u64,
    pub not_numeric: u64,
    pub out_of_range: u64,

    /// Records already seen in this run
    pub duplicate: u64,
}

impl SkipStats {
    pub fn total(&self) -> u64 {
        self.decode + self.missing_field + self.not_numeric + self.out_of_range + self.duplicate
    }

    /// Accounts for a record that failed validation
    pub fn rejected(&mut self, error: &ValidationError) {
        match error {
            ValidationError::MissingField(_) => self.missing_field += 1,
            ValidationError::NotNumeric(_) => self.not_numeric += 1,
            ValidationError::OutOfRange { .. } => self.out_of_range += 1,
        }
    }
}

/// Final (or partial) figures of one run
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Total distance, in kilometers
    pub total_distance_km: f64,

    /// Number of valid fixes
    pub valid_count: u64,

    /// Discarded records
    pub skipped: SkipStats,

    /// Number of successful connections
    pub connections: u32,

    /// Run was interrupted by the user
    pub cancelled: bool,

    /// Run duration, in seconds
    pub uptime_s: f64,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total distance: {:.6} km", self.total_distance_km)?;
        writeln!(f, "Valid points: {}", self.valid_count)?;
        write!(
            f,
            "Skipped points: {} (decode: {}, missing field: {}, not numeric: {}, out of range: {}, duplicate: {})",
            self.skipped.total(),
            self.skipped.decode,
            self.skipped.missing_field,
            self.skipped.not_numeric,
            self.skipped.out_of_range,
            self.skipped.duplicate,
        )?;
        if self.cancelled {
            write!(f, "\nInterrupted after {:.1} s", self.uptime_s)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Runtime {
    /// Current [Epoch]
    pub epoch: Epoch,

    /// Epoch of deployment
    deploy_time: Epoch,

    /// Uptime as [Duration]
    pub uptime: Duration,

    /// Discarded records
    pub skipped: SkipStats,

    /// Interrupted by the user
    pub cancelled: bool,
}

impl Runtime {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            deploy_time: epoch,
            uptime: Default::default(),
            skipped: Default::default(),
            cancelled: false,
        }
    }

    /// Update latest epoch
    pub fn new_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.uptime = epoch - self.deploy_time;
    }

    /// Redacts the [Report] of this run
    pub fn report(&self, accumulator: &Accumulator, connections: u32) -> Report {
        Report {
            total_distance_km: accumulator.total_distance(),
            valid_count: accumulator.valid_count(),
            skipped: self.skipped,
            connections,
            cancelled: self.cancelled,
            uptime_s: self.uptime.to_seconds(),
        }
    }
}
