//! Parameter records describing an ORIGAMI-MS collision voltage ramp.
//!
//! These live in the data model rather than the processing crate because a
//! [`Document`](crate::document::Document) persists the resolved settings and
//! per-voltage scan windows, so a later recalculation or per-voltage
//! extraction reuses exactly the parameters that produced the combined data.

use serde::{Deserialize, Serialize};

/// How scans are apportioned to collision voltages during combination.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpvMethod {
    /// A constant number of scans per voltage.
    #[default]
    Linear,
    /// Scans per voltage grow exponentially once the ramp passes a
    /// percentage of the end voltage.
    Exponential,
    /// Scans per voltage follow a Boltzmann sigmoid of the voltage.
    Boltzmann,
    /// An explicit `(scans, voltage)` list supplied by the acquisition.
    UserDefined,
}

/// One step of a user-defined ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpvStep {
    pub scans: usize,
    pub voltage: f64,
}

impl SpvStep {
    pub fn new(scans: usize, voltage: f64) -> Self {
        Self { scans, voltage }
    }
}

/// The full parameter set for a combination run.
///
/// Only the fields relevant to `method` are consulted; the rest ride along
/// so a settings record can be persisted and re-applied wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineSettings {
    pub method: SpvMethod,
    /// First scan of the voltage ramp; scans before it are the reporter
    /// region and are not combined.
    pub start_scan: usize,
    pub start_voltage: f64,
    pub end_voltage: f64,
    pub step_voltage: f64,
    pub scans_per_voltage: usize,
    /// Percentage of the end voltage past which the exponential ramp kicks in.
    pub exponential_percentage: f64,
    /// Exponent accumulator increment per step past the threshold.
    pub exponential_increment: f64,
    /// The `dx` slope of the Boltzmann sigmoid.
    pub boltzmann_offset: f64,
    pub user_list: Vec<SpvStep>,
}

impl Default for CombineSettings {
    fn default() -> Self {
        Self {
            method: SpvMethod::Linear,
            start_scan: 0,
            start_voltage: 4.0,
            end_voltage: 200.0,
            step_voltage: 2.0,
            scans_per_voltage: 3,
            exponential_percentage: 80.0,
            exponential_increment: 0.02,
            boltzmann_offset: 10.0,
            user_list: Vec::new(),
        }
    }
}

/// A half-open `[start_scan, end_scan)` window of scans summed into the
/// column for `voltage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanRange {
    pub start_scan: usize,
    pub end_scan: usize,
    pub voltage: f64,
}

impl ScanRange {
    pub fn new(start_scan: usize, end_scan: usize, voltage: f64) -> Self {
        Self {
            start_scan,
            end_scan,
            voltage,
        }
    }

    pub fn len(&self) -> usize {
        self.end_scan.saturating_sub(self.start_scan)
    }

    pub fn is_empty(&self) -> bool {
        self.end_scan <= self.start_scan
    }
}
