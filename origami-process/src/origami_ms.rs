//! Collision voltage combination for ORIGAMI-MS acquisitions.
//!
//! An ORIGAMI-MS run ramps the collision voltage during acquisition, so the
//! raw data arrives as a drift x scan array where consecutive scan windows
//! belong to one voltage each. Combination folds those windows into one
//! column per voltage. The window layout is dictated by the acquisition
//! policy: constant scans per voltage (Linear), exponentially growing
//! windows (Exponential), a Boltzmann sigmoid (Boltzmann), or an explicit
//! list (UserDefined).

use ndarray::{s, Array2, Axis};
use thiserror::Error;
use tracing::info;

use origami_core::combine::{CombineSettings, ScanRange, SpvMethod};
use origami_core::dataset::{AxisKind, Chromatogram, Heatmap};
use origami_core::document::Document;

const BOLTZMANN_A1: f64 = 2.0;
const BOLTZMANN_A2: f64 = 0.07;
const BOLTZMANN_X0: f64 = 47.0;

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("The ramp requires {required} scans but the data only contains {available}")]
    ScanRangeExceeded { required: usize, available: usize },
    #[error("The voltage step must be positive, got {0}")]
    InvalidStepVoltage(f64),
    #[error("Scans per voltage must be at least 1")]
    InvalidScansPerVoltage,
    #[error("The end voltage {end} must not be below the start voltage {start}")]
    InvertedVoltageRange { start: f64, end: f64 },
    #[error("The Boltzmann offset must be positive, got {0}")]
    InvalidBoltzmannOffset(f64),
    #[error("The user-defined scan list is empty")]
    EmptyUserList,
    #[error("No extracted ion is stored under the label {0:?}")]
    UnknownIon(String),
}

/// The combined array together with everything a document persists about
/// how it was produced.
#[derive(Debug, Clone)]
pub struct CombinedOutput {
    /// Drift x collision-voltage array; `x` holds the voltages.
    pub heatmap: Heatmap,
    pub ranges: Vec<ScanRange>,
    pub settings: CombineSettings,
}

fn voltage_axis(settings: &CombineSettings) -> Result<Vec<f64>, ActivationError> {
    if settings.step_voltage <= 0.0 {
        return Err(ActivationError::InvalidStepVoltage(settings.step_voltage));
    }
    if settings.end_voltage < settings.start_voltage {
        return Err(ActivationError::InvertedVoltageRange {
            start: settings.start_voltage,
            end: settings.end_voltage,
        });
    }
    let span = settings.end_voltage - settings.start_voltage;
    let n_voltages = (span / settings.step_voltage) as usize + 1;
    if n_voltages == 1 {
        return Ok(vec![settings.start_voltage]);
    }
    let step = span / (n_voltages - 1) as f64;
    Ok((0..n_voltages)
        .map(|i| settings.start_voltage + i as f64 * step)
        .collect())
}

fn ranges_from_counts(
    counts: impl IntoIterator<Item = usize>,
    voltages: impl IntoIterator<Item = f64>,
    start_scan: usize,
) -> Vec<ScanRange> {
    let mut x1 = 0;
    counts
        .into_iter()
        .zip(voltages)
        .map(|(count, voltage)| {
            let x2 = x1 + count;
            let range = ScanRange::new(x1 + start_scan, x2 + start_scan, voltage);
            x1 = x2;
            range
        })
        .collect()
}

/// Resolve the per-voltage scan windows for a parameter set.
pub fn calculate_scan_ranges(
    settings: &CombineSettings,
) -> Result<Vec<ScanRange>, ActivationError> {
    match settings.method {
        SpvMethod::UserDefined => {
            if settings.user_list.is_empty() {
                return Err(ActivationError::EmptyUserList);
            }
            Ok(ranges_from_counts(
                settings.user_list.iter().map(|step| step.scans),
                settings.user_list.iter().map(|step| step.voltage),
                settings.start_scan,
            ))
        }
        SpvMethod::Linear => {
            if settings.scans_per_voltage == 0 {
                return Err(ActivationError::InvalidScansPerVoltage);
            }
            let voltages = voltage_axis(settings)?;
            let counts = vec![settings.scans_per_voltage; voltages.len()];
            Ok(ranges_from_counts(counts, voltages, settings.start_scan))
        }
        SpvMethod::Exponential => {
            if settings.scans_per_voltage == 0 {
                return Err(ActivationError::InvalidScansPerVoltage);
            }
            let voltages = voltage_axis(settings)?;
            let threshold = settings.end_voltage * settings.exponential_percentage / 100.0;
            let base = settings.scans_per_voltage as f64;
            let mut accumulator = 0.0;
            let counts: Vec<usize> = voltages
                .iter()
                .map(|cv| {
                    if *cv >= threshold {
                        accumulator += settings.exponential_increment;
                        (base * accumulator.exp()).round() as usize
                    } else {
                        settings.scans_per_voltage
                    }
                })
                .collect();
            Ok(ranges_from_counts(counts, voltages, settings.start_scan))
        }
        SpvMethod::Boltzmann => {
            if settings.scans_per_voltage == 0 {
                return Err(ActivationError::InvalidScansPerVoltage);
            }
            if settings.boltzmann_offset <= 0.0 {
                return Err(ActivationError::InvalidBoltzmannOffset(
                    settings.boltzmann_offset,
                ));
            }
            let voltages = voltage_axis(settings)?;
            let dx = settings.boltzmann_offset;
            let counts: Vec<usize> = voltages
                .iter()
                .map(|cv| {
                    let sigmoid =
                        BOLTZMANN_A2 + (BOLTZMANN_A1 - BOLTZMANN_A2) / (1.0 + ((cv - BOLTZMANN_X0) / dx).exp());
                    let mut fit = (1.0 / sigmoid).round() as usize;
                    if fit == 0 {
                        fit = 1;
                    }
                    fit * settings.scans_per_voltage
                })
                .collect();
            Ok(ranges_from_counts(counts, voltages, settings.start_scan))
        }
    }
}

fn check_available(ranges: &[ScanRange], available: usize) -> Result<(), ActivationError> {
    let required = ranges.iter().map(|r| r.end_scan).max().unwrap_or(0);
    if required > available {
        return Err(ActivationError::ScanRangeExceeded {
            required,
            available,
        });
    }
    Ok(())
}

/// Fold a drift x scan heatmap into drift x collision voltage.
///
/// If the resolved ramp demands more scans than the array holds, nothing is
/// combined and [`ActivationError::ScanRangeExceeded`] reports both counts
/// so the caller can surface them.
pub fn combine_heatmap(
    source: &Heatmap,
    settings: &CombineSettings,
) -> Result<CombinedOutput, ActivationError> {
    let ranges = calculate_scan_ranges(settings)?;
    check_available(&ranges, source.ncols())?;

    let mut combined = Array2::zeros((source.nrows(), ranges.len()));
    for (column, range) in ranges.iter().enumerate() {
        let window = source.array.slice(s![.., range.start_scan..range.end_scan]);
        combined
            .column_mut(column)
            .assign(&window.sum_axis(Axis(1)));
    }
    info!(
        "Combined {} scans into {} voltages",
        ranges.iter().map(|r| r.len()).sum::<usize>(),
        ranges.len()
    );

    let heatmap = Heatmap {
        array: combined,
        x: ranges.iter().map(|r| r.voltage).collect(),
        y: source.y.clone(),
        x_axis: AxisKind::CollisionVoltage,
        y_axis: source.y_axis,
    };
    Ok(CombinedOutput {
        heatmap,
        ranges,
        settings: settings.clone(),
    })
}

/// Fold a per-scan trace into a per-voltage trace with the same windows.
pub fn combine_chromatogram(
    source: &Chromatogram,
    settings: &CombineSettings,
) -> Result<Chromatogram, ActivationError> {
    let ranges = calculate_scan_ranges(settings)?;
    check_available(&ranges, source.len())?;

    let mut time = Vec::with_capacity(ranges.len());
    let mut intensity = Vec::with_capacity(ranges.len());
    for range in &ranges {
        time.push(range.voltage);
        intensity.push(source.intensity[range.start_scan..range.end_scan].iter().sum());
    }
    Ok(Chromatogram {
        time,
        intensity,
        axis: AxisKind::CollisionVoltage,
    })
}

/// Combine one extracted ion and persist the run's settings and scan
/// windows on the document for later recalculation and per-voltage
/// extraction.
pub fn combine_ion(
    document: &mut Document,
    label: &str,
    settings: &CombineSettings,
) -> Result<(), ActivationError> {
    let source = document
        .ion_heatmaps
        .get(label)
        .ok_or_else(|| ActivationError::UnknownIon(label.to_string()))?;
    let output = combine_heatmap(source, settings)?;
    document.scan_ranges = output.ranges;
    document.combine_settings = Some(output.settings);
    document
        .combined_ion_heatmaps
        .insert(label.to_string(), output.heatmap);
    Ok(())
}

/// The staircase of `(scan, voltage)` pairs tracing the resolved ramp,
/// two points per window.
pub fn extraction_windows(ranges: &[ScanRange]) -> (Vec<usize>, Vec<f64>) {
    let mut scans = Vec::with_capacity(ranges.len() * 2);
    let mut voltages = Vec::with_capacity(ranges.len() * 2);
    for range in ranges {
        scans.push(range.start_scan);
        scans.push(range.end_scan);
        voltages.push(range.voltage);
        voltages.push(range.voltage);
    }
    (scans, voltages)
}
