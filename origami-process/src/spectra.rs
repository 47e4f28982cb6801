//! 1D signal helpers shared by extraction and comparison.

use origami_core::dataset::MassSpectrum;

/// Rescale a trace so its maximum is 1. Non-finite inputs are treated as
/// zero; an empty or all-zero trace comes back as zeros rather than NaN.
pub fn normalize_1d(values: &[f64]) -> Vec<f64> {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|v| if v.is_finite() { v / max } else { 0.0 })
        .collect()
}

/// Total intensity of the points falling inside `[start, end]`.
pub fn sum_window(mz: &[f64], intensity: &[f64], start: f64, end: f64) -> f64 {
    mz.iter()
        .zip(intensity.iter())
        .filter(|(m, _)| **m >= start && **m <= end)
        .map(|(_, i)| *i)
        .sum()
}

/// Accumulates point lists onto a shared, evenly spaced m/z axis.
///
/// Used to fold many per-scan spectra into one document-level mass
/// spectrum: every `add` drops each point into the bin its m/z falls in,
/// and `into_spectrum` hands back the axis of bin centers with the
/// accumulated intensities.
#[derive(Debug, Clone)]
pub struct SpectrumBinner {
    start: f64,
    bin_width: f64,
    axis: Vec<f64>,
    accumulator: Vec<f64>,
}

impl SpectrumBinner {
    pub fn new(start: f64, stop: f64, bin_width: f64) -> Self {
        let span = (stop - start).max(0.0);
        let n_bins = ((span / bin_width).ceil() as usize).max(1);
        let axis = (0..n_bins)
            .map(|i| start + (i as f64 + 0.5) * bin_width)
            .collect();
        Self {
            start,
            bin_width,
            axis,
            accumulator: vec![0.0; n_bins],
        }
    }

    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    pub fn add(&mut self, mz: &[f64], intensity: &[f64]) {
        for (m, i) in mz.iter().zip(intensity.iter()) {
            if let Some(bin) = self.bin_of(*m) {
                self.accumulator[bin] += *i;
            }
        }
    }

    fn bin_of(&self, mz: f64) -> Option<usize> {
        if mz < self.start {
            return None;
        }
        let bin = ((mz - self.start) / self.bin_width) as usize;
        (bin < self.accumulator.len()).then_some(bin)
    }

    pub fn into_spectrum(self) -> MassSpectrum {
        let limits = (
            self.start,
            self.start + self.bin_width * self.accumulator.len() as f64,
        );
        MassSpectrum {
            mz: self.axis,
            intensity: self.accumulator,
            limits: Some(limits),
        }
    }
}
