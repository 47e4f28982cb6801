//! 2D intensity transforms applied before comparison or display.

use ndarray::{s, Array2};

use origami_core::dataset::NormalizationMode;

/// Rescale a 2D array according to `mode`.
///
/// `Maximum` normalizes each column to a maximum of 1, so every collision
/// voltage (or scan) contributes equally to a downstream comparison
/// regardless of its absolute signal. The remaining modes are element-wise
/// transforms. Non-finite results are scrubbed to zero.
pub fn normalize_2d(array: &Array2<f64>, mode: NormalizationMode) -> Array2<f64> {
    let mut out = match mode {
        NormalizationMode::Maximum => {
            let mut out = array.clone();
            for mut column in out.columns_mut() {
                let max = column.iter().copied().fold(0.0_f64, f64::max);
                if max > 0.0 {
                    column.mapv_inplace(|v| v / max);
                }
            }
            out
        }
        NormalizationMode::Logarithmic => array.mapv(|v| if v > 0.0 { v.log10() } else { 0.0 }),
        NormalizationMode::NaturalLog => array.mapv(|v| if v > 0.0 { v.ln() } else { 0.0 }),
        NormalizationMode::SquareRoot => array.mapv(|v| v.max(0.0).sqrt()),
    };
    out.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    out
}

/// Zero every value below `fraction` of the array maximum. Used by mask
/// overlays to suppress the baseline before stacking.
pub fn threshold_below(array: &mut Array2<f64>, fraction: f64) {
    let max = array.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return;
    }
    let cutoff = fraction.clamp(0.0, 1.0) * max;
    array.mapv_inplace(|v| if v < cutoff { 0.0 } else { v });
}

/// Drop the first `start` columns, the reporter region preceding a ramp.
pub fn crop_columns(array: &Array2<f64>, start: usize) -> Array2<f64> {
    let start = start.min(array.ncols());
    array.slice(s![.., start..]).to_owned()
}

/// Global maximum normalization used for building color composites.
pub fn normalize_total(array: &Array2<f64>) -> Array2<f64> {
    let max = array.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return Array2::zeros(array.raw_dim());
    }
    array.mapv(|v| (v / max).clamp(0.0, 1.0))
}
