//! Similarity metrics between heatmaps.
//!
//! Both inputs are normalized per column before differencing so the metric
//! reflects the shape of the mobility profile at each voltage, not the raw
//! signal magnitude. Values are reported as percentages.

use ndarray::Array2;
use thiserror::Error;

use origami_core::dataset::NormalizationMode;

use crate::heatmap::normalize_2d;
use crate::spectra::normalize_1d;

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("The arrays have different shapes ({a:?} vs {b:?}) and cannot be compared")]
    ShapeMismatch { a: (usize, usize), b: (usize, usize) },
    #[error("At least {needed} arrays are required, got {got}")]
    NotEnoughInputs { needed: usize, got: usize },
    #[error("Cannot compare empty arrays")]
    EmptyInput,
}

fn dims(array: &Array2<f64>) -> (usize, usize) {
    (array.nrows(), array.ncols())
}

fn check_pair(a: &Array2<f64>, b: &Array2<f64>) -> Result<(), MetricError> {
    if a.is_empty() || b.is_empty() {
        return Err(MetricError::EmptyInput);
    }
    if dims(a) != dims(b) {
        return Err(MetricError::ShapeMismatch {
            a: dims(a),
            b: dims(b),
        });
    }
    Ok(())
}

fn check_stack(arrays: &[&Array2<f64>], needed: usize) -> Result<(), MetricError> {
    if arrays.len() < needed {
        return Err(MetricError::NotEnoughInputs {
            needed,
            got: arrays.len(),
        });
    }
    for pair in arrays.windows(2) {
        check_pair(pair[0], pair[1])?;
    }
    Ok(())
}

/// Percent root-mean-square deviation between two heatmaps, with the
/// normalized difference map it was computed from.
pub fn rmsd(a: &Array2<f64>, b: &Array2<f64>) -> Result<(f64, Array2<f64>), MetricError> {
    check_pair(a, b)?;
    let difference =
        normalize_2d(a, NormalizationMode::Maximum) - normalize_2d(b, NormalizationMode::Maximum);
    let mean_square = difference.mapv(|v| v * v).mean().unwrap_or(0.0);
    Ok((mean_square.sqrt() * 100.0, difference))
}

/// Per-column percent RMSD, one value per collision voltage. Each column is
/// normalized on its own before differencing.
pub fn rmsf(a: &Array2<f64>, b: &Array2<f64>) -> Result<Vec<f64>, MetricError> {
    check_pair(a, b)?;
    let mut profile = Vec::with_capacity(a.ncols());
    for (col_a, col_b) in a.columns().into_iter().zip(b.columns()) {
        let norm_a = normalize_1d(&col_a.to_vec());
        let norm_b = normalize_1d(&col_b.to_vec());
        let mean_square = norm_a
            .iter()
            .zip(norm_b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            / norm_a.len() as f64;
        profile.push(mean_square.sqrt() * 100.0);
    }
    Ok(profile)
}

/// Element-wise mean over a stack of same-shape arrays.
pub fn mean_map(arrays: &[&Array2<f64>]) -> Result<Array2<f64>, MetricError> {
    check_stack(arrays, 2)?;
    let mut sum = Array2::zeros(arrays[0].raw_dim());
    for array in arrays {
        sum += *array;
    }
    Ok(sum / arrays.len() as f64)
}

/// Element-wise population variance over a stack of same-shape arrays.
pub fn variance_map(arrays: &[&Array2<f64>]) -> Result<Array2<f64>, MetricError> {
    let mean = mean_map(arrays)?;
    let mut sum_sq = Array2::zeros(arrays[0].raw_dim());
    for array in arrays {
        let centered = *array - &mean;
        sum_sq += &centered.mapv(|v| v * v);
    }
    Ok(sum_sq / arrays.len() as f64)
}

/// Element-wise population standard deviation over a stack of same-shape
/// arrays.
pub fn std_map(arrays: &[&Array2<f64>]) -> Result<Array2<f64>, MetricError> {
    Ok(variance_map(arrays)?.mapv(f64::sqrt))
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    fn sample_a() -> Array2<f64> {
        arr2(&[[1.0, 0.0], [3.0, 10.0], [2.0, 5.0]])
    }

    fn sample_b() -> Array2<f64> {
        arr2(&[[3.0, 10.0], [1.0, 0.0], [2.0, 5.0]])
    }

    #[test]
    fn test_rmsd_self_is_zero() {
        let a = sample_a();
        let (scalar, difference) = rmsd(&a, &a).unwrap();
        assert_eq!(scalar, 0.0);
        assert!(difference.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rmsd_is_symmetric() {
        let a = sample_a();
        let b = sample_b();
        let (ab, _) = rmsd(&a, &b).unwrap();
        let (ba, _) = rmsd(&b, &a).unwrap();
        assert!(ab > 0.0);
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn test_rmsd_shape_mismatch() {
        let a = sample_a();
        let b = arr2(&[[1.0, 2.0]]);
        assert!(matches!(
            rmsd(&a, &b),
            Err(MetricError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rmsf_profile_per_column() {
        let a = sample_a();
        let b = sample_b();
        let profile = rmsf(&a, &b).unwrap();
        assert_eq!(profile.len(), a.ncols());
        assert!(profile.iter().all(|v| *v >= 0.0));

        let self_profile = rmsf(&a, &a).unwrap();
        assert!(self_profile.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_statistical_maps() {
        let a = arr2(&[[1.0, 2.0]]);
        let b = arr2(&[[3.0, 6.0]]);
        let stack = [&a, &b];

        let mean = mean_map(&stack).unwrap();
        assert_eq!(mean, arr2(&[[2.0, 4.0]]));

        let var = variance_map(&stack).unwrap();
        assert_eq!(var, arr2(&[[1.0, 4.0]]));

        let std = std_map(&stack).unwrap();
        assert_eq!(std, arr2(&[[1.0, 2.0]]));
    }

    #[test]
    fn test_stack_needs_two() {
        let a = arr2(&[[1.0]]);
        assert!(matches!(
            mean_map(&[&a]),
            Err(MetricError::NotEnoughInputs { needed: 2, got: 1 })
        ));
    }
}
