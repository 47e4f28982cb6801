//! Typed containers for the signal arrays attached to a [`Document`](crate::document::Document).
//!
//! Each dataset owns its axis arrays alongside the intensity values, so a
//! stored dataset is always internally consistent: constructors reject
//! ragged axes, and absence is represented by `Option`, never by an empty
//! placeholder guarded by a flag.

use std::fmt::Display;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("The {axis} axis has {actual} entries but the array has {expected}")]
    AxisLengthMismatch {
        axis: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("The x and y arrays have different lengths ({x} != {y})")]
    UnevenTrace { x: usize, y: usize },
}

/// The physical meaning of an axis, carried with the data so downstream
/// consumers can label plots and exports without guessing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisKind {
    #[default]
    Scans,
    CollisionVoltage,
    Mz,
    Minutes,
    DriftBins,
    DriftMilliseconds,
}

impl Display for AxisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AxisKind::Scans => "Scans",
            AxisKind::CollisionVoltage => "Collision Voltage (V)",
            AxisKind::Mz => "m/z",
            AxisKind::Minutes => "Time (min)",
            AxisKind::DriftBins => "Drift time (bins)",
            AxisKind::DriftMilliseconds => "Drift time (ms)",
        };
        f.write_str(label)
    }
}

/// How intensity values should be rescaled before display or comparison.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMode {
    #[default]
    Maximum,
    Logarithmic,
    NaturalLog,
    SquareRoot,
}

/// Intensity against m/z.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MassSpectrum {
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    /// Display/extraction window. Defaults to the data extent when absent.
    pub limits: Option<(f64, f64)>,
}

impl MassSpectrum {
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self, DatasetError> {
        if mz.len() != intensity.len() {
            return Err(DatasetError::UnevenTrace {
                x: mz.len(),
                y: intensity.len(),
            });
        }
        Ok(Self {
            mz,
            intensity,
            limits: None,
        })
    }

    pub fn with_limits(mut self, limits: (f64, f64)) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// The m/z extent, preferring the explicit limits over the data range.
    /// Assumes the m/z axis is sorted ascending, which every reader and
    /// binner in this workspace produces.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        if let Some(limits) = self.limits {
            return Some(limits);
        }
        match (self.mz.first(), self.mz.last()) {
            (Some(lo), Some(hi)) => Some((*lo, *hi)),
            _ => None,
        }
    }

    pub fn total_intensity(&self) -> f64 {
        self.intensity.iter().sum()
    }
}

/// Intensity against retention time or scan index.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Chromatogram {
    pub time: Vec<f64>,
    pub intensity: Vec<f64>,
    pub axis: AxisKind,
}

impl Chromatogram {
    pub fn new(time: Vec<f64>, intensity: Vec<f64>, axis: AxisKind) -> Result<Self, DatasetError> {
        if time.len() != intensity.len() {
            return Err(DatasetError::UnevenTrace {
                x: time.len(),
                y: intensity.len(),
            });
        }
        Ok(Self {
            time,
            intensity,
            axis,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Intensity against drift time.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Mobilogram {
    pub drift_time: Vec<f64>,
    pub intensity: Vec<f64>,
    pub axis: AxisKind,
}

impl Mobilogram {
    pub fn new(
        drift_time: Vec<f64>,
        intensity: Vec<f64>,
        axis: AxisKind,
    ) -> Result<Self, DatasetError> {
        if drift_time.len() != intensity.len() {
            return Err(DatasetError::UnevenTrace {
                x: drift_time.len(),
                y: intensity.len(),
            });
        }
        Ok(Self {
            drift_time,
            intensity,
            axis,
        })
    }

    pub fn len(&self) -> usize {
        self.drift_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drift_time.is_empty()
    }
}

/// A 2D intensity array over (row x column) with its axis arrays.
///
/// Rows carry the drift-time (or binned m/z) dimension, columns carry the
/// scan, collision voltage, or time dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heatmap {
    pub array: Array2<f64>,
    /// Column coordinates, `x.len() == array.ncols()`.
    pub x: Vec<f64>,
    /// Row coordinates, `y.len() == array.nrows()`.
    pub y: Vec<f64>,
    pub x_axis: AxisKind,
    pub y_axis: AxisKind,
}

impl Heatmap {
    pub fn new(
        array: Array2<f64>,
        x: Vec<f64>,
        y: Vec<f64>,
        x_axis: AxisKind,
        y_axis: AxisKind,
    ) -> Result<Self, DatasetError> {
        if x.len() != array.ncols() {
            return Err(DatasetError::AxisLengthMismatch {
                axis: "x",
                expected: array.ncols(),
                actual: x.len(),
            });
        }
        if y.len() != array.nrows() {
            return Err(DatasetError::AxisLengthMismatch {
                axis: "y",
                expected: array.nrows(),
                actual: y.len(),
            });
        }
        Ok(Self {
            array,
            x,
            y,
            x_axis,
            y_axis,
        })
    }

    /// Wrap a bare array, numbering both axes from 1.
    pub fn from_array(array: Array2<f64>, x_axis: AxisKind, y_axis: AxisKind) -> Self {
        let x = (1..=array.ncols()).map(|i| i as f64).collect();
        let y = (1..=array.nrows()).map(|i| i as f64).collect();
        Self {
            array,
            x,
            y,
            x_axis,
            y_axis,
        }
    }

    pub fn nrows(&self) -> usize {
        self.array.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.array.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.array.nrows(), self.array.ncols())
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn total_intensity(&self) -> f64 {
        self.array.sum()
    }

    /// One total per column, the trace along the x axis.
    pub fn column_sums(&self) -> Vec<f64> {
        self.array.sum_axis(Axis(0)).to_vec()
    }

    /// One total per row, the trace along the y axis.
    pub fn row_sums(&self) -> Vec<f64> {
        self.array.sum_axis(Axis(1)).to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_mass_spectrum_bounds() -> Result<(), DatasetError> {
        let ms = MassSpectrum::new(vec![100.0, 250.0, 900.0], vec![1.0, 2.0, 3.0])?;
        assert_eq!(ms.bounds(), Some((100.0, 900.0)));

        let ms = ms.with_limits((50.0, 1000.0));
        assert_eq!(ms.bounds(), Some((50.0, 1000.0)));

        assert_eq!(MassSpectrum::default().bounds(), None);
        Ok(())
    }

    #[test]
    fn test_mass_spectrum_uneven() {
        let err = MassSpectrum::new(vec![100.0, 250.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, DatasetError::UnevenTrace { x: 2, y: 1 }));
    }

    #[test]
    fn test_heatmap_axis_invariants() {
        let array = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let err = Heatmap::new(
            array.clone(),
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            AxisKind::Scans,
            AxisKind::DriftBins,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::AxisLengthMismatch {
                axis: "x",
                expected: 3,
                actual: 2
            }
        ));

        let hm = Heatmap::from_array(array, AxisKind::Scans, AxisKind::DriftBins);
        assert_eq!(hm.x, vec![1.0, 2.0, 3.0]);
        assert_eq!(hm.y, vec![1.0, 2.0]);
        assert_eq!(hm.shape(), (2, 3));
    }

    #[test]
    fn test_heatmap_sums() {
        let hm = Heatmap::from_array(
            arr2(&[[1.0, 2.0], [3.0, 4.0]]),
            AxisKind::Scans,
            AxisKind::DriftBins,
        );
        assert_eq!(hm.total_intensity(), 10.0);
        assert_eq!(hm.column_sums(), vec![4.0, 6.0]);
        assert_eq!(hm.row_sums(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_axis_labels() {
        assert_eq!(AxisKind::CollisionVoltage.to_string(), "Collision Voltage (V)");
        assert_eq!(AxisKind::DriftBins.to_string(), "Drift time (bins)");
    }
}
