//! Result records for comparison and overlay operations.
//!
//! These are pure data: the arithmetic that produces them lives in the
//! processing crate. Each record keeps the labels of its constituent
//! datasets so a cached result can be traced back to its inputs.

use std::fmt::Display;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::dataset::{Heatmap, MassSpectrum};

/// How stacked heatmap layers are blended when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerStyle {
    Transparent,
    Mask,
}

/// One constituent heatmap of a layered overlay, with its display
/// parameters resolved at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayLayer {
    /// Title of the document the layer came from.
    pub document: String,
    /// Label of the dataset within its collection.
    pub label: String,
    pub heatmap: Heatmap,
    pub color: [f64; 3],
    pub alpha: f64,
    pub mask_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OverlayData {
    /// Two heatmaps stacked with transparency or threshold masking.
    Layered {
        style: LayerStyle,
        layers: Vec<OverlayLayer>,
    },
    /// Root-mean-square deviation between two heatmaps: the percent scalar
    /// and the normalized difference map it was computed from.
    Rmsd {
        labels: (String, String),
        scalar: f64,
        difference: Heatmap,
    },
    /// Per-voltage root-mean-square fluctuation profile, with the scalar
    /// RMSD of the same pair for the plot annotation.
    Rmsf {
        labels: (String, String),
        scalar: f64,
        profile: Vec<f64>,
        difference: Heatmap,
    },
    /// False-color composite: each input colorized then channel-summed
    /// into an H x W x 3 image clipped to [0, 1].
    Rgb {
        labels: Vec<String>,
        image: Array3<f64>,
    },
    /// Shape-tolerant collection for grid rendering, no arithmetic.
    Grid { layers: Vec<OverlayLayer> },
}

/// The element-wise aggregate applied across a stack of heatmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatMethod {
    Mean,
    StdDev,
    Variance,
}

impl Display for StatMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StatMethod::Mean => "Mean",
            StatMethod::StdDev => "Standard Deviation",
            StatMethod::Variance => "Variance",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatsData {
    /// Element-wise aggregate map over N same-shape heatmaps.
    Statistical {
        method: StatMethod,
        labels: Vec<String>,
        map: Heatmap,
    },
    /// Symmetric N x N pairwise RMSD matrix with a zero diagonal.
    RmsdMatrix {
        labels: Vec<String>,
        values: Array2<f64>,
    },
}

/// A side-by-side mass spectrum comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonData {
    pub labels: Vec<String>,
    pub spectra: Vec<MassSpectrum>,
}
