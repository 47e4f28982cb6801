//! Comparison and overlay operations across extracted or combined ions.
//!
//! Every operation takes a list of [`OverlayItem`]s, possibly drawn from
//! different documents, and writes its result into a Comparison-kind
//! document under a name combining the method and the constituent labels.
//! Recomputing the same inputs with the same method lands on the same name
//! and overwrites, so results are cached by construction.

use std::fmt::Display;

use itertools::Itertools;
use ndarray::{Array2, Array3};
use thiserror::Error;
use tracing::debug;

use origami_core::dataset::Heatmap;
use origami_core::document::{Document, DocumentKind};
use origami_core::overlay::{
    ComparisonData, LayerStyle, OverlayData, OverlayLayer, StatMethod, StatsData,
};
use origami_core::store::{DocumentStore, UpdateKind};

use crate::activation::{mean_map, rmsd, rmsf, std_map, variance_map, MetricError};
use crate::heatmap::{normalize_total, threshold_below};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayMethod {
    Transparent,
    Mask,
    Rmsd,
    Rmsf,
    RmsdMatrix,
    Mean,
    StdDev,
    Variance,
    Rgb,
    Grid,
}

impl Display for OverlayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OverlayMethod::Transparent => "Transparent",
            OverlayMethod::Mask => "Mask",
            OverlayMethod::Rmsd => "RMSD",
            OverlayMethod::Rmsf => "RMSF",
            OverlayMethod::RmsdMatrix => "RMSD Matrix",
            OverlayMethod::Mean => "Mean",
            OverlayMethod::StdDev => "Standard Deviation",
            OverlayMethod::Variance => "Variance",
            OverlayMethod::Rgb => "RGB",
            OverlayMethod::Grid => "Grid",
        };
        f.write_str(label)
    }
}

impl OverlayMethod {
    /// Inclusive item count bounds for the method.
    fn item_bounds(&self) -> (usize, Option<usize>) {
        match self {
            OverlayMethod::Transparent
            | OverlayMethod::Mask
            | OverlayMethod::Rmsd
            | OverlayMethod::Rmsf => (2, Some(2)),
            _ => (2, None),
        }
    }

    /// Grid collection tolerates mixed shapes, everything else compares
    /// element-wise.
    fn is_shape_strict(&self) -> bool {
        !matches!(self, OverlayMethod::Grid)
    }
}

/// One constituent dataset of an overlay, with its display parameters.
#[derive(Debug, Clone)]
pub struct OverlayItem {
    pub document: String,
    pub label: String,
    pub heatmap: Heatmap,
    pub color: [f64; 3],
    pub alpha: f64,
    pub mask_threshold: f64,
}

impl OverlayItem {
    pub fn new(
        document: impl Into<String>,
        label: impl Into<String>,
        heatmap: Heatmap,
    ) -> Self {
        Self {
            document: document.into(),
            label: label.into(),
            heatmap,
            color: [0.0, 0.0, 1.0],
            alpha: 0.5,
            mask_threshold: 0.25,
        }
    }

    pub fn with_color(mut self, color: [f64; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_mask_threshold(mut self, mask_threshold: f64) -> Self {
        self.mask_threshold = mask_threshold;
        self
    }
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("{method} requires at least {needed} datasets, got {got}")]
    TooFewItems {
        method: OverlayMethod,
        needed: usize,
        got: usize,
    },
    #[error("{method} accepts at most {allowed} datasets, got {got}")]
    TooManyItems {
        method: OverlayMethod,
        allowed: usize,
        got: usize,
    },
    #[error(transparent)]
    Metric(#[from] MetricError),
}

/// The cache key a result is stored under.
pub fn overlay_name(method: OverlayMethod, items: &[OverlayItem]) -> String {
    format!(
        "{}: {}",
        method,
        items.iter().map(|item| item.label.as_str()).join(", ")
    )
}

/// Either face of the comparison collections on a document.
#[derive(Debug, Clone)]
pub enum OverlayOutput {
    Overlay(OverlayData),
    Stats(StatsData),
}

fn check_items(method: OverlayMethod, items: &[OverlayItem]) -> Result<(), OverlayError> {
    let (needed, allowed) = method.item_bounds();
    if items.len() < needed {
        return Err(OverlayError::TooFewItems {
            method,
            needed,
            got: items.len(),
        });
    }
    if let Some(allowed) = allowed {
        if items.len() > allowed {
            return Err(OverlayError::TooManyItems {
                method,
                allowed,
                got: items.len(),
            });
        }
    }
    if method.is_shape_strict() {
        for pair in items.windows(2) {
            let a = pair[0].heatmap.shape();
            let b = pair[1].heatmap.shape();
            if a != b {
                return Err(MetricError::ShapeMismatch { a, b }.into());
            }
        }
    }
    Ok(())
}

fn into_layer(item: &OverlayItem, style: LayerStyle) -> OverlayLayer {
    let mut heatmap = item.heatmap.clone();
    if style == LayerStyle::Mask {
        threshold_below(&mut heatmap.array, item.mask_threshold);
    }
    OverlayLayer {
        document: item.document.clone(),
        label: item.label.clone(),
        heatmap,
        color: item.color,
        alpha: item.alpha,
        mask_threshold: item.mask_threshold,
    }
}

fn difference_heatmap(template: &Heatmap, difference: Array2<f64>) -> Heatmap {
    Heatmap {
        array: difference,
        x: template.x.clone(),
        y: template.y.clone(),
        x_axis: template.x_axis,
        y_axis: template.y_axis,
    }
}

/// Scale a globally normalized array into its color's RGB channels.
fn make_rgb_cube(array: &Array2<f64>, color: [f64; 3]) -> Array3<f64> {
    let normalized = normalize_total(array);
    let (rows, cols) = (array.nrows(), array.ncols());
    let mut cube = Array3::zeros((rows, cols, 3));
    for channel in 0..3 {
        if color[channel] <= 0.0 {
            continue;
        }
        for row in 0..rows {
            for col in 0..cols {
                cube[[row, col, channel]] = normalized[[row, col]] * color[channel];
            }
        }
    }
    cube
}

/// Channel-wise sum of colorized arrays, clipped to [0, 1].
fn combine_rgb(cubes: &[Array3<f64>]) -> Array3<f64> {
    let mut combined = Array3::zeros(cubes[0].raw_dim());
    for cube in cubes {
        combined += cube;
    }
    combined.mapv_inplace(|v| v.clamp(0.0, 1.0));
    combined
}

/// Compute one overlay result without touching any document.
pub fn build_overlay(
    method: OverlayMethod,
    items: &[OverlayItem],
) -> Result<OverlayOutput, OverlayError> {
    check_items(method, items)?;
    let labels: Vec<String> = items.iter().map(|item| item.label.clone()).collect();
    let output = match method {
        OverlayMethod::Transparent => OverlayOutput::Overlay(OverlayData::Layered {
            style: LayerStyle::Transparent,
            layers: items
                .iter()
                .map(|item| into_layer(item, LayerStyle::Transparent))
                .collect(),
        }),
        OverlayMethod::Mask => OverlayOutput::Overlay(OverlayData::Layered {
            style: LayerStyle::Mask,
            layers: items
                .iter()
                .map(|item| into_layer(item, LayerStyle::Mask))
                .collect(),
        }),
        OverlayMethod::Rmsd => {
            let (scalar, difference) = rmsd(&items[0].heatmap.array, &items[1].heatmap.array)?;
            OverlayOutput::Overlay(OverlayData::Rmsd {
                labels: (labels[0].clone(), labels[1].clone()),
                scalar,
                difference: difference_heatmap(&items[0].heatmap, difference),
            })
        }
        OverlayMethod::Rmsf => {
            let (scalar, difference) = rmsd(&items[0].heatmap.array, &items[1].heatmap.array)?;
            let profile = rmsf(&items[0].heatmap.array, &items[1].heatmap.array)?;
            OverlayOutput::Overlay(OverlayData::Rmsf {
                labels: (labels[0].clone(), labels[1].clone()),
                scalar,
                profile,
                difference: difference_heatmap(&items[0].heatmap, difference),
            })
        }
        OverlayMethod::RmsdMatrix => {
            let mut values = Array2::zeros((items.len(), items.len()));
            for ((i, a), (j, b)) in items.iter().enumerate().tuple_combinations() {
                let (scalar, _) = rmsd(&a.heatmap.array, &b.heatmap.array)?;
                values[[i, j]] = scalar;
                values[[j, i]] = scalar;
            }
            OverlayOutput::Stats(StatsData::RmsdMatrix { labels, values })
        }
        OverlayMethod::Mean | OverlayMethod::StdDev | OverlayMethod::Variance => {
            let arrays: Vec<&Array2<f64>> =
                items.iter().map(|item| &item.heatmap.array).collect();
            let (stat_method, map) = match method {
                OverlayMethod::Mean => (StatMethod::Mean, mean_map(&arrays)?),
                OverlayMethod::StdDev => (StatMethod::StdDev, std_map(&arrays)?),
                _ => (StatMethod::Variance, variance_map(&arrays)?),
            };
            OverlayOutput::Stats(StatsData::Statistical {
                method: stat_method,
                labels,
                map: difference_heatmap(&items[0].heatmap, map),
            })
        }
        OverlayMethod::Rgb => {
            let cubes: Vec<Array3<f64>> = items
                .iter()
                .map(|item| make_rgb_cube(&item.heatmap.array, item.color))
                .collect();
            OverlayOutput::Overlay(OverlayData::Rgb {
                labels,
                image: combine_rgb(&cubes),
            })
        }
        OverlayMethod::Grid => OverlayOutput::Overlay(OverlayData::Grid {
            layers: items
                .iter()
                .map(|item| into_layer(item, LayerStyle::Transparent))
                .collect(),
        }),
    };
    Ok(output)
}

/// Compute an overlay and store it in the named Comparison document,
/// creating that document on first use, then notify the store. Returns the
/// name the result was stored under.
pub fn apply_overlay(
    store: &mut DocumentStore,
    comparison_title: &str,
    method: OverlayMethod,
    items: &[OverlayItem],
) -> Result<String, OverlayError> {
    let output = build_overlay(method, items)?;
    let name = overlay_name(method, items);
    debug!("Storing {name} in {comparison_title}");
    let document = store.get_or_create_with(comparison_title, || {
        Document::new(comparison_title, "", DocumentKind::Comparison)
    });
    let kind = match output {
        OverlayOutput::Overlay(data) => {
            document.overlays.insert(name.clone(), data);
            UpdateKind::Overlay {
                label: name.clone(),
            }
        }
        OverlayOutput::Stats(data) => {
            document.statistics.insert(name.clone(), data);
            UpdateKind::Statistics {
                label: name.clone(),
            }
        }
    };
    store.notify(comparison_title, kind);
    Ok(name)
}

/// Register a side-by-side mass spectrum comparison in the named
/// Comparison document.
pub fn apply_spectrum_comparison(
    store: &mut DocumentStore,
    comparison_title: &str,
    data: ComparisonData,
) -> String {
    let name = format!("Compare: {}", data.labels.iter().join(", "));
    let document = store.get_or_create_with(comparison_title, || {
        Document::new(comparison_title, "", DocumentKind::Comparison)
    });
    document.comparisons.insert(name.clone(), data);
    store.notify(
        comparison_title,
        UpdateKind::Comparison {
            label: name.clone(),
        },
    );
    name
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;
    use origami_core::dataset::AxisKind;

    fn heatmap(values: &[[f64; 2]; 3]) -> Heatmap {
        Heatmap::from_array(arr2(values), AxisKind::CollisionVoltage, AxisKind::DriftBins)
    }

    fn items() -> Vec<OverlayItem> {
        vec![
            OverlayItem::new(
                "run-1",
                "500-600",
                heatmap(&[[1.0, 0.0], [3.0, 10.0], [2.0, 5.0]]),
            )
            .with_color([1.0, 0.0, 0.0]),
            OverlayItem::new(
                "run-1",
                "700-800",
                heatmap(&[[3.0, 10.0], [1.0, 0.0], [2.0, 5.0]]),
            )
            .with_color([0.0, 1.0, 0.0])
            .with_alpha(0.3),
        ]
    }

    #[test]
    fn test_overlay_name_combines_method_and_labels() {
        assert_eq!(
            overlay_name(OverlayMethod::Rmsd, &items()),
            "RMSD: 500-600, 700-800"
        );
        assert_eq!(
            overlay_name(OverlayMethod::RmsdMatrix, &items()),
            "RMSD Matrix: 500-600, 700-800"
        );
    }

    #[test]
    fn test_pairwise_methods_reject_extra_items() {
        let mut three = items();
        three.push(OverlayItem::new(
            "run-2",
            "900-950",
            heatmap(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]),
        ));
        assert!(matches!(
            build_overlay(OverlayMethod::Rmsd, &three),
            Err(OverlayError::TooManyItems { allowed: 2, .. })
        ));
        assert!(matches!(
            build_overlay(OverlayMethod::Mean, &three[..1]),
            Err(OverlayError::TooFewItems { needed: 2, .. })
        ));
    }

    #[test]
    fn test_shape_mismatch_rejected_but_grid_tolerant() {
        let mut uneven = items();
        uneven[1].heatmap = Heatmap::from_array(
            arr2(&[[1.0], [2.0], [3.0]]),
            AxisKind::CollisionVoltage,
            AxisKind::DriftBins,
        );
        assert!(matches!(
            build_overlay(OverlayMethod::Transparent, &uneven),
            Err(OverlayError::Metric(MetricError::ShapeMismatch { .. }))
        ));
        assert!(build_overlay(OverlayMethod::Grid, &uneven).is_ok());
    }

    #[test]
    fn test_rmsd_and_rmsf_share_the_scalar() {
        let items = items();
        let rmsd_out = build_overlay(OverlayMethod::Rmsd, &items).unwrap();
        let rmsf_out = build_overlay(OverlayMethod::Rmsf, &items).unwrap();
        let scalar_rmsd = match rmsd_out {
            OverlayOutput::Overlay(OverlayData::Rmsd { scalar, .. }) => scalar,
            other => panic!("unexpected output {other:?}"),
        };
        let (scalar_rmsf, profile) = match rmsf_out {
            OverlayOutput::Overlay(OverlayData::Rmsf {
                scalar, profile, ..
            }) => (scalar, profile),
            other => panic!("unexpected output {other:?}"),
        };
        assert_eq!(scalar_rmsd, scalar_rmsf);
        assert_eq!(profile.len(), 2);
    }

    #[test]
    fn test_matrix_is_symmetric_with_zero_diagonal() {
        let mut three = items();
        three.push(OverlayItem::new(
            "run-2",
            "900-950",
            heatmap(&[[0.5, 4.0], [2.0, 2.0], [8.0, 1.0]]),
        ));
        let output = build_overlay(OverlayMethod::RmsdMatrix, &three).unwrap();
        let values = match output {
            OverlayOutput::Stats(StatsData::RmsdMatrix { values, .. }) => values,
            other => panic!("unexpected output {other:?}"),
        };
        assert_eq!(values.shape(), &[3, 3]);
        for i in 0..3 {
            assert_eq!(values[[i, i]], 0.0);
            for j in 0..3 {
                assert_eq!(values[[i, j]], values[[j, i]]);
            }
        }
    }

    #[test]
    fn test_mask_layers_are_thresholded() {
        let mut masked = items();
        masked[0].mask_threshold = 0.5;
        let output = build_overlay(OverlayMethod::Mask, &masked).unwrap();
        let layers = match output {
            OverlayOutput::Overlay(OverlayData::Layered { style, layers }) => {
                assert_eq!(style, LayerStyle::Mask);
                layers
            }
            other => panic!("unexpected output {other:?}"),
        };
        // 1.0 and 2.0 fall below half the maximum of 10.0
        assert_eq!(layers[0].heatmap.array[[0, 0]], 0.0);
        assert_eq!(layers[0].heatmap.array[[1, 1]], 10.0);
        // the item's own heatmap is untouched
        assert_eq!(masked[0].heatmap.array[[0, 0]], 1.0);
    }

    #[test]
    fn test_rgb_composite_is_clipped() {
        let output = build_overlay(OverlayMethod::Rgb, &items()).unwrap();
        let image = match output {
            OverlayOutput::Overlay(OverlayData::Rgb { image, .. }) => image,
            other => panic!("unexpected output {other:?}"),
        };
        assert_eq!(image.shape(), &[3, 2, 3]);
        assert!(image.iter().all(|v| (0.0..=1.0).contains(v)));
        // first item is pure red: its maximum lands in channel 0
        assert_eq!(image[[1, 1, 0]], 1.0);
        // second item is pure green: its zero contributes nothing
        assert_eq!(image[[1, 1, 1]], 0.0);
    }

    #[test]
    fn test_apply_overlay_caches_by_name() {
        let mut store = DocumentStore::new();
        let events = store.subscribe();
        let name =
            apply_overlay(&mut store, "Comparison", OverlayMethod::Rmsd, &items()).unwrap();
        assert_eq!(name, "RMSD: 500-600, 700-800");

        let document = store.get("Comparison").unwrap();
        assert_eq!(document.kind, DocumentKind::Comparison);
        assert_eq!(document.overlays.len(), 1);

        // recomputing overwrites rather than duplicating
        apply_overlay(&mut store, "Comparison", OverlayMethod::Rmsd, &items()).unwrap();
        assert_eq!(store.get("Comparison").unwrap().overlays.len(), 1);

        let update = events.recv().unwrap();
        assert_eq!(update.title, "Comparison");
        assert_eq!(update.kind, UpdateKind::Overlay { label: name });
    }

    #[test]
    fn test_spectrum_comparison_registered() {
        use origami_core::dataset::MassSpectrum;

        let mut store = DocumentStore::new();
        let data = ComparisonData {
            labels: vec!["run-1".into(), "run-2".into()],
            spectra: vec![
                MassSpectrum::new(vec![100.0], vec![1.0]).unwrap(),
                MassSpectrum::new(vec![100.0], vec![2.0]).unwrap(),
            ],
        };
        let name = apply_spectrum_comparison(&mut store, "Comparison", data);
        assert_eq!(name, "Compare: run-1, run-2");
        let document = store.get("Comparison").unwrap();
        assert!(document.has_comparisons());
        assert!(document.comparisons.contains_key(&name));
    }

    #[test]
    fn test_statistical_goes_to_statistics() {
        let mut store = DocumentStore::new();
        apply_overlay(&mut store, "Comparison", OverlayMethod::Mean, &items()).unwrap();
        let document = store.get("Comparison").unwrap();
        assert!(document.overlays.is_empty());
        assert_eq!(document.statistics.len(), 1);
        assert!(document
            .statistics
            .contains_key("Mean: 500-600, 700-800"));
    }
}
