//! The in-memory record of one loaded or derived experiment.

use std::fmt::Display;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::combine::{CombineSettings, ScanRange};
use crate::dataset::{Chromatogram, Heatmap, MassSpectrum, Mobilogram};
use crate::overlay::{ComparisonData, OverlayData, StatsData};

/// Where a document came from, which gates the operations that apply to it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    /// An ORIGAMI-MS acquisition with a collision voltage ramp.
    #[default]
    Origami,
    /// A manually assembled series of fixed-voltage files.
    Manual,
    /// A plain mass spectrum with no mobility dimension.
    MassSpectrum,
    /// An infrared multiphoton dissociation series.
    Infrared,
    /// A derived document holding overlay/statistics results.
    Comparison,
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DocumentKind::Origami => "ORIGAMI",
            DocumentKind::Manual => "Manual",
            DocumentKind::MassSpectrum => "Mass Spectrum",
            DocumentKind::Infrared => "Infrared",
            DocumentKind::Comparison => "Comparison",
        };
        f.write_str(label)
    }
}

/// One experiment: the singleton datasets read from the source file plus
/// every label-keyed collection derived from them.
///
/// Absence is an empty `Option` or an empty map; the `has_*` accessors are
/// defined as emptiness checks so they can never disagree with the data.
/// Labels are unique within a collection and re-deriving a label overwrites
/// the previous value.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique key in the document store, usually the source file stem.
    pub title: String,
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub file_format: String,

    pub mass_spectrum: Option<MassSpectrum>,
    pub chromatogram: Option<Chromatogram>,
    pub mobilogram: Option<Mobilogram>,
    /// The raw drift x scan array for the whole acquisition.
    pub heatmap: Option<Heatmap>,

    /// Extracted per-ion drift x scan arrays, keyed by the m/z window label.
    pub ion_heatmaps: IndexMap<String, Heatmap>,
    /// Drift x collision-voltage arrays produced by combination, keyed like
    /// the extracted ion they came from.
    pub combined_ion_heatmaps: IndexMap<String, Heatmap>,
    /// Per-voltage or per-file mass spectra.
    pub ion_mass_spectra: IndexMap<String, MassSpectrum>,
    /// Extracted 1D drift profiles.
    pub ion_mobilograms: IndexMap<String, Mobilogram>,

    pub overlays: IndexMap<String, OverlayData>,
    pub statistics: IndexMap<String, StatsData>,
    pub comparisons: IndexMap<String, ComparisonData>,

    /// The resolved parameter set of the last combination run, kept so a
    /// recalculation reuses exactly these values.
    pub combine_settings: Option<CombineSettings>,
    /// The per-voltage scan windows of the last combination run, kept for
    /// per-voltage mass spectrum extraction.
    pub scan_ranges: Vec<ScanRange>,
}

impl Document {
    pub fn new(title: impl Into<String>, path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            title: title.into(),
            path: path.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_file_format(mut self, file_format: impl Into<String>) -> Self {
        self.file_format = file_format.into();
        self
    }

    pub fn has_mass_spectrum(&self) -> bool {
        self.mass_spectrum.as_ref().is_some_and(|ms| !ms.is_empty())
    }

    pub fn has_chromatogram(&self) -> bool {
        self.chromatogram.as_ref().is_some_and(|rt| !rt.is_empty())
    }

    pub fn has_mobilogram(&self) -> bool {
        self.mobilogram.as_ref().is_some_and(|dt| !dt.is_empty())
    }

    pub fn has_heatmap(&self) -> bool {
        self.heatmap.as_ref().is_some_and(|hm| !hm.is_empty())
    }

    pub fn has_extracted_ions(&self) -> bool {
        !self.ion_heatmaps.is_empty()
    }

    pub fn has_combined_ions(&self) -> bool {
        !self.combined_ion_heatmaps.is_empty()
    }

    pub fn has_ion_mass_spectra(&self) -> bool {
        !self.ion_mass_spectra.is_empty()
    }

    pub fn has_ion_mobilograms(&self) -> bool {
        !self.ion_mobilograms.is_empty()
    }

    pub fn has_overlays(&self) -> bool {
        !self.overlays.is_empty()
    }

    pub fn has_statistics(&self) -> bool {
        !self.statistics.is_empty()
    }

    pub fn has_comparisons(&self) -> bool {
        !self.comparisons.is_empty()
    }

    /// The m/z extent extraction windows are validated against.
    pub fn mass_spectrum_bounds(&self) -> Option<(f64, f64)> {
        self.mass_spectrum.as_ref().and_then(|ms| ms.bounds())
    }
}
