//! Extraction of per-ion datasets from a raw data source into a document.
//!
//! The reader side is abstracted behind [`IonSource`]: anything that can
//! produce a drift x scan array, a drift profile, or a scan-window mass
//! spectrum for an m/z window can feed these operations. The operations own
//! the contract around them: the window must fall inside the document's
//! acquired mass range, the computed label is the collection key, and
//! re-extraction semantics follow [`ExtractPolicy`].

use std::fmt::Display;
use std::num::ParseFloatError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use origami_core::combine::ScanRange;
use origami_core::dataset::{Heatmap, MassSpectrum, Mobilogram};
use origami_core::document::Document;

/// An inclusive m/z window. Its `Display` form doubles as the label the
/// extracted dataset is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MzRange {
    pub start: f64,
    pub end: f64,
}

impl MzRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, mz: f64) -> bool {
        mz >= self.start && mz <= self.end
    }

    /// The collection key for datasets extracted over this window.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl Display for MzRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Error)]
pub enum MzRangeParseError {
    #[error("Failed to parse window start {0}")]
    MalformedStart(ParseFloatError),
    #[error("Failed to parse window end {0}")]
    MalformedEnd(ParseFloatError),
    #[error("An m/z window needs both ends, denoted START-END")]
    MissingBound,
}

impl FromStr for MzRange {
    type Err = MzRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = if s.contains(' ') {
            s.split(' ')
        } else if s.contains(':') {
            s.split(':')
        } else {
            s.split('-')
        };
        let start_s = tokens.next().ok_or(MzRangeParseError::MissingBound)?;
        if start_s.is_empty() {
            return Err(MzRangeParseError::MissingBound);
        }
        let start = start_s
            .parse()
            .map_err(MzRangeParseError::MalformedStart)?;
        let end_s = tokens.next().ok_or(MzRangeParseError::MissingBound)?;
        if end_s.is_empty() {
            return Err(MzRangeParseError::MissingBound);
        }
        let end = end_s.parse().map_err(MzRangeParseError::MalformedEnd)?;
        Ok(MzRange { start, end })
    }
}

/// Whether extraction recomputes datasets whose label already exists.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ExtractPolicy {
    /// Skip labels that are already present.
    #[default]
    OnlyNew,
    /// Recompute everything, overwriting previous values.
    All,
}

/// What an extraction call did, carrying the label either way so callers
/// can keep count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Extracted(String),
    SkippedExisting(String),
}

impl ExtractOutcome {
    pub fn label(&self) -> &str {
        match self {
            ExtractOutcome::Extracted(label) => label,
            ExtractOutcome::SkippedExisting(label) => label,
        }
    }

    pub fn was_extracted(&self) -> bool {
        matches!(self, ExtractOutcome::Extracted(_))
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(
        "The m/z window {start:.4}-{end:.4} falls outside the acquired mass range {min:.4}-{max:.4}"
    )]
    OutOfBounds {
        start: f64,
        end: f64,
        min: f64,
        max: f64,
    },
    #[error("The m/z window {0} is empty or inverted")]
    EmptyRange(MzRange),
    #[error("The document has no mass spectrum to validate the window against")]
    MissingMassSpectrum,
    #[error("The data source carries no ion mobility information")]
    MissingIonMobility,
    #[error("Reading the ion signal failed: {0}")]
    Source(String),
}

/// The seam to the external reader: produces derived arrays for an m/z
/// window or a scan window on demand.
pub trait IonSource {
    /// The drift x scan intensity array for the window.
    fn ion_heatmap(&mut self, range: MzRange) -> Result<Heatmap, ExtractError>;

    /// The 1D drift profile for the window.
    fn ion_mobilogram(&mut self, range: MzRange) -> Result<Mobilogram, ExtractError>;

    /// The mass spectrum accumulated over a window of scans.
    fn scan_mass_spectrum(&mut self, scans: ScanRange) -> Result<MassSpectrum, ExtractError>;
}

fn check_range(document: &Document, range: MzRange) -> Result<(), ExtractError> {
    if range.width() <= 0.0 {
        return Err(ExtractError::EmptyRange(range));
    }
    let (min, max) = document
        .mass_spectrum_bounds()
        .ok_or(ExtractError::MissingMassSpectrum)?;
    if range.start < min || range.end > max {
        return Err(ExtractError::OutOfBounds {
            start: range.start,
            end: range.end,
            min,
            max,
        });
    }
    Ok(())
}

/// Extract the drift x scan array for an m/z window into
/// `document.ion_heatmaps` under the window's label.
pub fn extract_ion_heatmap(
    document: &mut Document,
    source: &mut dyn IonSource,
    range: MzRange,
    policy: ExtractPolicy,
) -> Result<ExtractOutcome, ExtractError> {
    check_range(document, range)?;
    let label = range.label();
    if policy == ExtractPolicy::OnlyNew && document.ion_heatmaps.contains_key(&label) {
        debug!("Data was already extracted for the {label} ion");
        return Ok(ExtractOutcome::SkippedExisting(label));
    }
    let heatmap = source.ion_heatmap(range)?;
    document.ion_heatmaps.insert(label.clone(), heatmap);
    Ok(ExtractOutcome::Extracted(label))
}

/// Extract the 1D drift profile for an m/z window into
/// `document.ion_mobilograms` under the window's label.
pub fn extract_ion_mobilogram(
    document: &mut Document,
    source: &mut dyn IonSource,
    range: MzRange,
    policy: ExtractPolicy,
) -> Result<ExtractOutcome, ExtractError> {
    check_range(document, range)?;
    let label = range.label();
    if policy == ExtractPolicy::OnlyNew && document.ion_mobilograms.contains_key(&label) {
        debug!("A drift profile was already extracted for the {label} ion");
        return Ok(ExtractOutcome::SkippedExisting(label));
    }
    let mobilogram = source.ion_mobilogram(range)?;
    document.ion_mobilograms.insert(label.clone(), mobilogram);
    Ok(ExtractOutcome::Extracted(label))
}

/// The label a per-voltage mass spectrum is stored under.
pub fn voltage_label(voltage: f64) -> String {
    format!("{voltage} V")
}

/// Extract one mass spectrum per combined voltage, reusing the scan windows
/// persisted on the document by a prior combination run.
pub fn extract_voltage_mass_spectra(
    document: &mut Document,
    source: &mut dyn IonSource,
    policy: ExtractPolicy,
) -> Result<Vec<ExtractOutcome>, ExtractError> {
    let ranges = document.scan_ranges.clone();
    let mut outcomes = Vec::with_capacity(ranges.len());
    for scans in ranges {
        let label = voltage_label(scans.voltage);
        if policy == ExtractPolicy::OnlyNew && document.ion_mass_spectra.contains_key(&label) {
            debug!("A mass spectrum was already extracted for {label}");
            outcomes.push(ExtractOutcome::SkippedExisting(label));
            continue;
        }
        let spectrum = source.scan_mass_spectrum(scans)?;
        document.ion_mass_spectra.insert(label.clone(), spectrum);
        outcomes.push(ExtractOutcome::Extracted(label));
    }
    Ok(outcomes)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;
    use origami_core::dataset::AxisKind;
    use origami_core::document::DocumentKind;

    /// Hands back constant arrays and counts how often it was asked.
    struct CountingSource {
        calls: usize,
    }

    impl IonSource for CountingSource {
        fn ion_heatmap(&mut self, _range: MzRange) -> Result<Heatmap, ExtractError> {
            self.calls += 1;
            Ok(Heatmap::from_array(
                Array2::from_elem((4, 3), self.calls as f64),
                AxisKind::Scans,
                AxisKind::DriftBins,
            ))
        }

        fn ion_mobilogram(&mut self, _range: MzRange) -> Result<Mobilogram, ExtractError> {
            self.calls += 1;
            Mobilogram::new(vec![1.0, 2.0], vec![3.0, 4.0], AxisKind::DriftBins)
                .map_err(|e| ExtractError::Source(e.to_string()))
        }

        fn scan_mass_spectrum(&mut self, _scans: ScanRange) -> Result<MassSpectrum, ExtractError> {
            self.calls += 1;
            MassSpectrum::new(vec![100.0, 200.0], vec![1.0, 2.0])
                .map_err(|e| ExtractError::Source(e.to_string()))
        }
    }

    fn document_with_spectrum() -> Document {
        let mut doc = Document::new("run", "run.mzML", DocumentKind::Origami);
        doc.mass_spectrum = Some(
            MassSpectrum::new(vec![100.0, 500.0, 1000.0], vec![1.0, 2.0, 3.0]).unwrap(),
        );
        doc
    }

    #[test]
    fn test_range_parse() {
        let range: MzRange = "500-600.5".parse().unwrap();
        assert_eq!(range, MzRange::new(500.0, 600.5));
        assert_eq!(range.label(), "500-600.5");

        assert!(matches!(
            "500-".parse::<MzRange>(),
            Err(MzRangeParseError::MissingBound)
        ));
        assert!(matches!(
            "a-600".parse::<MzRange>(),
            Err(MzRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "500-b".parse::<MzRange>(),
            Err(MzRangeParseError::MalformedEnd(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_commits_nothing() {
        let mut doc = document_with_spectrum();
        let mut source = CountingSource { calls: 0 };
        let err = extract_ion_heatmap(
            &mut doc,
            &mut source,
            MzRange::new(50.0, 200.0),
            ExtractPolicy::OnlyNew,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::OutOfBounds { .. }));
        assert!(doc.ion_heatmaps.is_empty());
        assert_eq!(source.calls, 0, "the reader must not be consulted");
    }

    #[test]
    fn test_only_new_is_idempotent() {
        let mut doc = document_with_spectrum();
        let mut source = CountingSource { calls: 0 };
        let range = MzRange::new(200.0, 300.0);

        let first =
            extract_ion_heatmap(&mut doc, &mut source, range, ExtractPolicy::OnlyNew).unwrap();
        assert!(first.was_extracted());
        let second =
            extract_ion_heatmap(&mut doc, &mut source, range, ExtractPolicy::OnlyNew).unwrap();
        assert_eq!(
            second,
            ExtractOutcome::SkippedExisting("200-300".to_string())
        );
        assert_eq!(doc.ion_heatmaps.len(), 1);
        assert_eq!(source.calls, 1);
    }

    #[test]
    fn test_all_overwrites() {
        let mut doc = document_with_spectrum();
        let mut source = CountingSource { calls: 0 };
        let range = MzRange::new(200.0, 300.0);

        extract_ion_heatmap(&mut doc, &mut source, range, ExtractPolicy::All).unwrap();
        extract_ion_heatmap(&mut doc, &mut source, range, ExtractPolicy::All).unwrap();
        assert_eq!(doc.ion_heatmaps.len(), 1);
        assert_eq!(source.calls, 2);
        // the second extraction's values win
        assert_eq!(doc.ion_heatmaps["200-300"].array[[0, 0]], 2.0);
    }

    #[test]
    fn test_extraction_needs_a_mass_spectrum() {
        let mut doc = Document::new("run", "run.mzML", DocumentKind::Origami);
        let mut source = CountingSource { calls: 0 };
        let err = extract_ion_heatmap(
            &mut doc,
            &mut source,
            MzRange::new(200.0, 300.0),
            ExtractPolicy::OnlyNew,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::MissingMassSpectrum));
    }

    #[test]
    fn test_empty_range_rejected() {
        let mut doc = document_with_spectrum();
        let mut source = CountingSource { calls: 0 };
        let err = extract_ion_mobilogram(
            &mut doc,
            &mut source,
            MzRange::new(300.0, 200.0),
            ExtractPolicy::OnlyNew,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::EmptyRange(_)));
    }

    #[test]
    fn test_voltage_spectra_follow_scan_ranges() {
        let mut doc = document_with_spectrum();
        doc.scan_ranges = vec![
            ScanRange::new(0, 3, 4.0),
            ScanRange::new(3, 6, 6.0),
        ];
        let mut source = CountingSource { calls: 0 };
        let outcomes =
            extract_voltage_mass_spectra(&mut doc, &mut source, ExtractPolicy::OnlyNew).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(doc.ion_mass_spectra.contains_key("4 V"));
        assert!(doc.ion_mass_spectra.contains_key("6 V"));

        let again =
            extract_voltage_mass_spectra(&mut doc, &mut source, ExtractPolicy::OnlyNew).unwrap();
        assert!(again.iter().all(|o| !o.was_extracted()));
        assert_eq!(source.calls, 2);
    }
}
