//! In-memory scan stack read from an open mass spectrometry file, and the
//! [`IonSource`] implementation that extracts derived arrays from it.

use indexmap::IndexMap;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use mzdata::prelude::*;

use origami_core::combine::ScanRange;
use origami_core::dataset::{AxisKind, Chromatogram, Heatmap, MassSpectrum, Mobilogram};
use origami_process::extract::{ExtractError, IonSource, MzRange};
use origami_process::spectra::SpectrumBinner;

use crate::types::SpectrumType;

/// One scan's signal, with its per-point drift values when the file
/// carries an ion mobility dimension.
#[derive(Debug, Default, Clone)]
pub struct ScanRecord {
    pub time: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    pub drift: Option<Vec<f64>>,
}

/// Every scan of the acquisition, held in memory so that ion extraction
/// can sweep it repeatedly without touching the reader again.
#[derive(Debug, Default, Clone)]
pub struct ScanStack {
    scans: Vec<ScanRecord>,
    mz_min: f64,
    mz_max: f64,
    drift_min: f64,
    drift_max: f64,
    has_drift: bool,
}

impl ScanStack {
    pub fn from_reader<I: Iterator<Item = SpectrumType>>(reader: I) -> Self {
        let mut records = Vec::new();
        for spectrum in reader {
            let mut mz = Vec::new();
            let mut intensity = Vec::new();
            for point in spectrum.peaks().iter() {
                mz.push(point.mz);
                intensity.push(point.intensity as f64);
            }
            if mz.is_empty() {
                debug!("Spectrum {} carries no signal, skipping", spectrum.id());
                continue;
            }
            let drift = spectrum.raw_arrays().and_then(|arrays| {
                if !arrays.has_ion_mobility() {
                    return None;
                }
                match arrays.ion_mobility() {
                    Ok((values, _)) if values.len() == mz.len() => {
                        Some(values.iter().map(|v| *v as f64).collect())
                    }
                    Ok(_) => {
                        warn!(
                            "Spectrum {} has a mismatched ion mobility array, ignoring it",
                            spectrum.id()
                        );
                        None
                    }
                    Err(e) => {
                        warn!(
                            "Failed to decode the ion mobility array of {}: {e}",
                            spectrum.id()
                        );
                        None
                    }
                }
            });
            records.push(ScanRecord {
                time: spectrum.start_time(),
                mz,
                intensity,
                drift,
            });
        }
        Self::from_records(records)
    }

    pub fn from_records(scans: Vec<ScanRecord>) -> Self {
        let mut stack = Self {
            scans,
            mz_min: f64::INFINITY,
            mz_max: f64::NEG_INFINITY,
            drift_min: f64::INFINITY,
            drift_max: f64::NEG_INFINITY,
            has_drift: false,
        };
        for scan in &stack.scans {
            for m in &scan.mz {
                stack.mz_min = stack.mz_min.min(*m);
                stack.mz_max = stack.mz_max.max(*m);
            }
            if let Some(drift) = &scan.drift {
                stack.has_drift = true;
                for d in drift {
                    stack.drift_min = stack.drift_min.min(*d);
                    stack.drift_max = stack.drift_max.max(*d);
                }
            }
        }
        stack
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn has_ion_mobility(&self) -> bool {
        self.has_drift
    }

    pub fn mz_bounds(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.mz_min, self.mz_max))
    }

    /// All scans accumulated into one spectrum on a shared binned axis.
    pub fn mass_spectrum(&self, bin_width: f64) -> Option<MassSpectrum> {
        let (lo, hi) = self.mz_bounds()?;
        let mut binner = SpectrumBinner::new(lo, hi + bin_width, bin_width);
        for scan in &self.scans {
            binner.add(&scan.mz, &scan.intensity);
        }
        Some(binner.into_spectrum())
    }

    /// The total ion current per scan. The time axis is in minutes when the
    /// file reports retention times, scan numbers otherwise.
    pub fn tic(&self) -> Chromatogram {
        let totals: Vec<f64> = self
            .scans
            .iter()
            .map(|scan| scan.intensity.iter().sum())
            .collect();
        let timed = self.scans.iter().any(|scan| scan.time > 0.0);
        let (time, axis) = if timed {
            (
                self.scans.iter().map(|scan| scan.time).collect(),
                AxisKind::Minutes,
            )
        } else {
            (
                (1..=self.scans.len()).map(|i| i as f64).collect(),
                AxisKind::Scans,
            )
        };
        Chromatogram {
            time,
            intensity: totals,
            axis,
        }
    }

    /// The full-range drift x scan array, present only when the file has
    /// an ion mobility dimension.
    pub fn frame_heatmap(&self, drift_bins: usize) -> Option<Heatmap> {
        self.has_drift
            .then(|| self.window_heatmap(MzRange::new(self.mz_min, self.mz_max), drift_bins))
    }

    fn drift_bin_centers(&self, drift_bins: usize) -> (f64, Vec<f64>) {
        let span = (self.drift_max - self.drift_min).max(f64::EPSILON);
        let width = span / drift_bins as f64;
        let centers = (0..drift_bins)
            .map(|i| self.drift_min + (i as f64 + 0.5) * width)
            .collect();
        (width, centers)
    }

    /// The per-window heatmap: drift x scan when the acquisition carries a
    /// drift dimension, binned m/z x scan otherwise.
    fn window_heatmap(&self, range: MzRange, rows: usize) -> Heatmap {
        let mut array = Array2::zeros((rows, self.scans.len()));
        let (y, y_axis) = if self.has_drift {
            let (width, centers) = self.drift_bin_centers(rows);
            for (column, scan) in self.scans.iter().enumerate() {
                let Some(drift) = &scan.drift else { continue };
                for ((m, i), d) in scan.mz.iter().zip(&scan.intensity).zip(drift) {
                    if !range.contains(*m) {
                        continue;
                    }
                    let row = (((d - self.drift_min) / width) as usize).min(rows - 1);
                    array[[row, column]] += *i;
                }
            }
            (centers, AxisKind::DriftMilliseconds)
        } else {
            let width = range.width().max(f64::EPSILON) / rows as f64;
            let centers = (0..rows)
                .map(|i| range.start + (i as f64 + 0.5) * width)
                .collect();
            for (column, scan) in self.scans.iter().enumerate() {
                for (m, i) in scan.mz.iter().zip(&scan.intensity) {
                    if !range.contains(*m) {
                        continue;
                    }
                    let row = (((m - range.start) / width) as usize).min(rows - 1);
                    array[[row, column]] += *i;
                }
            }
            (centers, AxisKind::Mz)
        };
        let x = (1..=self.scans.len()).map(|i| i as f64).collect();
        Heatmap {
            array,
            x,
            y,
            x_axis: AxisKind::Scans,
            y_axis,
        }
    }

    fn scan_window_spectrum(&self, scans: ScanRange, bin_width: f64) -> MassSpectrum {
        let mut binner = SpectrumBinner::new(self.mz_min, self.mz_max + bin_width, bin_width);
        let end = scans.end_scan.min(self.scans.len());
        for scan in &self.scans[scans.start_scan.min(end)..end] {
            binner.add(&scan.mz, &scan.intensity);
        }
        binner.into_spectrum()
    }
}

/// [`IonSource`] over an in-memory [`ScanStack`].
///
/// Heatmap extraction for many windows is the hot path, so
/// [`MzdataIonSource::prefetch`] computes a batch of windows on the rayon
/// pool and the trait methods then serve from the cache.
pub struct MzdataIonSource<'a> {
    stack: &'a ScanStack,
    drift_bins: usize,
    bin_width: f64,
    cache: IndexMap<String, Heatmap>,
}

impl<'a> MzdataIonSource<'a> {
    pub fn new(stack: &'a ScanStack, drift_bins: usize, bin_width: f64) -> Self {
        Self {
            stack,
            drift_bins,
            bin_width,
            cache: IndexMap::new(),
        }
    }

    /// Compute the heatmaps for a batch of windows in parallel and keep
    /// them for the next [`IonSource::ion_heatmap`] calls.
    pub fn prefetch(&mut self, ranges: &[MzRange]) {
        if self.stack.is_empty() {
            return;
        }
        let computed: Vec<(String, Heatmap)> = ranges
            .par_iter()
            .map(|range| {
                (
                    range.label(),
                    self.stack.window_heatmap(*range, self.drift_bins),
                )
            })
            .collect();
        debug!("Prefetched {} ion windows", computed.len());
        self.cache.extend(computed);
    }

    fn checked(&self) -> Result<(), ExtractError> {
        if self.stack.is_empty() {
            return Err(ExtractError::Source(
                "the input contained no usable spectra".to_string(),
            ));
        }
        Ok(())
    }
}

impl IonSource for MzdataIonSource<'_> {
    fn ion_heatmap(&mut self, range: MzRange) -> Result<Heatmap, ExtractError> {
        self.checked()?;
        if let Some(heatmap) = self.cache.shift_remove(&range.label()) {
            return Ok(heatmap);
        }
        Ok(self.stack.window_heatmap(range, self.drift_bins))
    }

    fn ion_mobilogram(&mut self, range: MzRange) -> Result<Mobilogram, ExtractError> {
        self.checked()?;
        if !self.stack.has_ion_mobility() {
            return Err(ExtractError::MissingIonMobility);
        }
        let heatmap = self.stack.window_heatmap(range, self.drift_bins);
        Ok(Mobilogram {
            intensity: heatmap.row_sums(),
            drift_time: heatmap.y,
            axis: heatmap.y_axis,
        })
    }

    fn scan_mass_spectrum(&mut self, scans: ScanRange) -> Result<MassSpectrum, ExtractError> {
        self.checked()?;
        Ok(self.stack.scan_window_spectrum(scans, self.bin_width))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn plain_scan(time: f64, mz: Vec<f64>, intensity: Vec<f64>) -> ScanRecord {
        ScanRecord {
            time,
            mz,
            intensity,
            drift: None,
        }
    }

    fn stack_without_drift() -> ScanStack {
        ScanStack::from_records(vec![
            plain_scan(0.1, vec![100.0, 500.0, 900.0], vec![1.0, 2.0, 4.0]),
            plain_scan(0.2, vec![100.0, 500.0], vec![8.0, 16.0]),
        ])
    }

    fn stack_with_drift() -> ScanStack {
        ScanStack::from_records(vec![
            ScanRecord {
                time: 0.1,
                mz: vec![100.0, 500.0],
                intensity: vec![1.0, 2.0],
                drift: Some(vec![1.0, 9.0]),
            },
            ScanRecord {
                time: 0.2,
                mz: vec![500.0],
                intensity: vec![4.0],
                drift: Some(vec![9.0]),
            },
        ])
    }

    #[test]
    fn test_bounds_and_flags() {
        let stack = stack_without_drift();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.mz_bounds(), Some((100.0, 900.0)));
        assert!(!stack.has_ion_mobility());
        assert!(stack_with_drift().has_ion_mobility());
        assert!(ScanStack::from_records(Vec::new()).mz_bounds().is_none());
    }

    #[test]
    fn test_mass_spectrum_accumulates_all_scans() {
        let stack = stack_without_drift();
        let ms = stack.mass_spectrum(1.0).unwrap();
        assert_eq!(ms.total_intensity(), 31.0);
        let bounds = ms.bounds().unwrap();
        assert!(bounds.0 <= 100.0 && bounds.1 >= 900.0);
    }

    #[test]
    fn test_tic_uses_reported_times() {
        let stack = stack_without_drift();
        let tic = stack.tic();
        assert_eq!(tic.intensity, vec![7.0, 24.0]);
        assert_eq!(tic.axis, AxisKind::Minutes);
        assert_eq!(tic.time, vec![0.1, 0.2]);

        let untimed = ScanStack::from_records(vec![
            plain_scan(0.0, vec![100.0], vec![1.0]),
            plain_scan(0.0, vec![100.0], vec![1.0]),
        ]);
        assert_eq!(untimed.tic().axis, AxisKind::Scans);
        assert_eq!(untimed.tic().time, vec![1.0, 2.0]);
    }

    #[test]
    fn test_window_heatmap_without_drift_bins_mz() {
        let stack = stack_without_drift();
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        let hm = source.ion_heatmap(MzRange::new(100.0, 500.0)).unwrap();
        assert_eq!(hm.shape(), (4, 2));
        assert_eq!(hm.y_axis, AxisKind::Mz);
        assert_eq!(hm.x_axis, AxisKind::Scans);
        // the 900 m/z point falls outside the window
        assert_eq!(hm.total_intensity(), 27.0);
        // 100 lands in the first row, 500 in the last
        assert_eq!(hm.array[[0, 0]], 1.0);
        assert_eq!(hm.array[[3, 1]], 16.0);
    }

    #[test]
    fn test_window_heatmap_with_drift_bins_drift() {
        let stack = stack_with_drift();
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        let hm = source.ion_heatmap(MzRange::new(100.0, 500.0)).unwrap();
        assert_eq!(hm.y_axis, AxisKind::DriftMilliseconds);
        // drift 1.0 is the lowest bin, drift 9.0 the highest
        assert_eq!(hm.array[[0, 0]], 1.0);
        assert_eq!(hm.array[[3, 0]], 2.0);
        assert_eq!(hm.array[[3, 1]], 4.0);

        let frame = stack.frame_heatmap(4).unwrap();
        assert_eq!(frame.total_intensity(), 7.0);
        assert!(stack_without_drift().frame_heatmap(4).is_none());
    }

    #[test]
    fn test_mobilogram_requires_drift() {
        let stack = stack_without_drift();
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        assert!(matches!(
            source.ion_mobilogram(MzRange::new(100.0, 500.0)),
            Err(ExtractError::MissingIonMobility)
        ));

        let stack = stack_with_drift();
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        let dt = source.ion_mobilogram(MzRange::new(100.0, 500.0)).unwrap();
        assert_eq!(dt.intensity, vec![1.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn test_prefetch_feeds_the_cache() {
        let stack = stack_without_drift();
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        let ranges = vec![MzRange::new(100.0, 500.0), MzRange::new(500.0, 900.0)];
        source.prefetch(&ranges);
        assert_eq!(source.cache.len(), 2);
        let hm = source.ion_heatmap(ranges[0]).unwrap();
        assert_eq!(hm.total_intensity(), 27.0);
        assert_eq!(source.cache.len(), 1);
    }

    #[test]
    fn test_scan_window_spectrum_clamps() {
        let stack = stack_without_drift();
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        let ms = source
            .scan_mass_spectrum(ScanRange::new(1, 10, 20.0))
            .unwrap();
        assert_eq!(ms.total_intensity(), 24.0);
    }

    #[test]
    fn test_empty_stack_is_an_error() {
        let stack = ScanStack::from_records(Vec::new());
        let mut source = MzdataIonSource::new(&stack, 4, 1.0);
        assert!(matches!(
            source.ion_heatmap(MzRange::new(1.0, 2.0)),
            Err(ExtractError::Source(_))
        ));
    }
}
