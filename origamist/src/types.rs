use mzdata::spectrum::MultiLayerSpectrum;
use mzpeaks::{CentroidPeak, DeconvolutedPeak};

pub(crate) type SpectrumType = MultiLayerSpectrum<CentroidPeak, DeconvolutedPeak>;
pub(crate) const DRIFT_BINS: usize = 200;
