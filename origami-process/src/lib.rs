pub mod activation;
pub mod extract;
pub mod heatmap;
pub mod origami_ms;
pub mod overlay;
pub mod spectra;
