use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use clap::Parser;
use serde::{Deserialize, Serialize};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;

use thiserror::Error;

use tracing::{debug, info, warn};

use mzdata::io::{
    infer_format, infer_from_stream,
    mgf::MGFReaderType,
    mzml::MzMLReaderType,
    MassSpectrometryFormat, PreBufferedStream, RestartableGzDecoder, StreamingSpectrumIterator,
};
use mzdata::prelude::*;

use origami_core::combine::CombineSettings;
use origami_core::config::Settings;
use origami_core::document::{Document, DocumentKind};
use origami_core::store::{DocumentStore, StoreError, UpdateKind};
use origami_process::extract::{
    extract_ion_heatmap, extract_ion_mobilogram, extract_voltage_mass_spectra, ExtractError,
    ExtractPolicy, MzRange,
};
use origami_process::origami_ms::{combine_ion, ActivationError};
use origami_process::overlay::{apply_overlay, OverlayError, OverlayItem};

use crate::args::{read_spv_list, ArgOverlayMethod, ArgSpvMethod, SpvListError, ION_COLORS};
use crate::progress::ProgressRecord;
use crate::source::{MzdataIonSource, ScanStack};
use crate::stages::{watch_updates, write_documents};
use crate::types::DRIFT_BINS;

/// The title overlay and statistics results are collected under.
const COMPARISON_TITLE: &str = "Comparison";

fn positive_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value <= 0.0 {
        Err(format!("`{s}` is not a positive number"))
    } else {
        Ok(value)
    }
}

fn positive_usize(s: &str) -> Result<usize, String> {
    let value = s.parse::<usize>().map_err(|e| e.to_string())?;
    if value == 0 {
        Err(format!("`{s}` must be at least 1"))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Error)]
pub enum OrigamistError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("The input file format for {0} was either unknown or not supported ({1:?})")]
    FormatUnknownOrNotSupportedError(String, MassSpectrometryFormat),
    #[error("The input file format from STDIN was either unknown or not supported ({0:?})")]
    FormatUnknownOrNotSupportedErrorStdIn(MassSpectrometryFormat),
    #[error("The input contained no usable spectra")]
    EmptyInput,
    #[error("Failed to read the configuration: {0}")]
    ConfigError(#[from] figment::Error),
    #[error(transparent)]
    SpvListError(#[from] SpvListError),
    #[error("Extraction failed: {0}")]
    ExtractError(#[from] ExtractError),
    #[error("Combination failed: {0}")]
    ActivationError(#[from] ActivationError),
    #[error("Overlay failed: {0}")]
    OverlayError(#[from] OverlayError),
    #[error(transparent)]
    StoreError(#[from] StoreError),
    #[error("Failed to serialize the project: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Batch processing of ORIGAMI-MS ion mobility acquisitions.
///
/// Read a file or stream, extract the requested ions, combine the collision
/// voltage ramp, compute comparisons, and write the resulting documents out
/// as a project JSON file.
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(author, version)]
pub struct Origamist {
    /// The path to read the input spectra from, or if '-' is passed, read from STDIN
    #[arg()]
    pub input_file: String,

    /// The path to write the project JSON to, or if '-' is passed, write to STDOUT.
    ///
    /// A path ending in .gz is gzip-compressed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `origamist.toml` in the working directory.
    /// Environment variables prefixed with `ORIGAMIST_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,

    /// The document title; defaults to the input file stem
    #[arg(short = 'T', long = "title")]
    pub title: Option<String>,

    /// An m/z window to extract, denoted START-END. Repeatable.
    #[arg(short = 'i', long = "ion", value_parser = MzRange::from_str)]
    pub ions: Vec<MzRange>,

    /// Recompute and overwrite ions whose label already exists
    #[arg(long = "refresh-ions")]
    pub refresh_ions: bool,

    /// The scan-to-voltage mapping used to combine the ramp
    #[arg(short = 'm', long = "method")]
    pub method: Option<ArgSpvMethod>,

    /// First scan of the voltage ramp
    #[arg(long = "start-scan")]
    pub start_scan: Option<usize>,

    /// First collision voltage of the ramp
    #[arg(long = "start-voltage")]
    pub start_voltage: Option<f64>,

    /// Last collision voltage of the ramp
    #[arg(long = "end-voltage")]
    pub end_voltage: Option<f64>,

    /// Voltage increment between steps
    #[arg(long = "step-voltage")]
    pub step_voltage: Option<f64>,

    /// Scans acquired per voltage
    #[arg(long = "scans-per-voltage")]
    pub scans_per_voltage: Option<usize>,

    /// Percentage of the end voltage past which the exponential ramp grows
    #[arg(long = "exponential-percentage")]
    pub exponential_percentage: Option<f64>,

    /// Exponent increment per step of the exponential ramp
    #[arg(long = "exponential-increment")]
    pub exponential_increment: Option<f64>,

    /// The dx slope of the Boltzmann ramp
    #[arg(long = "boltzmann-offset")]
    pub boltzmann_offset: Option<f64>,

    /// A CSV file of `scans,voltage` rows for the user-defined method
    #[arg(long = "spv-list")]
    pub spv_list: Option<PathBuf>,

    /// Skip combination even when ions were extracted
    #[arg(long = "no-combine")]
    pub no_combine: bool,

    /// An overlay to compute across the combined ions. Repeatable.
    #[arg(short = 'p', long = "overlay")]
    pub overlays: Vec<ArgOverlayMethod>,

    /// Number of drift (or m/z) rows when building extracted heatmaps
    #[arg(
        long = "drift-bins",
        default_value_t = DRIFT_BINS,
        value_parser = positive_usize
    )]
    pub drift_bins: usize,

    /// Bin width for accumulated mass spectra
    #[arg(
        long = "mz-bin-width",
        default_value_t = 0.1,
        value_parser = positive_float
    )]
    pub mz_bin_width: f64,

    /// Pretty-print the project JSON
    #[arg(long = "pretty")]
    pub pretty: bool,

    /// The size of the buffer between the pipeline stages; defaults to the
    /// configured value
    #[arg(short = 'w', long = "write-buffer-size")]
    pub write_buffer_size: Option<usize>,
}

impl Origamist {
    fn create_threadpool(&self) -> rayon::ThreadPool {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism().unwrap().into()
        };
        debug!("Using {} cores", num_threads);
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .unwrap()
    }

    fn load_settings(&self) -> Result<Settings, figment::Error> {
        let mut figment = Figment::new().merge(Toml::file("origamist.toml"));
        if let Some(path) = &self.config_file {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment.merge(Env::prefixed("ORIGAMIST_")).extract()
    }

    /// The configured combination parameters with any explicit flags
    /// layered on top.
    fn combine_settings(&self, settings: &Settings) -> Result<CombineSettings, OrigamistError> {
        let mut combine = settings.combination.clone();
        if let Some(method) = self.method {
            combine.method = method.into();
        }
        if let Some(start_scan) = self.start_scan {
            combine.start_scan = start_scan;
        }
        if let Some(start_voltage) = self.start_voltage {
            combine.start_voltage = start_voltage;
        }
        if let Some(end_voltage) = self.end_voltage {
            combine.end_voltage = end_voltage;
        }
        if let Some(step_voltage) = self.step_voltage {
            combine.step_voltage = step_voltage;
        }
        if let Some(scans_per_voltage) = self.scans_per_voltage {
            combine.scans_per_voltage = scans_per_voltage;
        }
        if let Some(exponential_percentage) = self.exponential_percentage {
            combine.exponential_percentage = exponential_percentage;
        }
        if let Some(exponential_increment) = self.exponential_increment {
            combine.exponential_increment = exponential_increment;
        }
        if let Some(boltzmann_offset) = self.boltzmann_offset {
            combine.boltzmann_offset = boltzmann_offset;
        }
        if let Some(path) = &self.spv_list {
            combine.user_list = read_spv_list(path)?;
        }
        Ok(combine)
    }

    fn document_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if self.input_file == "-" {
            return "STDIN".to_string();
        }
        Path::new(&self.input_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| self.input_file.clone())
    }

    pub fn main(&self) -> Result<(), OrigamistError> {
        info!(
            "origamist v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Input: {}", self.input_file);
        info!("Output: {}", self.output_file.display());
        let settings = self.load_settings()?;
        self.create_threadpool()
            .install(|| self.reader_then(&settings))
    }

    fn reader_then(&self, settings: &Settings) -> Result<(), OrigamistError> {
        if self.input_file == "-" {
            let mut buffered =
                PreBufferedStream::new_with_buffer_size(io::stdin(), 2usize.pow(20))?;
            let (ms_format, compressed) = infer_from_stream(&mut buffered)?;
            debug!("Detected {ms_format:?} from STDIN (compressed? {compressed})");
            match ms_format {
                MassSpectrometryFormat::MGF => {
                    let stack = if compressed {
                        ScanStack::from_reader(StreamingSpectrumIterator::new(MGFReaderType::new(
                            RestartableGzDecoder::new(io::BufReader::new(buffered)),
                        )))
                    } else {
                        ScanStack::from_reader(StreamingSpectrumIterator::new(MGFReaderType::new(
                            buffered,
                        )))
                    };
                    self.run_workflow(stack, settings, ms_format)?;
                }
                MassSpectrometryFormat::MzML => {
                    let stack = if compressed {
                        ScanStack::from_reader(StreamingSpectrumIterator::new(MzMLReaderType::new(
                            RestartableGzDecoder::new(io::BufReader::new(buffered)),
                        )))
                    } else {
                        ScanStack::from_reader(StreamingSpectrumIterator::new(MzMLReaderType::new(
                            buffered,
                        )))
                    };
                    self.run_workflow(stack, settings, ms_format)?;
                }
                _ => {
                    return Err(OrigamistError::FormatUnknownOrNotSupportedErrorStdIn(
                        ms_format,
                    ))
                }
            }
        } else {
            let (ms_format, compressed) = infer_format(&self.input_file)?;
            debug!("Detected {ms_format:?} from path (compressed? {compressed})");
            match ms_format {
                MassSpectrometryFormat::MGF => {
                    let stack = if compressed {
                        let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(
                            &self.input_file,
                        )?));
                        ScanStack::from_reader(StreamingSpectrumIterator::new(MGFReaderType::new(
                            fh,
                        )))
                    } else {
                        ScanStack::from_reader(MGFReaderType::open_path(self.input_file.clone())?)
                    };
                    self.run_workflow(stack, settings, ms_format)?;
                }
                MassSpectrometryFormat::MzML => {
                    let stack = if compressed {
                        let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(
                            &self.input_file,
                        )?));
                        ScanStack::from_reader(StreamingSpectrumIterator::new(MzMLReaderType::new(
                            fh,
                        )))
                    } else {
                        ScanStack::from_reader(MzMLReaderType::open_path(self.input_file.clone())?)
                    };
                    self.run_workflow(stack, settings, ms_format)?;
                }
                _ => {
                    return Err(OrigamistError::FormatUnknownOrNotSupportedError(
                        self.input_file.clone(),
                        ms_format,
                    ))
                }
            }
        }
        Ok(())
    }

    fn run_workflow(
        &self,
        stack: ScanStack,
        settings: &Settings,
        format: MassSpectrometryFormat,
    ) -> Result<(), OrigamistError> {
        if stack.is_empty() {
            return Err(OrigamistError::EmptyInput);
        }
        let start = Instant::now();
        let title = self.document_title();

        let mut store = DocumentStore::new();
        let buffer_size = self.write_buffer_size.unwrap_or(settings.write_buffer_size);
        let updates = store.subscribe_with(buffer_size);
        let watch_task = thread::spawn(move || watch_updates(updates));

        let mut prog = ProgressRecord {
            scans_read: stack.len(),
            ..Default::default()
        };

        self.build_document(&mut store, &title, &stack, format);

        let policy = if self.refresh_ions || settings.extraction_overwrite {
            ExtractPolicy::All
        } else {
            ExtractPolicy::OnlyNew
        };
        let mut source = MzdataIonSource::new(&stack, self.drift_bins, self.mz_bin_width);
        self.extract_ions(&mut store, &title, &stack, &mut source, policy, &mut prog)?;
        self.maybe_autosave(settings, &store)?;

        if !self.no_combine && store.get(&title)?.has_extracted_ions() {
            let combine = self.combine_settings(settings)?;
            self.combine_ions(&mut store, &title, &combine, &mut source, policy, &mut prog)?;
            self.maybe_autosave(settings, &store)?;
        }

        if !self.overlays.is_empty() {
            self.build_overlays(&mut store, &title, &mut prog)?;
        }

        self.write_project(&store)?;
        drop(store);
        match watch_task.join() {
            Ok(count) => debug!("{count} document updates were applied"),
            Err(e) => warn!("Failed to join the update watcher: {e:?}"),
        }

        info!("Scans: {}", prog.scans_read);
        info!(
            "Ions Extracted: {} | Skipped: {} | Out of Range: {}",
            prog.ions_extracted, prog.ions_skipped, prog.ions_out_of_range
        );
        info!("Voltages Combined: {}", prog.voltages_combined);
        info!("Per-Voltage Spectra: {}", prog.spectra_per_voltage);
        info!("Overlays: {}", prog.overlays_built);
        info!("Elapsed Time: {:0.3?}", Instant::now() - start);
        Ok(())
    }

    fn build_document(
        &self,
        store: &mut DocumentStore,
        title: &str,
        stack: &ScanStack,
        format: MassSpectrometryFormat,
    ) {
        let kind = if stack.has_ion_mobility() {
            DocumentKind::Origami
        } else {
            DocumentKind::MassSpectrum
        };
        let mut document =
            Document::new(title, &self.input_file, kind).with_file_format(format!("{format:?}"));
        document.mass_spectrum = stack.mass_spectrum(self.mz_bin_width);
        document.chromatogram = Some(stack.tic());
        document.heatmap = stack.frame_heatmap(self.drift_bins);

        let has_ms = document.has_mass_spectrum();
        let has_rt = document.has_chromatogram();
        let has_hm = document.has_heatmap();
        store.put(document);
        store.notify(title, UpdateKind::Document);
        if has_ms {
            store.notify(title, UpdateKind::MassSpectrum);
        }
        if has_rt {
            store.notify(title, UpdateKind::Chromatogram);
        }
        if has_hm {
            store.notify(title, UpdateKind::Heatmap);
        }
    }

    fn extract_ions(
        &self,
        store: &mut DocumentStore,
        title: &str,
        stack: &ScanStack,
        source: &mut MzdataIonSource<'_>,
        policy: ExtractPolicy,
        prog: &mut ProgressRecord,
    ) -> Result<(), OrigamistError> {
        if self.ions.is_empty() {
            return Ok(());
        }
        debug!(
            "Extracting ions: {}",
            self.ions.iter().map(|range| range.label()).join(", ")
        );
        source.prefetch(&self.ions);
        for range in &self.ions {
            let document = store.get_mut(title)?;
            match extract_ion_heatmap(document, source, *range, policy) {
                Ok(outcome) => {
                    let label = outcome.label().to_string();
                    if outcome.was_extracted() {
                        prog.ions_extracted += 1;
                        store.notify(
                            title,
                            UpdateKind::Ions {
                                label: label.clone(),
                            },
                        );
                    } else {
                        prog.ions_skipped += 1;
                    }
                    if stack.has_ion_mobility() {
                        let document = store.get_mut(title)?;
                        if extract_ion_mobilogram(document, source, *range, policy)?
                            .was_extracted()
                        {
                            store.notify(title, UpdateKind::Mobilograms { label });
                        }
                    }
                }
                Err(e @ ExtractError::OutOfBounds { .. }) => {
                    warn!("Skipping the {range} ion: {e}");
                    prog.ions_out_of_range += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn combine_ions(
        &self,
        store: &mut DocumentStore,
        title: &str,
        combine: &CombineSettings,
        source: &mut MzdataIonSource<'_>,
        policy: ExtractPolicy,
        prog: &mut ProgressRecord,
    ) -> Result<(), OrigamistError> {
        let labels: Vec<String> = store.get(title)?.ion_heatmaps.keys().cloned().collect();
        for label in labels {
            let document = store.get_mut(title)?;
            match combine_ion(document, &label, combine) {
                Ok(()) => {
                    prog.voltages_combined = document.scan_ranges.len();
                    store.notify(title, UpdateKind::CombinedIons { label });
                }
                Err(e @ ActivationError::ScanRangeExceeded { .. }) => {
                    // every ion shares the scan count, so the rest would fail too
                    warn!("Could not combine the ramp: {e}");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let outcomes = {
            let document = store.get_mut(title)?;
            if document.scan_ranges.is_empty() {
                Vec::new()
            } else {
                extract_voltage_mass_spectra(document, source, policy)?
            }
        };
        for outcome in outcomes {
            if outcome.was_extracted() {
                prog.spectra_per_voltage += 1;
                store.notify(
                    title,
                    UpdateKind::MassSpectra {
                        label: outcome.label().to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    fn build_overlays(
        &self,
        store: &mut DocumentStore,
        title: &str,
        prog: &mut ProgressRecord,
    ) -> Result<(), OrigamistError> {
        let items: Vec<OverlayItem> = {
            let document = store.get(title)?;
            let collection = if document.has_combined_ions() {
                &document.combined_ion_heatmaps
            } else {
                &document.ion_heatmaps
            };
            collection
                .iter()
                .enumerate()
                .map(|(index, (label, heatmap))| {
                    OverlayItem::new(title, label.clone(), heatmap.clone())
                        .with_color(ION_COLORS[index % ION_COLORS.len()])
                })
                .collect()
        };
        for method in &self.overlays {
            match apply_overlay(store, COMPARISON_TITLE, (*method).into(), &items) {
                Ok(name) => {
                    prog.overlays_built += 1;
                    info!("Computed {name}");
                }
                Err(e @ OverlayError::TooFewItems { .. }) => {
                    warn!("Skipping the {method} overlay: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn maybe_autosave(&self, settings: &Settings, store: &DocumentStore) -> Result<(), OrigamistError> {
        if settings.autosave && self.output_file != PathBuf::from("-") {
            self.write_project(store)?;
        }
        Ok(())
    }

    fn write_project(&self, store: &DocumentStore) -> Result<(), OrigamistError> {
        if self.output_file == PathBuf::from("-") {
            write_documents(io::stdout().lock(), store.documents(), self.pretty)?;
        } else {
            let handle = io::BufWriter::new(fs::File::create(&self.output_file)?);
            if self
                .output_file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
            {
                let mut encoder = GzEncoder::new(handle, Compression::best());
                write_documents(&mut encoder, store.documents(), self.pretty)?;
                encoder.try_finish()?;
            } else {
                write_documents(handle, store.documents(), self.pretty)?;
            }
        }
        debug!("Wrote {} document(s)", store.len());
        Ok(())
    }
}
