//! Session-level processing settings.
//!
//! The configuration surface is restricted to what the processing core
//! consumes; presentation settings belong to whatever frontend embeds it.
//! Loading (TOML file, environment) is the embedding application's job,
//! which is why this type only carries serde derives and defaults.

use serde::{Deserialize, Serialize};

use crate::combine::CombineSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// When true, extraction recomputes and overwrites datasets whose label
    /// already exists; when false only missing labels are extracted.
    pub extraction_overwrite: bool,
    /// Default parameters for collision voltage combination.
    pub combination: CombineSettings,
    /// Write the project file again after each processing phase.
    pub autosave: bool,
    /// Capacity of the channels between pipeline stages.
    pub write_buffer_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extraction_overwrite: false,
            combination: CombineSettings::default(),
            autosave: false,
            write_buffer_size: 10_000,
        }
    }
}
