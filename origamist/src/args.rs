use std::fmt::Display;
use std::fs;
use std::io;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use origami_core::combine::{SpvMethod, SpvStep};
use origami_process::overlay::OverlayMethod;

/// A small palette cycled over when assigning overlay colors to ions.
pub const ION_COLORS: [[f64; 3]; 6] = [
    [0.89, 0.10, 0.11],
    [0.22, 0.49, 0.72],
    [0.30, 0.69, 0.29],
    [0.60, 0.31, 0.64],
    [1.00, 0.50, 0.00],
    [0.65, 0.34, 0.16],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
pub enum ArgSpvMethod {
    #[default]
    Linear,
    Exponential,
    Boltzmann,
    UserDefined,
}

impl From<ArgSpvMethod> for SpvMethod {
    fn from(value: ArgSpvMethod) -> Self {
        match value {
            ArgSpvMethod::Linear => SpvMethod::Linear,
            ArgSpvMethod::Exponential => SpvMethod::Exponential,
            ArgSpvMethod::Boltzmann => SpvMethod::Boltzmann,
            ArgSpvMethod::UserDefined => SpvMethod::UserDefined,
        }
    }
}

impl Display for ArgSpvMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ArgOverlayMethod {
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

impl From<ArgOverlayMethod> for OverlayMethod {
    fn from(value: ArgOverlayMethod) -> Self {
        match value {
            ArgOverlayMethod::Transparent => OverlayMethod::Transparent,
            ArgOverlayMethod::Mask => OverlayMethod::Mask,
            ArgOverlayMethod::Rmsd => OverlayMethod::Rmsd,
            ArgOverlayMethod::Rmsf => OverlayMethod::Rmsf,
            ArgOverlayMethod::RmsdMatrix => OverlayMethod::RmsdMatrix,
            ArgOverlayMethod::Mean => OverlayMethod::Mean,
            ArgOverlayMethod::StdDev => OverlayMethod::StdDev,
            ArgOverlayMethod::Variance => OverlayMethod::Variance,
            ArgOverlayMethod::Rgb => OverlayMethod::Rgb,
            ArgOverlayMethod::Grid => OverlayMethod::Grid,
        }
    }
}

impl Display for ArgOverlayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum SpvListError {
    #[error("Failed to read the scan list: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Line {line} of the scan list is not a `scans,voltage` pair: {text:?}")]
    Malformed { line: usize, text: String },
}

/// Read a user-defined `scans,voltage` list, one pair per line. Blank
/// lines and lines starting with `#` are ignored.
pub fn read_spv_list(path: &Path) -> Result<Vec<SpvStep>, SpvListError> {
    let text = fs::read_to_string(path)?;
    let mut steps = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = || SpvListError::Malformed {
            line: index + 1,
            text: line.to_string(),
        };
        let (scans_s, voltage_s) = line.split_once(',').ok_or_else(malformed)?;
        let scans = scans_s.trim().parse().map_err(|_| malformed())?;
        let voltage = voltage_s.trim().parse().map_err(|_| malformed())?;
        steps.push(SpvStep::new(scans, voltage));
    }
    Ok(steps)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_spv_list() -> Result<(), SpvListError> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "# scans per voltage ramp")?;
        writeln!(file, "3, 5.0")?;
        writeln!(file)?;
        writeln!(file, "6,10")?;
        let steps = read_spv_list(file.path())?;
        assert_eq!(steps, vec![SpvStep::new(3, 5.0), SpvStep::new(6, 10.0)]);
        Ok(())
    }

    #[test]
    fn test_read_spv_list_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3, 5.0").unwrap();
        writeln!(file, "six,10").unwrap();
        let err = read_spv_list(file.path()).unwrap_err();
        assert!(
            matches!(err, SpvListError::Malformed { line: 2, .. }),
            "{err}"
        );
    }
}
