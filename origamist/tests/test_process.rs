use std::{error::Error, io::Write, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("origamist")?;

    cmd.arg("not_real.mzML").arg("-o").arg("-");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("NotFound"));
    Ok(())
}

#[test]
fn test_malformed_ion_window() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("origamist")?;

    cmd.arg("not_real.mzML")
        .args(["-o", "-", "-i", "500-"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "An m/z window needs both ends",
    ));

    let mut cmd = Command::cargo_bin("origamist")?;

    cmd.arg("not_real.mzML")
        .args(["-o", "-", "-i", "a-600"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse window start"));

    Ok(())
}

#[test]
fn test_unknown_method_rejected() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("origamist")?;

    cmd.arg("not_real.mzML").args(["-m", "sideways"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
    Ok(())
}

#[test]
fn test_unknown_format_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("not_spectra.xyz");
    let mut handle = std::fs::File::create(&path)?;
    writeln!(handle, "this is not a mass spectrometry file")?;
    drop(handle);

    let mut cmd = Command::cargo_bin("origamist")?;
    cmd.arg(path.to_string_lossy().to_string()).args(["-o", "-"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("FormatUnknownOrNotSupported"));
    Ok(())
}
