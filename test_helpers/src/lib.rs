//! Test helpers for the loss-cone workspace
//!
//! Builds synthetic ER telemetry and theta files in the default column layout
//! (`Bx By Bz phi[..] flux[..] energy spec_no time`) so integration tests can
//! exercise the loaders against real files.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Timestamp used for rows that should pass validation
pub const NOMINAL_TIME: &str = "1998-01-16T12:00:00";

/// Timestamp the ground system writes when the clock is missing
pub const NULL_TIME: &str = "1970-01-01T00:00:00";

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to write fixture {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),
}

/// One synthetic telemetry row.
#[derive(Debug, Clone, PartialEq)]
pub struct ErRow {
    pub spec_no: i64,
    pub time: String,
    pub field: [f64; 3],
    pub azimuths: Vec<f64>,
    pub flux: Vec<f64>,
    pub energy: f64,
}

impl ErRow {
    /// Row in the default column layout.
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        for value in self
            .field
            .iter()
            .chain(self.azimuths.iter())
            .chain(self.flux.iter())
        {
            let _ = write!(line, "{value} ");
        }
        let _ = write!(line, "{} {} {}", self.energy, self.spec_no, self.time);
        line
    }
}

/// Evenly spaced polar angles symmetric about the spin plane, degrees.
///
/// Half of the channels look above the plane and half below, so a field with
/// a component along z always leaves some channels incident.
pub fn default_thetas(channels: usize) -> Vec<f64> {
    let spacing = 180.0 / channels as f64;
    (0..channels)
        .map(|i| -90.0 + spacing * (i as f64 + 0.5))
        .collect()
}

/// One sweep of `rows` energy bins with a fixed field vector.
///
/// Energies step down geometrically from 20 keV. Flux falls off with energy
/// and channels in the lower half of the theta table read three times more
/// than the upper half.
pub fn sweep(spec_no: i64, rows: usize, channels: usize, field: [f64; 3]) -> Vec<ErRow> {
    (0..rows)
        .map(|bin| {
            let energy = 20_000.0 * 0.7_f64.powi(bin as i32);
            let base = 1e6 / (1.0 + energy / 100.0);
            ErRow {
                spec_no,
                time: NOMINAL_TIME.to_string(),
                field,
                azimuths: (0..channels)
                    .map(|c| (c as f64 * 360.0 / channels as f64 + bin as f64 * 5.0) % 360.0)
                    .collect(),
                flux: (0..channels)
                    .map(|c| if c < channels / 2 { 3.0 * base } else { base })
                    .collect(),
                energy,
            }
        })
        .collect()
}

/// Fresh temporary directory for fixture files.
pub fn temp_workspace() -> Result<TempDir, TestHelperError> {
    tempfile::tempdir().map_err(TestHelperError::TempDir)
}

fn write_fixture(path: PathBuf, contents: &str) -> Result<PathBuf, TestHelperError> {
    fs::write(&path, contents).map_err(|source| TestHelperError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Write `rows` as an ER data file named `name` inside `dir`.
pub fn write_er_file(dir: &Path, name: &str, rows: &[ErRow]) -> Result<PathBuf, TestHelperError> {
    let contents: String = rows.iter().map(|row| row.to_line() + "\n").collect();
    write_fixture(dir.join(name), &contents)
}

/// Write a theta file, one angle per line.
pub fn write_theta_file(dir: &Path, thetas: &[f64]) -> Result<PathBuf, TestHelperError> {
    let contents: String = thetas.iter().map(|t| format!("{t}\n")).collect();
    write_fixture(dir.join("theta.txt"), &contents)
}

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
