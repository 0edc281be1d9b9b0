//! ER telemetry loading and sweep-level cleaning.
//!
//! A corrupted magnetometer sample or a missing timestamp invalidates the
//! geometry of the whole sweep it belongs to, so cleaning removes every row
//! that shares a `spec_no` with an invalid row rather than the row alone.
//! The surviving rows are re-indexed contiguously; chunk indexing downstream
//! relies on there being no gaps.

use crate::config::{ColumnSchema, EPOCH_NULL, MAX_FIELD_MAGNITUDE, MIN_FIELD_MAGNITUDE};
use crate::error::{ConfigurationError, DataLoadError};
use log::{error, info};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One telemetry row as read from the ER data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    /// Sweep identifier shared by every row of one instrument scan
    pub spec_no: i64,
    /// UTC timestamp as written in the file
    pub time: String,
    /// Magnetic field vector (Bx, By, Bz), nT
    pub magnetic_field: [f64; 3],
    /// Per-channel azimuth angles, degrees
    pub azimuths: Vec<f64>,
    /// Per-channel electron flux
    pub flux: Vec<f64>,
    /// Energy of this row's bin, eV
    pub energy: f64,
}

/// Summary of what sweep cleaning removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningReport {
    /// Rows before cleaning
    pub original_rows: usize,
    /// Rows removed
    pub removed_rows: usize,
    /// Distinct `spec_no` values that were dropped, ascending
    pub removed_sweeps: Vec<i64>,
}

impl CleaningReport {
    pub fn sweeps_removed(&self) -> usize {
        self.removed_sweeps.len()
    }

    /// Percentage of the original rows that were removed.
    pub fn removed_percent(&self) -> f64 {
        if self.original_rows == 0 {
            0.0
        } else {
            self.removed_rows as f64 / self.original_rows as f64 * 100.0
        }
    }
}

/// True if a row with this field magnitude and timestamp can be used.
pub fn is_row_valid(field_magnitude: f64, time: &str) -> bool {
    field_magnitude.is_finite()
        && field_magnitude > MIN_FIELD_MAGNITUDE
        && field_magnitude < MAX_FIELD_MAGNITUDE
        && time != EPOCH_NULL
}

/// Row table of ER telemetry, stored column-wise.
///
/// Once built the table is never mutated; cleaning consumes it and returns a
/// new one.
#[derive(Debug, Clone)]
pub struct SweepDataset {
    channels: usize,
    magnetic_field: Array2<f64>,
    azimuths: Array2<f64>,
    flux: Array2<f64>,
    energies: Array1<f64>,
    spec_nos: Vec<i64>,
    times: Vec<String>,
}

impl SweepDataset {
    /// Load an ER data file and remove invalid sweeps.
    ///
    /// Errors are logged before being returned; an `Err` is the "no data"
    /// state and the caller decides whether the run can continue.
    pub fn load(path: &Path, schema: &ColumnSchema) -> Result<Self, DataLoadError> {
        Self::load_with_report(path, schema).map(|(dataset, _)| dataset)
    }

    /// Like [`SweepDataset::load`] but also returns the cleaning summary.
    pub fn load_with_report(
        path: &Path,
        schema: &ColumnSchema,
    ) -> Result<(Self, CleaningReport), DataLoadError> {
        let records = read_records(path, schema).inspect_err(|e| error!("{e}"))?;
        let raw = Self::from_parsed(records, schema.channels);
        Ok(raw.clean_sweeps())
    }

    /// Build an uncleaned dataset from records.
    ///
    /// Every record must carry exactly `channels` azimuths and fluxes.
    pub fn from_records(
        records: Vec<SweepRecord>,
        channels: usize,
    ) -> Result<Self, ConfigurationError> {
        if let Some(bad) = records
            .iter()
            .find(|r| r.azimuths.len() != channels || r.flux.len() != channels)
        {
            return Err(ConfigurationError::ChannelMismatch {
                expected: channels,
                found: bad.azimuths.len().min(bad.flux.len()),
            });
        }
        Ok(Self::from_parsed(records, channels))
    }

    fn from_parsed(records: Vec<SweepRecord>, channels: usize) -> Self {
        let rows = records.len();
        let magnetic_field = Array2::from_shape_fn((rows, 3), |(r, c)| records[r].magnetic_field[c]);
        let azimuths = Array2::from_shape_fn((rows, channels), |(r, c)| records[r].azimuths[c]);
        let flux = Array2::from_shape_fn((rows, channels), |(r, c)| records[r].flux[c]);
        let energies = records.iter().map(|r| r.energy).collect::<Array1<f64>>();
        let spec_nos = records.iter().map(|r| r.spec_no).collect();
        let times = records.into_iter().map(|r| r.time).collect();

        Self {
            channels,
            magnetic_field,
            azimuths,
            flux,
            energies,
            spec_nos,
            times,
        }
    }

    /// Remove every sweep that contains at least one invalid row.
    pub fn clean_sweeps(self) -> (Self, CleaningReport) {
        let original_rows = self.len();
        let magnitudes = self.field_magnitudes();

        let invalid_sweeps: BTreeSet<i64> = (0..original_rows)
            .filter(|&row| !is_row_valid(magnitudes[row], &self.times[row]))
            .map(|row| self.spec_nos[row])
            .collect();

        if invalid_sweeps.is_empty() {
            let report = CleaningReport {
                original_rows,
                ..Default::default()
            };
            return (self, report);
        }

        info!("Removing {} sweeps with invalid data", invalid_sweeps.len());

        let keep: Vec<usize> = (0..original_rows)
            .filter(|&row| !invalid_sweeps.contains(&self.spec_nos[row]))
            .collect();
        let cleaned = self.select_rows(&keep);

        let report = CleaningReport {
            original_rows,
            removed_rows: original_rows - cleaned.len(),
            removed_sweeps: invalid_sweeps.into_iter().collect(),
        };
        info!(
            "Removed {} rows ({:.1}%) from {} invalid sweeps",
            report.removed_rows,
            report.removed_percent(),
            report.sweeps_removed()
        );

        (cleaned, report)
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            channels: self.channels,
            magnetic_field: self.magnetic_field.select(Axis(0), rows),
            azimuths: self.azimuths.select(Axis(0), rows),
            flux: self.flux.select(Axis(0), rows),
            energies: self.energies.select(Axis(0), rows),
            spec_nos: rows.iter().map(|&r| self.spec_nos[r]).collect(),
            times: rows.iter().map(|&r| self.times[r].clone()).collect(),
        }
    }

    /// L2 norm of each row's magnetic field vector.
    pub fn field_magnitudes(&self) -> Array1<f64> {
        self.magnetic_field
            .rows()
            .into_iter()
            .map(|b| b.dot(&b).sqrt())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spec_nos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spec_nos.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Magnetic field, rows × 3
    pub fn magnetic_field(&self) -> ArrayView2<'_, f64> {
        self.magnetic_field.view()
    }

    /// Azimuth angles in degrees, rows × channels
    pub fn azimuths(&self) -> ArrayView2<'_, f64> {
        self.azimuths.view()
    }

    /// Electron flux, rows × channels
    pub fn flux(&self) -> ArrayView2<'_, f64> {
        self.flux.view()
    }

    /// Electron flux of one row
    pub fn flux_row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.flux.row(row)
    }

    /// Bin energies in eV, one per row
    pub fn energies(&self) -> ArrayView1<'_, f64> {
        self.energies.view()
    }

    /// Energies for rows `start..end`
    pub fn energy_slice(&self, start: usize, end: usize) -> ArrayView1<'_, f64> {
        self.energies.slice(s![start..end])
    }

    pub fn spec_nos(&self) -> &[i64] {
        &self.spec_nos
    }

    pub fn times(&self) -> &[String] {
        &self.times
    }
}

fn read_records(path: &Path, schema: &ColumnSchema) -> Result<Vec<SweepRecord>, DataLoadError> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DataLoadError::NotFound(path.to_path_buf())
        } else {
            DataLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_record(&line, index + 1, schema)?);
    }
    Ok(records)
}

/// Parse one whitespace-delimited row. `line` is 1-based and only used in errors.
pub fn parse_record(
    text: &str,
    line: usize,
    schema: &ColumnSchema,
) -> Result<SweepRecord, DataLoadError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let expected = schema.min_columns();
    if fields.len() < expected {
        return Err(DataLoadError::MissingColumns {
            line,
            expected,
            found: fields.len(),
        });
    }

    let float_at = |column: usize| -> Result<f64, DataLoadError> {
        fields[column].parse::<f64>().map_err(|_| DataLoadError::Parse {
            line,
            column,
            value: fields[column].to_string(),
            expected: "float",
        })
    };
    let floats_from = |start: usize, count: usize| -> Result<Vec<f64>, DataLoadError> {
        (start..start + count).map(&float_at).collect()
    };

    let magnetic_field = [
        float_at(schema.mag_start)?,
        float_at(schema.mag_start + 1)?,
        float_at(schema.mag_start + 2)?,
    ];

    Ok(SweepRecord {
        spec_no: parse_spec_no(fields[schema.spec_no]).ok_or_else(|| DataLoadError::Parse {
            line,
            column: schema.spec_no,
            value: fields[schema.spec_no].to_string(),
            expected: "integer",
        })?,
        time: fields[schema.time].to_string(),
        magnetic_field,
        azimuths: floats_from(schema.phi_start, schema.channels)?,
        flux: floats_from(schema.flux_start, schema.channels)?,
        energy: float_at(schema.energy)?,
    })
}

// Sweep numbers are sometimes written with a trailing ".0".
fn parse_spec_no(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(spec_no: i64, field: [f64; 3], time: &str) -> SweepRecord {
        SweepRecord {
            spec_no,
            time: time.to_string(),
            magnetic_field: field,
            azimuths: vec![0.0; 4],
            flux: vec![1.0; 4],
            energy: 100.0,
        }
    }

    #[test]
    fn test_row_validity_thresholds() {
        assert!(is_row_valid(50.0, "1998-01-16T00:00:00"));
        assert!(!is_row_valid(1e-9, "1998-01-16T00:00:00"));
        assert!(!is_row_valid(1e3, "1998-01-16T00:00:00"));
        assert!(!is_row_valid(f64::NAN, "1998-01-16T00:00:00"));
        assert!(!is_row_valid(50.0, EPOCH_NULL));
    }

    #[test]
    fn test_clean_removes_whole_sweep() {
        let good = [30.0, 40.0, 0.0];
        let records = vec![
            record(1, good, "t0"),
            record(1, good, "t1"),
            record(7, good, "t2"),
            record(7, [1e4, 0.0, 0.0], "t3"),
            record(7, good, "t4"),
            record(9, good, "t5"),
        ];
        let dataset = SweepDataset::from_records(records, 4).unwrap();
        let (cleaned, report) = dataset.clean_sweeps();

        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned.spec_nos(), &[1, 1, 9]);
        assert_eq!(cleaned.times(), &["t0", "t1", "t5"]);
        assert_eq!(report.removed_sweeps, vec![7]);
        assert_eq!(report.removed_rows, 3);
        assert!((report.removed_percent() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_clean_epoch_null_timestamp() {
        let good = [0.0, 0.0, 5.0];
        let records = vec![
            record(2, good, EPOCH_NULL),
            record(2, good, "t1"),
            record(3, good, "t2"),
        ];
        let (cleaned, report) = SweepDataset::from_records(records, 4)
            .unwrap()
            .clean_sweeps();
        assert_eq!(cleaned.spec_nos(), &[3]);
        assert_eq!(report.sweeps_removed(), 1);
    }

    #[test]
    fn test_clean_no_invalid_rows_is_identity() {
        let records = vec![record(1, [1.0, 2.0, 2.0], "t0")];
        let (cleaned, report) = SweepDataset::from_records(records, 4)
            .unwrap()
            .clean_sweeps();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(report.removed_rows, 0);
        assert_eq!(report.removed_percent(), 0.0);
        assert!((cleaned.field_magnitudes()[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_flux_row_view() {
        let mut records = vec![record(1, [0.0, 0.0, 5.0], "t0"); 2];
        records[1].flux = vec![1.0, 2.0, 3.0, 4.0];
        let dataset = SweepDataset::from_records(records, 4).unwrap();

        assert_eq!(dataset.flux_row(0).to_vec(), vec![1.0; 4]);
        assert_eq!(dataset.flux_row(1), dataset.flux().row(1));
        assert_eq!(dataset.flux_row(1)[3], 4.0);
    }

    #[test]
    fn test_from_records_rejects_wrong_channel_count() {
        let records = vec![record(1, [1.0, 0.0, 0.0], "t0")];
        assert!(matches!(
            SweepDataset::from_records(records, 16),
            Err(ConfigurationError::ChannelMismatch { expected: 16, .. })
        ));
    }

    #[test]
    fn test_parse_record_default_schema() {
        let schema = ColumnSchema::with_channels(2);
        let record = parse_record("1 2 3  10 20  5.5 6.5  150.0 42.0 1998-01-16T00:00:00 extra", 1, &schema)
            .unwrap();
        assert_eq!(record.magnetic_field, [1.0, 2.0, 3.0]);
        assert_eq!(record.azimuths, vec![10.0, 20.0]);
        assert_eq!(record.flux, vec![5.5, 6.5]);
        assert_eq!(record.energy, 150.0);
        assert_eq!(record.spec_no, 42);
        assert_eq!(record.time, "1998-01-16T00:00:00");
    }

    #[test]
    fn test_parse_record_errors() {
        let schema = ColumnSchema::with_channels(2);
        assert!(matches!(
            parse_record("1 2 3", 4, &schema),
            Err(DataLoadError::MissingColumns { line: 4, expected: 10, found: 3 })
        ));
        assert!(matches!(
            parse_record("1 x 3 10 20 5 6 150 1 t", 2, &schema),
            Err(DataLoadError::Parse { line: 2, column: 1, .. })
        ));
        assert!(matches!(
            parse_record("1 2 3 10 20 5 6 150 1.5 t", 2, &schema),
            Err(DataLoadError::Parse { column: 8, expected: "integer", .. })
        ));
    }
}
