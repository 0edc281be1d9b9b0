//! Result table of a fitting run.

use crate::solver::FitResult;
use ndarray::Array2;
use serde::Serialize;
use std::path::Path;

/// Columns of [`FitTable::to_array`]
pub const TABLE_COLUMNS: usize = 4;

#[derive(Serialize)]
struct CsvRow<'a> {
    chunk: usize,
    delta_u: f64,
    bs_over_bm: f64,
    chi2: f64,
    status: &'a str,
}

/// Per-chunk fit results in chunk order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitTable {
    rows: Vec<FitResult>,
}

impl FitTable {
    pub fn new(rows: Vec<FitResult>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FitResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of chunks whose fit converged
    pub fn fitted_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_fitted()).count()
    }

    /// chunkCount × 4 array of (ΔU, B_s/B_m, χ², chunk index).
    pub fn to_array(&self) -> Array2<f64> {
        let mut array = Array2::from_elem((self.rows.len(), TABLE_COLUMNS), f64::NAN);
        for (mut out, fit) in array.rows_mut().into_iter().zip(&self.rows) {
            out[0] = fit.delta_u;
            out[1] = fit.bs_over_bm;
            out[2] = fit.chi2;
            out[3] = fit.chunk as f64;
        }
        array
    }

    /// Write the table as CSV with a `chunk,delta_u,bs_over_bm,chi2,status` header.
    pub fn write_csv(&self, path: &Path) -> csv::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for fit in &self.rows {
            let status = fit.status.to_string();
            writer.serialize(CsvRow {
                chunk: fit.chunk,
                delta_u: fit.delta_u,
                bs_over_bm: fit.bs_over_bm,
                chi2: fit.chi2,
                status: &status,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl FromIterator<FitResult> for FitTable {
    fn from_iter<I: IntoIterator<Item = FitResult>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
