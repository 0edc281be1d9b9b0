//! Common fixtures for losscone integration tests

#![allow(dead_code)]

use losscone::config::CHANNELS;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::path::PathBuf;
use tempfile::TempDir;
use test_helpers::{default_thetas, sweep, write_er_file, write_theta_file, ErRow};

/// |B| = 50 nT with components in and out of the spin plane
pub const FIELD_50NT: [f64; 3] = [30.0, 0.0, 40.0];

/// Smooth positive model: flux scales with exp(ΔU / 1000) and grows with
/// pitch angle at a rate set by B_s/B_m.
pub fn smooth_model(
    _energies: ArrayView1<'_, f64>,
    pitch: ArrayView2<'_, f64>,
    delta_u: f64,
    bs_over_bm: f64,
) -> Array2<f64> {
    let scale = (delta_u / 1000.0).exp();
    pitch.mapv(|angle| scale * (1.0 + bs_over_bm * angle / 180.0))
}

/// Files for a run on `rows` in a fresh temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub er_data: PathBuf,
    pub thetas: PathBuf,
}

impl Fixture {
    pub fn new(rows: &[ErRow], thetas: &[f64]) -> Self {
        let dir = test_helpers::temp_workspace().unwrap();
        let er_data = write_er_file(dir.path(), "er.txt", rows).unwrap();
        let thetas = write_theta_file(dir.path(), thetas).unwrap();
        Self {
            dir,
            er_data,
            thetas,
        }
    }

    /// `sweeps` consecutive 15-row sweeps numbered from 1, all valid.
    pub fn valid_sweeps(sweeps: i64) -> Self {
        let rows: Vec<ErRow> = (1..=sweeps)
            .flat_map(|spec_no| sweep(spec_no, 15, CHANNELS, FIELD_50NT))
            .collect();
        Self::new(&rows, &default_thetas(CHANNELS))
    }
}
