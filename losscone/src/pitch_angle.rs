//! Pitch angle of every (row, channel) look direction.
//!
//! Look directions come from the per-row azimuth and the fixed per-channel
//! polar angle. The direction vector points toward the sensor, so the pitch
//! angle is taken against the negated dot product with the field direction.

use crate::config::MIN_FIELD_MAGNITUDE;
use crate::dataset::SweepDataset;
use crate::error::ConfigurationError;
use crate::geometry::ChannelGeometry;
use log::warn;
use nalgebra::Vector3;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

/// Unit look direction for an azimuth and polar angle given in degrees.
pub fn look_direction(azimuth_deg: f64, polar_deg: f64) -> Vector3<f64> {
    let (phi, theta) = (azimuth_deg.to_radians(), polar_deg.to_radians());
    Vector3::new(phi.cos() * theta.cos(), phi.sin() * theta.cos(), theta.sin())
}

/// Pitch angle in degrees between a unit field vector and a look direction.
///
/// The cosine is clipped to [-1, 1] so rounding on near-parallel vectors
/// cannot push `acos` out of its domain.
pub fn pitch_angle_deg(unit_field: &Vector3<f64>, direction: &Vector3<f64>) -> f64 {
    (-unit_field.dot(direction)).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Pitch angles (rows × channels) with a per-row validity mask.
///
/// Rows whose field vector cannot be normalized are kept, flagged invalid and
/// filled with NaN. Sweep cleaning should leave no such rows; the guard stays
/// so a schema or ordering change upstream shows up as NaN instead of as a
/// silently wrong angle.
#[derive(Debug, Clone)]
pub struct PitchAngleTable {
    angles: Array2<f64>,
    valid: Array1<bool>,
}

impl PitchAngleTable {
    pub fn compute(
        dataset: &SweepDataset,
        geometry: &ChannelGeometry,
    ) -> Result<Self, ConfigurationError> {
        let channels = dataset.channels();
        geometry.ensure_channels(channels)?;

        let rows = dataset.len();
        let field = dataset.magnetic_field();
        let azimuths = dataset.azimuths();
        let thetas = geometry.thetas_deg();

        let mut angles = Array2::from_elem((rows, channels), f64::NAN);
        let mut valid = Array1::from_elem(rows, false);

        for row in 0..rows {
            let b = Vector3::new(field[[row, 0]], field[[row, 1]], field[[row, 2]]);
            let magnitude = b.norm();
            if !(magnitude.is_finite() && magnitude > MIN_FIELD_MAGNITUDE) {
                warn!("Row {row} has unusable magnetic field |B| = {magnitude:e}; pitch angles set to NaN");
                continue;
            }
            let unit_field = b / magnitude;

            for channel in 0..channels {
                let direction = look_direction(azimuths[[row, channel]], thetas[channel]);
                angles[[row, channel]] = pitch_angle_deg(&unit_field, &direction);
            }
            valid[row] = true;
        }

        Ok(Self { angles, valid })
    }

    /// Pitch angles in degrees, rows × channels
    pub fn angles(&self) -> ArrayView2<'_, f64> {
        self.angles.view()
    }

    /// Pitch angles of rows `start..end`
    pub fn rows(&self, start: usize, end: usize) -> ArrayView2<'_, f64> {
        self.angles.slice(s![start..end, ..])
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.angles.row(row)
    }

    pub fn valid_mask(&self) -> ArrayView1<'_, bool> {
        self.valid.view()
    }

    pub fn is_valid(&self, row: usize) -> bool {
        self.valid.get(row).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}
