//! Fitting configuration and the ER file column schema.
//!
//! Everything the pipeline needs to know about the instrument layout and the
//! optimizer lives here so a deployment can be described by one JSON file.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of look-direction channels on the Lunar Prospector ER.
pub const CHANNELS: usize = 16;

/// Rows per measurement chunk (one energy sweep).
pub const SWEEP_ROWS: usize = 15;

/// Floor applied to the incident reference flux before dividing by it.
pub const EPS: f64 = 1e-10;

/// Timestamp written by the ground system when the clock was not available.
pub const EPOCH_NULL: &str = "1970-01-01T00:00:00";

/// Field magnitudes at or below this are treated as missing magnetometer data.
pub const MIN_FIELD_MAGNITUDE: f64 = 1e-9;

/// Field magnitudes at or above this are treated as magnetometer glitches.
pub const MAX_FIELD_MAGNITUDE: f64 = 1e3;

/// Penalty returned by the objective for unusable model output.
pub const CHI2_PENALTY: f64 = 1e30;

/// Offset added inside the logarithms of the χ² objective.
pub const LOG_EPSILON: f64 = 1e-6;

/// Column positions of one whitespace-delimited ER data row.
///
/// Multi-column fields (magnetic field, azimuths, fluxes) are described by the
/// index of their first column; they occupy consecutive columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Number of instrument channels
    pub channels: usize,
    /// First of the three magnetic-field columns (Bx, By, Bz)
    pub mag_start: usize,
    /// First of `channels` azimuth columns, degrees
    pub phi_start: usize,
    /// First of `channels` electron flux columns
    pub flux_start: usize,
    /// Energy column, eV
    pub energy: usize,
    /// Sweep identifier column
    pub spec_no: usize,
    /// UTC timestamp column
    pub time: usize,
}

impl ColumnSchema {
    /// Default layout for `channels` channels:
    /// `Bx By Bz phi[0..n] flux[0..n] energy spec_no time`.
    pub fn with_channels(channels: usize) -> Self {
        let mag_start = 0;
        let phi_start = mag_start + 3;
        let flux_start = phi_start + channels;
        let energy = flux_start + channels;
        Self {
            channels,
            mag_start,
            phi_start,
            flux_start,
            energy,
            spec_no: energy + 1,
            time: energy + 2,
        }
    }

    /// Minimum number of fields a row must have to be parsed.
    pub fn min_columns(&self) -> usize {
        [
            self.mag_start + 3,
            self.phi_start + self.channels,
            self.flux_start + self.channels,
            self.energy + 1,
            self.spec_no + 1,
            self.time + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self::with_channels(CHANNELS)
    }
}

/// What `fit_all` does when the local refinement of one chunk fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing chunk and return its error
    #[default]
    Abort,
    /// Record the chunk as failed (NaN row) and keep going
    Isolate,
}

/// Inclusive search box for (ΔU, B_s/B_m).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    /// Surface potential range in volts
    pub delta_u: (f64, f64),
    /// Surface to spacecraft field ratio range
    pub bs_over_bm: (f64, f64),
}

impl ParameterBounds {
    pub fn lower(&self) -> [f64; 2] {
        [self.delta_u.0, self.bs_over_bm.0]
    }

    pub fn upper(&self) -> [f64; 2] {
        [self.delta_u.1, self.bs_over_bm.1]
    }

    /// True if `params` lies inside the box (edges included).
    pub fn contains(&self, params: &[f64]) -> bool {
        params.len() == 2
            && params
                .iter()
                .zip(self.lower().iter().zip(self.upper().iter()))
                .all(|(p, (lo, hi))| *p >= *lo && *p <= *hi)
    }
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            delta_u: (-1000.0, 1000.0),
            bs_over_bm: (0.1, 1.0),
        }
    }
}

/// Complete configuration of a fitting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Column layout of the ER data file
    pub schema: ColumnSchema,
    /// Rows per measurement chunk
    pub sweep_rows: usize,
    /// Floor for the incident reference flux
    pub eps: f64,
    /// Number of Latin hypercube points in the global scan
    pub lhs_samples: usize,
    /// Seed for the stratum permutation of the Latin hypercube
    pub lhs_seed: u64,
    /// Search box for the global scan and the local refinement
    pub bounds: ParameterBounds,
    /// Relative simplex size used to build the initial Nelder-Mead simplex
    pub simplex_step: f64,
    /// Largest parameter distance between simplex vertices at convergence
    pub xatol: f64,
    /// Largest cost difference between simplex vertices at convergence
    pub fatol: f64,
    /// Iteration cap of the local refinement
    pub max_iters: u64,
    /// Optional wall-clock budget per chunk fit, seconds
    pub max_fit_seconds: Option<f64>,
    /// Behavior on optimizer failure
    pub failure_policy: FailurePolicy,
    /// Fit chunks on the rayon thread pool
    pub parallel: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            schema: ColumnSchema::default(),
            sweep_rows: SWEEP_ROWS,
            eps: EPS,
            lhs_samples: 400,
            lhs_seed: 0,
            bounds: ParameterBounds::default(),
            simplex_step: 0.05,
            xatol: 1e-4,
            fatol: 1e-4,
            max_iters: 1000,
            max_fit_seconds: None,
            failure_policy: FailurePolicy::Abort,
            parallel: false,
        }
    }
}

impl FitConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            ConfigurationError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.schema.channels == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "schema.channels must be positive".to_string(),
            ));
        }
        if self.sweep_rows == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "sweep_rows must be positive".to_string(),
            ));
        }
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(ConfigurationError::InvalidConfig(format!(
                "eps must be a small positive number, got {}",
                self.eps
            )));
        }
        if self.lhs_samples == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "lhs_samples must be positive".to_string(),
            ));
        }
        let (lo, hi) = (self.bounds.lower(), self.bounds.upper());
        if lo.iter().zip(hi.iter()).any(|(l, h)| !(l < h)) {
            return Err(ConfigurationError::InvalidConfig(format!(
                "bounds must satisfy lower < upper, got {:?}",
                self.bounds
            )));
        }
        if !(self.simplex_step > 0.0) {
            return Err(ConfigurationError::InvalidConfig(
                "simplex_step must be positive".to_string(),
            ));
        }
        if !(self.xatol > 0.0) {
            return Err(ConfigurationError::InvalidConfig(format!(
                "xatol must be positive, got {}",
                self.xatol
            )));
        }
        if !(self.fatol > 0.0) {
            return Err(ConfigurationError::InvalidConfig(format!(
                "fatol must be positive, got {}",
                self.fatol
            )));
        }
        if self.max_iters == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "max_iters must be positive".to_string(),
            ));
        }
        if let Some(budget) = self.max_fit_seconds {
            if !(budget > 0.0) {
                return Err(ConfigurationError::InvalidConfig(format!(
                    "max_fit_seconds must be positive, got {budget}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_layout() {
        let schema = ColumnSchema::default();
        assert_eq!(schema.mag_start, 0);
        assert_eq!(schema.phi_start, 3);
        assert_eq!(schema.flux_start, 3 + CHANNELS);
        assert_eq!(schema.energy, 3 + 2 * CHANNELS);
        assert_eq!(schema.spec_no, schema.energy + 1);
        assert_eq!(schema.time, schema.energy + 2);
        assert_eq!(schema.min_columns(), 3 + 2 * CHANNELS + 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FitConfig =
            serde_json::from_str(r#"{"parallel": true, "failure_policy": "isolate"}"#).unwrap();
        assert!(config.parallel);
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert_eq!(config.sweep_rows, SWEEP_ROWS);
        assert_eq!(config.lhs_samples, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = FitConfig {
            bounds: ParameterBounds {
                delta_u: (10.0, -10.0),
                bs_over_bm: (0.1, 1.0),
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_tolerances() {
        for config in [
            FitConfig {
                xatol: 0.0,
                ..Default::default()
            },
            FitConfig {
                fatol: -1.0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigurationError::InvalidConfig(message)) if message.contains("atol")
            ));
        }
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = ParameterBounds::default();
        assert!(bounds.contains(&[0.0, 0.5]));
        assert!(bounds.contains(&[-1000.0, 1.0]));
        assert!(!bounds.contains(&[1000.1, 0.5]));
        assert!(!bounds.contains(&[0.0, 0.05]));
        assert!(!bounds.contains(&[f64::NAN, 0.5]));
    }
}
