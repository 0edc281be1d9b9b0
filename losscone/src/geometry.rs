//! Fixed per-channel polar angles of the instrument.

use crate::error::ConfigurationError;
use ndarray::{Array1, ArrayView1};
use std::path::Path;

/// Polar angle of each instrument channel, degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGeometry {
    thetas_deg: Array1<f64>,
}

impl ChannelGeometry {
    pub fn from_degrees(thetas_deg: Vec<f64>) -> Self {
        Self {
            thetas_deg: Array1::from(thetas_deg),
        }
    }

    /// Read a theta file: one angle in degrees per line, blank lines ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::ThetaIo {
            path: path.to_path_buf(),
            source,
        })?;

        let thetas = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                line.trim()
                    .parse::<f64>()
                    .map_err(|_| ConfigurationError::ThetaParse {
                        line: index + 1,
                        value: line.trim().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_degrees(thetas))
    }

    pub fn len(&self) -> usize {
        self.thetas_deg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thetas_deg.is_empty()
    }

    pub fn thetas_deg(&self) -> ArrayView1<'_, f64> {
        self.thetas_deg.view()
    }

    /// Fail unless the geometry describes exactly `channels` channels.
    pub fn ensure_channels(&self, channels: usize) -> Result<(), ConfigurationError> {
        if self.len() == channels {
            Ok(())
        } else {
            Err(ConfigurationError::ChannelMismatch {
                expected: channels,
                found: self.len(),
            })
        }
    }
}
