//! Flux normalization against the incident (pitch angle < 90°) channels.

use crate::dataset::SweepDataset;
use crate::pitch_angle::PitchAngleTable;
use ndarray::{Array1, Array2};

/// Pitch angle separating incident from reflected channels, degrees.
pub const INCIDENT_LIMIT_DEG: f64 = 90.0;

/// Normalizes channel flux of one row by the mean incident flux of that row.
///
/// Reflected channels are divided by the same incident reference as the
/// incident ones; they are not normalized against a reflected reference.
#[derive(Debug, Clone, Copy)]
pub struct FluxNormalizer<'a> {
    dataset: &'a SweepDataset,
    pitch_angles: &'a PitchAngleTable,
    sweep_rows: usize,
    eps: f64,
}

impl<'a> FluxNormalizer<'a> {
    pub fn new(
        dataset: &'a SweepDataset,
        pitch_angles: &'a PitchAngleTable,
        sweep_rows: usize,
        eps: f64,
    ) -> Self {
        Self {
            dataset,
            pitch_angles,
            sweep_rows,
            eps,
        }
    }

    pub fn sweep_rows(&self) -> usize {
        self.sweep_rows
    }

    fn nan_row(&self) -> Array1<f64> {
        Array1::from_elem(self.dataset.channels(), f64::NAN)
    }

    /// Normalized flux of energy bin `energy_bin` in chunk `chunk`.
    ///
    /// Returns all-NaN when the row does not exist, is flagged invalid, or has
    /// no incident channel.
    pub fn normalized_flux(&self, energy_bin: usize, chunk: usize) -> Array1<f64> {
        let index = match chunk
            .checked_mul(self.sweep_rows)
            .and_then(|start| start.checked_add(energy_bin))
        {
            Some(index) if index < self.dataset.len() && index < self.pitch_angles.len() => index,
            _ => return self.nan_row(),
        };
        if !self.pitch_angles.is_valid(index) {
            return self.nan_row();
        }

        let flux = self.dataset.flux_row(index);
        let angles = self.pitch_angles.row(index);

        let (sum, count) = flux
            .iter()
            .zip(angles.iter())
            .filter(|&(_, &angle)| angle < INCIDENT_LIMIT_DEG)
            .fold((0.0, 0usize), |(sum, count), (&f, _)| (sum + f, count + 1));
        if count == 0 {
            return self.nan_row();
        }

        // f64::max ignores a NaN mean; keep NaN so bad flux is not hidden.
        let mean = sum / count as f64;
        let reference = if mean.is_nan() { mean } else { mean.max(self.eps) };
        flux.mapv(|f| f / reference)
    }

    /// Stack of `normalized_flux` over all energy bins of a chunk
    /// (`sweep_rows` × channels).
    pub fn chunk_matrix(&self, chunk: usize) -> Array2<f64> {
        let channels = self.dataset.channels();
        let mut matrix = Array2::from_elem((self.sweep_rows, channels), f64::NAN);
        for (energy_bin, mut row) in matrix.rows_mut().into_iter().enumerate() {
            row.assign(&self.normalized_flux(energy_bin, chunk));
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SweepRecord;
    use crate::geometry::ChannelGeometry;
    use approx::assert_relative_eq;

    // Field along +z; channel polar angles -45 (incident) and +45 (reflected).
    fn fixture(fluxes: &[[f64; 2]], thetas: [f64; 2]) -> (SweepDataset, PitchAngleTable) {
        let records = fluxes
            .iter()
            .map(|flux| SweepRecord {
                spec_no: 1,
                time: "1998-01-16T00:00:00".to_string(),
                magnetic_field: [0.0, 0.0, 20.0],
                azimuths: vec![0.0, 0.0],
                flux: flux.to_vec(),
                energy: 50.0,
            })
            .collect();
        let dataset = SweepDataset::from_records(records, 2).unwrap();
        let geometry = ChannelGeometry::from_degrees(thetas.to_vec());
        let table = PitchAngleTable::compute(&dataset, &geometry).unwrap();
        (dataset, table)
    }

    #[test]
    fn test_reflected_divided_by_incident_reference() {
        let (dataset, table) = fixture(&[[200.0, 50.0]], [-45.0, 45.0]);
        let normalizer = FluxNormalizer::new(&dataset, &table, 1, 1e-10);

        let flux = normalizer.normalized_flux(0, 0);
        assert_relative_eq!(flux[0], 1.0);
        assert_relative_eq!(flux[1], 0.25);
    }

    #[test]
    fn test_out_of_range_row_is_nan() {
        let (dataset, table) = fixture(&[[1.0, 1.0], [1.0, 1.0]], [-45.0, 45.0]);
        let normalizer = FluxNormalizer::new(&dataset, &table, 2, 1e-10);

        let flux = normalizer.normalized_flux(0, 1);
        assert_eq!(flux.len(), 2);
        assert!(flux.iter().all(|f| f.is_nan()));
        assert!(normalizer.normalized_flux(5, 0).iter().all(|f| f.is_nan()));
    }

    #[test]
    fn test_huge_chunk_index_is_nan() {
        let (dataset, table) = fixture(&[[1.0, 1.0], [1.0, 1.0]], [-45.0, 45.0]);
        let normalizer = FluxNormalizer::new(&dataset, &table, 15, 1e-10);

        assert!(normalizer
            .normalized_flux(0, usize::MAX / 2)
            .iter()
            .all(|f| f.is_nan()));
        assert!(normalizer
            .normalized_flux(usize::MAX, 0)
            .iter()
            .all(|f| f.is_nan()));
        let matrix = normalizer.chunk_matrix(usize::MAX);
        assert_eq!(matrix.dim(), (15, 2));
        assert!(matrix.iter().all(|f| f.is_nan()));
    }

    #[test]
    fn test_no_incident_channel_is_nan() {
        let (dataset, table) = fixture(&[[3.0, 4.0]], [45.0, 60.0]);
        let normalizer = FluxNormalizer::new(&dataset, &table, 1, 1e-10);
        assert!(normalizer.normalized_flux(0, 0).iter().all(|f| f.is_nan()));
    }

    #[test]
    fn test_reference_never_below_eps() {
        let (dataset, table) = fixture(&[[0.0, 3.0]], [-45.0, 45.0]);
        let normalizer = FluxNormalizer::new(&dataset, &table, 1, 0.5);

        let flux = normalizer.normalized_flux(0, 0);
        assert_relative_eq!(flux[0], 0.0);
        assert_relative_eq!(flux[1], 6.0);
    }

    #[test]
    fn test_chunk_matrix_pads_short_chunk_with_nan() {
        let (dataset, table) = fixture(&[[2.0, 1.0], [4.0, 1.0], [8.0, 1.0]], [-45.0, 45.0]);
        let normalizer = FluxNormalizer::new(&dataset, &table, 2, 1e-10);

        let first = normalizer.chunk_matrix(0);
        assert_eq!(first.dim(), (2, 2));
        assert_relative_eq!(first[[1, 1]], 0.25);

        let second = normalizer.chunk_matrix(1);
        assert_relative_eq!(second[[0, 1]], 0.125);
        assert!(second.row(1).iter().all(|f| f.is_nan()));
    }
}
