//! Fits every complete chunk of a dataset.

use crate::config::FailurePolicy;
use crate::error::OptimizationError;
use crate::model::LossConeModel;
use crate::solver::{FitResult, LossConeSolver};
use crate::table::FitTable;
use log::{info, warn};
use rayon::prelude::*;
use std::time::Instant;

/// Runs a [`LossConeSolver`] over all chunks and collects the result table.
pub struct FitOrchestrator<'s, 'a, M> {
    solver: &'s LossConeSolver<'a, M>,
}

impl<'s, 'a, M: LossConeModel + Sync> FitOrchestrator<'s, 'a, M> {
    pub fn new(solver: &'s LossConeSolver<'a, M>) -> Self {
        Self { solver }
    }

    /// Number of complete chunks; a trailing partial chunk is not fit.
    pub fn chunk_count(&self) -> usize {
        self.solver.dataset().len() / self.solver.config().sweep_rows
    }

    /// Fit every complete chunk, in chunk order.
    ///
    /// Under [`FailurePolicy::Abort`] the first optimizer failure is returned.
    /// Under [`FailurePolicy::Isolate`] it is logged and recorded as a failed
    /// NaN row. Parallel runs return exactly what a sequential run returns.
    pub fn fit_all(&self) -> Result<FitTable, OptimizationError> {
        let config = self.solver.config();
        let chunks = self.chunk_count();
        let started = Instant::now();

        let fit = |chunk: usize| self.fit_one(chunk, config.failure_policy);
        let rows = if config.parallel {
            (0..chunks)
                .into_par_iter()
                .map(fit)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            (0..chunks).map(fit).collect::<Result<Vec<_>, _>>()?
        };
        let table = FitTable::new(rows);

        let no_data = table.rows().iter().filter(|r| r.is_no_data()).count();
        info!(
            "Fitted {} of {} chunks ({} without data, {} failed) in {:.2} s",
            table.fitted_count(),
            chunks,
            no_data,
            chunks - table.fitted_count() - no_data,
            started.elapsed().as_secs_f64()
        );
        Ok(table)
    }

    fn fit_one(&self, chunk: usize, policy: FailurePolicy) -> Result<FitResult, OptimizationError> {
        match (self.solver.fit_chunk(chunk), policy) {
            (Err(e), FailurePolicy::Isolate) => {
                warn!("{e}; recording chunk {chunk} as failed");
                Ok(FitResult::failed(chunk, e.to_string()))
            }
            (result, _) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitConfig;
    use crate::dataset::{SweepDataset, SweepRecord};
    use crate::geometry::ChannelGeometry;
    use crate::pitch_angle::PitchAngleTable;
    use crate::solver::FitStatus;
    use ndarray::{Array2, ArrayView1, ArrayView2};

    fn flat(_: ArrayView1<'_, f64>, p: ArrayView2<'_, f64>, du: f64, ratio: f64) -> Array2<f64> {
        let offset = (du / 1000.0).powi(2) + (ratio - 0.4).powi(2);
        Array2::from_elem(p.dim(), offset.exp())
    }

    fn dataset(rows: usize) -> (SweepDataset, PitchAngleTable) {
        let records = (0..rows)
            .map(|i| SweepRecord {
                spec_no: (i / 2) as i64,
                time: "1998-01-16T00:00:00".to_string(),
                magnetic_field: [0.0, 0.0, 40.0],
                azimuths: vec![0.0, 0.0],
                flux: vec![5.0, 2.0],
                energy: 30.0,
            })
            .collect();
        let dataset = SweepDataset::from_records(records, 2).unwrap();
        let geometry = ChannelGeometry::from_degrees(vec![-45.0, 45.0]);
        let table = PitchAngleTable::compute(&dataset, &geometry).unwrap();
        (dataset, table)
    }

    #[test]
    fn test_trailing_partial_chunk_dropped() {
        let (data, pitch) = dataset(5);
        let config = FitConfig {
            sweep_rows: 2,
            lhs_samples: 20,
            ..Default::default()
        };
        let solver = LossConeSolver::new(&data, &pitch, &flat, &config);
        let orchestrator = FitOrchestrator::new(&solver);
        assert_eq!(orchestrator.chunk_count(), 2);

        let table = orchestrator.fit_all().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].chunk, 0);
        assert_eq!(table.rows()[1].chunk, 1);
    }

    #[test]
    fn test_abort_and_isolate_policies() {
        let (data, pitch) = dataset(4);
        let abort = FitConfig {
            sweep_rows: 2,
            lhs_samples: 20,
            max_iters: 1,
            fatol: 1e-300,
            ..Default::default()
        };
        let solver = LossConeSolver::new(&data, &pitch, &flat, &abort);
        let err = FitOrchestrator::new(&solver).fit_all().unwrap_err();
        assert_eq!(err.chunk(), 0);

        let isolate = FitConfig {
            failure_policy: FailurePolicy::Isolate,
            ..abort.clone()
        };
        let solver = LossConeSolver::new(&data, &pitch, &flat, &isolate);
        let table = FitOrchestrator::new(&solver).fit_all().unwrap();
        assert_eq!(table.len(), 2);
        for row in table.rows() {
            assert!(matches!(row.status, FitStatus::Failed(_)));
            assert!(row.delta_u.is_nan());
        }
    }
}
