//! Per-chunk inversion of the loss-cone model.
//!
//! Each chunk is fit in two stages. A Latin hypercube scan over the whole
//! parameter box picks the starting point, then a Nelder-Mead simplex refines
//! it. The scan is what keeps the simplex out of the shallow local minima the
//! loss-cone model produces near the box edges.

use crate::config::{FitConfig, ParameterBounds, CHI2_PENALTY, LOG_EPSILON};
use crate::dataset::SweepDataset;
use crate::error::OptimizationError;
use crate::model::LossConeModel;
use crate::normalize::FluxNormalizer;
use crate::pitch_angle::PitchAngleTable;
use crate::sampling::LatinHypercube;
use crate::simplex::SimplexSearch;
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus,
};
use log::debug;
use ndarray::{s, ArrayView1, ArrayView2};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Step used for a zero coordinate when building the initial simplex.
const ZERO_COORDINATE_STEP: f64 = 0.00025;

/// How a chunk's fit ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FitStatus {
    /// Both stages ran and the simplex converged
    Fitted,
    /// The chunk had no usable normalized flux
    NoData,
    /// The local refinement failed and the failure was isolated
    Failed(String),
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStatus::Fitted => write!(f, "fitted"),
            FitStatus::NoData => write!(f, "no_data"),
            FitStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Best-fit parameters of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub chunk: usize,
    /// Surface potential, volts
    pub delta_u: f64,
    /// Surface to spacecraft magnetic field ratio
    pub bs_over_bm: f64,
    /// Objective at the optimum
    pub chi2: f64,
    pub status: FitStatus,
}

impl FitResult {
    /// NaN triple for a chunk with nothing to fit.
    pub fn no_data(chunk: usize) -> Self {
        Self {
            chunk,
            delta_u: f64::NAN,
            bs_over_bm: f64::NAN,
            chi2: f64::NAN,
            status: FitStatus::NoData,
        }
    }

    /// NaN triple for a chunk whose refinement failed.
    pub fn failed(chunk: usize, reason: impl Into<String>) -> Self {
        Self {
            status: FitStatus::Failed(reason.into()),
            ..Self::no_data(chunk)
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.status == FitStatus::NoData
    }

    pub fn is_fitted(&self) -> bool {
        self.status == FitStatus::Fitted
    }
}

#[derive(Error, Debug)]
#[error("wall-clock budget exhausted")]
struct BudgetExhausted;

/// Log-space least-squares distance between observed and modeled flux.
struct ChiSquared<'a, M> {
    observed: ArrayView2<'a, f64>,
    energies: ArrayView1<'a, f64>,
    pitch_angles: ArrayView2<'a, f64>,
    model: &'a M,
    bounds: ParameterBounds,
    deadline: Option<Instant>,
}

impl<M: LossConeModel> ChiSquared<'_, M> {
    fn evaluate(&self, params: &[f64]) -> f64 {
        if !self.bounds.contains(params) {
            return CHI2_PENALTY;
        }
        let predicted = self
            .model
            .synth(self.energies, self.pitch_angles, params[0], params[1]);
        if predicted.dim() != self.observed.dim()
            || predicted.iter().any(|p| !p.is_finite())
            || predicted.iter().all(|&p| p <= 0.0)
        {
            return CHI2_PENALTY;
        }

        let chi2: f64 = self
            .observed
            .iter()
            .zip(predicted.iter())
            .filter(|(obs, _)| !obs.is_nan())
            .map(|(obs, pred)| {
                let diff = (obs + LOG_EPSILON).ln() - (pred + LOG_EPSILON).ln();
                diff * diff
            })
            .sum();

        if chi2.is_finite() {
            chi2
        } else {
            CHI2_PENALTY
        }
    }

    fn out_of_time(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl<M: LossConeModel> CostFunction for ChiSquared<'_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, ArgminError> {
        if self.out_of_time() {
            return Err(BudgetExhausted.into());
        }
        Ok(self.evaluate(params))
    }
}

/// Initial simplex around `x0`: `x0` plus one vertex per coordinate, that
/// coordinate moved by `step` of its magnitude toward the inside of the box.
fn initial_simplex(x0: &[f64], step: f64, bounds: &ParameterBounds) -> Vec<Vec<f64>> {
    let (lower, upper) = (bounds.lower(), bounds.upper());
    let mut simplex = vec![x0.to_vec()];
    for dim in 0..x0.len() {
        let delta = if x0[dim] == 0.0 {
            ZERO_COORDINATE_STEP
        } else {
            step * x0[dim].abs()
        };
        let mut vertex = x0.to_vec();
        vertex[dim] = if x0[dim] + delta <= upper[dim] {
            x0[dim] + delta
        } else {
            (x0[dim] - delta).max(lower[dim])
        };
        simplex.push(vertex);
    }
    simplex
}

/// Two-stage fitter for the chunks of one dataset.
///
/// The Latin hypercube is generated once and shared by every chunk, so a
/// solver is cheap to call repeatedly and safe to share across threads.
pub struct LossConeSolver<'a, M> {
    dataset: &'a SweepDataset,
    pitch_angles: &'a PitchAngleTable,
    normalizer: FluxNormalizer<'a>,
    model: &'a M,
    config: &'a FitConfig,
    sample: LatinHypercube,
}

impl<'a, M: LossConeModel> LossConeSolver<'a, M> {
    pub fn new(
        dataset: &'a SweepDataset,
        pitch_angles: &'a PitchAngleTable,
        model: &'a M,
        config: &'a FitConfig,
    ) -> Self {
        let sample = LatinHypercube::centered(
            config.lhs_samples,
            &config.bounds.lower(),
            &config.bounds.upper(),
            config.lhs_seed,
        );
        Self {
            dataset,
            pitch_angles,
            normalizer: FluxNormalizer::new(dataset, pitch_angles, config.sweep_rows, config.eps),
            model,
            config,
            sample,
        }
    }

    pub fn normalizer(&self) -> &FluxNormalizer<'a> {
        &self.normalizer
    }

    pub fn sample(&self) -> &LatinHypercube {
        &self.sample
    }

    pub fn dataset(&self) -> &'a SweepDataset {
        self.dataset
    }

    pub fn config(&self) -> &'a FitConfig {
        self.config
    }

    /// Fit ΔU and B_s/B_m for one chunk.
    ///
    /// Chunks past the end of the data or without any finite normalized flux
    /// give a NaN result with [`FitStatus::NoData`]. A simplex that stops
    /// without converging is an error, not a NaN result.
    ///
    /// The simplex converges once its vertices agree within `xatol` in every
    /// parameter and `fatol` in cost. On a piecewise constant model such as
    /// [`crate::model::SharpLossCone`] the scan's start point often already
    /// sits on the best plateau, so the simplex shrinks onto it and the
    /// result is that sample point.
    pub fn fit_chunk(&self, chunk: usize) -> Result<FitResult, OptimizationError> {
        let started = Instant::now();
        let sweep_rows = self.config.sweep_rows;
        let rows = self.dataset.len().min(self.pitch_angles.len());

        let start = match chunk.checked_mul(sweep_rows) {
            Some(start) if start < rows => start,
            _ => {
                debug!("Chunk {chunk} starts past the end of the data");
                return Ok(FitResult::no_data(chunk));
            }
        };
        let end = start.saturating_add(sweep_rows).min(rows);

        let matrix = self.normalizer.chunk_matrix(chunk);
        let observed = matrix.slice(s![..end - start, ..]);
        if observed.iter().all(|v| v.is_nan()) {
            debug!("Chunk {chunk} has no usable normalized flux");
            return Ok(FitResult::no_data(chunk));
        }

        let objective = ChiSquared {
            observed,
            energies: self.dataset.energy_slice(start, end),
            pitch_angles: self.pitch_angles.rows(start, end),
            model: self.model,
            bounds: self.config.bounds,
            deadline: self
                .config
                .max_fit_seconds
                .map(|seconds| started + Duration::from_secs_f64(seconds)),
        };

        let x0 = self.global_scan(&objective);
        if objective.out_of_time() {
            return Err(self.budget_exceeded(chunk));
        }

        let simplex = initial_simplex(&x0, self.config.simplex_step, &self.config.bounds);
        let solver = SimplexSearch::new(simplex, self.config.xatol, self.config.fatol);

        let result = Executor::new(objective, solver)
            .configure(|state| state.max_iters(self.config.max_iters))
            .run()
            .map_err(|e| {
                if e.downcast_ref::<BudgetExhausted>().is_some() {
                    self.budget_exceeded(chunk)
                } else {
                    OptimizationError::Solver {
                        chunk,
                        message: e.to_string(),
                    }
                }
            })?;

        let state = result.state();
        let status = state.get_termination_status();
        if !matches!(
            status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        ) {
            return Err(OptimizationError::NotConverged {
                chunk,
                reason: format!("{status:?} after {} iterations", state.get_iter()),
            });
        }
        let best = state
            .get_best_param()
            .ok_or_else(|| OptimizationError::Solver {
                chunk,
                message: "solver returned no parameters".to_string(),
            })?;

        let fit = FitResult {
            chunk,
            delta_u: best[0],
            bs_over_bm: best[1],
            chi2: state.get_best_cost(),
            status: FitStatus::Fitted,
        };
        debug!(
            "Chunk {chunk}: dU = {:.3} V, Bs/Bm = {:.4}, chi2 = {:.4e} ({} iterations, {:.1} ms)",
            fit.delta_u,
            fit.bs_over_bm,
            fit.chi2,
            state.get_iter(),
            started.elapsed().as_secs_f64() * 1e3
        );
        Ok(fit)
    }

    /// Sample point with the lowest objective; the first one wins ties.
    fn global_scan(&self, objective: &ChiSquared<'_, M>) -> Vec<f64> {
        let mut best_index = 0;
        let mut best_cost = f64::INFINITY;
        for (index, point) in self.sample.points().rows().into_iter().enumerate() {
            let cost = objective.evaluate(&point.to_vec());
            if cost < best_cost {
                best_cost = cost;
                best_index = index;
            }
        }
        self.sample.point(best_index).to_vec()
    }

    fn budget_exceeded(&self, chunk: usize) -> OptimizationError {
        OptimizationError::BudgetExceeded {
            chunk,
            seconds: self.config.max_fit_seconds.unwrap_or(0.0),
        }
    }
}
