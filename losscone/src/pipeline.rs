//! Files-to-table facade.
//!
//! [`FitPipeline`] owns everything that is derived once per run (the cleaned
//! dataset, the channel geometry and the pitch-angle table) and hands out the
//! borrowing stages on demand.

use crate::config::FitConfig;
use crate::dataset::{CleaningReport, SweepDataset};
use crate::error::{OptimizationError, PipelineError};
use crate::geometry::ChannelGeometry;
use crate::model::LossConeModel;
use crate::normalize::FluxNormalizer;
use crate::orchestrator::FitOrchestrator;
use crate::pitch_angle::PitchAngleTable;
use crate::solver::{FitResult, LossConeSolver};
use crate::table::FitTable;
use log::info;
use ndarray::{Array1, Array2};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FitPipeline {
    config: FitConfig,
    dataset: SweepDataset,
    geometry: ChannelGeometry,
    pitch_angles: PitchAngleTable,
    cleaning: CleaningReport,
}

impl FitPipeline {
    /// Load an ER data file and a theta file and derive the pitch angles.
    pub fn from_files(
        er_data: &Path,
        thetas: &Path,
        config: FitConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let geometry = ChannelGeometry::load(thetas)?;
        geometry.ensure_channels(config.schema.channels)?;
        let (dataset, cleaning) = SweepDataset::load_with_report(er_data, &config.schema)?;
        info!(
            "Loaded {} rows from {} ({} channels)",
            dataset.len(),
            er_data.display(),
            dataset.channels()
        );
        Self::from_parts(dataset, geometry, config, cleaning)
    }

    /// Build from an already cleaned dataset.
    pub fn from_parts(
        dataset: SweepDataset,
        geometry: ChannelGeometry,
        config: FitConfig,
        cleaning: CleaningReport,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let pitch_angles = PitchAngleTable::compute(&dataset, &geometry)?;
        Ok(Self {
            config,
            dataset,
            geometry,
            pitch_angles,
            cleaning,
        })
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn dataset(&self) -> &SweepDataset {
        &self.dataset
    }

    pub fn geometry(&self) -> &ChannelGeometry {
        &self.geometry
    }

    pub fn pitch_angles(&self) -> &PitchAngleTable {
        &self.pitch_angles
    }

    pub fn cleaning_report(&self) -> &CleaningReport {
        &self.cleaning
    }

    pub fn normalizer(&self) -> FluxNormalizer<'_> {
        FluxNormalizer::new(
            &self.dataset,
            &self.pitch_angles,
            self.config.sweep_rows,
            self.config.eps,
        )
    }

    pub fn solver<'p, M: LossConeModel>(&'p self, model: &'p M) -> LossConeSolver<'p, M> {
        LossConeSolver::new(&self.dataset, &self.pitch_angles, model, &self.config)
    }

    pub fn normalized_flux(&self, energy_bin: usize, chunk: usize) -> Array1<f64> {
        self.normalizer().normalized_flux(energy_bin, chunk)
    }

    pub fn chunk_matrix(&self, chunk: usize) -> Array2<f64> {
        self.normalizer().chunk_matrix(chunk)
    }

    /// Fit one chunk. Builds a fresh Latin hypercube; use [`FitPipeline::solver`]
    /// when fitting many chunks one at a time.
    pub fn fit_chunk<M: LossConeModel>(
        &self,
        model: &M,
        chunk: usize,
    ) -> Result<FitResult, OptimizationError> {
        self.solver(model).fit_chunk(chunk)
    }

    pub fn fit_all<M: LossConeModel + Sync>(&self, model: &M) -> Result<FitTable, OptimizationError> {
        FitOrchestrator::new(&self.solver(model)).fit_all()
    }
}
