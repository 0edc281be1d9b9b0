//! Lunar surface potential from electron reflectometer loss cones.
//!
//! The crate turns ER telemetry into per-sweep estimates of the lunar surface
//! potential ΔU and the surface to spacecraft field ratio B_s/B_m:
//!
//! 1. [`SweepDataset`] loads the telemetry and drops every sweep that contains
//!    a corrupt field sample or a null timestamp.
//! 2. [`PitchAngleTable`] combines the per-channel look directions with the
//!    measured field to get the pitch angle of every (row, channel).
//! 3. [`FluxNormalizer`] divides each row's flux by its mean incident flux.
//! 4. [`LossConeSolver`] fits a [`LossConeModel`] to one chunk with a Latin
//!    hypercube scan followed by a Nelder-Mead refinement.
//! 5. [`FitOrchestrator`] fits every chunk and collects a [`FitTable`].
//!
//! [`FitPipeline`] wires all of this together from a data file and a theta file.

pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod pitch_angle;
pub mod sampling;
pub mod simplex;
pub mod solver;
pub mod table;

pub use config::{ColumnSchema, FailurePolicy, FitConfig, ParameterBounds};
pub use dataset::{CleaningReport, SweepDataset, SweepRecord};
pub use error::{ConfigurationError, DataLoadError, OptimizationError, PipelineError};
pub use geometry::ChannelGeometry;
pub use model::{LossConeModel, SharpLossCone};
pub use normalize::FluxNormalizer;
pub use orchestrator::FitOrchestrator;
pub use pipeline::FitPipeline;
pub use pitch_angle::PitchAngleTable;
pub use sampling::LatinHypercube;
pub use solver::{FitResult, FitStatus, LossConeSolver};
pub use table::FitTable;
