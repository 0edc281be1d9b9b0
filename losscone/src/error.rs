use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce a dataset from an ER data file.
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// The data file does not exist.
    #[error("ER data file {0} was not found")]
    NotFound(PathBuf),

    /// Reading the file failed.
    #[error("failed to read ER data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row has fewer fields than the column schema requires.
    #[error("line {line}: expected at least {expected} columns, found {found}")]
    MissingColumns {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A field could not be parsed as the type its column requires.
    #[error("line {line}, column {column}: cannot parse {value:?} as {expected}")]
    Parse {
        line: usize,
        column: usize,
        value: String,
        expected: &'static str,
    },
}

/// Invalid instrument geometry or run configuration.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// The channel geometry does not describe the dataset's channels.
    #[error("channel geometry has {found} polar angles but the instrument has {expected} channels")]
    ChannelMismatch { expected: usize, found: usize },

    /// The theta file could not be read.
    #[error("failed to read theta file {path}: {source}")]
    ThetaIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A theta file line is not a number.
    #[error("theta file line {line}: cannot parse {value:?} as degrees")]
    ThetaParse { line: usize, value: String },

    /// A configuration value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Local refinement of one chunk did not produce a converged optimum.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizationError {
    /// The optimizer itself returned an error.
    #[error("chunk {chunk}: optimisation failed: {message}")]
    Solver { chunk: usize, message: String },

    /// The optimizer stopped without meeting its tolerances.
    #[error("chunk {chunk}: optimisation did not converge: {reason}")]
    NotConverged { chunk: usize, reason: String },

    /// The per-chunk wall-clock budget ran out.
    #[error("chunk {chunk}: fit exceeded its {seconds:.3} s budget")]
    BudgetExceeded { chunk: usize, seconds: f64 },
}

impl OptimizationError {
    /// Index of the chunk whose fit failed.
    pub fn chunk(&self) -> usize {
        match self {
            OptimizationError::Solver { chunk, .. }
            | OptimizationError::NotConverged { chunk, .. }
            | OptimizationError::BudgetExceeded { chunk, .. } => *chunk,
        }
    }
}

/// Any failure of the file-to-table pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    DataLoad(#[from] DataLoadError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),
}
