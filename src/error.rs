use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid genome accession: {0}")]
    InvalidGenomeAccession(String),

    #[error("input not found: {0}")]
    #[diagnostic(help("check the path given on the command line"))]
    InputNotFound(PathBuf),

    #[error("no {pattern} inputs found in {dir}")]
    NoInputs { dir: String, pattern: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install the tool or point the config file at its location"))]
    ToolUnavailable(String),

    #[error("{0}")]
    ItemFailure(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("{stage} halted at {genome}: {reason}")]
    BatchHalted {
        stage: String,
        genome: String,
        reason: String,
    },

    #[error("{stage} cancelled")]
    Cancelled { stage: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum IdentityError {
    #[error("genome identifier derived from {source_name} is empty")]
    Empty { source_name: String },

    #[error("genome identifier {id} derived from {source_name} still carries a known suffix")]
    Ambiguous { id: String, source_name: String },

    #[error("genome identifier {id} contains characters unsafe for a path")]
    UnsafeCharacters { id: String },

    #[error("genome identifier {id} from {source_name} collides with {existing}")]
    Collision {
        id: String,
        source_name: String,
        existing: String,
    },
}

impl PipelineError {
    pub fn fs(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        PipelineError::Filesystem(format!("{context}: {err}"))
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::InputNotFound(_)
            | PipelineError::NoInputs { .. }
            | PipelineError::InvalidGenomeAccession(_)
            | PipelineError::ConfigRead(_)
            | PipelineError::ConfigParse(_) => 2,
            PipelineError::ToolUnavailable(_) => 3,
            PipelineError::BatchHalted { .. } => 4,
            PipelineError::Cancelled { .. } => 130,
            _ => 1,
        }
    }
}
