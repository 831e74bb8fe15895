use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("invalid run accession: {0:?}")]
    InvalidRunAccession(String),

    #[error("ENA request failed: {0}")]
    MetadataHttp(String),

    #[error("ENA returned status {status}: {message}")]
    MetadataStatus { status: u16, message: String },

    #[error("failed to parse ENA run metadata: {0}")]
    MetadataParse(String),

    #[error("download of {url} failed: {message}")]
    TransferHttp { url: String, message: String },

    #[error("download of {url} returned status {status}")]
    TransferStatus { url: String, status: u16 },

    #[error("unexpected number of FASTQ files for run {run}: {count} (expected 1 or 2)")]
    #[diagnostic(help(
        "set \"strict_file_count\": false in ena-quant.json to skip such runs instead"
    ))]
    UnexpectedFileCount { run: String, count: usize },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to start quantification for run {run}: {message}")]
    QuantificationInvocation { run: String, message: String },

    #[error("quantification failed for run {run}: {message}")]
    QuantificationFailed { run: String, message: String },

    #[error("could not load quantification table {path}: {message}")]
    LoadError { path: PathBuf, message: String },

    #[error("no sample alias found for run {0}")]
    AliasUnresolved(String),

    #[error("no sample produced a loadable quantification table for project {0}")]
    EmptyAggregation(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("staging directory {staging} overlaps the output directory {output}")]
    #[diagnostic(help(
        "point \"staging_dir\" in ena-quant.json outside <root>/<project>, or use another root"
    ))]
    StagingOverlap { staging: String, output: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PipelineError {
    /// Errors that cost one sample its result but never stop the batch.
    pub fn is_sample_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidRunAccession(_)
                | PipelineError::TransferHttp { .. }
                | PipelineError::TransferStatus { .. }
                | PipelineError::QuantificationInvocation { .. }
                | PipelineError::QuantificationFailed { .. }
                | PipelineError::LoadError { .. }
                | PipelineError::AliasUnresolved(_)
                | PipelineError::Filesystem(_)
        )
    }
}
