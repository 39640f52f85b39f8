use crate::types::{rpc::RpcError, AssetId, ErrorDetail, JobId, JobState};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the remote collaborators themselves (transport, encoding,
/// service side errors).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("rpc call {method} failed: {reason}")]
    Rpc { method: &'static str, reason: String },

    #[error("rpc call {method} rejected: {source}")]
    Remote {
        method: &'static str,
        #[source]
        source: RpcError,
    },

    #[error("rpc params encoding: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("file {0} has no transfer url")]
    MissingTransferUrl(String),

    #[error("transfer of {file} failed: {reason}")]
    Transfer { file: String, reason: String },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Transport level failures that may go away on the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Rpc { .. } | ServiceError::Transfer { .. } | ServiceError::Io(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Unknown media processor: {0}")]
    UnknownProcessor(String),

    #[error("failed to read configuration file {path:?}: {source}")]
    ConfigurationRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset not found: {0}")]
    AssetNotFound(AssetId),

    #[error("upload of {file:?} failed: {reason}")]
    UploadFailed { file: PathBuf, reason: String },

    #[error("download of {file} failed: {reason}")]
    DownloadFailed { file: String, reason: String },

    #[error("job {job} ended in state {state}{}", format_detail(.detail))]
    JobFailed {
        job: JobId,
        state: JobState,
        detail: Option<ErrorDetail>,
    },

    #[error("job {0} finished without an output asset")]
    MissingOutput(JobId),

    #[error("status of job {job} could not be fetched: {source}")]
    StatusUnavailable {
        job: JobId,
        #[source]
        source: ServiceError,
    },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("job {0} did not reach a terminal state within {1:?}")]
    JobTimedOut(JobId, Duration),

    #[error("wait for job {0} was cancelled")]
    WaitCancelled(JobId),

    #[error("run cancelled before job {0} was submitted")]
    RunCancelled(JobId),

    #[error("remote service error: {0}")]
    Service(#[from] ServiceError),
}

fn format_detail(detail: &Option<ErrorDetail>) -> String {
    match detail {
        Some(detail) => format!(": {}. {}", detail.code, detail.message),
        None => String::new(),
    }
}
