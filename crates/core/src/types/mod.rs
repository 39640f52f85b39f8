mod asset;
mod job;
mod processor;
pub mod rpc;

pub use asset::{AssetFile, AssetHandle, AssetId, InputTarget, REFERENCE_PREFIX};
pub use job::{
    ErrorDetail, JobId, JobKind, JobSpec, JobState, JobStateChange, JobStatus, TaskSpec,
    TaskStatus,
};
pub use processor::{ProcessorDescriptor, ProcessorVersion, VersionParseError};
