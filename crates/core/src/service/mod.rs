use crate::error::ServiceError;
use crate::types::{AssetFile, AssetHandle, AssetId, JobId, JobSpec, JobStatus, ProcessorDescriptor};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[async_trait]
pub trait ProcessorRegistry: Send + Sync {
    /// All registered instances of the named capability, in registry order.
    async fn list_processors(&self, name: &str) -> Result<Vec<ProcessorDescriptor>>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create_asset(&self, name: &str) -> Result<AssetHandle>;

    /// Registers a member file on an asset. The returned file carries the
    /// location `upload_file` sends the content to.
    async fn create_asset_file(
        &self,
        asset: &AssetId,
        name: &str,
        size: u64,
        checksum: Option<String>,
    ) -> Result<AssetFile>;

    async fn upload_file(&self, file: &AssetFile, source: &Path) -> Result<()>;

    async fn find_asset(&self, id: &AssetId) -> Result<Option<AssetHandle>>;

    async fn list_assets(&self) -> Result<Vec<AssetHandle>>;

    async fn list_files(&self, asset: &AssetId) -> Result<Vec<AssetFile>>;

    async fn download_file(&self, file: &AssetFile, destination: &Path) -> Result<()>;
}

#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Hands the job to the remote scheduler. Returns once the job is
    /// accepted; execution happens asynchronously.
    async fn submit_job(&self, job: &JobSpec) -> Result<()>;

    async fn job_status(&self, id: JobId) -> Result<JobStatus>;

    async fn cancel_job(&self, id: JobId) -> Result<()>;
}

/// Explicit handle on the remote collaborators, passed to every component.
#[derive(Clone)]
pub struct ServiceContext {
    pub registry: Arc<dyn ProcessorRegistry>,
    pub store: Arc<dyn AssetStore>,
    pub scheduler: Arc<dyn JobScheduler>,
}

impl ServiceContext {
    pub fn new(
        registry: Arc<dyn ProcessorRegistry>,
        store: Arc<dyn AssetStore>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        ServiceContext {
            registry,
            store,
            scheduler,
        }
    }

    /// Builds a context where one backend plays every role.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ProcessorRegistry + AssetStore + JobScheduler + 'static,
    {
        ServiceContext {
            registry: backend.clone(),
            store: backend.clone(),
            scheduler: backend,
        }
    }
}
