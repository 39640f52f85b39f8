//! In-memory media service used by tests. Jobs follow a scripted sequence of
//! states, one step per status poll, and every call is counted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::service::{self, AssetStore, JobScheduler, ProcessorRegistry};
use crate::types::{
    AssetFile, AssetHandle, AssetId, ErrorDetail, JobId, JobSpec, JobState, JobStatus,
    ProcessorDescriptor, TaskStatus, REFERENCE_PREFIX,
};

/// States a submitted job walks through, plus what it produces.
#[derive(Clone, Debug)]
pub struct JobScript {
    pub states: Vec<JobState>,
    pub error_details: Vec<ErrorDetail>,
    // Files placed in the output asset on Finished. `None` copies the
    // input asset files.
    pub outputs: Option<Vec<(String, Vec<u8>)>>,
}

impl JobScript {
    pub fn finishing() -> Self {
        JobScript {
            states: vec![JobState::Scheduled, JobState::Processing, JobState::Finished],
            error_details: vec![],
            outputs: None,
        }
    }

    pub fn failing(code: &str, message: &str) -> Self {
        JobScript {
            states: vec![JobState::Processing, JobState::Error],
            error_details: vec![ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            }],
            outputs: None,
        }
    }

    /// A job that never leaves Queued.
    pub fn stalled() -> Self {
        JobScript {
            states: vec![],
            error_details: vec![],
            outputs: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<(String, Vec<u8>)>) -> Self {
        self.outputs = Some(outputs);
        self
    }
}

struct StoredAsset {
    handle: AssetHandle,
    files: Vec<(AssetFile, Option<Vec<u8>>)>,
}

struct MemoryJob {
    spec: JobSpec,
    state: JobState,
    pending: VecDeque<JobState>,
    error_details: Vec<ErrorDetail>,
    outputs: Option<Vec<(String, Vec<u8>)>>,
}

#[derive(Default)]
struct MemoryState {
    processors: Vec<ProcessorDescriptor>,
    assets: Vec<StoredAsset>,
    jobs: HashMap<JobId, MemoryJob>,
    scripts: VecDeque<JobScript>,
    failing_downloads: HashSet<String>,
    failing_uploads: bool,
    failing_status_polls: usize,
    submitted: Vec<JobSpec>,
}

impl MemoryState {
    fn asset_mut(&mut self, id: &AssetId) -> Option<&mut StoredAsset> {
        self.assets.iter_mut().find(|asset| &asset.handle.id == id)
    }

    fn asset(&self, id: &AssetId) -> Option<&StoredAsset> {
        self.assets.iter().find(|asset| &asset.handle.id == id)
    }

    fn store(&mut self, name: &str) -> AssetHandle {
        let handle = AssetHandle {
            id: AssetId::new(format!("{REFERENCE_PREFIX}UUID:{}", Uuid::new_v4())),
            name: name.to_string(),
        };
        self.assets.push(StoredAsset {
            handle: handle.clone(),
            files: vec![],
        });
        handle
    }

    fn fill_outputs(&mut self, job: JobId) {
        let Some(job) = self.jobs.get(&job) else {
            return;
        };
        let files: Vec<(String, Vec<u8>)> = match &job.outputs {
            Some(outputs) => outputs.clone(),
            None => job
                .spec
                .task
                .input_assets
                .iter()
                .filter_map(|input| self.asset(&input.id))
                .flat_map(|asset| asset.files.iter())
                .filter_map(|(file, content)| {
                    content.as_ref().map(|c| (file.name.clone(), c.clone()))
                })
                .collect(),
        };
        let outputs: Vec<AssetId> = job
            .spec
            .task
            .output_assets
            .iter()
            .map(|asset| asset.id.clone())
            .collect();

        for id in outputs {
            if let Some(asset) = self.asset_mut(&id) {
                asset.files = files
                    .iter()
                    .map(|(name, content)| {
                        (
                            AssetFile {
                                name: name.clone(),
                                size: content.len() as u64,
                                checksum: Some(blake3::hash(content).to_hex().to_string()),
                                url: None,
                            },
                            Some(content.clone()),
                        )
                    })
                    .collect();
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryService {
    state: Mutex<MemoryState>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processor(self, name: &str, version: &str) -> Self {
        self.state().processors.push(ProcessorDescriptor {
            name: name.to_string(),
            version: version.to_string(),
        });
        self
    }

    /// Script for the next submitted job. Jobs without a script finish.
    pub fn push_script(&self, script: JobScript) {
        self.state().scripts.push_back(script);
    }

    /// Stores an asset directly, without counting it as a call.
    pub fn insert_asset(&self, id: &str, name: &str, files: Vec<(String, Vec<u8>)>) -> AssetHandle {
        let handle = AssetHandle {
            id: AssetId::new(id),
            name: name.to_string(),
        };
        let files = files
            .into_iter()
            .map(|(name, content)| {
                (
                    AssetFile {
                        name,
                        size: content.len() as u64,
                        checksum: Some(blake3::hash(&content).to_hex().to_string()),
                        url: None,
                    },
                    Some(content),
                )
            })
            .collect();
        self.state().assets.push(StoredAsset {
            handle: handle.clone(),
            files,
        });
        handle
    }

    pub fn fail_download_of(&self, file_name: &str) {
        self.state().failing_downloads.insert(file_name.to_string());
    }

    pub fn fail_uploads(&self) {
        self.state().failing_uploads = true;
    }

    /// The next `count` status polls fail with a transport error.
    pub fn fail_status_polls(&self, count: usize) {
        self.state().failing_status_polls = count;
    }

    pub fn submitted_jobs(&self) -> Vec<JobSpec> {
        self.state().submitted.clone()
    }

    pub fn asset_count(&self) -> usize {
        self.state().assets.len()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls_guard().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls_guard().values().sum()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn calls_guard(&self) -> MutexGuard<'_, HashMap<&'static str, usize>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: &'static str) {
        *self.calls_guard().entry(operation).or_default() += 1;
    }
}

#[async_trait]
impl ProcessorRegistry for MemoryService {
    async fn list_processors(&self, name: &str) -> service::Result<Vec<ProcessorDescriptor>> {
        self.record("list_processors");
        Ok(self
            .state()
            .processors
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssetStore for MemoryService {
    async fn create_asset(&self, name: &str) -> service::Result<AssetHandle> {
        self.record("create_asset");
        Ok(self.state().store(name))
    }

    async fn create_asset_file(
        &self,
        asset: &AssetId,
        name: &str,
        size: u64,
        checksum: Option<String>,
    ) -> service::Result<AssetFile> {
        self.record("create_asset_file");
        let mut state = self.state();
        let stored = state.asset_mut(asset).ok_or_else(|| ServiceError::Transfer {
            file: name.to_string(),
            reason: format!("no asset {asset}"),
        })?;
        let file = AssetFile {
            name: name.to_string(),
            size,
            checksum,
            url: Some(format!("memory://{asset}/{name}")),
        };
        stored.files.push((file.clone(), None));
        Ok(file)
    }

    async fn upload_file(&self, file: &AssetFile, source: &Path) -> service::Result<()> {
        self.record("upload_file");
        if self.state().failing_uploads {
            return Err(ServiceError::Transfer {
                file: file.name.clone(),
                reason: "connection reset".to_string(),
            });
        }
        let content = tokio::fs::read(source).await?;
        let mut state = self.state();
        let slot = state
            .assets
            .iter_mut()
            .flat_map(|asset| asset.files.iter_mut())
            .find(|(f, _)| f.url == file.url)
            .ok_or_else(|| ServiceError::MissingTransferUrl(file.name.clone()))?;
        slot.1 = Some(content);
        Ok(())
    }

    async fn find_asset(&self, id: &AssetId) -> service::Result<Option<AssetHandle>> {
        self.record("find_asset");
        Ok(self.state().asset(id).map(|asset| asset.handle.clone()))
    }

    async fn list_assets(&self) -> service::Result<Vec<AssetHandle>> {
        self.record("list_assets");
        Ok(self
            .state()
            .assets
            .iter()
            .map(|asset| asset.handle.clone())
            .collect())
    }

    async fn list_files(&self, asset: &AssetId) -> service::Result<Vec<AssetFile>> {
        self.record("list_files");
        Ok(self
            .state()
            .asset(asset)
            .map(|asset| asset.files.iter().map(|(file, _)| file.clone()).collect())
            .unwrap_or_default())
    }

    async fn download_file(&self, file: &AssetFile, destination: &Path) -> service::Result<()> {
        self.record("download_file");
        let content = {
            let state = self.state();
            if state.failing_downloads.contains(&file.name) {
                return Err(ServiceError::Transfer {
                    file: file.name.clone(),
                    reason: "response status: 500 Internal Server Error".to_string(),
                });
            }
            state
                .assets
                .iter()
                .flat_map(|asset| asset.files.iter())
                .find(|(f, _)| f == file)
                .and_then(|(_, content)| content.clone())
                .ok_or_else(|| ServiceError::Transfer {
                    file: file.name.clone(),
                    reason: "response status: 404 Not Found".to_string(),
                })?
        };
        tokio::fs::write(destination, content).await?;
        Ok(())
    }
}

#[async_trait]
impl JobScheduler for MemoryService {
    async fn submit_job(&self, job: &JobSpec) -> service::Result<()> {
        self.record("submit_job");
        let mut state = self.state();
        let script = state.scripts.pop_front().unwrap_or_else(JobScript::finishing);
        state.submitted.push(job.clone());
        state.jobs.insert(
            job.id,
            MemoryJob {
                spec: job.clone(),
                state: JobState::Queued,
                pending: script.states.into(),
                error_details: script.error_details,
                outputs: script.outputs,
            },
        );
        Ok(())
    }

    async fn job_status(&self, id: JobId) -> service::Result<JobStatus> {
        self.record("job_status");
        let mut state = self.state();
        if state.failing_status_polls > 0 {
            state.failing_status_polls -= 1;
            return Err(ServiceError::Rpc {
                method: "getJob",
                reason: "connection reset".to_string(),
            });
        }
        let job = state.jobs.get_mut(&id).ok_or(ServiceError::UnknownJob(id))?;
        let finished_now = match job.pending.pop_front() {
            Some(next) => {
                job.state = next;
                next == JobState::Finished
            }
            None => false,
        };
        if finished_now {
            state.fill_outputs(id);
        }

        let job = state.jobs.get(&id).ok_or(ServiceError::UnknownJob(id))?;
        let error_details = if job.state == JobState::Error {
            job.error_details.clone()
        } else {
            vec![]
        };
        Ok(JobStatus {
            id,
            state: job.state,
            tasks: vec![TaskStatus {
                name: job.spec.task.name.clone(),
                error_details,
            }],
            output_assets: job.spec.task.output_assets.clone(),
        })
    }

    async fn cancel_job(&self, id: JobId) -> service::Result<()> {
        self.record("cancel_job");
        let mut state = self.state();
        let job = state.jobs.get_mut(&id).ok_or(ServiceError::UnknownJob(id))?;
        job.pending = VecDeque::from(vec![JobState::Canceling, JobState::Canceled]);
        Ok(())
    }
}
