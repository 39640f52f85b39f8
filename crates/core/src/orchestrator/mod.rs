use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_DETECTOR_NAME, DEFAULT_REDACTOR_NAME};
use crate::error::JobError;
use crate::resolver::ProcessorResolver;
use crate::service::{AssetStore, JobScheduler, ServiceContext};
use crate::types::{
    AssetHandle, ErrorDetail, JobId, JobKind, JobSpec, JobState, JobStateChange, JobStatus,
    ProcessorDescriptor, TaskSpec,
};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
// Consecutive transient status poll failures tolerated before giving up.
const MAX_STATUS_FAILURES: u32 = 5;

#[derive(Clone, Debug)]
pub struct JobSettings {
    pub detector_name: String,
    pub redactor_name: String,
    pub poll_interval: Duration,
    // None waits until the job ends, however long that takes.
    pub timeout: Option<Duration>,
}

impl JobSettings {
    pub fn processor_name(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::Detection => &self.detector_name,
            JobKind::Redaction => &self.redactor_name,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        JobSettings {
            detector_name: DEFAULT_DETECTOR_NAME.to_string(),
            redactor_name: DEFAULT_REDACTOR_NAME.to_string(),
            poll_interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl From<&Config> for JobSettings {
    fn from(config: &Config) -> Self {
        JobSettings {
            detector_name: config.detector_name.clone(),
            redactor_name: config.redactor_name.clone(),
            poll_interval: config.poll_interval(),
            timeout: config.job_timeout(),
        }
    }
}

/// How a submitted job ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Finished {
        job: JobId,
        output: AssetHandle,
    },
    Failed {
        job: JobId,
        state: JobState,
        error: Option<ErrorDetail>,
    },
}

impl JobOutcome {
    pub fn job(&self) -> JobId {
        match self {
            JobOutcome::Finished { job, .. } | JobOutcome::Failed { job, .. } => *job,
        }
    }

    /// The output handle of a finished job, `JobFailed` otherwise.
    pub fn into_output(self) -> Result<AssetHandle, JobError> {
        match self {
            JobOutcome::Finished { output, .. } => Ok(output),
            JobOutcome::Failed { job, state, error } => Err(JobError::JobFailed {
                job,
                state,
                detail: error,
            }),
        }
    }
}

/// JobOrchestrator builds the single-task job, submits it and waits for the
/// scheduler to move it into a terminal state.
///
/// State changes are pushed to the optional observer as they are seen. The
/// wait itself only relies on polling the scheduler.
pub struct JobOrchestrator {
    resolver: ProcessorResolver,
    store: Arc<dyn AssetStore>,
    scheduler: Arc<dyn JobScheduler>,
    settings: JobSettings,
    observer: Option<UnboundedSender<JobStateChange>>,
    cancel: CancellationToken,
}

impl JobOrchestrator {
    pub fn new(ctx: &ServiceContext, settings: JobSettings) -> Self {
        JobOrchestrator {
            resolver: ProcessorResolver::new(ctx.registry.clone()),
            store: ctx.store.clone(),
            scheduler: ctx.scheduler.clone(),
            settings,
            observer: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: UnboundedSender<JobStateChange>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run_job(
        &self,
        job_id: JobId,
        kind: JobKind,
        input: &AssetHandle,
        config_path: &Path,
    ) -> Result<JobOutcome, JobError> {
        self.ensure_not_cancelled(job_id)?;
        let processor = self
            .resolver
            .resolve(self.settings.processor_name(kind))
            .await?;
        let configuration = read_configuration(config_path).await?;

        self.ensure_not_cancelled(job_id)?;
        let output = self
            .store
            .create_asset(&format!("{} Output Asset {job_id}", kind.label()))
            .await?;
        let job = build_job(job_id, kind, processor, configuration, input.clone(), output);

        self.ensure_not_cancelled(job_id)?;
        self.scheduler.submit_job(&job).await?;
        tracing::info!("job {} submitted: {}", job.id, job.name);

        let status = self.wait_for_completion(job.id).await?;
        outcome_of(status, &job)
    }

    fn ensure_not_cancelled(&self, job: JobId) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            tracing::warn!("run cancelled before job {job} was submitted");
            return Err(JobError::RunCancelled(job));
        }
        Ok(())
    }

    async fn wait_for_completion(&self, job: JobId) -> Result<JobStatus, JobError> {
        let poll = self.poll_until_terminal(job);
        let bounded = async {
            match self.settings.timeout {
                Some(limit) => match tokio::time::timeout(limit, poll).await {
                    Ok(res) => res,
                    Err(_) => Err(JobError::JobTimedOut(job, limit)),
                },
                None => poll.await,
            }
        };

        let res = tokio::select! {
            res = bounded => res,
            _ = self.cancel.cancelled() => Err(JobError::WaitCancelled(job)),
        };

        if let Err(
            JobError::JobTimedOut(..)
            | JobError::WaitCancelled(_)
            | JobError::StatusUnavailable { .. },
        ) = &res
        {
            tracing::warn!("requesting cancellation of job {job}");
            if let Err(err) = self.scheduler.cancel_job(job).await {
                tracing::error!("failed to cancel job {job}: {err}");
            }
        }
        res
    }

    async fn poll_until_terminal(&self, job: JobId) -> Result<JobStatus, JobError> {
        let mut tracker = StateTracker::new(job, self.observer.clone());
        let mut interval =
            tokio::time::interval(self.settings.poll_interval.max(MIN_POLL_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failures = 0;

        loop {
            interval.tick().await;
            let status = match self.scheduler.job_status(job).await {
                Ok(status) => {
                    failures = 0;
                    status
                }
                Err(err) if err.is_transient() && failures < MAX_STATUS_FAILURES => {
                    failures += 1;
                    tracing::warn!("status poll of job {job} failed ({failures}): {err}");
                    continue;
                }
                Err(source) => return Err(JobError::StatusUnavailable { job, source }),
            };
            tracing::debug!("job {job} polled in state {}", status.state);
            tracker.observe(status.state);
            if status.state.is_terminal() {
                return Ok(status);
            }
        }
    }
}

pub fn build_job(
    id: JobId,
    kind: JobKind,
    processor: ProcessorDescriptor,
    configuration: String,
    input: AssetHandle,
    output: AssetHandle,
) -> JobSpec {
    JobSpec {
        id,
        name: format!("{} Job {id}", kind.label()),
        task: TaskSpec {
            name: format!("{} Task {id}", kind.label()),
            processor,
            configuration,
            input_assets: vec![input],
            output_assets: vec![output],
        },
    }
}

async fn read_configuration(path: &Path) -> Result<String, JobError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| JobError::ConfigurationRead {
            path: path.to_path_buf(),
            source,
        })
}

fn outcome_of(status: JobStatus, job: &JobSpec) -> Result<JobOutcome, JobError> {
    match status.state {
        JobState::Finished => status
            .output_assets
            .into_iter()
            .next()
            .or_else(|| job.task.output_assets.first().cloned())
            .map(|output| JobOutcome::Finished {
                job: job.id,
                output,
            })
            .ok_or(JobError::MissingOutput(job.id)),
        state => Ok(JobOutcome::Failed {
            job: job.id,
            state,
            error: status.first_error_detail().cloned(),
        }),
    }
}

// Follows the job through its lifecycle and reports forward moves.
struct StateTracker {
    job: JobId,
    current: JobState,
    observer: Option<UnboundedSender<JobStateChange>>,
}

impl StateTracker {
    fn new(job: JobId, observer: Option<UnboundedSender<JobStateChange>>) -> Self {
        StateTracker {
            job,
            current: JobState::Queued,
            observer,
        }
    }

    fn observe(&mut self, next: JobState) -> Option<JobStateChange> {
        if next == self.current {
            return None;
        }
        if !self.current.can_transition_to(next) {
            tracing::warn!(
                "job {} reported {next} after {}, ignoring",
                self.job,
                self.current
            );
            return None;
        }

        let change = JobStateChange {
            job: self.job,
            previous: self.current,
            current: next,
        };
        self.current = next;
        tracing::debug!("job {} state changed: {} -> {}", self.job, change.previous, next);

        if let Some(observer) = &self.observer {
            // A gone observer only loses progress lines.
            if observer.send(change).is_err() {
                self.observer = None;
            }
        }
        Some(change)
    }
}
