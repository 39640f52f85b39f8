use super::asset::AssetHandle;
use super::processor::ProcessorDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Detection,
    Redaction,
}

impl JobKind {
    /// Human readable label used when naming jobs, tasks and assets.
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Detection => "Face Detection",
            JobKind::Redaction => "Face Redaction",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum JobState {
    #[default]
    Queued,
    Scheduled,
    Processing,
    Canceling,
    Canceled,
    Finished,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Canceled | JobState::Finished | JobState::Error)
    }

    // Position in the lifecycle. States are only ever left for a higher rank.
    fn rank(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Scheduled => 1,
            JobState::Processing => 2,
            JobState::Canceling => 3,
            JobState::Canceled | JobState::Finished | JobState::Error => 4,
        }
    }

    /// Whether `next` is a forward move from `self`. Polling may skip
    /// intermediate states, so any move toward a later stage is accepted.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskSpec {
    pub name: String,
    pub processor: ProcessorDescriptor,
    pub configuration: String,
    pub input_assets: Vec<AssetHandle>,
    pub output_assets: Vec<AssetHandle>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobSpec {
    pub id: JobId,
    pub name: String,
    pub task: TaskSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskStatus {
    pub name: String,
    #[serde(default)]
    pub error_details: Vec<ErrorDetail>,
}

/// Scheduler view of a submitted job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    #[serde(default)]
    pub tasks: Vec<TaskStatus>,
    #[serde(default)]
    pub output_assets: Vec<AssetHandle>,
}

impl JobStatus {
    /// First error detail of the first task, the only one reported.
    pub fn first_error_detail(&self) -> Option<&ErrorDetail> {
        self.tasks.first()?.error_details.first()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobStateChange {
    pub job: JobId,
    pub previous: JobState,
    pub current: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Finished.is_terminal());
        assert!(JobState::Canceled.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Canceling.is_terminal());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        assert!(JobState::Queued.can_transition_to(JobState::Scheduled));
        assert!(JobState::Queued.can_transition_to(JobState::Finished));
        assert!(JobState::Scheduled.can_transition_to(JobState::Processing));
        assert!(JobState::Canceling.can_transition_to(JobState::Canceled));
        assert!(!JobState::Processing.can_transition_to(JobState::Queued));
        assert!(!JobState::Processing.can_transition_to(JobState::Processing));
        assert!(!JobState::Finished.can_transition_to(JobState::Error));
        assert!(!JobState::Error.can_transition_to(JobState::Finished));
    }

    #[test]
    fn test_first_error_detail_of_first_task() {
        let status = JobStatus {
            state: JobState::Error,
            tasks: vec![
                TaskStatus {
                    name: "first".to_string(),
                    error_details: vec![
                        ErrorDetail {
                            code: "5000".to_string(),
                            message: "decode failure".to_string(),
                        },
                        ErrorDetail {
                            code: "5001".to_string(),
                            message: "other".to_string(),
                        },
                    ],
                },
                TaskStatus {
                    name: "second".to_string(),
                    error_details: vec![ErrorDetail {
                        code: "1".to_string(),
                        message: "ignored".to_string(),
                    }],
                },
            ],
            ..Default::default()
        };
        let detail = status.first_error_detail().unwrap();
        assert_eq!(detail.code, "5000");
        assert_eq!(detail.message, "decode failure");

        assert!(JobStatus::default().first_error_detail().is_none());
    }
}
