//! Plain console lines shown while a job runs and once it is over.

use facework_core::provisioner::CatalogEntry;
use facework_core::types::{ErrorDetail, JobState, JobStateChange};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn state_change_lines(change: &JobStateChange) -> Vec<String> {
    let mut lines = vec![format!(
        "Job state changed: {} -> {}",
        change.previous, change.current
    )];
    match change.current {
        JobState::Finished => lines.push("Job is finished.".to_string()),
        state if !state.is_terminal() => lines.push("Please wait...".to_string()),
        _ => {}
    }
    lines
}

/// Prints every received state change until the sender side is dropped.
pub async fn print_state_changes(mut rx: UnboundedReceiver<JobStateChange>) {
    while let Some(change) = rx.recv().await {
        for line in state_change_lines(&change) {
            println!("{line}");
        }
    }
}

pub fn job_error_line(detail: &ErrorDetail) -> String {
    format!("Error: {}. {}", detail.code, detail.message)
}

pub fn catalog_lines(entries: &[CatalogEntry]) -> Vec<String> {
    let mut lines = vec![];
    for entry in entries {
        lines.push(format!("{} {}", entry.asset.id, entry.asset.name));
        for file in &entry.files {
            lines.push(format!("    {} ({} bytes)", file.name, file.size));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use facework_core::types::{AssetFile, AssetHandle, AssetId};
    use uuid::Uuid;

    fn change(previous: JobState, current: JobState) -> JobStateChange {
        JobStateChange {
            job: Uuid::nil(),
            previous,
            current,
        }
    }

    #[test]
    fn test_state_change_lines() {
        assert_eq!(
            state_change_lines(&change(JobState::Queued, JobState::Scheduled)),
            vec!["Job state changed: Queued -> Scheduled", "Please wait..."]
        );
        assert_eq!(
            state_change_lines(&change(JobState::Processing, JobState::Finished)),
            vec!["Job state changed: Processing -> Finished", "Job is finished."]
        );
        assert_eq!(
            state_change_lines(&change(JobState::Processing, JobState::Error)),
            vec!["Job state changed: Processing -> Error"]
        );
        assert_eq!(
            state_change_lines(&change(JobState::Canceling, JobState::Canceled)),
            vec!["Job state changed: Canceling -> Canceled"]
        );
    }

    #[test]
    fn test_job_error_line() {
        let detail = ErrorDetail {
            code: "5000".to_string(),
            message: "decode failure".to_string(),
        };
        assert_eq!(job_error_line(&detail), "Error: 5000. decode failure");
    }

    #[test]
    fn test_catalog_lines() {
        let entries = vec![CatalogEntry {
            asset: AssetHandle {
                id: AssetId::new("nb:cid:UUID:1"),
                name: "stored video".to_string(),
            },
            files: vec![AssetFile {
                name: "clip.mp4".to_string(),
                size: 4,
                checksum: None,
                url: None,
            }],
        }];
        assert_eq!(
            catalog_lines(&entries),
            vec!["nb:cid:UUID:1 stored video", "    clip.mp4 (4 bytes)"]
        );
    }
}
