use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::JobError;
use crate::service::AssetStore;
use crate::types::{AssetHandle, JobId};

/// Local directory receiving the output of `job` under `base`.
pub fn result_directory(base: &Path, job: JobId) -> PathBuf {
    base.join(format!("result_{job}"))
}

pub struct ResultRetriever {
    store: Arc<dyn AssetStore>,
}

impl ResultRetriever {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        ResultRetriever { store }
    }

    /// Downloads every file of `asset` into `destination`, keeping remote
    /// file names. Stops at the first failed transfer.
    pub async fn download_all(
        &self,
        asset: &AssetHandle,
        destination: &Path,
    ) -> Result<Vec<PathBuf>, JobError> {
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|err| JobError::DownloadFailed {
                file: destination.display().to_string(),
                reason: err.to_string(),
            })?;

        let files = self.store.list_files(&asset.id).await?;
        tracing::info!(
            "downloading {} file(s) of asset {} into {destination:?}",
            files.len(),
            asset.id
        );

        let mut downloaded = Vec::with_capacity(files.len());
        for file in files {
            if !is_plain_file_name(&file.name) {
                return Err(JobError::DownloadFailed {
                    file: file.name,
                    reason: "file name is not a plain file name".to_string(),
                });
            }
            let target = destination.join(&file.name);
            self.store
                .download_file(&file, &target)
                .await
                .map_err(|err| JobError::DownloadFailed {
                    file: file.name.clone(),
                    reason: err.to_string(),
                })?;
            downloaded.push(target);
        }

        Ok(downloaded)
    }
}

// Remote names must not escape the destination directory.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
