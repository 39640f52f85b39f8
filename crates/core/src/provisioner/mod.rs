use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::JobError;
use crate::networking::transfer::file_checksum;
use crate::service::AssetStore;
use crate::types::{AssetFile, AssetHandle, AssetId, InputTarget};

/// Asset listing entry: the asset and its member files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub asset: AssetHandle,
    pub files: Vec<AssetFile>,
}

/// AssetProvisioner turns a run target into an asset handle the scheduler
/// accepts as job input. Local files are uploaded into a new asset, while
/// references are looked up as-is.
///
/// Uploaded assets stay in the store when a later step of the run fails.
pub struct AssetProvisioner {
    store: Arc<dyn AssetStore>,
}

impl AssetProvisioner {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        AssetProvisioner { store }
    }

    /// `asset_name` names the asset created for a local file. It is unused
    /// for references.
    pub async fn provision(
        &self,
        target: &InputTarget,
        asset_name: &str,
    ) -> Result<AssetHandle, JobError> {
        match target {
            InputTarget::ExistingReference(id) => self.lookup_existing(id).await,
            InputTarget::LocalPath(path) => self.upload_new(path, asset_name).await,
        }
    }

    async fn lookup_existing(&self, id: &AssetId) -> Result<AssetHandle, JobError> {
        let asset = self
            .store
            .find_asset(id)
            .await?
            .ok_or_else(|| JobError::AssetNotFound(id.clone()))?;
        tracing::info!("using existing asset {} ({})", asset.id, asset.name);
        Ok(asset)
    }

    async fn upload_new(&self, path: &Path, asset_name: &str) -> Result<AssetHandle, JobError> {
        let upload_err = |reason: String| JobError::UploadFailed {
            file: path.to_path_buf(),
            reason,
        };

        let path = verify_file_path(path)
            .ok_or_else(|| upload_err("file not found or not a regular file".to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(String::from)
            .ok_or_else(|| upload_err("file name is not valid UTF-8".to_string()))?;
        let size = std::fs::metadata(&path)
            .map_err(|err| upload_err(err.to_string()))?
            .len();
        let checksum = file_checksum(&path).map_err(|err| upload_err(err.to_string()))?;

        let asset = self
            .store
            .create_asset(asset_name)
            .await
            .map_err(|err| upload_err(err.to_string()))?;
        let file = self
            .store
            .create_asset_file(&asset.id, &file_name, size, Some(checksum))
            .await
            .map_err(|err| upload_err(err.to_string()))?;
        self.store
            .upload_file(&file, &path)
            .await
            .map_err(|err| upload_err(err.to_string()))?;

        tracing::info!("uploaded {file_name} ({size} bytes) into asset {}", asset.id);
        Ok(asset)
    }

    /// Every asset in the store with its files.
    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>, JobError> {
        let mut entries = vec![];
        for asset in self.store.list_assets().await? {
            let files = self.store.list_files(&asset.id).await?;
            entries.push(CatalogEntry { asset, files });
        }
        Ok(entries)
    }
}

// Verify that the path exists and is a file.
fn verify_file_path(path: &Path) -> Option<PathBuf> {
    path.try_exists()
        .map(|res| res && path.is_file())
        .ok()
        .and_then(|present| present.then(|| path.to_path_buf()))
}
