use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams},
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
};
use serde::de::DeserializeOwned;

use crate::error::ServiceError;
use crate::networking::transfer::{self, TransferEventSender};
use crate::service::{self, AssetStore, JobScheduler, ProcessorRegistry};
use crate::types::{
    rpc::{RpcError, RpcResponse},
    AssetFile, AssetHandle, AssetId, JobId, JobSpec, JobStatus, ProcessorDescriptor,
};

/// JSON-RPC binding of the media service. One client serves as processor
/// registry, asset store and job scheduler; file content moves over plain
/// HTTP to the urls the store hands out.
pub struct RpcClient {
    client: HttpClient,
    http_client: reqwest::Client,
    progress: Option<TransferEventSender>,
}

impl RpcClient {
    pub fn new(
        url: impl AsRef<str>,
        api_token: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        let mut http_headers = reqwest::header::HeaderMap::new();
        if let Some(token) = api_token {
            let value = format!("Bearer {token}");
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&value).map_err(|err| ServiceError::Rpc {
                    method: "connect",
                    reason: format!("invalid api token: {err}"),
                })?,
            );
            http_headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&value).map_err(|err| {
                    ServiceError::Rpc {
                        method: "connect",
                        reason: format!("invalid api token: {err}"),
                    }
                })?,
            );
        }

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(request_timeout)
            .build(url)
            .map_err(|err| ServiceError::Rpc {
                method: "connect",
                reason: err.to_string(),
            })?;

        let http_client = reqwest::Client::builder()
            .default_headers(http_headers)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|err| ServiceError::Rpc {
                method: "connect",
                reason: err.to_string(),
            })?;

        Ok(RpcClient {
            client,
            http_client,
            progress: None,
        })
    }

    /// Reports file transfer progress on `progress`.
    pub fn with_transfer_progress(mut self, progress: TransferEventSender) -> Self {
        self.progress = Some(progress);
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> Result<T, ServiceError> {
        tracing::debug!("rpc call {method}");
        let resp = self
            .client
            .request::<RpcResponse<T>, ArrayParams>(method, params)
            .await
            .map_err(|err| ServiceError::Rpc {
                method,
                reason: err.to_string(),
            })?;

        Result::<T, RpcError>::from(resp).map_err(|source| ServiceError::Remote { method, source })
    }
}

#[async_trait]
impl ProcessorRegistry for RpcClient {
    async fn list_processors(&self, name: &str) -> service::Result<Vec<ProcessorDescriptor>> {
        let mut params = ArrayParams::new();
        params.insert(name)?;
        self.call("listMediaProcessors", params).await
    }
}

#[async_trait]
impl AssetStore for RpcClient {
    async fn create_asset(&self, name: &str) -> service::Result<AssetHandle> {
        let mut params = ArrayParams::new();
        params.insert(name)?;
        self.call("createAsset", params).await
    }

    async fn create_asset_file(
        &self,
        asset: &AssetId,
        name: &str,
        size: u64,
        checksum: Option<String>,
    ) -> service::Result<AssetFile> {
        let mut params = ArrayParams::new();
        params.insert(asset)?;
        params.insert(name)?;
        params.insert(size)?;
        params.insert(checksum)?;
        self.call("createAssetFile", params).await
    }

    async fn upload_file(&self, file: &AssetFile, source: &Path) -> service::Result<()> {
        let url = file
            .url
            .as_deref()
            .ok_or_else(|| ServiceError::MissingTransferUrl(file.name.clone()))?;
        transfer::upload_file(
            &self.http_client,
            url,
            &file.name,
            source,
            self.progress.as_ref(),
        )
        .await
    }

    async fn find_asset(&self, id: &AssetId) -> service::Result<Option<AssetHandle>> {
        let mut params = ArrayParams::new();
        params.insert(id)?;
        match self.call("getAsset", params).await {
            Ok(asset) => Ok(Some(asset)),
            Err(ServiceError::Remote {
                source: RpcError::NotFound(_),
                ..
            }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list_assets(&self) -> service::Result<Vec<AssetHandle>> {
        self.call("listAssets", ArrayParams::new()).await
    }

    async fn list_files(&self, asset: &AssetId) -> service::Result<Vec<AssetFile>> {
        let mut params = ArrayParams::new();
        params.insert(asset)?;
        self.call("listAssetFiles", params).await
    }

    async fn download_file(&self, file: &AssetFile, destination: &Path) -> service::Result<()> {
        let url = file
            .url
            .as_deref()
            .ok_or_else(|| ServiceError::MissingTransferUrl(file.name.clone()))?;
        transfer::download_file(
            &self.http_client,
            url,
            &file.name,
            destination,
            file.checksum.as_deref(),
            self.progress.as_ref(),
        )
        .await
    }
}

#[async_trait]
impl JobScheduler for RpcClient {
    async fn submit_job(&self, job: &JobSpec) -> service::Result<()> {
        let mut params = ArrayParams::new();
        params.insert(job)?;
        self.call("submitJob", params).await
    }

    async fn job_status(&self, id: JobId) -> service::Result<JobStatus> {
        let mut params = ArrayParams::new();
        params.insert(id)?;
        self.call("getJob", params).await
    }

    async fn cancel_job(&self, id: JobId) -> service::Result<()> {
        let mut params = ArrayParams::new();
        params.insert(id)?;
        self.call("cancelJob", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unusable_api_token() {
        let res = RpcClient::new(
            "http://localhost:9944",
            Some("bad\ntoken"),
            Duration::from_secs(1),
        );
        assert!(matches!(res, Err(ServiceError::Rpc { method: "connect", .. })));
    }

    #[tokio::test]
    async fn test_transfer_without_url_fails() {
        let client = RpcClient::new("http://localhost:9944", None, Duration::from_secs(1))
            .expect("client");
        let file = AssetFile {
            name: "faces.json".to_string(),
            ..Default::default()
        };
        let res = client
            .download_file(&file, Path::new("faces.json"))
            .await;
        assert!(matches!(res, Err(ServiceError::MissingTransferUrl(name)) if name == "faces.json"));
    }
}
