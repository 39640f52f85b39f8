use crate::error::ServiceError;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout, Duration};
use tokio_util::io::ReaderStream;

// A stalled chunk aborts the download.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    Started {
        file: String,
        direction: TransferDirection,
        total: Option<u64>,
    },
    Progress {
        file: String,
        bytes: usize,
    },
    Finished {
        file: String,
    },
}

pub type TransferEventSender = UnboundedSender<TransferEvent>;

fn notify(progress: Option<&TransferEventSender>, event: TransferEvent) {
    if let Some(progress) = progress {
        if let Err(err) = progress.send(event) {
            tracing::trace!("transfer progress receiver closed: {err}");
        }
    }
}

/// Computes the blake3 digest of the file content, hex encoded.
pub fn file_checksum(path: &Path) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let fd = std::fs::File::open(path)?;
    hasher.update_reader(fd)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// upload_file streams the content of `source` to `url` with an HTTP PUT.
pub async fn upload_file(
    http_client: &reqwest::Client,
    url: &str,
    file_name: &str,
    source: &Path,
    progress: Option<&TransferEventSender>,
) -> Result<(), ServiceError> {
    let fd = tokio::fs::File::open(source).await?;
    let total = fd.metadata().await?.len();
    tracing::info!("upload_file:{file_name} source:{source:?} size:{total} url:{url}");

    notify(
        progress,
        TransferEvent::Started {
            file: file_name.to_string(),
            direction: TransferDirection::Upload,
            total: Some(total),
        },
    );

    let reader = ReaderStream::new(fd).map({
        let progress = progress.cloned();
        let file_name = file_name.to_string();
        move |bytes| {
            if let Ok(chunk) = &bytes {
                notify(
                    progress.as_ref(),
                    TransferEvent::Progress {
                        file: file_name.clone(),
                        bytes: chunk.len(),
                    },
                );
            }
            bytes
        }
    });

    let resp = http_client
        .put(url)
        .header(reqwest::header::CONTENT_LENGTH, total)
        .body(reqwest::Body::wrap_stream(reader))
        .send()
        .await
        .map_err(|err| ServiceError::Transfer {
            file: file_name.to_string(),
            reason: err.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(ServiceError::Transfer {
            file: file_name.to_string(),
            reason: format!("response status: {}", resp.status()),
        });
    }

    notify(
        progress,
        TransferEvent::Finished {
            file: file_name.to_string(),
        },
    );
    Ok(())
}

/// download_file fetches `url` into `destination`. Content is written to a
/// `.tmp` sibling first and only renamed into place once complete and, when
/// `checksum` is known, verified.
pub async fn download_file(
    http_client: &reqwest::Client,
    url: &str,
    file_name: &str,
    destination: &Path,
    checksum: Option<&str>,
    progress: Option<&TransferEventSender>,
) -> Result<(), ServiceError> {
    tracing::info!("download_file:{file_name} url:{url} destination:{destination:?}");
    let transfer_err = |reason: String| ServiceError::Transfer {
        file: file_name.to_string(),
        reason,
    };

    let mut resp = http_client
        .get(url)
        .send()
        .await
        .map_err(|err| transfer_err(err.to_string()))?;

    if resp.status() != reqwest::StatusCode::OK {
        return Err(transfer_err(format!("response status: {}", resp.status())));
    }

    notify(
        progress,
        TransferEvent::Started {
            file: file_name.to_string(),
            direction: TransferDirection::Download,
            total: resp.content_length(),
        },
    );

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_file_path = tmp_path(destination);
    let actual = match stream_to_file(&mut resp, &tmp_file_path, file_name, progress).await {
        Ok(actual) => actual,
        Err(err) => {
            discard_tmp(&tmp_file_path).await;
            return Err(err);
        }
    };
    install_file(&tmp_file_path, destination, file_name, checksum, actual).await?;

    notify(
        progress,
        TransferEvent::Finished {
            file: file_name.to_string(),
        },
    );
    Ok(())
}

// Writes the response body into `tmp_file_path` and returns its blake3 digest.
async fn stream_to_file(
    resp: &mut reqwest::Response,
    tmp_file_path: &Path,
    file_name: &str,
    progress: Option<&TransferEventSender>,
) -> Result<String, ServiceError> {
    let transfer_err = |reason: String| ServiceError::Transfer {
        file: file_name.to_string(),
        reason,
    };

    let fd = tokio::fs::File::create(tmp_file_path).await?;
    let mut fd = tokio::io::BufWriter::new(fd);
    let mut hasher = blake3::Hasher::new();

    loop {
        match timeout(CHUNK_TIMEOUT, resp.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                hasher.update(&chunk);
                fd.write_all(&chunk).await?;
                notify(
                    progress,
                    TransferEvent::Progress {
                        file: file_name.to_string(),
                        bytes: chunk.len(),
                    },
                );
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(transfer_err(format!("http error: {err}"))),
            Err(_) => return Err(transfer_err("connection timeout".to_string())),
        }
    }
    fd.flush().await?;

    Ok(hasher.finalize().to_hex().to_string())
}

// Moves a complete download into place. The tmp file never outlives a failure.
async fn install_file(
    tmp_file_path: &Path,
    destination: &Path,
    file_name: &str,
    checksum: Option<&str>,
    actual: String,
) -> Result<(), ServiceError> {
    if let Some(expected) = checksum {
        if !expected.eq_ignore_ascii_case(&actual) {
            discard_tmp(tmp_file_path).await;
            return Err(ServiceError::ChecksumMismatch {
                file: file_name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    if let Err(err) = tokio::fs::rename(tmp_file_path, destination).await {
        discard_tmp(tmp_file_path).await;
        return Err(err.into());
    }
    Ok(())
}

async fn discard_tmp(tmp_file_path: &Path) {
    if let Err(err) = tokio::fs::remove_file(tmp_file_path).await {
        tracing::debug!("tmp file {tmp_file_path:?} not removed: {err}");
    }
}

fn tmp_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    destination.with_file_name(name)
}
