//! HTTP implementation of [`TransferExecutor`]

use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{ProgressSink, TransferAbort, TransferControl, TransferExecutor, TransferRequest};
use crate::config::HttpConfig;
use crate::error::{Result, TransferError};
use crate::extraction::{ArchiveExtractor, is_archive};
use crate::types::TransferStats;
use crate::utils::{
    clear_dir, extract_filename_from_response, move_dir_contents, move_file, prepare_url,
    split_extension, with_extension,
};

/// Streams a URL into the temp folder, then unpacks or moves it into place
#[derive(Clone)]
pub struct HttpTransferExecutor {
    client: reqwest::Client,
    extractor: Arc<dyn ArchiveExtractor>,
    read_timeout: Option<Duration>,
}

impl std::fmt::Debug for HttpTransferExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransferExecutor")
            .field("client", &self.client)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransferExecutor {
    /// Build an executor with a client configured from `config`
    pub fn new(config: &HttpConfig, extractor: Arc<dyn ArchiveExtractor>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            extractor,
            read_timeout: config.read_timeout,
        })
    }

    /// Await `fut`, giving up once the read timeout elapses
    async fn read<T>(
        &self,
        fut: impl std::future::Future<Output = T>,
    ) -> std::result::Result<T, Duration> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
            None => Ok(fut.await),
        }
    }

    /// Stream the response body into `path`, returning the number of bytes
    /// written and the time spent suspended
    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        path: &Path,
        expected: Option<u64>,
        control: &TransferControl,
        progress: &ProgressSink,
    ) -> std::result::Result<(u64, Duration), TransferAbort> {
        let mut file = tokio::fs::File::create(path).await.map_err(|e| {
            TransferError::load(format!("failed to create {}: {}", path.display(), e))
        })?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut suspended = Duration::ZERO;

        loop {
            suspended += control
                .checkpoint()
                .await
                .map_err(|_| TransferAbort::Cancelled)?;

            let chunk = tokio::select! {
                _ = control.cancelled() => return Err(TransferAbort::Cancelled),
                chunk = self.read(stream.next()) => chunk,
            };
            let chunk = chunk.map_err(|limit| {
                TransferError::load(format!("on read: no data for {}s", limit.as_secs_f64()))
            })?;
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| TransferError::load(format!("on read: {}", e)))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::load(format!("on write: {}", e)))?;
            written += chunk.len() as u64;

            if let Some(total) = expected.filter(|total| *total > 0) {
                progress.report((written.saturating_mul(100) / total).min(100) as u8);
            }
        }

        file.flush()
            .await
            .map_err(|e| TransferError::load(format!("on write: {}", e)))?;

        Ok((written, suspended))
    }

    /// Unpack or move the finished temp file into the destination folder
    ///
    /// Archives are unpacked next to the temp file first and only moved into
    /// the destination if the run is still live.
    async fn place_output(
        &self,
        request: &TransferRequest,
        control: &TransferControl,
        temp_path: &Path,
        final_stem: &str,
        extension: Option<&str>,
    ) -> std::result::Result<PathBuf, TransferAbort> {
        if control.is_cancelled() {
            let _ = tokio::fs::remove_file(temp_path).await;
            return Err(TransferAbort::Cancelled);
        }

        if is_archive(temp_path) {
            let target = if request.new_folder {
                request.dest_dir.join(final_stem)
            } else {
                request.dest_dir.clone()
            };

            let staging = temp_path.with_extension("unpack");
            let _ = tokio::fs::remove_dir_all(&staging).await;

            let result = self.extractor.extract(temp_path, &staging).await;
            if request.temp_dir != request.dest_dir
                && let Err(e) = tokio::fs::remove_file(temp_path).await
            {
                warn!(path = ?temp_path, error = %e, "failed to remove temporary archive");
            }
            if let Err(e) = result {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(TransferError::archive(e.to_string()).into());
            }
            if control.is_cancelled() {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(TransferAbort::Cancelled);
            }

            move_dir_contents(&staging, &target).await.map_err(|e| {
                TransferError::load(format!("failed to move to {}: {}", target.display(), e))
            })?;
            return Ok(target);
        }

        let target = request
            .dest_dir
            .join(with_extension(final_stem, extension));
        if target != temp_path {
            move_file(temp_path, &target).await.map_err(|e| {
                TransferError::load(format!("failed to move to {}: {}", target.display(), e))
            })?;
        }
        Ok(target)
    }
}

#[async_trait]
impl TransferExecutor for HttpTransferExecutor {
    async fn transfer(
        &self,
        request: TransferRequest,
        control: TransferControl,
        progress: ProgressSink,
    ) -> std::result::Result<TransferStats, TransferAbort> {
        let url = prepare_url(&request.source).to_string();
        let started = Instant::now();
        debug!(url = %url, "starting transfer");

        let response = tokio::select! {
            _ = control.cancelled() => return Err(TransferAbort::Cancelled),
            response = self.read(self.client.get(&url).send()) => response,
        }
        .map_err(|limit| {
            TransferError::load(format!(
                "on request: no response for {}s, url: {}",
                limit.as_secs_f64(),
                url
            ))
        })?
        .map_err(|e| TransferError::load(format!("on request: {}, url: {}", e, url)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TransferError::load(format!(
                "code: {}, respMsg: {}, url: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                url
            ))
            .into());
        }

        let served = extract_filename_from_response(&response, &url);
        let (served_stem, extension) = split_extension(&served);
        let base = request.file_name.as_deref().unwrap_or(served_stem);
        let temp_base = request.temp_file_name.as_deref().unwrap_or(base);
        let final_stem = format!("{}{}{}", request.name_prefix, base, request.name_postfix);
        let temp_name = with_extension(
            &format!("{}{}{}", request.name_prefix, temp_base, request.name_postfix),
            extension,
        );

        for dir in [&request.temp_dir, &request.dest_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                TransferError::load(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        let temp_path = request.temp_dir.join(&temp_name);
        let expected = response.content_length();

        let (written, suspended) =
            match self.stream_to_file(response, &temp_path, expected, &control, &progress).await {
                Ok(done) => done,
                Err(abort) => {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(abort);
                }
            };

        if let Some(total) = expected
            && written < total
        {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(TransferError::load(format!(
                "connection closed after {} of {} bytes, url: {}",
                written, total, url
            ))
            .into());
        }

        if control.is_cancelled() {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(TransferAbort::Cancelled);
        }

        if request.clear_folder {
            clear_dir(&request.dest_dir, Some(&temp_path))
                .await
                .map_err(|e| TransferError::load(format!("failed to clear folder: {}", e)))?;
        }

        let output = self
            .place_output(&request, &control, &temp_path, &final_stem, extension)
            .await?;

        progress.report(100);

        let elapsed = started.elapsed().saturating_sub(suspended);
        let bytes = expected.unwrap_or(0).max(written);
        info!(url = %url, ?output, bytes, elapsed_ms = elapsed.as_millis() as u64, "transfer complete");

        Ok(TransferStats {
            url,
            elapsed,
            bytes,
        })
    }
}
