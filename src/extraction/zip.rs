use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ArchiveExtractor;

/// Archive extractor for ZIP files
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ZipExtractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_zip_entry(
        mut file: ::zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(?archive_path, "skipping entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path).map_err(|e| Error::Extraction {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to create directory {}: {}", file_path.display(), e),
            })?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Extraction {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to create parent directories: {}", e),
            })?;
        }

        let mut outfile = std::fs::File::create(&file_path).map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to create output file {}: {}", file_path.display(), e),
        })?;

        std::io::copy(&mut file, &mut outfile).map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!("on unpack: {}", e),
        })?;

        Ok(Some(file_path))
    }

    /// Extract a ZIP archive synchronously
    ///
    /// The archive handle is dropped before this returns, on success and on error.
    pub fn extract_blocking(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        if !archive_path.is_file() {
            return Err(Error::Extraction {
                archive: archive_path.to_path_buf(),
                reason: "archive file does not exist".to_string(),
            });
        }

        std::fs::create_dir_all(dest_path).map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!(
                "failed to create destination {}: {}",
                dest_path.display(),
                e
            ),
        })?;

        let file = std::fs::File::open(archive_path).map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to open ZIP archive: {}", e),
        })?;

        let mut archive = ::zip::ZipArchive::new(file).map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to read ZIP archive: {}", e),
        })?;

        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| Error::Extraction {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP entry {}: {}", i, e),
            })?;

            if let Some(file_path) = Self::extract_zip_entry(entry, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        let task_archive = archive.clone();

        tokio::task::spawn_blocking(move || Self::extract_blocking(&task_archive, &dest))
            .await
            .map_err(|e| Error::Extraction {
                archive,
                reason: format!("extraction worker failed: {}", e),
            })?
    }
}
