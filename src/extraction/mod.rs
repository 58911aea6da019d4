//! Archive extraction
//!
//! Transfers whose payload is an archive are unpacked into their destination
//! folder before the transfer reports success. Only ZIP archives are
//! recognised; everything else is moved into place as-is.

mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use zip::ZipExtractor;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Unpacks an archive file into a folder
///
/// Implementations must create `dest` when it is missing and must not keep
/// the archive open once the returned future resolves, whatever the outcome.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest`, returning the files written
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>>;
}

/// Check whether a file is an archive this crate knows how to unpack
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}
