use crate::error::Error;
use crate::extraction::*;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a valid ZIP archive containing the given files
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

// ---------------------------------------------------------------------------
// is_archive
// ---------------------------------------------------------------------------

#[test]
fn test_is_archive_matches_zip_case_insensitively() {
    assert!(is_archive(Path::new("pack.zip")));
    assert!(is_archive(Path::new("/tmp/PACK.ZIP")));
    assert!(!is_archive(Path::new("pack.zip.part")));
    assert!(!is_archive(Path::new("pack.rar")));
    assert!(!is_archive(Path::new("zip")));
}

// ---------------------------------------------------------------------------
// ZipExtractor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_extract_creates_missing_destination() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("levels.zip");
    create_zip_archive(
        &archive,
        &[("level1.json", b"{\"id\":1}"), ("maps/level2.json", b"{\"id\":2}")],
    );
    let dest = temp.path().join("out").join("levels");

    let files = ZipExtractor::new().extract(&archive, &dest).await.unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(
        std::fs::read(dest.join("level1.json")).unwrap(),
        b"{\"id\":1}"
    );
    assert_eq!(
        std::fs::read(dest.join("maps").join("level2.json")).unwrap(),
        b"{\"id\":2}"
    );
}

#[tokio::test]
async fn test_extract_reports_missing_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("missing.zip");

    let result = ZipExtractor::new()
        .extract(&archive, &temp.path().join("out"))
        .await;

    match result {
        Err(Error::Extraction { archive: path, reason }) => {
            assert_eq!(path, archive);
            assert!(reason.contains("does not exist"), "reason: {reason}");
        }
        other => panic!("expected extraction error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_extract_rejects_corrupt_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.zip");
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    let result = ZipExtractor::new()
        .extract(&archive, &temp.path().join("out"))
        .await;

    assert!(
        matches!(result, Err(Error::Extraction { .. })),
        "corrupt archive should fail extraction, got {result:?}"
    );

    // The archive must not stay locked: it can be removed right away
    std::fs::remove_file(&archive).unwrap();
}

#[tokio::test]
async fn test_extract_skips_entries_escaping_destination() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("evil.zip");
    create_zip_archive(&archive, &[("../escape.txt", b"nope"), ("safe.txt", b"ok")]);
    let dest = temp.path().join("out");

    let files = ZipExtractor::new().extract(&archive, &dest).await.unwrap();

    assert_eq!(files, vec![dest.join("safe.txt")]);
    assert!(!temp.path().join("escape.txt").exists());
}

#[test]
fn test_extract_blocking_overwrites_existing_files() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(&archive, &[("a.txt", b"fresh")]);
    let dest = temp.path().join("out");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("a.txt"), b"stale").unwrap();

    ZipExtractor::extract_blocking(&archive, &dest).unwrap();

    assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"fresh");
}
