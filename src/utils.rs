//! Utility functions for file naming and path manipulation

use std::path::Path;

/// Strip a single trailing slash from a source URL
///
/// ```
/// use batch_dl::utils::prepare_url;
///
/// assert_eq!(prepare_url("https://cdn.example.com/pack.zip/"), "https://cdn.example.com/pack.zip");
/// assert_eq!(prepare_url(""), "");
/// ```
pub fn prepare_url(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Extract the served file name (with extension) from an HTTP response
///
/// Tries the `Content-Disposition` header first and falls back to the last
/// URL path segment. Returns "download" as last resort.
pub fn extract_filename_from_response(response: &reqwest::Response, url: &str) -> String {
    let content_disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok());
    guess_file_name(content_disposition, url)
}

/// Guess a file name from an optional `Content-Disposition` value and the URL
///
/// ```
/// use batch_dl::utils::guess_file_name;
///
/// assert_eq!(guess_file_name(None, "https://example.com/files/map.zip"), "map.zip");
/// assert_eq!(
///     guess_file_name(Some(r#"attachment; filename="levels.zip""#), "https://example.com/get?id=4"),
///     "levels.zip"
/// );
/// ```
pub fn guess_file_name(content_disposition: Option<&str>, url: &str) -> String {
    if let Some(value) = content_disposition {
        // Format: attachment; filename="file.zip" or filename*=UTF-8''file.zip
        for part in value.split(';') {
            let part = part.trim();
            if let Some(filename) = part.strip_prefix("filename=") {
                let filename = filename.trim_matches('"');
                if !filename.is_empty() {
                    return filename.to_string();
                }
            } else if let Some(filename) = part.strip_prefix("filename*=") {
                // Format is: charset'lang'encoded-filename
                if let Some(idx) = filename.rfind('\'')
                    && let Ok(decoded) = urlencoding::decode(&filename[idx + 1..])
                    && !decoded.is_empty()
                {
                    return decoded.into_owned();
                }
            }
        }
    }

    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        return urlencoding::decode(last_segment)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| last_segment.to_string());
    }

    "download".to_string()
}

/// Split a file name into its stem and extension at the last `.`
///
/// A leading dot does not start an extension.
///
/// ```
/// use batch_dl::utils::split_extension;
///
/// assert_eq!(split_extension("map.v2.zip"), ("map.v2", Some("zip")));
/// assert_eq!(split_extension("README"), ("README", None));
/// ```
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}

/// Join a stem and an optional extension back into a file name
pub fn with_extension(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Check whether a directory contains an entry whose name, minus its
/// extension, equals `stem`
///
/// Both files and sub-folders count, so an archive unpacked into a folder
/// named after the stem is found as well. Folders also match on their full
/// name, since an unpacked stem such as `map.v2` has no extension to strip.
pub async fn has_entry_with_stem(dir: &Path, stem: &str) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return false;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if split_extension(&name).0 == stem {
            return true;
        }
        if name == stem && entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            return true;
        }
    }
    false
}

/// Turn an identifier into a single path component
///
/// Anything other than ASCII alphanumerics, `-`, `_` and `.` becomes `_`,
/// and names made only of dots are prefixed so they never mean `.` or `..`.
///
/// ```
/// use batch_dl::utils::path_component;
///
/// assert_eq!(path_component("level-1"), "level-1");
/// assert_eq!(path_component("../maps/1"), "_.._maps_1");
/// assert_eq!(path_component(".."), "_..");
/// ```
pub fn path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        format!("_{cleaned}")
    } else {
        cleaned
    }
}

/// Delete every entry of `dir`, except `keep` if it lives there
///
/// A missing directory is treated as already clear.
pub async fn clear_dir(dir: &Path, keep: Option<&Path>) -> std::io::Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if keep.is_some_and(|keep| keep == path) {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

/// Move a file, falling back to copy + remove across filesystems
///
/// An existing file at `to` is overwritten.
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(from, to).await?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        tracing::warn!(path = ?from, error = %e, "failed to remove source after copy");
    }
    Ok(())
}

/// Move everything inside `from` into `to`, then remove `from`
///
/// Existing folders in `to` are merged and existing files overwritten.
pub async fn move_dir_contents(from: &Path, to: &Path) -> std::io::Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src, dst)) = pending.pop() {
        tokio::fs::create_dir_all(&dst).await?;
        let mut entries = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                move_file(&entry.path(), &target).await?;
            }
        }
    }

    tokio::fs::remove_dir_all(from).await
}
