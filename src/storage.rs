// Taskweave — JSON document directories with atomic replacement

use std::io;
use std::path::{Path, PathBuf};

/// Path of the document `<dir>/<stem>.json`.
pub fn document_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.json", stem))
}

/// Write `content` to `path` so readers see either the old or the new file.
///
/// The temp file lives in the same directory (same filesystem, so rename is
/// atomic) and carries a unique suffix so concurrent writers never share it.
pub async fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&tmp_path, content).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Read a document, mapping a missing file to `Ok(None)`.
pub async fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a document. Returns false if it did not exist.
pub async fn remove(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Stems of every `*.json` file in `dir`, sorted. A missing dir is empty.
pub async fn list_stems(dir: &Path) -> io::Result<Vec<String>> {
    let mut stems = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stems),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with('.') {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".json") {
                stems.push(stem.to_string());
            }
        }
    }

    stems.sort();
    Ok(stems)
}
