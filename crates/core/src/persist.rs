use crate::error::{KnowledgeError, KnowledgeResult};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Writes `bytes` to a sibling temp file, fsyncs it, then renames it over
/// `path`, so readers only ever see the old or the new content.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> KnowledgeResult<()> {
    let io_err = |source| KnowledgeError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = non_empty_parent(path) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
    file.write_all(bytes).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)
}

/// Blocking twin of [`write_atomic`], for load-time repairs that run before
/// the store is handed to any task.
pub(crate) fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> KnowledgeResult<()> {
    let io_err = |source| KnowledgeError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = non_empty_parent(path) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file = File::create(&tmp_path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(io_err)
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}
