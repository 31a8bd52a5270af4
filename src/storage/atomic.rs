use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// `<dir>/<name>.<suffix>` for a file living next to `path`.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn temp_prefix(target: &Path) -> String {
    format!(
        ".{}.",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    )
}

/// A fresh, hidden temp file name in the same directory as `target`.
pub(crate) fn temp_path_for(target: &Path) -> PathBuf {
    parent_dir(target).join(format!(
        "{}{}.tmp",
        temp_prefix(target),
        Uuid::new_v4().simple()
    ))
}

/// Write `bytes` to a new temp file next to `target` and flush it to stable storage.
/// The target itself is not touched.
pub(crate) async fn write_temp(target: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let temp = temp_path_for(target);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp)
        .await?;

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(temp)
}

/// Atomically move a fully written temp file over `target`, then persist the
/// directory entry. Readers see either the old file or the new one, never a mix.
pub(crate) async fn replace(temp: &Path, target: &Path) -> io::Result<()> {
    if let Err(e) = fs::rename(temp, target).await {
        let _ = fs::remove_file(temp).await;
        return Err(e);
    }
    sync_dir(parent_dir(target)).await
}

pub(crate) async fn write_atomically(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = write_temp(target, bytes).await?;
    replace(&temp, target).await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Remove temp files left behind by writers that died before their rename.
/// Only files older than `older_than` are considered orphaned.
pub(crate) async fn sweep_orphaned_temps(target: &Path, older_than: Duration) -> io::Result<usize> {
    let prefix = temp_prefix(target);
    let mut entries = fs::read_dir(parent_dir(target)).await?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&prefix) || !name.ends_with(".tmp") {
            continue;
        }

        let age = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        if age.is_some_and(|age| age >= older_than) {
            debug!(file = %name, "Removing orphaned ledger temp file");
            if fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
    }

    Ok(removed)
}
