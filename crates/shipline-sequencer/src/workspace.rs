//! Build workspaces.
//!
//! The build container gets a private copy of the source tree so build
//! output never lands in the checkout and excluded paths are truly absent.

use shipline_core::stage::SourceTree;
use shipline_core::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Copy `source` into a fresh temporary directory, leaving out excluded
/// paths. Excludes are relative to the source root (`ci`, `helmChart/values`).
pub async fn prepare_workspace(source: &SourceTree) -> Result<TempDir> {
    let root = source.root.clone();
    let exclude: Vec<PathBuf> = source
        .exclude
        .iter()
        .map(|e| PathBuf::from(e.trim_matches('/')))
        .filter(|e| !e.as_os_str().is_empty())
        .collect();

    if !root.is_dir() {
        return Err(Error::NotFound(format!(
            "source directory {} does not exist",
            root.display()
        )));
    }

    tokio::task::spawn_blocking(move || -> Result<TempDir> {
        let workspace = tempfile::Builder::new()
            .prefix("shipline-workspace-")
            .tempdir()?;
        let copied = copy_tree(&root, workspace.path(), Path::new(""), &exclude)?;
        debug!(
            source = %root.display(),
            workspace = %workspace.path().display(),
            files = copied,
            "Prepared workspace"
        );
        Ok(workspace)
    })
    .await
    .map_err(|e| Error::Internal(format!("workspace copy task failed: {}", e)))?
}

fn copy_tree(src: &Path, dst: &Path, relative: &Path, exclude: &[PathBuf]) -> io::Result<usize> {
    let mut copied = 0;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let rel = relative.join(entry.file_name());
        if exclude.iter().any(|e| *e == rel) {
            continue;
        }

        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            fs::create_dir_all(&to)?;
            copied += copy_tree(&from, &to, &rel, exclude)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
            copied += 1;
        } else {
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        return Ok(());
    }
    fs::copy(from, to).map(|_| ())
}
