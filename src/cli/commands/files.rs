//! Commands for files already stored on the server: list, download, delete.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::client_from;

/// List stored files, optionally filtered by name prefix.
pub async fn run_list(prefix: Option<&str>, config_path: &Path) -> anyhow::Result<()> {
    let response = client_from(config_path)?
        .list_files(prefix)
        .await
        .context("listing files failed")?;

    if response.files.is_empty() {
        println!("No files found");
        return Ok(());
    }

    println!("Found {} files:\n", response.count);
    for file in &response.files {
        println!("  - {file}");
    }
    Ok(())
}

/// Download `name` to `output`, or to `./<name>` when no output is given.
pub async fn run_download(
    name: &str,
    output: Option<PathBuf>,
    config_path: &Path,
) -> anyhow::Result<()> {
    let dest = output.unwrap_or_else(|| PathBuf::from(name));

    let bytes = client_from(config_path)?
        .download_file(name, &dest)
        .await
        .with_context(|| format!("downloading {name}"))?;

    println!("File downloaded: {name} -> {} ({bytes} bytes)", dest.display());
    Ok(())
}

/// Delete a stored file and its index data.
pub async fn run_delete(name: &str, config_path: &Path) -> anyhow::Result<()> {
    let response = client_from(config_path)?
        .delete_file(name)
        .await
        .with_context(|| format!("deleting {name}"))?;

    println!("File deleted: {name}");
    println!("Job ID: {}", response.job_id);
    Ok(())
}
