//! Upload command - send one file without going through the daemon.

use std::path::Path;

use anyhow::Context;

use super::client_from;

/// Upload `file` once and print the queued job id.
pub async fn run(file: &Path, update: bool, config_path: &Path) -> anyhow::Result<()> {
    let client = client_from(config_path)?;

    let response = client
        .upload_file(file, update)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    println!("Queued {} (job {})", file.display(), response.job_id);
    Ok(())
}
