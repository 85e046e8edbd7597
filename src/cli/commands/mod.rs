//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod config;
pub mod files;
pub mod run;
pub mod search;
pub mod upload;
pub mod watch;

use std::path::Path;

use anyhow::Context;

use crate::api::ApiClient;
use crate::config::Settings;

/// Build a one-shot API client from the config file.
fn client_from(config_path: &Path) -> anyhow::Result<ApiClient> {
    let settings = Settings::load_from(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    ApiClient::from_settings(settings).context("creating HTTP client")
}
