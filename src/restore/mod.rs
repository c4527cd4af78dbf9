pub(crate) mod logic;
pub(crate) mod verification;

use anyhow::Result;

use crate::config::AppConfig;

/// Public entry point for the restore flow: download the archive by key,
/// extract, verify, and replay the collection dumps.
pub async fn run_restore_flow(app_config: &AppConfig, archive_key: &str) -> Result<()> {
    logic::perform_restore(app_config, archive_key).await
}
