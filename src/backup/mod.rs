mod logic;
pub(crate) mod archive;
pub(crate) mod dump;

use anyhow::Result;

use crate::config::AppConfig;

pub use logic::{archive_name, dump_dir_name};

/// Public entry point for the backup pipeline: dump, archive, upload,
/// clean up.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<()> {
    logic::perform_backup(app_config).await
}
