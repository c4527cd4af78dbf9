//! Provisioning, deployment, and backup toolkit
//!
//! Provides the CLI for role-based remote tasks and the datastore
//! backup/restore pipeline.

// opstool/src/main.rs
mod backup;
mod config;
mod remote;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use storage::{BlobStore, S3Store};
use utils::log;

/// Main entry point for the toolkit
#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    dotenv::dotenv().ok();

    // Expects config.json next to the executable, or in the project root
    // when running with `cargo run`.
    let config_path = PathBuf::from("config.json");
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().collect();
    let Some(task_name) = args.get(1).map(|s| s.trim().to_string()) else {
        print_usage(&app_config);
        anyhow::bail!("No task given");
    };

    match task_name.as_str() {
        "backup" => {
            println!("🚀 Starting backup process...");
            backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
        }
        "restore" => {
            let archive_key = args
                .get(2)
                .map(|s| s.trim().to_string())
                .context("restore needs the archive key, e.g. backup_mongo_2024-01-01-00-00.tgz")?;
            println!("🔄 Starting restore of {}...", archive_key);
            restore::run_restore_flow(&app_config, &archive_key)
                .await
                .context("Restore process failed")?;
        }
        "list-backups" => {
            let store = S3Store::connect(app_config.storage()?).await;
            for (i, key) in store.list_all().await?.iter().enumerate() {
                log::info(&format!("[{}] {}", i, key));
            }
        }
        "purge-backups" => {
            let store = S3Store::connect(app_config.storage()?).await;
            let deleted = store.delete_all().await?;
            println!("Deleted {} objects", deleted);
        }
        name => {
            remote::run_task(&app_config, name)
                .await
                .with_context(|| format!("Task {} failed", name))?;
        }
    }
    Ok(())
}

fn print_usage(app_config: &AppConfig) {
    println!("Usage: opstool <task> [arg]");
    println!();
    println!("Pipeline tasks:");
    println!("  backup                  Dump collections, archive, upload, clean up");
    println!("  restore <key>           Download an archive by key and replay it");
    println!("  list-backups            List archive keys in the object store");
    println!("  purge-backups           Delete every object in the store");
    println!();
    println!("Remote tasks (role in brackets):");
    let deploy_config = config::load_deploy_config(&app_config.raw);
    for task in remote::catalog(&deploy_config) {
        println!(
            "  {:<22}  [{}] {}",
            task.name,
            task.role.as_str(),
            task.summary
        );
    }
}
