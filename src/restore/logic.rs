// opstool/src/restore/logic.rs
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::backup::{archive, dump_dir_name};
use crate::config::{AppConfig, MongoConfig, load_mongo_config};
use crate::restore::verification;
use crate::storage::{BlobStore, S3Store};
use crate::utils::find_mongorestore;
use crate::utils::log;

/// Recovers the run timestamp from an archive key such as
/// `backup_mongo_2024-01-01-00-00.tgz`.
pub fn timestamp_from_key(archive_key: &str) -> Result<String> {
    let timestamp = archive_key
        .strip_prefix("backup_mongo_")
        .and_then(|rest| rest.strip_suffix(".tgz"))
        .filter(|stamp| !stamp.is_empty())
        .with_context(|| {
            format!(
                "Archive key {} does not match backup_mongo_<timestamp>.tgz",
                archive_key
            )
        })?;
    Ok(timestamp.to_string())
}

/// Where mongodump left one collection's data inside the extracted tree.
pub fn collection_dump_path(dump_root: &Path, collection: &str) -> PathBuf {
    dump_root.join(format!("{}.bson", collection))
}

pub fn mongorestore_args(
    mongo: &MongoConfig,
    target_db: &str,
    collection: &str,
    bson_path: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--db".into(),
        target_db.into(),
        "--collection".into(),
        collection.into(),
    ];
    if let Some(host) = &mongo.host {
        args.push("--host".into());
        args.push(host.clone().into());
    }
    if let Some(username) = &mongo.username {
        args.push("--username".into());
        args.push(username.clone().into());
    }
    if let Some(password) = &mongo.password {
        args.push("--password".into());
        args.push(password.clone().into());
    }
    args.push(bson_path.as_os_str().to_os_string());
    args
}

/// Main restore flow: download the archive by key, extract it, check that
/// every configured collection has a dump, then replay the dumps.
pub async fn perform_restore(app_config: &AppConfig, archive_key: &str) -> Result<()> {
    let mongo = load_mongo_config(&app_config.raw)?;
    let storage_config = app_config.storage()?;
    let timestamp = timestamp_from_key(archive_key)?;

    let archive_path = app_config.work_dir.join(archive_key);
    let extract_dir = app_config.work_dir.join("extract");
    fs::create_dir_all(&extract_dir).with_context(|| {
        format!(
            "Failed to create extraction directory {}",
            extract_dir.display()
        )
    })?;

    let store = S3Store::connect(storage_config).await;
    store.download(archive_key, &archive_path).await?;
    archive::extract_tgz_archive(&archive_path, &extract_dir)?;

    let dump_root = extract_dir
        .join(dump_dir_name(&timestamp))
        .join(&mongo.db_name);
    verification::verify_collection_dumps(&mongo, &dump_root);
    restore_collections(&mongo, &dump_root)?;
    Ok(())
}

/// Replays every collection dump into `<db>_restored` so a restore run
/// never clobbers the live database.
fn restore_collections(mongo: &MongoConfig, dump_root: &Path) -> Result<()> {
    let mongorestore_path = find_mongorestore()?;
    let target_db = format!("{}_restored", mongo.db_name);

    for collection in &mongo.collections {
        let bson_path = collection_dump_path(dump_root, collection);
        if !bson_path.exists() {
            println!(
                "Skipping {}: no dump file at {}",
                collection,
                bson_path.display()
            );
            continue;
        }

        log::info(&format!(
            "---> Restoring [{}] into [{}]",
            collection, target_db
        ));
        let output = Command::new(&mongorestore_path)
            .args(mongorestore_args(mongo, &target_db, collection, &bson_path))
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute mongorestore for collection: {}",
                    collection
                )
            })?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "mongorestore for collection {} failed with status: {}\nStdout: {}\nStderr: {}",
                collection,
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        println!("✓ Restored collection {}", collection);
    }

    Ok(())
}
