// opstool/src/backup/dump.rs
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::config::MongoConfig;
use crate::utils::find_mongodump;
use crate::utils::log;

/// Builds the argument vector for one mongodump invocation. Kept pure so
/// the per-collection command shape can be checked without a mongod around.
pub fn mongodump_args(mongo: &MongoConfig, collection: &str, dump_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--db".into(),
        mongo.db_name.clone().into(),
        "--collection".into(),
        collection.into(),
        "-o".into(),
        dump_dir.as_os_str().to_os_string(),
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
    args
}

/// Dumps every configured collection into `dump_dir`, one mongodump run per
/// collection. Aborts on the first failing invocation and names the
/// collection that failed.
pub fn dump_collections(mongo: &MongoConfig, dump_dir: &Path) -> Result<()> {
    if mongo.collections.is_empty() {
        anyhow::bail!("No collections configured to back up");
    }

    let mongodump_path = find_mongodump()?;

    for collection in &mongo.collections {
        log::info(&format!("---> Dumping [{}]", collection));
        let output = Command::new(&mongodump_path)
            .args(mongodump_args(mongo, collection, dump_dir))
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute mongodump for collection: {}",
                    collection
                )
            })?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "mongodump for collection {} failed with status: {}\nStdout: {}\nStderr: {}",
                collection,
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        println!("✓ Dumped collection {}", collection);
    }

    Ok(())
}
