// opstool/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;

use crate::backup::{archive, dump};
use crate::config::{AppConfig, load_mongo_config};
use crate::storage::{BlobStore, S3Store};
use crate::utils::log;

/// Minute-resolution UTC stamp embedded in the dump directory and archive
/// names. Two runs within the same minute produce the same key; the second
/// overwrites the first both locally and in the store.
pub fn run_timestamp() -> String {
    Utc::now().format("%Y-%m-%d-%H-%M").to_string()
}

pub fn dump_dir_name(timestamp: &str) -> String {
    format!("backup_mongo_{}", timestamp)
}

/// The archive filename doubles as the object key in the store.
pub fn archive_name(timestamp: &str) -> String {
    format!("{}.tgz", dump_dir_name(timestamp))
}

/// Main backup flow: dump every collection into a timestamped directory,
/// archive it, upload the archive under its filename, then remove the
/// local directory and archive.
pub async fn perform_backup(app_config: &AppConfig) -> Result<()> {
    let mongo = load_mongo_config(&app_config.raw)?;
    let storage_config = app_config.storage()?;

    let timestamp = run_timestamp();
    let archive_key = archive_name(&timestamp);
    let dump_dir = app_config.work_dir.join(dump_dir_name(&timestamp));
    let archive_path = app_config.work_dir.join(&archive_key);

    fs::create_dir_all(&dump_dir)
        .with_context(|| format!("Failed to create dump directory {}", dump_dir.display()))?;

    dump::dump_collections(&mongo, &dump_dir)?;
    archive::create_tgz_archive(&dump_dir, &archive_path)?;

    log::info(&format!("---> Uploading [{}]", archive_key));
    let store = S3Store::connect(storage_config).await;
    upload_and_cleanup(&store, &archive_key, &archive_path, &dump_dir).await?;

    println!("✓ Backup {} uploaded, local files removed", archive_key);
    Ok(())
}

/// Uploads the archive, then removes the dump directory and the archive
/// file. Cleanup runs only after the upload succeeds; any failure before
/// or during the upload leaves both on disk for inspection.
pub async fn upload_and_cleanup<S: BlobStore>(
    store: &S,
    archive_key: &str,
    archive_path: &Path,
    dump_dir: &Path,
) -> Result<()> {
    store.upload(archive_key, archive_path).await?;

    fs::remove_dir_all(dump_dir)
        .with_context(|| format!("Failed to remove dump directory {}", dump_dir.display()))?;
    fs::remove_file(archive_path)
        .with_context(|| format!("Failed to remove archive {}", archive_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct AcceptingStore;

    impl BlobStore for AcceptingStore {
        async fn upload(&self, _key: &str, local_path: &Path) -> Result<()> {
            assert!(local_path.exists(), "upload must see the archive on disk");
            Ok(())
        }
        async fn download(&self, _key: &str, destination: &Path) -> Result<PathBuf> {
            Ok(destination.to_path_buf())
        }
        async fn list_all(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn delete_all(&self) -> Result<usize> {
            Ok(0)
        }
    }

    struct RefusingStore;

    impl BlobStore for RefusingStore {
        async fn upload(&self, _key: &str, _local_path: &Path) -> Result<()> {
            anyhow::bail!("upload refused")
        }
        async fn download(&self, _key: &str, destination: &Path) -> Result<PathBuf> {
            Ok(destination.to_path_buf())
        }
        async fn list_all(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn delete_all(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_names_are_a_pure_function_of_the_timestamp() {
        assert_eq!(
            dump_dir_name("2024-01-01-00-00"),
            "backup_mongo_2024-01-01-00-00"
        );
        assert_eq!(
            archive_name("2024-01-01-00-00"),
            "backup_mongo_2024-01-01-00-00.tgz"
        );
        // Same stamp, same key; distinct stamps never collide.
        assert_eq!(archive_name("2024-01-01-00-00"), archive_name("2024-01-01-00-00"));
        assert_ne!(archive_name("2024-01-01-00-00"), archive_name("2024-01-01-00-01"));
    }

    #[test]
    fn test_run_timestamp_is_minute_resolution() {
        let stamp = run_timestamp();
        // YYYY-MM-DD-HH-MM
        assert_eq!(stamp.len(), 16);
        assert_eq!(stamp.matches('-').count(), 4);
    }

    #[tokio::test]
    async fn test_successful_upload_removes_local_files() -> Result<()> {
        let workspace = tempfile::tempdir()?;
        let dump_dir = workspace.path().join("backup_mongo_2024-01-01-00-00");
        fs::create_dir_all(&dump_dir)?;
        fs::write(dump_dir.join("a.bson"), b"a")?;
        let archive_path = workspace.path().join("backup_mongo_2024-01-01-00-00.tgz");
        fs::write(&archive_path, b"archive")?;

        upload_and_cleanup(
            &AcceptingStore,
            "backup_mongo_2024-01-01-00-00.tgz",
            &archive_path,
            &dump_dir,
        )
        .await?;

        assert!(!dump_dir.exists());
        assert!(!archive_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_local_files_on_disk() -> Result<()> {
        let workspace = tempfile::tempdir()?;
        let dump_dir = workspace.path().join("backup_mongo_2024-01-01-00-00");
        fs::create_dir_all(&dump_dir)?;
        fs::write(dump_dir.join("a.bson"), b"a")?;
        let archive_path = workspace.path().join("backup_mongo_2024-01-01-00-00.tgz");
        fs::write(&archive_path, b"archive")?;

        let result = upload_and_cleanup(
            &RefusingStore,
            "backup_mongo_2024-01-01-00-00.tgz",
            &archive_path,
            &dump_dir,
        )
        .await;

        assert!(result.is_err());
        assert!(dump_dir.exists());
        assert!(archive_path.exists());
        Ok(())
    }
}
