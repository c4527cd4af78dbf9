// opstool/src/storage/mod.rs
use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::StorageConfig;

/// Key-addressed blob storage used as the backup destination. A flat
/// namespace: the archive filename is the whole identity of an object.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Stores the file contents under `key`, silently overwriting any
    /// object already there.
    async fn upload(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Fetches the object to a local path. Fails if the key is absent.
    async fn download(&self, key: &str, destination: &Path) -> Result<PathBuf>;

    /// Every key currently in the store.
    async fn list_all(&self) -> Result<Vec<String>>;

    /// Deletes every object returned by `list_all()` at call time. Not
    /// transactional with respect to concurrent writers. Returns the
    /// number of objects deleted.
    async fn delete_all(&self) -> Result<usize>;
}

/// Client for an S3-compatible object storage service (AWS S3 or
/// DigitalOcean Spaces via `endpoint_url`).
pub struct S3Store {
    client: s3::Client,
    bucket: String,
}

impl S3Store {
    /// Builds a client from explicit credentials. Nothing is read from
    /// ambient AWS configuration.
    pub async fn connect(storage_config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(storage_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &storage_config.access_key_id,
                &storage_config.secret_access_key,
                None,
                None,
                "Static",
            ));
        if let Some(endpoint) = &storage_config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        S3Store {
            client: s3::Client::new(&sdk_config),
            bucket: storage_config.bucket_name.clone(),
        }
    }
}

impl BlobStore for S3Store {
    async fn upload(&self, key: &str, local_path: &Path) -> Result<()> {
        println!(
            "Uploading {} to bucket {} with key {}",
            local_path.display(),
            self.bucket,
            key
        );

        let body = ByteStream::from_path(local_path).await.with_context(|| {
            format!(
                "Failed to read upload source file: {}",
                local_path.display()
            )
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload {} to bucket {} with key {}",
                    local_path.display(),
                    self.bucket,
                    key
                )
            })?;

        println!("✓ Uploaded {} as {}", local_path.display(), key);
        Ok(())
    }

    async fn download(&self, key: &str, destination: &Path) -> Result<PathBuf> {
        println!(
            "Downloading {} from bucket {} to {}",
            key,
            self.bucket,
            destination.display()
        );

        if let Some(parent_dir) = destination.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                tokio::fs::create_dir_all(parent_dir).await.with_context(|| {
                    format!(
                        "Failed to create directory for download: {}",
                        parent_dir.display()
                    )
                })?;
            }
        }

        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get object {} from bucket {}", key, self.bucket))?;

        let mut output_file = File::create(destination).await.with_context(|| {
            format!(
                "Failed to create destination file: {}",
                destination.display()
            )
        })?;

        let mut total_bytes = 0;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .with_context(|| format!("Failed while reading object {} from the store", key))?
        {
            output_file.write_all(&chunk).await.with_context(|| {
                format!(
                    "Failed to write to destination file: {}",
                    destination.display()
                )
            })?;
            total_bytes += chunk.len();
        }

        println!("✓ Downloaded {} bytes from {}", total_bytes, key);
        Ok(destination.to_path_buf())
    }

    async fn list_all(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page
                .with_context(|| format!("Failed to list objects in bucket {}", self.bucket))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn delete_all(&self) -> Result<usize> {
        let keys = self.list_all().await?;
        for key in &keys {
            println!("deleting {}", key);
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to delete object {} from bucket {}", key, self.bucket)
                })?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;

    /// In-memory stand-in used to pin down the store contract without a
    /// bucket: flat key namespace, silent overwrite, NotFound on missing
    /// keys.
    struct MemStore {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MemStore {
        fn new() -> Self {
            MemStore {
                objects: Mutex::new(BTreeMap::new()),
            }
        }
    }

    impl BlobStore for MemStore {
        async fn upload(&self, key: &str, local_path: &Path) -> Result<()> {
            let data = fs::read(local_path)?;
            self.objects
                .lock()
                .expect("store lock")
                .insert(key.to_string(), data);
            Ok(())
        }

        async fn download(&self, key: &str, destination: &Path) -> Result<PathBuf> {
            let objects = self.objects.lock().expect("store lock");
            let data = objects
                .get(key)
                .with_context(|| format!("NotFound: no object with key {}", key))?;
            fs::write(destination, data)?;
            Ok(destination.to_path_buf())
        }

        async fn list_all(&self) -> Result<Vec<String>> {
            Ok(self
                .objects
                .lock()
                .expect("store lock")
                .keys()
                .cloned()
                .collect())
        }

        async fn delete_all(&self) -> Result<usize> {
            let mut objects = self.objects.lock().expect("store lock");
            let count = objects.len();
            objects.clear();
            Ok(count)
        }
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trips_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("backup_mongo_2024-01-01-00-00.tgz");
        fs::write(&source, b"archive bytes")?;

        let store = MemStore::new();
        store
            .upload("backup_mongo_2024-01-01-00-00.tgz", &source)
            .await?;

        let fetched = dir.path().join("fetched.tgz");
        store
            .download("backup_mongo_2024-01-01-00-00.tgz", &fetched)
            .await?;
        assert_eq!(fs::read(&fetched)?, b"archive bytes");
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_key() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first.tgz");
        let second = dir.path().join("second.tgz");
        fs::write(&first, b"first run")?;
        fs::write(&second, b"second run")?;

        let store = MemStore::new();
        store.upload("backup_mongo_2024-01-01-00-00.tgz", &first).await?;
        store.upload("backup_mongo_2024-01-01-00-00.tgz", &second).await?;

        let fetched = dir.path().join("fetched.tgz");
        store
            .download("backup_mongo_2024-01-01-00-00.tgz", &fetched)
            .await?;
        assert_eq!(fs::read(&fetched)?, b"second run");
        assert_eq!(store.list_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_missing_key_fails() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = MemStore::new();
        let result = store
            .download("backup_mongo_1999-12-31-23-59.tgz", &dir.path().join("x.tgz"))
            .await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_all_leaves_store_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = MemStore::new();
        for stamp in ["2024-01-01-00-00", "2024-01-02-00-00", "2024-01-03-00-00"] {
            let path = dir.path().join(format!("backup_mongo_{}.tgz", stamp));
            fs::write(&path, stamp.as_bytes())?;
            store
                .upload(&format!("backup_mongo_{}.tgz", stamp), &path)
                .await?;
        }
        assert_eq!(store.list_all().await?.len(), 3);

        let deleted = store.delete_all().await?;
        assert_eq!(deleted, 3);
        assert!(store.list_all().await?.is_empty());
        Ok(())
    }
}
