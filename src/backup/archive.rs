// opstool/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Packs `dump_dir` into a gzip-compressed tar at `archive_dest_path`.
///
/// Entries are stored under the dump directory's own name, so extracting
/// the archive reproduces `backup_mongo_<timestamp>/...` with one dump
/// subdirectory per collection. No checksum is computed.
pub fn create_tgz_archive(dump_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !dump_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Source for archival is not a directory: {}",
            dump_dir.display()
        ));
    }
    let top_level = dump_dir
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Dump directory has no usable name: {}", dump_dir.display()))?;

    if let Some(parent) = archive_dest_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create parent directory for archive: {}",
                    parent.display()
                )
            })?;
        }
    }

    println!(
        "Creating archive {} from {}",
        archive_dest_path.display(),
        dump_dir.display()
    );

    let archive_file = File::create(archive_dest_path).with_context(|| {
        format!(
            "Failed to create archive file: {}",
            archive_dest_path.display()
        )
    })?;
    let encoder = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    for entry in WalkDir::new(dump_dir) {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", dump_dir.display()))?;
        let path = entry.path();
        let relative = path.strip_prefix(dump_dir).with_context(|| {
            format!(
                "Failed to strip prefix {} from {}",
                dump_dir.display(),
                path.display()
            )
        })?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let name = Path::new(top_level).join(relative);
        if path.is_dir() {
            tar_builder.append_dir(&name, path).with_context(|| {
                format!("Failed to append directory {} to archive", path.display())
            })?;
        } else if path.is_file() {
            tar_builder
                .append_path_with_name(path, &name)
                .with_context(|| {
                    format!(
                        "Failed to append file {} as {} to archive",
                        path.display(),
                        name.display()
                    )
                })?;
        }
    }

    let encoder = tar_builder.into_inner().with_context(|| {
        format!(
            "Failed to finalize tar stream for archive: {}",
            archive_dest_path.display()
        )
    })?;
    encoder.finish().with_context(|| {
        format!(
            "Failed to finish gzip encoding for archive: {}",
            archive_dest_path.display()
        )
    })?;

    println!("✓ Archive created at {}", archive_dest_path.display());
    Ok(archive_dest_path.to_path_buf())
}

/// Extracts a gzip-compressed tar archive into `extract_to_dir`.
pub fn extract_tgz_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(anyhow::anyhow!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        ));
    }
    if !extract_to_dir.exists() {
        std::fs::create_dir_all(extract_to_dir).with_context(|| {
            format!(
                "Failed to create extraction directory: {}",
                extract_to_dir.display()
            )
        })?;
    } else if !extract_to_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Extraction path exists but is not a directory: {}",
            extract_to_dir.display()
        ));
    }

    println!(
        "Extracting {} to {}",
        archive_path.display(),
        extract_to_dir.display()
    );

    let archive_file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive file: {}", archive_path.display()))?;
    let gz_decoder = flate2::read::GzDecoder::new(archive_file);
    let mut archive = tar::Archive::new(gz_decoder);
    archive.unpack(extract_to_dir).with_context(|| {
        format!(
            "Failed to unpack archive {} to {}",
            archive_path.display(),
            extract_to_dir.display()
        )
    })?;

    println!("✓ Archive extracted to {}", extract_to_dir.display());
    Ok(extract_to_dir.to_path_buf())
}
