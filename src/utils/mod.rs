pub mod log;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Finds the mongodump executable in the system PATH.
pub fn find_mongodump() -> Result<PathBuf> {
    which("mongodump").context("mongodump executable not found in PATH. Please ensure MongoDB database tools are installed and in your PATH.")
}

/// Finds the mongorestore executable in the system PATH.
pub fn find_mongorestore() -> Result<PathBuf> {
    which("mongorestore").context("mongorestore executable not found in PATH. Please ensure MongoDB database tools are installed and in your PATH.")
}
