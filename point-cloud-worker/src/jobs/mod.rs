//! Job handlers. Each owns a scratch directory that is removed on every exit path.

pub mod chunking;
pub mod compare;
pub mod preprocess;

use crate::error::JobResult;
use tempfile::TempDir;

/// Scratch directory for one job
fn scratch_dir(prefix: &str) -> JobResult<TempDir> {
    Ok(tempfile::Builder::new().prefix(prefix).tempdir()?)
}
