//! Scratch folder cleanup

use std::path::Path;
use tracing::warn;

use crate::error::OperationError;
use crate::outcome::{Outcome, Step};

/// Recursively delete a scratch folder
///
/// Best effort: a failure is logged and reported, never escalated. A folder
/// that is already gone is a skip.
pub async fn remove(scratch: &Path) -> Outcome {
    let subject = scratch.display().to_string();

    if !scratch.exists() {
        return Outcome::skipped(Step::Cleanup, subject, "not present");
    }

    match tokio::fs::remove_dir_all(scratch).await {
        Ok(()) => Outcome::ok(Step::Cleanup, subject),
        Err(e) => {
            let error = OperationError::io(scratch, e);
            warn!("Failed to remove scratch folder: {}", error.chain());
            Outcome::failed(Step::Cleanup, subject, &error)
        }
    }
}
