/// Retention (rotation) engine
///
/// After every successful backup the volume's archive set is pruned down
/// to the newest N files. Selection is a pure function over the
/// newest-first listing; deletion failures are isolated per file.

use std::fs;
use std::path::Path;

use colored::Colorize;

use crate::core::error::BackupError;
use crate::core::naming::{list_archives, Archive};

/// Everything past the `keep` newest archives, given a newest-first slice.
///
/// `keep == 0` is clamped to 1 so rotation can never wipe a volume's
/// entire history.
pub fn select_for_deletion(archives: &[Archive], keep: u32) -> &[Archive] {
    let keep = keep.max(1) as usize;
    if archives.len() <= keep {
        &[]
    } else {
        &archives[keep..]
    }
}

/// Prune a volume's archives down to the `keep` newest.
///
/// Each deletion is attempted independently; a failed unlink is reported
/// and does not stop the rest of the pass. Returns the number of archives
/// actually deleted.
pub fn rotate(root: &Path, volume: &str, keep: u32) -> Result<usize, BackupError> {
    if keep == 0 {
        eprintln!(
            "{} retention count 0 for volume '{}', keeping 1 archive",
            "warning:".yellow(),
            volume
        );
    }

    let archives = list_archives(root, volume)?;

    let mut deleted = 0;
    for archive in select_for_deletion(&archives, keep) {
        match fs::remove_file(&archive.path) {
            Ok(()) => deleted += 1,
            Err(e) => eprintln!(
                "{} failed to delete {}: {}",
                "warning:".yellow(),
                archive.path.display(),
                e
            ),
        }
    }

    Ok(deleted)
}
