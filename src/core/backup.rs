/// Backup orchestration
///
/// Drives the end-to-end backup of a volume: archive directory and name
/// resolution, the containerized archiver, post-write integrity
/// verification, and rotation. A failed or corrupt archive is deleted
/// before the error is reported, so a backup run never leaves a truncated
/// file behind as if it were usable.

use std::fs;
use std::path::Path;

use chrono::Local;
use colored::Colorize;

use crate::core::config::BackupConfig;
use crate::core::docker::VolumeRuntime;
use crate::core::error::BackupError;
use crate::core::naming::{archive_dir, archive_file_name, write_volume_marker, Archive,
                          TIMESTAMP_FORMAT};
use crate::core::rotation::rotate;

pub struct BackupRunner<'a, R: VolumeRuntime> {
    runtime: &'a R,
    config: &'a BackupConfig,
}

/// Outcome of a batch backup. The batch succeeds only if no volume failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<Archive>,
    pub failed: Vec<(String, BackupError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, volume: &str, result: Result<Archive, BackupError>) {
        match result {
            Ok(archive) => self.succeeded.push(archive),
            Err(e) => self.failed.push((volume.to_string(), e)),
        }
    }

    pub fn failed_volume_names(&self) -> Vec<&str> {
        self.failed.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl<'a, R: VolumeRuntime> BackupRunner<'a, R> {
    pub fn new(runtime: &'a R, config: &'a BackupConfig) -> Self {
        Self { runtime, config }
    }

    /// Back up a single volume and rotate its archive set.
    pub async fn backup_volume(&self, volume: &str) -> Result<Archive, BackupError> {
        let dir = archive_dir(&self.config.backup_directory, volume)?;
        fs::create_dir_all(&dir).map_err(|source| BackupError::Path {
            path: dir.clone(),
            source,
        })?;
        write_volume_marker(&dir, volume)?;

        // The helper container needs an absolute host path to mount.
        let mount_dir = fs::canonicalize(&dir).map_err(|source| BackupError::Path {
            path: dir.clone(),
            source,
        })?;

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let file_name = archive_file_name(volume, &timestamp);
        let path = mount_dir.join(&file_name);

        let code = self
            .runtime
            .archive_volume(volume, &mount_dir, &file_name)
            .await?;
        if code != 0 {
            remove_leftover(&path);
            return Err(BackupError::Archive {
                volume: volume.to_string(),
                code,
            });
        }

        let code = self.runtime.verify_archive(&mount_dir, &file_name).await?;
        if code != 0 {
            remove_leftover(&path);
            return Err(BackupError::CorruptArchive { path });
        }

        let keep = self.config.resolve_retention(volume);
        rotate(&self.config.backup_directory, volume, keep)?;

        Ok(Archive {
            volume_name: volume.to_string(),
            timestamp,
            path,
        })
    }

    /// Back up each volume in turn. One volume's failure never aborts the
    /// rest; the report aggregates both outcomes.
    pub async fn backup_all(&self, volumes: &[String]) -> BatchReport {
        let mut report = BatchReport::default();
        for volume in volumes {
            let result = self.backup_volume(volume).await;
            report.record(volume, result);
        }
        report
    }
}

/// Delete a failed or corrupt archive; it must never stay on disk.
fn remove_leftover(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            eprintln!(
                "{} failed to remove incomplete archive {}: {}",
                "warning:".yellow(),
                path.display(),
                e
            );
        }
    }
}
