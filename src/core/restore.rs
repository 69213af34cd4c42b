/// Restore coordination
///
/// Replacing a live volume is a multi-step, failure-sensitive sequence:
/// stop the containers that use it, remove and recreate the volume, then
/// extract the chosen archive into it. Every destructive transition is
/// gated on operator confirmation, and only containers stopped by this
/// session are ever restarted by it. If extraction fails the dependents
/// are left stopped on purpose: restarting them onto an empty or
/// half-written volume would be worse than making the operator decide.

use anyhow::anyhow;
use colored::Colorize;

use crate::core::docker::VolumeRuntime;
use crate::core::error::{BackupError, RestorePhase};
use crate::core::naming::Archive;

/// Operator confirmation for destructive steps. Production reads stdin;
/// tests substitute a mock so the state machine runs without a terminal.
#[cfg_attr(test, mockall::automock)]
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// How a restore session ended. Cancellation is an operator decision, not
/// a fault, and leaves volumes and containers untouched.
#[derive(Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    Done { restarted: Vec<String> },
    Cancelled,
}

pub struct RestoreCoordinator<'a, R: VolumeRuntime> {
    runtime: &'a R,
}

impl<'a, R: VolumeRuntime> RestoreCoordinator<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Restore `volume` from `archive`.
    ///
    /// Walks: archive check, volume existence, dependent enumeration,
    /// confirmation, stop, remove, create, extract, restart. The
    /// restarted set is exactly the set this session stopped.
    pub async fn restore(
        &self,
        volume: &str,
        archive: &Archive,
        confirm: &mut dyn Confirm,
    ) -> Result<RestoreOutcome, BackupError> {
        if !archive.path.is_file() {
            return Err(BackupError::ArchiveNotFound {
                path: archive.path.clone(),
            });
        }
        let backup_dir = archive
            .path
            .parent()
            .map(std::fs::canonicalize)
            .transpose()
            .map_err(|source| BackupError::Path {
                path: archive.path.clone(),
                source,
            })?
            .ok_or_else(|| BackupError::ArchiveNotFound {
                path: archive.path.clone(),
            })?;
        let file_name = archive.file_name();

        let prior_volume_existed = self.runtime.volume_exists(volume).await?;

        let mut stopped: Vec<String> = Vec::new();
        if prior_volume_existed {
            let dependents = self.runtime.containers_using_volume(volume).await?;

            if dependents.is_empty() {
                let prompt = format!(
                    "Volume '{}' exists and is not in use. Remove it and restore from {}?",
                    volume, file_name
                );
                if !confirm.confirm(&prompt) {
                    return Ok(RestoreOutcome::Cancelled);
                }
            } else {
                let prompt = format!(
                    "Volume '{}' is used by {} container(s): {}. Stop them and replace the volume?",
                    volume,
                    dependents.len(),
                    dependents.join(", ")
                );
                if !confirm.confirm(&prompt) {
                    return Ok(RestoreOutcome::Cancelled);
                }

                for container in &dependents {
                    self.runtime.stop_container(container).await.map_err(|source| {
                        BackupError::RestoreFailed {
                            volume: volume.to_string(),
                            phase: RestorePhase::Stopping,
                            source,
                        }
                    })?;
                    stopped.push(container.clone());
                }
            }

            self.runtime
                .remove_volume(volume)
                .await
                .map_err(|source| BackupError::RestoreFailed {
                    volume: volume.to_string(),
                    phase: RestorePhase::Removing,
                    source,
                })?;
        }

        self.runtime
            .create_volume(volume)
            .await
            .map_err(|source| BackupError::RestoreFailed {
                volume: volume.to_string(),
                phase: RestorePhase::Creating,
                source,
            })?;

        let code = self
            .runtime
            .extract_archive(volume, &backup_dir, &file_name)
            .await?;
        if code != 0 {
            if !stopped.is_empty() {
                eprintln!(
                    "{} extraction failed; containers left stopped for inspection: {}",
                    "warning:".yellow(),
                    stopped.join(", ")
                );
            }
            return Err(BackupError::RestoreFailed {
                volume: volume.to_string(),
                phase: RestorePhase::Extracting,
                source: anyhow!("extractor exited with code {}", code),
            });
        }

        let mut failed_starts = 0;
        for container in &stopped {
            if let Err(e) = self.runtime.start_container(container).await {
                eprintln!(
                    "{} failed to restart container '{}': {:#}",
                    "warning:".yellow(),
                    container,
                    e
                );
                failed_starts += 1;
            }
        }
        if failed_starts > 0 {
            return Err(BackupError::RestoreFailed {
                volume: volume.to_string(),
                phase: RestorePhase::Restarting,
                source: anyhow!("{} container(s) failed to restart", failed_starts),
            });
        }

        Ok(RestoreOutcome::Done { restarted: stopped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashSet};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every runtime call so tests can assert exactly which
    /// mutations a session performed, and in what order.
    struct FakeRuntime {
        exists: bool,
        dependents: Vec<String>,
        extract_exit: i64,
        fail_remove: bool,
        fail_starts: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        fn new(exists: bool, dependents: &[&str]) -> Self {
            Self {
                exists,
                dependents: dependents.iter().map(|s| s.to_string()).collect(),
                extract_exit: 0,
                fail_remove: false,
                fail_starts: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_matching(&self, prefix: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with(prefix))
                .collect()
        }
    }

    #[async_trait]
    impl VolumeRuntime for FakeRuntime {
        async fn running_volume_names(&self) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }

        async fn volume_exists(&self, _name: &str) -> Result<bool> {
            self.log("exists");
            Ok(self.exists)
        }

        async fn containers_using_volume(&self, _name: &str) -> Result<Vec<String>> {
            self.log("dependents");
            Ok(self.dependents.clone())
        }

        async fn stop_container(&self, id: &str) -> Result<()> {
            self.log(format!("stop:{}", id));
            Ok(())
        }

        async fn start_container(&self, id: &str) -> Result<()> {
            self.log(format!("start:{}", id));
            if self.fail_starts.contains(id) {
                bail!("no such container");
            }
            Ok(())
        }

        async fn create_volume(&self, name: &str) -> Result<()> {
            self.log(format!("create:{}", name));
            Ok(())
        }

        async fn remove_volume(&self, name: &str) -> Result<()> {
            self.log(format!("remove:{}", name));
            if self.fail_remove {
                bail!("volume is in use");
            }
            Ok(())
        }

        async fn archive_volume(
            &self,
            _volume: &str,
            _backup_dir: &Path,
            _file_name: &str,
        ) -> Result<i64> {
            unimplemented!("not used by restore")
        }

        async fn extract_archive(
            &self,
            volume: &str,
            _backup_dir: &Path,
            _file_name: &str,
        ) -> Result<i64> {
            self.log(format!("extract:{}", volume));
            Ok(self.extract_exit)
        }

        async fn verify_archive(&self, _backup_dir: &Path, _file_name: &str) -> Result<i64> {
            unimplemented!("not used by restore")
        }
    }

    fn archive_on_disk(dir: &TempDir, volume: &str) -> Archive {
        let timestamp = "20260101_120000".to_string();
        let path = dir
            .path()
            .join(format!("{}_{}.tar.gz", volume, timestamp));
        fs::write(&path, b"fake tar stream").unwrap();
        Archive {
            volume_name: volume.to_string(),
            timestamp,
            path,
        }
    }

    fn always_yes() -> MockConfirm {
        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().returning(|_| true);
        confirm
    }

    #[tokio::test]
    async fn test_missing_archive_fails_without_touching_runtime() {
        let runtime = FakeRuntime::new(true, &["a"]);
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = Archive {
            volume_name: "db".to_string(),
            timestamp: "20260101_120000".to_string(),
            path: PathBuf::from("/nonexistent/db_20260101_120000.tar.gz"),
        };

        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().never();

        let err = coordinator
            .restore("db", &archive, &mut confirm)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ArchiveNotFound { .. }));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_with_dependents_restarts_exactly_the_stopped_set() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new(true, &["A", "B"]);
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "db");

        let outcome = coordinator
            .restore("db", &archive, &mut always_yes())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RestoreOutcome::Done {
                restarted: vec!["A".to_string(), "B".to_string()]
            }
        );
        assert_eq!(runtime.calls_matching("stop:"), vec!["stop:A", "stop:B"]);
        assert_eq!(runtime.calls_matching("start:"), vec!["start:A", "start:B"]);
        assert_eq!(
            runtime.calls(),
            vec![
                "exists",
                "dependents",
                "stop:A",
                "stop:B",
                "remove:db",
                "create:db",
                "extract:db",
                "start:A",
                "start:B"
            ]
        );
    }

    #[tokio::test]
    async fn test_restore_without_dependents_never_stops_or_starts() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new(true, &[]);
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "db");

        let outcome = coordinator
            .restore("db", &archive, &mut always_yes())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RestoreOutcome::Done {
                restarted: Vec::new()
            }
        );
        assert!(runtime.calls_matching("stop:").is_empty());
        assert!(runtime.calls_matching("start:").is_empty());
    }

    #[tokio::test]
    async fn test_declined_confirmation_cancels_without_mutation() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new(true, &["A"]);
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "db");

        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().times(1).returning(|_| false);

        let outcome = coordinator
            .restore("db", &archive, &mut confirm)
            .await
            .unwrap();

        assert_eq!(outcome, RestoreOutcome::Cancelled);
        assert_eq!(runtime.calls(), vec!["exists", "dependents"]);
    }

    #[tokio::test]
    async fn test_absent_volume_skips_confirmation_and_removal() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new(false, &[]);
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "fresh");

        let mut confirm = MockConfirm::new();
        confirm.expect_confirm().never();

        let outcome = coordinator
            .restore("fresh", &archive, &mut confirm)
            .await
            .unwrap();

        assert!(matches!(outcome, RestoreOutcome::Done { .. }));
        assert_eq!(runtime.calls(), vec!["exists", "create:fresh", "extract:fresh"]);
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_dependents_stopped() {
        let dir = TempDir::new().unwrap();
        let mut runtime = FakeRuntime::new(true, &["A", "B"]);
        runtime.extract_exit = 1;
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "db");

        let err = coordinator
            .restore("db", &archive, &mut always_yes())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BackupError::RestoreFailed {
                phase: RestorePhase::Extracting,
                ..
            }
        ));
        assert_eq!(runtime.calls_matching("stop:"), vec!["stop:A", "stop:B"]);
        assert!(runtime.calls_matching("start:").is_empty());
    }

    #[tokio::test]
    async fn test_failed_removal_aborts_before_extraction() {
        let dir = TempDir::new().unwrap();
        let mut runtime = FakeRuntime::new(true, &[]);
        runtime.fail_remove = true;
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "db");

        let err = coordinator
            .restore("db", &archive, &mut always_yes())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BackupError::RestoreFailed {
                phase: RestorePhase::Removing,
                ..
            }
        ));
        assert!(runtime.calls_matching("create:").is_empty());
        assert!(runtime.calls_matching("extract:").is_empty());
    }

    #[tokio::test]
    async fn test_restart_failure_is_surfaced_after_all_attempts() {
        let dir = TempDir::new().unwrap();
        let mut runtime = FakeRuntime::new(true, &["A", "B"]);
        runtime.fail_starts.insert("A".to_string());
        let coordinator = RestoreCoordinator::new(&runtime);
        let archive = archive_on_disk(&dir, "db");

        let err = coordinator
            .restore("db", &archive, &mut always_yes())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BackupError::RestoreFailed {
                phase: RestorePhase::Restarting,
                ..
            }
        ));
        // Every stopped container still got a start attempt.
        assert_eq!(runtime.calls_matching("start:"), vec!["start:A", "start:B"]);
    }
}
