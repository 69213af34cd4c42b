/// Docker runtime integration
///
/// Container and volume introspection goes through the bollard API. The
/// archiver, extractor and gzip integrity check run as one-shot
/// `docker run --rm` helper containers so that all volume reads and
/// writes happen through the daemon, never through this process.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bollard::container::{ListContainersOptions, StartContainerOptions, StopContainerOptions};
use bollard::models::MountPointTypeEnum;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use colored::Colorize;

/// Image used for the tar/gzip helper containers.
pub const HELPER_IMAGE: &str = "alpine:3.19";

/// Seconds a dependent container gets to stop gracefully.
const STOP_TIMEOUT_SECS: i64 = 30;

/// Everything the backup and restore flows need from the container
/// runtime. Production uses [`DockerRuntime`]; tests substitute fakes.
#[async_trait]
pub trait VolumeRuntime: Send + Sync {
    /// Names of volumes mounted by at least one running container.
    async fn running_volume_names(&self) -> Result<BTreeSet<String>>;

    async fn volume_exists(&self, name: &str) -> Result<bool>;

    /// Containers (any state) referencing the volume, in daemon order.
    async fn containers_using_volume(&self, name: &str) -> Result<Vec<String>>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn create_volume(&self, name: &str) -> Result<()>;

    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Compress the volume's contents into `{backup_dir}/{file_name}`.
    /// Returns the archiver's exit code; the volume is mounted read-only.
    async fn archive_volume(&self, volume: &str, backup_dir: &Path, file_name: &str)
        -> Result<i64>;

    /// Extract `{backup_dir}/{file_name}` into the (empty) volume.
    async fn extract_archive(&self, volume: &str, backup_dir: &Path, file_name: &str)
        -> Result<i64>;

    /// Structural gzip check of `{backup_dir}/{file_name}`, independent of
    /// the archiver invocation that produced it.
    async fn verify_archive(&self, backup_dir: &Path, file_name: &str) -> Result<i64>;
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker })
    }

    /// Run the helper image with the given `docker run --rm` arguments and
    /// return the exit code. Spawn failures and signal deaths are
    /// transport errors, not archiver verdicts.
    async fn run_helper(&self, args: &[String]) -> Result<i64> {
        let output = tokio::process::Command::new("docker")
            .arg("run")
            .arg("--rm")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute docker run")?;

        let code = output
            .status
            .code()
            .map(i64::from)
            .ok_or_else(|| anyhow!("helper container terminated by signal"))?;

        if code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                eprintln!("{}", stderr.dimmed());
            }
        }

        Ok(code)
    }

    fn mount_arg(host: &Path, container: &str) -> String {
        format!("{}:{}", host.display(), container)
    }

    fn primary_name(names: Option<&Vec<String>>, id: Option<&String>) -> Option<String> {
        names
            .and_then(|names| names.first())
            .map(|n| n.trim_start_matches('/').to_string())
            .or_else(|| id.cloned())
    }
}

#[async_trait]
impl VolumeRuntime for DockerRuntime {
    async fn running_volume_names(&self) -> Result<BTreeSet<String>> {
        let options = Some(ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        });

        let containers = self
            .docker
            .list_containers(options)
            .await
            .context("Failed to list running containers")?;

        let mut volumes = BTreeSet::new();
        for container in containers {
            for mount in container.mounts.unwrap_or_default() {
                if mount.typ == Some(MountPointTypeEnum::VOLUME) {
                    if let Some(name) = mount.name {
                        volumes.insert(name);
                    }
                }
            }
        }

        Ok(volumes)
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to inspect volume '{}'", name)),
        }
    }

    async fn containers_using_volume(&self, name: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("volume".to_string(), vec![name.to_string()]);

        let options = Some(ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        });

        let containers = self
            .docker
            .list_containers(options)
            .await
            .with_context(|| format!("Failed to list containers using volume '{}'", name))?;

        Ok(containers
            .iter()
            .filter_map(|c| Self::primary_name(c.names.as_ref(), c.id.as_ref()))
            .collect())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
            .with_context(|| format!("Failed to stop container '{}'", id))?;
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("Failed to start container '{}'", id))?;
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to create volume '{}'", name))?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: false }))
            .await
            .with_context(|| format!("Failed to remove volume '{}'", name))?;
        Ok(())
    }

    async fn archive_volume(
        &self,
        volume: &str,
        backup_dir: &Path,
        file_name: &str,
    ) -> Result<i64> {
        let args = vec![
            "-v".to_string(),
            format!("{}:/source:ro", volume),
            "-v".to_string(),
            Self::mount_arg(backup_dir, "/backup"),
            HELPER_IMAGE.to_string(),
            "tar".to_string(),
            "czf".to_string(),
            format!("/backup/{}", file_name),
            "-C".to_string(),
            "/source".to_string(),
            ".".to_string(),
        ];
        self.run_helper(&args).await
    }

    async fn extract_archive(
        &self,
        volume: &str,
        backup_dir: &Path,
        file_name: &str,
    ) -> Result<i64> {
        let args = vec![
            "-v".to_string(),
            format!("{}:/target", volume),
            "-v".to_string(),
            format!("{}:/backup:ro", backup_dir.display()),
            HELPER_IMAGE.to_string(),
            "tar".to_string(),
            "xzf".to_string(),
            format!("/backup/{}", file_name),
            "-C".to_string(),
            "/target".to_string(),
        ];
        self.run_helper(&args).await
    }

    async fn verify_archive(&self, backup_dir: &Path, file_name: &str) -> Result<i64> {
        let args = vec![
            "-v".to_string(),
            format!("{}:/backup:ro", backup_dir.display()),
            HELPER_IMAGE.to_string(),
            "gzip".to_string(),
            "-t".to_string(),
            format!("/backup/{}", file_name),
        ];
        self.run_helper(&args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_name_trims_leading_slash() {
        let names = vec!["/web".to_string(), "/alias".to_string()];
        let id = "abc123".to_string();
        assert_eq!(
            DockerRuntime::primary_name(Some(&names), Some(&id)),
            Some("web".to_string())
        );
        assert_eq!(
            DockerRuntime::primary_name(None, Some(&id)),
            Some("abc123".to_string())
        );
        assert_eq!(DockerRuntime::primary_name(None, None), None);
    }

    #[test]
    fn test_mount_arg() {
        assert_eq!(
            DockerRuntime::mount_arg(Path::new("/backups/app"), "/backup"),
            "/backups/app:/backup"
        );
    }
}
