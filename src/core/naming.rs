/// Archive naming and discovery
///
/// Volume names are runtime-assigned and may contain characters that are
/// unsafe in paths, so each volume gets a sanitized directory under the
/// backup root. Archive files are named `{volume}_{timestamp}.tar.gz` with
/// a fixed-width timestamp, which makes lexicographic order chronological.
/// A `volume.json` marker in each directory records the original volume
/// name so restore discovery does not have to guess it back from the
/// sanitized directory name.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::BackupError;

/// Fixed-width timestamp used in archive file names, e.g. `20260806_142501`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Marker file recording the original volume name of an archive directory.
pub const MARKER_FILE: &str = "volume.json";

/// A single on-disk archive of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub volume_name: String,
    pub timestamp: String,
    pub path: PathBuf,
}

impl Archive {
    pub fn file_name(&self) -> String {
        archive_file_name(&self.volume_name, &self.timestamp)
    }
}

/// An archive directory found under the backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDirEntry {
    pub dir_name: String,
    pub volume_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VolumeMarker {
    name: String,
}

/// Map a volume name to a filesystem-safe directory name.
///
/// Path separators become underscores, everything that is not
/// alphanumeric, underscore or hyphen is stripped. Names that sanitize to
/// nothing are rejected rather than silently producing an empty segment.
pub fn sanitize_volume_name(name: &str) -> Result<String, BackupError> {
    let sanitized: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        return Err(BackupError::InvalidVolumeName(name.to_string()));
    }

    Ok(sanitized)
}

pub fn archive_file_name(volume: &str, timestamp: &str) -> String {
    format!("{}_{}.tar.gz", volume, timestamp)
}

/// Directory holding all archives of a volume.
pub fn archive_dir(root: &Path, volume: &str) -> Result<PathBuf, BackupError> {
    Ok(root.join(sanitize_volume_name(volume)?))
}

/// Full path an archive of `volume` taken at `timestamp` lives at.
pub fn archive_path(root: &Path, volume: &str, timestamp: &str) -> Result<PathBuf, BackupError> {
    Ok(archive_dir(root, volume)?.join(archive_file_name(volume, timestamp)))
}

/// List a volume's archives, newest first.
///
/// A missing directory means "no backups yet" and yields an empty list.
/// Files that do not match the `{volume}_{timestamp}.tar.gz` shape are
/// ignored.
pub fn list_archives(root: &Path, volume: &str) -> Result<Vec<Archive>, BackupError> {
    let dir = archive_dir(root, volume)?;

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(BackupError::Path { path: dir, source }),
    };

    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BackupError::Path {
            path: dir.clone(),
            source,
        })?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(timestamp) = parse_timestamp(file_name, volume) {
            archives.push(Archive {
                volume_name: volume.to_string(),
                timestamp,
                path: entry.path(),
            });
        }
    }

    // Fixed-width timestamps sort correctly as strings.
    archives.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(archives)
}

/// Discover archive directories under the backup root for restore.
///
/// The original volume name comes from the `volume.json` marker when
/// present; directories written before the marker existed fall back to
/// their (sanitized) directory name. Sorted by volume name.
pub fn list_archive_dirs(root: &Path) -> Result<Vec<ArchiveDirEntry>, BackupError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(BackupError::Path {
                path: root.to_path_buf(),
                source,
            })
        }
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BackupError::Path {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let dir_name = entry.file_name();
        let Some(dir_name) = dir_name.to_str() else {
            continue;
        };
        let volume_name =
            read_volume_marker(&entry.path()).unwrap_or_else(|| dir_name.to_string());
        dirs.push(ArchiveDirEntry {
            dir_name: dir_name.to_string(),
            volume_name,
        });
    }

    dirs.sort_by(|a, b| a.volume_name.cmp(&b.volume_name));

    Ok(dirs)
}

/// Record the original volume name inside its archive directory.
pub fn write_volume_marker(dir: &Path, volume: &str) -> Result<(), BackupError> {
    let marker = VolumeMarker {
        name: volume.to_string(),
    };
    let path = dir.join(MARKER_FILE);
    let contents = serde_json::to_string_pretty(&marker)
        .map_err(|e| BackupError::Runtime(anyhow::Error::new(e)))?;
    fs::write(&path, contents).map_err(|source| BackupError::Path { path, source })
}

pub fn read_volume_marker(dir: &Path) -> Option<String> {
    let contents = fs::read_to_string(dir.join(MARKER_FILE)).ok()?;
    let marker: VolumeMarker = serde_json::from_str(&contents).ok()?;
    Some(marker.name)
}

fn parse_timestamp(file_name: &str, volume: &str) -> Option<String> {
    let timestamp = file_name
        .strip_prefix(volume)?
        .strip_prefix('_')?
        .strip_suffix(".tar.gz")?;
    is_timestamp(timestamp).then(|| timestamp.to_string())
}

fn is_timestamp(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 15
        && bytes[8] == b'_'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}
