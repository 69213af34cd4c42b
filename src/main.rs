mod cli;
mod core;
mod utils;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::Cli;
use crate::core::naming::{list_archive_dirs, list_archives, sanitize_volume_name};
use crate::core::{
    BackupConfig, BackupRunner, BatchReport, DockerRuntime, RestoreCoordinator, RestoreOutcome,
    VolumeRuntime,
};
use crate::utils::{format_archive_timestamp, format_bytes, parse_selection, prompt_line,
                   TermConfirm};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BackupConfig::load_from(path)?,
        None => BackupConfig::load()?,
    };

    if cli.configure {
        return handle_configure(config, cli.config.as_deref());
    }

    let runtime = DockerRuntime::connect()?;

    if cli.restore {
        handle_restore(&runtime, &config).await
    } else if cli.interactive {
        handle_interactive(&runtime, &config).await
    } else {
        handle_silent(&runtime, &config).await
    }
}

/// Unattended backup of every configured volume.
async fn handle_silent(runtime: &DockerRuntime, config: &BackupConfig) -> Result<()> {
    let volumes: Vec<String> = config
        .configured_volumes()
        .iter()
        .map(|s| s.to_string())
        .collect();

    if volumes.is_empty() {
        println!("No volumes configured for backup. Run 'volback --configure' to add some.");
        return Ok(());
    }

    println!(
        "Backing up {} configured volume(s) to {}\n",
        volumes.len(),
        config.backup_directory.display()
    );

    let runner = BackupRunner::new(runtime, config);
    let report = runner.backup_all(&volumes).await;
    finish_batch(report)
}

/// Backup with interactive volume selection.
async fn handle_interactive(runtime: &DockerRuntime, config: &BackupConfig) -> Result<()> {
    let mut volumes: Vec<String> = runtime.running_volume_names().await?.into_iter().collect();
    for name in config.configured_volumes() {
        if !volumes.iter().any(|v| v == name) {
            volumes.push(name.to_string());
        }
    }

    if volumes.is_empty() {
        println!("No volumes are in use by running containers and none are configured.");
        return Ok(());
    }

    println!("Available volumes:\n");
    for (i, name) in volumes.iter().enumerate() {
        let suffix = if config.configured_volumes().contains(&name.as_str()) {
            format!("  (configured, keep {})", config.resolve_retention(name))
        } else {
            String::new()
        };
        println!("  {:>2}. {}{}", i + 1, name, suffix);
    }
    println!();

    let selection = loop {
        let input = prompt_line("Volumes to back up (e.g. 1,3 or 'all'):")?;
        match parse_selection(&input, volumes.len()) {
            Some(indices) => break indices,
            None => println!("Invalid selection."),
        }
    };
    let selected: Vec<String> = selection.into_iter().map(|i| volumes[i].clone()).collect();

    let runner = BackupRunner::new(runtime, config);
    let bar = ProgressBar::new(selected.len() as u64);
    let style = ProgressStyle::with_template("[{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("=>-"));

    let mut report = BatchReport::default();
    for volume in &selected {
        bar.set_message(volume.clone());
        let result = runner.backup_volume(volume).await;
        report.record(volume, result);
        bar.inc(1);
    }
    bar.finish_and_clear();

    finish_batch(report)
}

/// Interactive restore: pick a volume, pick an archive, run the
/// coordinator with stdin confirmation of the destructive steps.
async fn handle_restore(runtime: &DockerRuntime, config: &BackupConfig) -> Result<()> {
    let dirs = list_archive_dirs(&config.backup_directory)?;
    if dirs.is_empty() {
        println!("No backups found under {}.", config.backup_directory.display());
        return Ok(());
    }

    println!("Volumes with backups:\n");
    for (i, entry) in dirs.iter().enumerate() {
        let count = list_archives(&config.backup_directory, &entry.volume_name)?.len();
        println!("  {:>2}. {} ({} archive(s))", i + 1, entry.volume_name, count);
    }
    println!();

    let volume = loop {
        let input = prompt_line("Volume to restore:")?;
        match parse_selection(&input, dirs.len()) {
            Some(indices) if indices.len() == 1 => break dirs[indices[0]].volume_name.clone(),
            _ => println!("Pick a single volume number."),
        }
    };

    let archives = list_archives(&config.backup_directory, &volume)?;
    if archives.is_empty() {
        println!("No archives found for volume '{}'.", volume);
        return Ok(());
    }

    println!("\nArchives for '{}' (newest first):\n", volume);
    for (i, archive) in archives.iter().enumerate() {
        let size = fs::metadata(&archive.path).map(|m| m.len()).unwrap_or(0);
        println!(
            "  {:>2}. {}  ({})",
            i + 1,
            format_archive_timestamp(&archive.timestamp),
            format_bytes(size)
        );
    }
    println!();

    let archive = loop {
        let input = prompt_line("Archive to restore:")?;
        match parse_selection(&input, archives.len()) {
            Some(indices) if indices.len() == 1 => break &archives[indices[0]],
            _ => println!("Pick a single archive number."),
        }
    };

    let coordinator = RestoreCoordinator::new(runtime);
    match coordinator.restore(&volume, archive, &mut TermConfirm).await? {
        RestoreOutcome::Done { restarted } => {
            println!(
                "{} Volume '{}' restored from {}",
                "✓".green(),
                volume,
                archive.file_name()
            );
            if !restarted.is_empty() {
                println!("  Restarted container(s): {}", restarted.join(", "));
            }
            Ok(())
        }
        RestoreOutcome::Cancelled => {
            println!("Restore cancelled.");
            Ok(())
        }
    }
}

/// Edit and save the configuration.
fn handle_configure(mut config: BackupConfig, path: Option<&Path>) -> Result<()> {
    println!("volback configuration\n");

    let dir = prompt_line(&format!(
        "Backup directory [{}]:",
        config.backup_directory.display()
    ))?;
    if !dir.is_empty() {
        config.backup_directory = PathBuf::from(dir);
    }

    config.default_max_backups =
        prompt_keep_count("Default number of backups to keep", config.default_max_backups)?;

    loop {
        println!("\nConfigured volumes:");
        if config.volumes.is_empty() {
            println!("  (none)");
        }
        for policy in &config.volumes {
            match policy.max_backups {
                Some(keep) => println!("  {} (keep {})", policy.name, keep),
                None => println!(
                    "  {} (keep {} by default)",
                    policy.name, config.default_max_backups
                ),
            }
        }

        let name = prompt_line("\nAdd or update a volume (empty to finish):")?;
        if name.is_empty() {
            break;
        }
        if let Err(e) = sanitize_volume_name(&name) {
            println!("{} {}", "✗".red(), e);
            continue;
        }

        let keep = prompt_line(&format!(
            "  Backups to keep for '{}' [default {}]:",
            name, config.default_max_backups
        ))?;
        let max_backups = if keep.is_empty() {
            None
        } else {
            match keep.parse::<u32>() {
                Ok(k) if k >= 1 => Some(k),
                _ => {
                    println!("Keep count must be a positive integer; using the default.");
                    None
                }
            }
        };
        config.set_policy(&name, max_backups);
    }

    let saved = match path {
        Some(path) => {
            config.save_to(path)?;
            path.to_path_buf()
        }
        None => {
            config.save()?;
            BackupConfig::config_path()?
        }
    };
    println!(
        "\n{} Configuration saved to {}",
        "✓".green(),
        saved.display()
    );

    Ok(())
}

fn prompt_keep_count(prompt: &str, current: u32) -> Result<u32> {
    loop {
        let input = prompt_line(&format!("{} [{}]:", prompt, current))?;
        if input.is_empty() {
            return Ok(current);
        }
        match input.parse::<u32>() {
            Ok(k) if k >= 1 => return Ok(k),
            _ => println!("Enter a positive integer."),
        }
    }
}

/// Print per-volume results; a batch with any failure exits non-zero
/// after the whole batch has been attempted.
fn finish_batch(report: BatchReport) -> Result<()> {
    for archive in &report.succeeded {
        let size = fs::metadata(&archive.path).map(|m| m.len()).unwrap_or(0);
        println!(
            "{} {} -> {} ({})",
            "✓".green(),
            archive.volume_name,
            archive.path.display(),
            format_bytes(size)
        );
    }
    for (volume, error) in &report.failed {
        println!("{} {}: {}", "✗".red(), volume, error);
    }

    if !report.is_success() {
        bail!(
            "{} volume(s) failed to back up: {}",
            report.failed.len(),
            report.failed_volume_names().join(", ")
        );
    }
    Ok(())
}
