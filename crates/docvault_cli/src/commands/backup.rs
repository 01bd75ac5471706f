//! Backup and restore commands.
//!
//! Both work on directories only and never open an engine, so they are
//! safe to run against a store no process has open. Restore must not run
//! while an application is using the store.

use docvault_core::{format_millis, BackupManager, BackupManifest, Config, CoreError};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;

/// Default parent directory for timestamped backups.
const DEFAULT_BACKUP_DIR: &str = "backups";

/// Create a backup of the store.
pub fn create(config: &Config, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Creating backup of {}", config.data_dir.display());
    let manager = BackupManager::from_config(config);

    let (path, manifest) = match output {
        Some(path) => (path.to_path_buf(), manager.create_backup(path)?),
        None => manager.create_timestamped(Path::new(DEFAULT_BACKUP_DIR))?,
    };

    println!("✓ Backup created successfully");
    println!("  Path: {}", path.display());
    print_manifest(&manifest);
    Ok(())
}

/// Restore the store from a backup directory.
///
/// Without `force`, asks for confirmation when the live store holds data.
pub fn restore(config: &Config, source: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring {} from {}", config.data_dir.display(), source.display());
    let manager = BackupManager::from_config(config);

    let manifest = BackupManager::read_manifest(source)?;
    println!("Backup at {}", source.display());
    print_manifest(&manifest);
    println!();

    let report = match manager.restore(source, force) {
        Err(CoreError::ConfirmationRequired { path }) => {
            let question = format!(
                "This will replace all data in {}. Continue? [y/N] ",
                path.display()
            );
            if !confirm(&question, io::stdin().lock(), io::stdout())? {
                println!("Restore cancelled");
                return Ok(());
            }
            manager.restore(source, true)?
        }
        other => other?,
    };

    println!("✓ Store restored successfully");
    println!("  Path: {}", config.data_dir.display());
    println!("  Documents restored: {}", report.documents);
    println!("  Bytes restored: {}", report.bytes);
    if report.assets_restored {
        println!("  Assets restored: yes");
    }
    println!(
        "  From backup created: {}",
        format_millis(report.backup_created_at_ms)
    );
    Ok(())
}

fn print_manifest(manifest: &BackupManifest) {
    println!("  Created: {}", format_millis(manifest.created_at_ms));
    println!("  Source: {}", manifest.source);
    println!("  Collections: {}", manifest.collections);
    println!("  Documents: {}", manifest.documents);
    println!("  Size: {} bytes", manifest.bytes);
    if manifest.includes_assets {
        println!(
            "  Assets: {} file(s), {} bytes",
            manifest.asset_files, manifest.asset_bytes
        );
    }
}

/// Asks a yes/no question; anything but `y` or `yes` is no.
fn confirm(question: &str, mut input: impl BufRead, mut output: impl Write) -> io::Result<bool> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
