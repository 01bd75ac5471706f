//! Validate command implementation.

use crate::OutputFormat;
use docvault_core::{integrity, Config, DocumentFormat};

/// Runs the validate command.
///
/// Works on the directory directly, without connecting an engine, so it
/// never creates a missing store.
pub fn run(config: &Config, fix: bool, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !config.data_dir.is_dir() {
        return Err(format!("No data directory at {}", config.data_dir.display()).into());
    }

    let report = integrity::validate(&config.data_dir, &DocumentFormat::from_config(config), fix)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{report}");
            println!();
            if report.is_clean() {
                if report.fixed_count() > 0 {
                    println!("✓ Repaired {} document(s)", report.fixed_count());
                } else {
                    println!("✓ Validation passed");
                }
            } else {
                println!("✗ Validation failed");
                if !fix && report.mismatches().next().is_some() {
                    println!("  Run with --fix to rewrite mismatched ids");
                }
            }
        }
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err("Validation failed".into())
    }
}
