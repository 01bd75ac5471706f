//! Clear-cache command implementation.

use docvault_core::{Config, StorageEngine};

/// Runs the clear-cache command.
///
/// The in-memory cache lives only as long as a process, so this mainly
/// removes the on-disk cache artifact directory.
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = StorageEngine::connect(config)?;
    engine.clear_cache();
    let removed = engine.clear_cache_artifacts()?;

    if removed {
        println!("✓ Cache cleared");
    } else {
        println!("✓ Cache cleared (no cache artifacts on disk)");
    }
    println!("  Path: {}", engine.data_dir().display());

    engine.close();
    Ok(())
}
