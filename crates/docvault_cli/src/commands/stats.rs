//! Stats command implementation.

use crate::OutputFormat;
use docvault_core::{Config, StorageEngine};

/// Runs the stats command.
pub fn run(config: Config, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !config.data_dir.is_dir() {
        return Err(format!("No data directory at {}", config.data_dir.display()).into());
    }

    let engine = StorageEngine::connect(config)?;
    let stats = engine.stats()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("{stats}");
            let config = engine.config();
            println!();
            println!(
                "Compression: {}",
                if config.performance.enable_compression { "on" } else { "off" }
            );
            println!(
                "Encryption:  {}",
                if config.encryption.enabled { "on" } else { "off" }
            );
            println!("Cache TTL:   {}s", config.cache.ttl.as_secs());
        }
    }

    engine.close();
    Ok(())
}
