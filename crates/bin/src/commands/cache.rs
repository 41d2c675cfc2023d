//! Local CRS cache commands.

use crs_sync::store::{FileCache, LocalCache};

use crate::cli::CacheArgs;
use crate::output::{OutputFormat, print_value};

fn open(args: &CacheArgs) -> FileCache {
    FileCache::new(&args.cache_dir, &args.namespace)
}

/// Run the `cache show` command
pub fn show(args: &CacheArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let cache = open(args);
    match cache.load()? {
        Some(profile) => print_value(&profile, format),
        None => {
            match format {
                OutputFormat::Human => {
                    println!("No cached CRS profile at {}", cache.path().display())
                }
                OutputFormat::Json => println!("null"),
            }
            Ok(())
        }
    }
}

/// Run the `cache clear` command
pub fn clear(args: &CacheArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cache = open(args);
    cache.clear()?;
    println!("Cleared {}", cache.path().display());
    Ok(())
}
