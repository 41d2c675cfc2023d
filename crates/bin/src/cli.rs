//! CLI argument definitions for the crs-sync binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crs_sync::constants::CRS_CACHE_NAMESPACE;

/// Inspect and exercise the CRS profile sync engine
#[derive(Parser, Debug)]
#[command(name = "crs-sync")]
#[command(about = "crs-sync: CRS profile state synchronization")]
#[command(version)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scripted session against an in-memory remote
    Simulate(SimulateArgs),
    /// Inspect or remove the locally cached CRS profile
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print the cached CRS profile
    Show(CacheArgs),
    /// Delete the cached CRS profile
    Clear(CacheArgs),
}

/// Location of the local CRS cache
#[derive(clap::Args, Debug, Clone)]
pub struct CacheArgs {
    /// Directory holding the cache file
    #[arg(short = 'D', long, default_value = ".crs-sync", env = "CRS_SYNC_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Cache namespace; the file is `<cache-dir>/<namespace>.json`
    #[arg(long, default_value = CRS_CACHE_NAMESPACE, env = "CRS_SYNC_NAMESPACE")]
    pub namespace: String,
}

/// Arguments for the simulate command
#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub cache: CacheArgs,

    /// Session id of the simulated user
    #[arg(long, default_value = "demo-user", env = "CRS_SYNC_UID")]
    pub uid: String,

    /// Email of the simulated user
    #[arg(long)]
    pub email: Option<String>,

    /// Number of CRS edits to make while signed in
    #[arg(short = 'n', long, default_value_t = 5)]
    pub edits: u32,

    /// Pause between edits in milliseconds
    #[arg(long, default_value_t = 200)]
    pub edit_interval_ms: u64,

    /// Debounce window in milliseconds (overrides the config file)
    #[arg(long, env = "CRS_SYNC_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,

    /// Make the first N remote writes after sign-in fail
    #[arg(long, default_value_t = 0)]
    pub fail_writes: u32,

    /// JSON file with engine settings
    #[arg(short, long, env = "CRS_SYNC_CONFIG")]
    pub config: Option<PathBuf>,
}
