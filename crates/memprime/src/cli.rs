//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// MemPrime - incremental backups for MemoryPrime flashcard data
#[derive(Parser, Debug)]
#[command(name = "memprime")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to memprime.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up to every configured destination, rebuilding only stale archives
    Backup(BackupArgs),

    /// Write the complete data set into a single archive
    Export(ExportArgs),

    /// Manage the four backup destination slots
    Locations(LocationsArgs),

    /// Show version information
    Version(VersionArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Application storage root (overrides memprime.yaml)
    #[arg(long)]
    pub root: Option<Utf8PathBuf>,

    /// Location registry store (overrides memprime.yaml)
    #[arg(long)]
    pub registry: Option<Utf8PathBuf>,

    /// Validate existing archives' entry streams before trusting them
    #[arg(long)]
    pub validate: bool,

    /// Announce progress milestones
    #[arg(long)]
    pub announce: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Application storage root (overrides memprime.yaml)
    #[arg(long)]
    pub root: Option<Utf8PathBuf>,

    /// Output location (directory or file path)
    #[arg(short, long, default_value = ".")]
    pub output: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct LocationsArgs {
    /// Location registry store (overrides memprime.yaml)
    #[arg(long, global = true)]
    pub registry: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: LocationsCommands,
}

#[derive(Subcommand, Debug)]
pub enum LocationsCommands {
    /// Show all four slots
    List,

    /// Persist a destination under a slot
    Set {
        /// Slot number (1-4)
        slot: u8,

        /// Destination identifier (a directory path)
        destination: Utf8PathBuf,

        /// Overwrite an occupied slot without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Clear a slot
    Clear {
        /// Slot number (1-4)
        slot: u8,
    },
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
