use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "assetforge")]
#[command(author, version, about = "Asset store with background media compression")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recover, then run compression workers until Ctrl-C
    Start,

    /// Add files to the store and compress them
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Queue compression for stored assets and wait for the results
    Compress {
        /// Asset ids
        #[arg(required = true)]
        asset_ids: Vec<String>,
    },

    /// List assets, newest first
    List {
        /// Only assets with this tag (repeatable; any match)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Maximum number of assets to show
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Number of assets to skip
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Delete assets and their files
    Delete {
        /// Asset ids
        #[arg(required = true)]
        asset_ids: Vec<String>,
    },

    /// Manage tags
    Tags {
        #[command(subcommand)]
        command: TagCommands,
    },

    /// Show an asset and its tags
    Show {
        /// Asset id
        asset_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the compression history of an asset
    Jobs {
        /// Asset id
        asset_id: String,
    },

    /// Resolve interrupted swaps and orphaned jobs, then exit
    Recover,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// List all tags
    List,

    /// Create a tag
    Add {
        /// Tag name
        name: String,

        /// Colour as #RRGGBB
        #[arg(long, default_value = "#3B82F6")]
        color: String,
    },

    /// Attach an existing tag to assets
    Attach {
        /// Tag name
        name: String,

        /// Asset ids
        #[arg(required = true)]
        asset_ids: Vec<String>,
    },

    /// Remove a tag from an asset
    Untag {
        /// Asset id
        asset_id: String,

        /// Tag name
        name: String,
    },

    /// Delete a tag and every asset carrying it
    Delete {
        /// Tag name
        name: String,
    },
}
