//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stash", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Talk to the store directly, without a local cache for this command
    #[arg(long, global = true)]
    pub no_local_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the value stored under a key
    Read {
        key: String,

        /// Return the stored text instead of decoding it
        #[arg(long)]
        raw: bool,
    },

    /// Store a value; it is parsed as JSON and kept as a string otherwise
    Write {
        key: String,
        value: String,

        /// Store the value's text form
        #[arg(long)]
        raw: bool,

        /// Expire the entry after this many seconds
        #[arg(long, value_name = "SECONDS")]
        expires_in: Option<u64>,

        /// Only write when the key is not present
        #[arg(long)]
        unless_exist: bool,
    },

    /// Remove a key
    Delete { key: String },

    /// Report whether a key is present
    Exist { key: String },

    /// Add to a counter
    Increment {
        key: String,

        #[arg(long, default_value_t = 1)]
        by: i64,
    },

    /// Subtract from a counter
    Decrement {
        key: String,

        #[arg(long, default_value_t = 1)]
        by: i64,
    },

    /// Remove every entry from the store
    Clear,

    /// Print the canonical key for a list of components
    ExpandKey {
        /// Key components; integers and booleans are recognised
        #[arg(required = true)]
        parts: Vec<String>,

        /// Prefix for the expanded key
        #[arg(long)]
        namespace: Option<String>,
    },
}
