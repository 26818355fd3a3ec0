//! Configuration settings for locality construction
//!
//! Defines the CLI arguments, the runtime configuration and its defaults.

use crate::domain::Scope;
use crate::topology::DEFAULT_MIC_SYSFS_ROOT;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest domain tag accepted by default
pub const DEFAULT_MAX_TAG_LEN: usize = 64;

/// Longest hostname accepted by default
pub const DEFAULT_MAX_HOST_LEN: usize = 255;

/// pgas-locality - locality domain hierarchies for PGAS teams
#[derive(Parser, Debug, Clone)]
#[command(name = "pgas-locality")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and inspect locality domain trees of PGAS teams")]
#[command(long_about = r#"
Builds the locality domain hierarchy (nodes, modules, NUMA domains,
packages, caches and cores) of a team from a JSON team layout.

Examples:
  pgas-locality tree layout.json                 # Print the domain tree
  pgas-locality tree layout.json --format json   # Nested JSON tree
  pgas-locality scope layout.json numa           # Tags of all NUMA domains
  pgas-locality filter layout.json --remove .0.1 # Tree without a module
  pgas-locality split layout.json core 4         # Group cores into 4 parts
  pgas-locality detect                           # Describe this process
"#)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Longest domain tag to accept
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_TAG_LEN, value_name = "LEN")]
    pub max_tag_len: usize,

    /// Longest hostname to accept
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_HOST_LEN, value_name = "LEN")]
    pub max_host_len: usize,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Skip accelerator module discovery
    #[arg(long, global = true)]
    pub no_discovery: bool,

    /// Sysfs directory scanned for accelerator cards
    #[arg(long, global = true, default_value = DEFAULT_MIC_SYSFS_ROOT, value_name = "PATH")]
    pub mic_sysfs_root: PathBuf,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build and print the domain tree of a team layout
    #[command(name = "tree")]
    Tree {
        /// Team layout file
        layout: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the host topology of a team layout
    #[command(name = "hosts")]
    Hosts {
        /// Team layout file
        layout: PathBuf,
    },

    /// List the domains at a scope
    #[command(name = "scope")]
    Scope {
        /// Team layout file
        layout: PathBuf,
        /// Domain scope
        #[arg(value_enum)]
        scope: Scope,
    },

    /// Print a filtered copy of the domain tree
    #[command(name = "filter")]
    #[command(group(ArgGroup::new("mode").required(true).args(["keep", "remove"])))]
    Filter {
        /// Team layout file
        layout: PathBuf,
        /// Keep only domains on the path to the tags
        #[arg(long)]
        keep: bool,
        /// Remove the domains at or below the tags
        #[arg(long)]
        remove: bool,
        /// Domain tags
        #[arg(required = true, value_name = "TAG")]
        tags: Vec<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Partition the domains at a scope into balanced groups
    #[command(name = "split")]
    Split {
        /// Team layout file
        layout: PathBuf,
        /// Domain scope
        #[arg(value_enum)]
        scope: Scope,
        /// Number of groups
        parts: usize,
    },

    /// Describe the hardware of this process
    #[command(name = "detect")]
    Detect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format of the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Runtime configuration of a locality build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalityConfig {
    /// Longest domain tag to accept
    pub max_tag_len: usize,
    /// Longest hostname to accept
    pub max_host_len: usize,
    /// Run accelerator module discovery during the build
    pub module_discovery: bool,
    /// Sysfs directory scanned for accelerator cards
    pub mic_sysfs_root: PathBuf,
}

impl Default for LocalityConfig {
    fn default() -> Self {
        Self {
            max_tag_len: DEFAULT_MAX_TAG_LEN,
            max_host_len: DEFAULT_MAX_HOST_LEN,
            module_discovery: true,
            mic_sysfs_root: PathBuf::from(DEFAULT_MIC_SYSFS_ROOT),
        }
    }
}

impl LocalityConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        if args.max_tag_len == 0 {
            return Err("--max-tag-len must be at least 1".into());
        }
        if args.max_host_len == 0 {
            return Err("--max-host-len must be at least 1".into());
        }

        Ok(Self {
            max_tag_len: args.max_tag_len,
            max_host_len: args.max_host_len,
            module_discovery: !args.no_discovery,
            mic_sysfs_root: args.mic_sysfs_root.clone(),
        })
    }
}
