//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Kiln - container build pipelines from a declarative definition
///
/// Resolves the targets of a build definition into a dependency graph,
/// computes variables and drives BuildKit through the docker CLI.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Docker client config directory, overrides builder.docker_config
    #[arg(long, global = true, env = "KILN_DOCKER_CONFIG")]
    pub docker_config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build targets from the build definition
    Build(BuildArgs),

    /// Manage the builder cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Print version information as JSON
    Version,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Inspect the build definition instead of building
    #[command(subcommand)]
    pub action: Option<BuildAction>,

    /// Build definition file
    #[arg(short, long, global = true, env = "KILN_DEFINITION")]
    pub definition: Option<PathBuf>,

    /// Always pull images, even those present locally
    #[arg(short = 'p', long, env = "KILN_FORCE_PULL")]
    pub force_pull: bool,

    /// Print computed variable values
    #[arg(long)]
    pub show_vars: bool,

    /// Targets to build (defaults to "all")
    pub targets: Vec<String>,
}

/// Build subcommands
#[derive(Subcommand, Debug)]
pub enum BuildAction {
    /// Print the resolved and verified build definition as JSON
    Definition,

    /// Print the evaluated flat build definition, useful for debugging
    DefinitionDebug,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Prune the builder cache
    Clear {
        /// Remove all cache, not only dangling entries
        #[arg(short, long)]
        all: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., builder.force_pull)
        key: String,
        /// Value to set
        value: String,
    },
}
