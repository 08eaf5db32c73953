//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pgstamp - Template database cache for PostgreSQL
///
/// Initializes databases from cached templates when the same recipe was
/// built before, and builds from scratch otherwise.
#[derive(Parser, Debug)]
#[command(name = "pgstamp")]
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
    #[arg(short, long, global = true, env = "PGSTAMP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database server URL (overrides database.url)
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a database, cloning a cached template when possible
    Init(InitArgs),

    /// Copy one database to another
    Copy(CopyArgs),

    /// Inspect and maintain the template cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Recipe selection shared by `init` and `cache fingerprint`
#[derive(Args, Debug, Clone)]
pub struct RecipeArgs {
    /// Modules to install (comma-separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub modules: Vec<String>,

    /// Load demo data
    #[arg(long)]
    pub demo: bool,

    /// Extra file whose content is part of the recipe (repeatable)
    #[arg(long = "recipe-file", value_name = "FILE")]
    pub recipe_files: Vec<PathBuf>,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Name of the database to create
    #[arg(short = 'n', long = "new-database", value_name = "DATABASE")]
    pub new_database: String,

    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Always build from scratch and leave the cache alone
    #[arg(long)]
    pub no_cache: bool,

    /// Template name prefix (overrides cache.prefix)
    #[arg(long)]
    pub cache_prefix: Option<String>,

    /// Keep at most N templates, negative for unlimited
    #[arg(long, allow_negative_numbers = true)]
    pub cache_max_size: Option<i64>,

    /// Drop templates unused for N days, negative to never expire
    #[arg(long, value_name = "DAYS", allow_negative_numbers = true)]
    pub cache_max_age: Option<i64>,

    /// Do nothing if the database already exists
    #[arg(long)]
    pub unless_exists: bool,
}

/// Arguments for the copy command
#[derive(Parser, Debug)]
pub struct CopyArgs {
    /// Database to copy from
    pub source: String,

    /// Database to create
    pub dest: String,

    /// Terminate other sessions on the source before copying
    #[arg(short, long)]
    pub force_disconnect: bool,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Template name prefix (overrides cache.prefix)
    #[arg(long, global = true)]
    pub cache_prefix: Option<String>,

    /// Cache action
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached templates, most recently used first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the number of cached templates
    Size,

    /// Evict templates by count and/or age
    Trim {
        /// Keep at most N templates (defaults to cache.max_size)
        #[arg(long, allow_negative_numbers = true)]
        max_size: Option<i64>,

        /// Drop templates unused for N days (defaults to cache.max_age_days)
        #[arg(long, value_name = "DAYS", allow_negative_numbers = true)]
        max_age: Option<i64>,
    },

    /// Drop every cached template
    Purge {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the fingerprint and template name for a recipe
    Fingerprint(RecipeArgs),
}

/// Output format for cache listing
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Plain,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config action
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
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.max_size)
        key: String,

        /// Value to set
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}
