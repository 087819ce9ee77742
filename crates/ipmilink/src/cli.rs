//! Clap derive structures for the `ipmilink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ipmilink -- inspect IPMI record links, inventory caches and connections
#[derive(Debug, Parser)]
#[command(
    name = "ipmilink",
    version,
    about = "Inspect IPMI record links, inventory caches and controller connections",
    long_about = "Offline companion to the ipmilink engine.\n\n\
        Validates SENSOR / PICMG_LED / OEM_CMD record links, decodes on-disk\n\
        SDR inventory caches, and shows how configured connections resolve.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "IPMILINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "IPMILINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse record links and show what they address
    #[command(alias = "addr")]
    Address(AddressArgs),

    /// Decode an inventory cache file offline
    #[command(alias = "inv")]
    Inventory(InventoryArgs),

    /// Show configured connections
    Config(ConfigArgs),
}

// ── Address ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AddressArgs {
    /// Record links, e.g. "crate1 SENSOR 30:97 'CU TEMP1'"
    #[arg(required = true)]
    pub links: Vec<String>,
}

// ── Inventory ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InventoryArgs {
    /// Path to a `{connection}.{host}.cache` file
    pub cache_file: PathBuf,

    /// Which part of the inventory to print
    #[arg(long, short = 's', default_value = "all")]
    pub section: InventorySection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InventorySection {
    /// Header, sensors, FRUs and orphans
    All,
    /// Repository header only
    Header,
    /// Every sensor record
    Sensors,
    /// FRU locators with their claimed sensors
    Frus,
    /// Sensors no FRU claims
    Orphans,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display every connection as the engine would receive it
    Show,

    /// Print the config file path
    Path,
}
