use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobtree",
    about = "blobtree: filesystem-backed binary content store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with store settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the store (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Maximum children per directory (overrides the config file)
    #[arg(long, global = true)]
    pub block_size: Option<u32>,

    /// Path segments per item (overrides the config file)
    #[arg(long, global = true)]
    pub depth: Option<u32>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store new content and print its identifier
    Put(PutArgs),
    /// Write stored content to stdout or a file
    Get(GetArgs),
    /// Replace the content of an existing item
    Update(UpdateArgs),
    /// Delete an item
    Rm(RmArgs),
    /// Show identifier, path, and length of an item
    Stat(StatArgs),
    /// List every stored identifier
    Ls(LsArgs),
    /// Clean up after interrupted updates
    Recover(RecoverArgs),
}

#[derive(Args)]
pub struct PutArgs {
    /// Source file; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: String,
    /// Source file; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: String,
}

#[derive(Args)]
pub struct StatArgs {
    pub id: String,
}

#[derive(Args)]
pub struct LsArgs {}

#[derive(Args)]
pub struct RecoverArgs {}
