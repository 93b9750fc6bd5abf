use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use blobtree_store::{ContentStore, FileSystemContentStore, StoreConfig};
use colored::Colorize;
use serde::Serialize;

use crate::cli::*;

#[derive(Serialize)]
struct ItemInfo {
    id: String,
    path: PathBuf,
    len: u64,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let store = FileSystemContentStore::open(config).context("failed to open content store")?;
    let format = cli.format;
    match cli.command {
        Command::Put(args) => cmd_put(&store, args, &format),
        Command::Get(args) => cmd_get(&store, args),
        Command::Update(args) => cmd_update(&store, args, &format),
        Command::Rm(args) => cmd_rm(&store, args),
        Command::Stat(args) => cmd_stat(&store, args, &format),
        Command::Ls(_) => cmd_ls(&store, &format),
        Command::Recover(_) => cmd_recover(&store),
    }
}

/// Config file first, then command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_toml_file(path)?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(block_size) = cli.block_size {
        config.block_size = block_size;
    }
    if let Some(depth) = cli.depth {
        config.depth = depth;
    }
    Ok(config)
}

fn open_source(file: Option<&Path>) -> anyhow::Result<(Box<dyn Read>, Option<u64>)> {
    match file {
        Some(path) => {
            let f = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            let len = f.metadata().ok().map(|m| m.len());
            Ok((Box::new(f), len))
        }
        None => Ok((Box::new(io::stdin().lock()), None)),
    }
}

fn print_item(info: &ItemInfo, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(info)?),
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), info.id.yellow().bold());
            println!("  Path: {}", info.path.display());
            println!("  Length: {} bytes", info.len);
        }
    }
    Ok(())
}

fn cmd_put(
    store: &FileSystemContentStore,
    args: PutArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let (mut source, hint) = open_source(args.file.as_deref())?;
    let handle = store.create(&mut source, hint)?;
    print_item(
        &ItemInfo {
            id: handle.id_string(),
            path: handle.path().to_path_buf(),
            len: handle.len()?,
        },
        format,
    )
}

fn cmd_get(store: &FileSystemContentStore, args: GetArgs) -> anyhow::Result<()> {
    let handle = store.fetch(&args.id)?;
    match &args.output {
        Some(path) => {
            let mut out =
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            let copied = handle.with_reader(|r| io::copy(r, &mut out))?;
            eprintln!("{} Wrote {} bytes to {}", "✓".green(), copied, path.display());
        }
        None => {
            let mut out = io::stdout().lock();
            handle.with_reader(|r| io::copy(r, &mut out))?;
            out.flush()?;
        }
    }
    Ok(())
}

fn cmd_update(
    store: &FileSystemContentStore,
    args: UpdateArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let (mut source, hint) = open_source(args.file.as_deref())?;
    let handle = store.update(&args.id, &mut source, hint)?;
    print_item(
        &ItemInfo {
            id: handle.id_string(),
            path: handle.path().to_path_buf(),
            len: handle.len()?,
        },
        format,
    )
}

fn cmd_rm(store: &FileSystemContentStore, args: RmArgs) -> anyhow::Result<()> {
    store.delete(&args.id)?;
    println!("Deleted {}", args.id.yellow());
    Ok(())
}

fn cmd_stat(
    store: &FileSystemContentStore,
    args: StatArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let handle = store.fetch(&args.id)?;
    print_item(
        &ItemInfo {
            id: handle.id_string(),
            path: handle.path().to_path_buf(),
            len: handle.len()?,
        },
        format,
    )
}

fn cmd_ls(store: &FileSystemContentStore, format: &OutputFormat) -> anyhow::Result<()> {
    let ids = store.list()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&ids)?),
        OutputFormat::Text if ids.is_empty() => println!("No content stored."),
        OutputFormat::Text => {
            for id in &ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn cmd_recover(store: &FileSystemContentStore) -> anyhow::Result<()> {
    let report = store.recover()?;
    if report.is_clean() {
        println!("{} No interrupted updates.", "✓".green().bold());
        return Ok(());
    }
    println!("{} Recovery complete", "✓".green().bold());
    println!("  Restored: {}", report.restored);
    println!("  Removed previous: {}", report.removed_previous);
    println!("  Removed incoming: {}", report.removed_incoming);
    if report.failures > 0 {
        println!("  Failures: {}", report.failures.to_string().red());
    }
    Ok(())
}
