// SPDX-License-Identifier: MIT
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use binfs::{Config, Container};

#[derive(Parser)]
#[command(name = "binfs", about = "Embed files into an executable and read them back")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stage files into the target's container and save it
    Embed {
        target: PathBuf,

        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Name to store a single file under (defaults to its file name)
        #[arg(long)]
        name: Option<String>,

        /// Start a new container if none is recognized (first embed)
        #[arg(long)]
        init: bool,
    },

    /// List the entries embedded in the target
    List {
        target: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Write one embedded file to a path or stdout
    Extract {
        target: PathBuf,

        name: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check every embedded file against its checksum
    Verify { target: PathBuf },
}

#[derive(Serialize)]
struct EntrySummary<'a> {
    filename: &'a str,
    size: u64,
    offset: u64,
    checksum: String,
    readable: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so extracted bytes on stdout stay clean
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = Config::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    match cli.command {
        Command::Embed {
            target,
            files,
            name,
            init,
        } => {
            let config = Config {
                init_on_unrecognized: config.init_on_unrecognized || init,
                ..config
            };
            embed(&config, &target, &files, name)
        }
        Command::List { target, json } => list(&config, &target, json),
        Command::Extract {
            target,
            name,
            output,
        } => extract(&config, &target, &name, output.as_deref()),
        Command::Verify { target } => verify(&config, &target),
    }
}

fn open(config: &Config, target: &Path) -> anyhow::Result<Container> {
    Container::open_with_config(target, config)
        .with_context(|| format!("Failed to load container from {}", target.display()))
}

fn embed(
    config: &Config,
    target: &Path,
    files: &[PathBuf],
    name: Option<String>,
) -> anyhow::Result<()> {
    if name.is_some() && files.len() != 1 {
        bail!("--name can only be used with a single file");
    }

    let mut container = open(config, target)?;
    for file in files {
        let filename = match &name {
            Some(name) => name.clone(),
            None => file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("{} has no file name", file.display()))?,
        };

        let data =
            std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        if container.stage(filename.as_str(), data)? {
            info!(filename = %filename, source = %file.display(), "Staged");
        } else {
            info!(filename = %filename, "Identical content already embedded, skipped");
        }
    }

    container
        .save()
        .with_context(|| format!("Failed to rewrite {}", target.display()))?;
    Ok(())
}

fn list(config: &Config, target: &Path, json: bool) -> anyhow::Result<()> {
    let container = open(config, target)?;
    let summaries: Vec<EntrySummary<'_>> = container
        .entries()
        .iter()
        .map(|record| EntrySummary {
            filename: &record.filename,
            size: record.size,
            offset: record.offset,
            checksum: record.checksum.to_hex(),
            readable: container.read_file(&record.filename).is_some(),
        })
        .collect();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &summaries)?;
        writeln!(out)?;
    } else {
        for summary in &summaries {
            writeln!(
                out,
                "{:<16} {:>10} {:>10} {}{}",
                summary.filename,
                summary.size,
                summary.offset,
                summary.checksum,
                if summary.readable { "" } else { " (corrupt)" }
            )?;
        }
    }
    Ok(())
}

fn extract(
    config: &Config,
    target: &Path,
    name: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let container = open(config, target)?;
    let Some(data) = container.read_file(name) else {
        bail!("{} is not embedded in {} or failed verification", name, target.display());
    };

    match output {
        Some(path) => std::fs::write(path, data)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().lock().write_all(data)?,
    }
    Ok(())
}

fn verify(config: &Config, target: &Path) -> anyhow::Result<()> {
    let container = open(config, target)?;
    for failure in container.integrity_failures() {
        eprintln!("{}", failure);
    }
    container.verify()?;

    info!(entries = container.entries().len(), "All entries verified");
    Ok(())
}
