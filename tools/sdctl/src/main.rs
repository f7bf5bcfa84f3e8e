mod commands;
mod config;
mod env_utils;
mod image;
mod logging;

use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::ImageTarget;
use logging::Logger;
use sdfiles::LogConsole;

const DEFAULT_IMAGE_MIB: u64 = 64;
const DEFAULT_CAT_BYTES: usize = 4096;
const DEFAULT_CSV_RECORDS: usize = 16;

#[derive(Debug, Parser)]
#[command(name = "sdctl")]
#[command(about = "SD card image inspection and editing CLI")]
struct Cli {
    /// Card image file; falls back to SDCTL_IMAGE.
    #[arg(long, global = true)]
    image: Option<PathBuf>,
    /// TOML configuration; falls back to SDCTL_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a blank image and put a fresh FAT volume on it.
    Format(FormatArgs),
    Info,
    Df,
    Ls(LsArgs),
    Cat(CatArgs),
    Write(TextArgs),
    Append(TextArgs),
    Csv(CsvArgs),
    Rm(PathArgs),
    Mv(MvArgs),
    Mkdir(PathArgs),
    Stat(PathArgs),
}

#[derive(Debug, Args)]
struct FormatArgs {
    #[arg(long = "size-mib", default_value_t = DEFAULT_IMAGE_MIB)]
    size_mib: u64,
}

#[derive(Debug, Args)]
struct LsArgs {
    path: Option<String>,
}

#[derive(Debug, Args)]
struct CatArgs {
    path: String,
    #[arg(long = "max-bytes", default_value_t = DEFAULT_CAT_BYTES)]
    max_bytes: usize,
}

#[derive(Debug, Args)]
struct TextArgs {
    path: String,
    text: String,
}

#[derive(Debug, Args)]
struct CsvArgs {
    path: String,
    #[arg(long = "max-records", default_value_t = DEFAULT_CSV_RECORDS)]
    max_records: usize,
}

#[derive(Debug, Args)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Args)]
struct MvArgs {
    old: String,
    new: String,
}

fn run(cli: Cli) -> Result<()> {
    Logger::from_env()?.install()?;

    let config_path = env_utils::path_from_flag_or_env(cli.config, "SDCTL_CONFIG")?;
    let config = config::load(config_path.as_deref())?;
    let image = env_utils::path_from_flag_or_env(cli.image, "SDCTL_IMAGE")?
        .context("no card image given; pass --image or set SDCTL_IMAGE")?;
    let target = ImageTarget { image, config };

    match cli.command {
        Commands::Format(args) => commands::format(&target, LogConsole, args.size_mib),
        Commands::Info => {
            let info = commands::info(&target, LogConsole)?;
            log::info!(
                "Sectors: {} ({} MiB)",
                info.sector_count,
                info.capacity_bytes() / (1024 * 1024)
            );
            Ok(())
        }
        Commands::Df => commands::df(&target, LogConsole).map(drop),
        Commands::Ls(args) => commands::ls(&target, LogConsole, args.path.as_deref()),
        Commands::Cat(args) => {
            let bytes = commands::cat(&target, LogConsole, &args.path, args.max_bytes)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            if !bytes.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
        Commands::Write(args) => commands::write(&target, LogConsole, &args.path, &args.text),
        Commands::Append(args) => commands::append(&target, LogConsole, &args.path, &args.text),
        Commands::Csv(args) => {
            commands::csv(&target, LogConsole, &args.path, args.max_records).map(drop)
        }
        Commands::Rm(args) => commands::rm(&target, LogConsole, &args.path),
        Commands::Mv(args) => commands::mv(&target, LogConsole, &args.old, &args.new),
        Commands::Mkdir(args) => commands::mkdir(&target, LogConsole, &args.path),
        Commands::Stat(args) => commands::stat(&target, LogConsole, &args.path).map(drop),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
