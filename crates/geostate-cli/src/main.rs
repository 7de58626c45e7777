mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{annotate::AnnotateArgs, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "geostate",
    about = "Annotate location-history exports with the US state each point falls in",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./geostate.yaml when present)
    #[arg(long, global = true, env = "GEOSTATE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring an annotated store up to date with raw exports
    Annotate(AnnotateArgs),

    /// Rewrite an annotated store (including the legacy per-day layout) in the current layout
    Convert {
        /// Existing annotated store
        #[arg(short = 'a', long = "annotated")]
        input: PathBuf,
        /// New file to write; must not exist
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },

    /// Write one calendar year of the raw exports and the store to archive files
    Archive {
        /// Raw location-history exports, oldest first
        #[arg(short = 'r', long = "raw", required = true, num_args = 1..)]
        raw: Vec<PathBuf>,
        #[arg(short = 'a', long = "annotated")]
        store: PathBuf,
        #[arg(short = 'y', long)]
        year: i32,
        /// Lowercase name used in the archive file name
        #[arg(short = 'n', long)]
        name: String,
        /// Output directory
        #[arg(short = 'o', long = "output", default_value = ".")]
        dir: PathBuf,
    },

    /// Per-state point and day counts for a store
    Summary {
        #[arg(short = 'a', long = "annotated")]
        store: PathBuf,
    },

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Annotate(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Annotate(args) => cmd::annotate::run(config, args, cli.json),
        Commands::Convert { input, output } => cmd::convert::run(&input, &output, cli.json),
        Commands::Archive {
            raw,
            store,
            year,
            name,
            dir,
        } => cmd::archive::run(&raw, &store, year, &name, &dir, cli.json),
        Commands::Summary { store } => cmd::summary::run(&store, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
