//! `arcbrowse` binary entry point
//!
//! A thin wrapper around `arcbrowse-core` and `arcbrowse-formats` that:
//! 1. parses command-line arguments,
//! 2. initializes logging,
//! 3. loads the configuration and scheme database,
//! 4. runs one command against the default format catalog.

mod commands;

use anyhow::{Context, Result};
use arcbrowse_core::{BrowseConfig, OverwritePolicy, SchemeDatabase};
use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::Session;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "arcbrowse",
    about = "Browse, extract and decode game resource archives",
    version
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file
    #[arg(short, long, global = true, env = "ARCBROWSE_CONFIG")]
    config: Option<PathBuf>,

    /// Scheme database, overriding the one named in the configuration
    #[arg(long, global = true)]
    schemes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Archive on disk plus the nested archives to descend into
#[derive(Debug, Args)]
pub struct Location {
    /// Archive file
    pub archive: PathBuf,

    /// Nested archive inside the previous level, repeatable
    #[arg(short, long = "inside", value_name = "NAME")]
    pub inside: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Overwrite {
    Overwrite,
    Skip,
    Fail,
}

impl From<Overwrite> for OverwritePolicy {
    fn from(value: Overwrite) -> Self {
        match value {
            Overwrite::Overwrite => Self::Overwrite,
            Overwrite::Skip => Self::Skip,
            Overwrite::Fail => Self::Fail,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an archive
    List {
        #[command(flatten)]
        location: Location,

        /// Include every subdirectory
        #[arg(short, long)]
        recursive: bool,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Name the archive or image format of files
    Identify {
        /// Files to probe
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract entries to a directory
    Extract {
        #[command(flatten)]
        location: Location,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Policy for files that already exist
        #[arg(long, value_enum)]
        overwrite: Option<Overwrite>,

        /// Only extract these entries, repeatable
        #[arg(long, value_name = "NAME")]
        only: Vec<String>,
    },

    /// Write one entry to standard output
    Cat {
        #[command(flatten)]
        location: Location,

        /// Entry name
        entry: String,
    },

    /// Decode an image entry and save it as PNG or BMP
    Decode {
        #[command(flatten)]
        location: Location,

        /// Entry name
        entry: String,

        /// Output image, format chosen by extension
        output: PathBuf,
    },

    /// Pack files into a new LIB archive
    Pack {
        /// Archive to create
        output: PathBuf,

        /// Files to store, under their file names
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => BrowseConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => BrowseConfig::default(),
    };

    let catalog = arcbrowse_formats::default_catalog();
    if let Some(path) = cli.schemes.as_ref().or(config.scheme_database.as_ref()) {
        let db = SchemeDatabase::from_file(path)
            .with_context(|| format!("loading scheme database {}", path.display()))?;
        if catalog.load_schemes(&db)? {
            info!("Scheme database v{} loaded", db.version());
        }
    }

    let session = Session::new(catalog, config);
    match cli.command {
        Commands::List {
            location,
            recursive,
            json,
        } => session.list(&location, recursive, json),
        Commands::Identify { files } => session.identify(&files),
        Commands::Extract {
            location,
            output,
            overwrite,
            only,
        } => session.extract(&location, &output, overwrite.map(Into::into), &only),
        Commands::Cat { location, entry } => session.cat(&location, &entry),
        Commands::Decode {
            location,
            entry,
            output,
        } => session.decode(&location, &entry, &output),
        Commands::Pack { output, files } => session.pack(&output, &files),
    }
}
