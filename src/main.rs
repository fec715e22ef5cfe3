use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use osmdb::commands;

#[derive(Parser, Debug)]
#[command(name = "osmdb", version, about = "OSM import and tile database tools")]
struct Cli {
    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import an OSM XML extract into an index database
    ImportOsm {
        /// Style data file with the class table
        style: PathBuf,
        /// OSM XML extract
        osm: PathBuf,
        /// Output index database
        db: PathBuf,
        /// Cache target in GB
        #[arg(long, default_value_t = 1.0)]
        smem: f64,
        /// Reopen an existing database for additional writes
        #[arg(long)]
        append: bool,
    },

    /// Materialise a rectangular range of tiles into a flat tile store
    Prefetch {
        /// Prefetch region: CO, US or WW
        #[arg(long = "pf", default_value = "CO")]
        pf: String,
        /// Cache target in GB
        smem: f64,
        /// Output tile store
        cache: PathBuf,
        /// Index database to read
        db: PathBuf,
        /// Worker threads (default: all cores)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Build one tile, write it to disk and pretty-print it
    Select {
        /// Index database to read
        db: PathBuf,
        /// Tile path, e.g. /osmdbv6/14/3411/6208
        path: String,
        /// Output file (default: zoom-x-y.osmdb)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Cache target in GB
        #[arg(long, default_value_t = 1.0)]
        smem: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    osmdb::logging::init(cli.log_level.as_deref());
    match cli.command {
        Commands::ImportOsm {
            style,
            osm,
            db,
            smem,
            append,
        } => commands::import_osm::cmd_import_osm(&style, &osm, &db, smem, append),
        Commands::Prefetch {
            pf,
            smem,
            cache,
            db,
            threads,
        } => commands::prefetch::cmd_prefetch(&pf, smem, &cache, &db, threads),
        Commands::Select {
            db,
            path,
            out,
            smem,
        } => commands::select::cmd_select(&db, &path, out.as_deref(), smem),
    }
}
