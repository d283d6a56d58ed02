//! sstdump
//!
//! Inspect lsmkv table files: print the rows of one table, or a summary
//! of every table in a data directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lsmkv::storage::{SSTable, StorageManager};
use lsmkv::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// lsmkv table inspector
#[derive(Parser, Debug)]
#[command(name = "sstdump")]
#[command(about = "Inspect lsmkv SSTable files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every row of one table file
    Rows {
        /// Path to a `<generation>.dat` file
        path: PathBuf,

        /// Start at the first key >= this one
        #[arg(short, long, default_value = "")]
        from: String,

        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Summarize every table in a data directory
    Dir {
        /// Data directory
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Rows { path, from, limit } => dump_rows(&path, from.as_bytes(), limit),
        Commands::Dir { path } => dump_dir(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "sstdump failed");
            ExitCode::FAILURE
        }
    }
}

fn dump_rows(path: &std::path::Path, from: &[u8], limit: Option<usize>) -> Result<()> {
    let table = SSTable::open(path)?;
    let rows = table.iter_from(from)?.take(limit.unwrap_or(usize::MAX));

    for row in rows {
        let cell = row?;
        match cell.value.payload() {
            Some(payload) => println!(
                "{}\t{}\t{}",
                String::from_utf8_lossy(&cell.key),
                cell.value.timestamp(),
                String::from_utf8_lossy(payload)
            ),
            None => println!(
                "{}\t{}\t<tombstone>",
                String::from_utf8_lossy(&cell.key),
                cell.value.timestamp()
            ),
        }
    }

    Ok(())
}

fn dump_dir(path: &std::path::Path) -> Result<()> {
    let storage = StorageManager::open(path)?;

    println!("generation\trows\tbytes");
    for generation in storage.generations() {
        if let Some(table) = storage.table(generation) {
            println!("{}\t{}\t{}", generation, table.row_count(), table.file_size());
        }
    }
    println!("next generation: {}", storage.next_generation());

    storage.close();
    Ok(())
}
