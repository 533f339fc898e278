//! pharmacy CLI
//!
//! Entry point for the `pharmacy` command-line tool.

use clap::{Parser, Subcommand};
use pharmacy::config::DEFAULT_CONFIG_FILE;
use pharmacy::logging::init_logging;
use pharmacy::{ArchiveReader, Compiler};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "pharmacy")]
#[command(about = "Build self-executing archives from a JSON description", version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the archive described by a config file
    Compile {
        /// Path to the config file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },

    /// Check an archive's signature and list its entries
    Verify {
        /// Path to the archive
        #[arg(default_value = "pharmacy.phar")]
        archive: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "info" });

    match cli.command {
        Commands::Compile { file } => run_compile(file),
        Commands::Verify { archive } => run_verify(archive),
    }
}

fn run_compile(path: PathBuf) {
    let compiler = match Compiler::from_file(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ConfigError: {}", e);
            process::exit(1);
        }
    };

    if compiler.compile() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn run_verify(path: PathBuf) {
    let reader = match ArchiveReader::open(&path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Verification failed: {}", e);
            process::exit(1);
        }
    };

    println!("Archive valid: {}", path.display());
    println!("  Signature: {} {}", reader.algorithm(), reader.signature_hex());
    println!("  Stub: {} bytes", reader.stub().len());
    println!("  Entries: {}", reader.entries().len());
    for entry in reader.entries() {
        println!("    {} ({} bytes)", entry.path, entry.contents.len());
    }
}
