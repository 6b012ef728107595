// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::path::PathBuf;
use std::process;

use chdbg::compare_dbs;
use chdbg_storage::DbConfig;
use clap::Parser;

/// Exit code for every failure, including a detected mismatch
const FAILURE: i32 = 2;

/// Compare two replicas of an authenticated key-value tree at one version.
///
/// Exits 0 when both databases hold identical entries and root hashes, 2
/// otherwise. Differences are printed to stderr.
#[derive(Debug, Parser)]
#[command(name = "chdbg", author, version, long_about = None)]
struct Cli {
    /// Path to the first database; must end with .db
    #[arg(value_name = "DB_A")]
    db_a: PathBuf,

    /// Path to the second database; must end with .db
    #[arg(value_name = "DB_B")]
    db_b: PathBuf,

    /// The version (height) to load from both databases
    #[arg(id = "height", value_name = "VERSION")]
    version: u64,
}

fn main() {
    // argument errors exit with status 2 from here
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    log::debug!("{cli:?}");

    let cfg = DbConfig::builder().create_if_missing(false).build();
    if let Err(err) = compare_dbs(&cli.db_a, &cli.db_b, cli.version, &cfg, std::io::stderr().lock()) {
        eprintln!("chdbg: {err}");
        process::exit(FAILURE);
    }
}
