//! `payin-ledger commands.csv`
//!
//! Feeds setup rows and processor callbacks through a fresh ledger and prints
//! `receiving`, `npatrons` and `giving` for every participant on stdout.
//! Rejected rows show up as warnings (`RUST_LOG=warn`); an invariant
//! violation aborts with exit status 1 before any output.

use payin_ledger::{LedgerError, Replay, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(LedgerError::MissingArgument);
    }

    let input_path = &args[1];
    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let mut replay = Replay::new();
    replay.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    replay.write_output(handle)?;

    Ok(())
}
