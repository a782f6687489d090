use clap::Parser;
use facetsweep::Cli;
use std::process;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = facetsweep::run_sweep(cli) {
        eprintln!("{}: {err:#}", env!("CARGO_BIN_NAME"));
        process::exit(1);
    }
}
