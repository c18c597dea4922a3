use clap::Parser;
use lexshard::cli::{Cli, run};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    let default_level = if cfg!(debug_assertions) {
        "lexshard=debug,warn"
    } else {
        "lexshard=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
