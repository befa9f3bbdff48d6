mod auth;
mod batch;
mod cadence;
mod cli;
mod config;
mod error;
mod logging;
mod providers;
mod retrier;
mod scheduler;
mod signals;

use clap::Parser;
use cli::Cli;
use log::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init();

    let cli = Cli::parse();

    // Exit straight away: in-flight checks are safe to abandon
    std::process::exit(exit_code(&cli.execute().await));
}

fn exit_code(result: &anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("Fatal error: {e:#}");
            1
        }
    }
}
