//! termgate server binary.

use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use termgate::{AppState, Cli, TargetRegistry};

#[tokio::main]
async fn main() -> Result<(), termgate::Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    let targets = TargetRegistry::load(&cli.targets_file)?;
    info!("available targets: {}", targets.identifiers().join(", "));
    for warning in targets.validate() {
        warn!("target configuration: {warning}");
    }
    if targets.is_empty() {
        warn!(
            "no targets configured in {}; every connection will be rejected",
            cli.targets_file.display()
        );
    }

    let state = Arc::new(AppState::new(targets, cli.tunables()));
    termgate::server::run(cli.listen_addr(), state).await
}
