//! Deprecated standalone publisher: `map_service_publisher -c services.json`.

use anyhow::Result;
use clap::Parser;
use slap::legacy::{legacy_working_dir, load_legacy_services};
use slap::publish::{PublishOptions, Publisher};
use slap::toolkit::ArcPyToolkit;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "map_service_publisher",
    version,
    about = "Publish the services listed in a flat config file (deprecated, use `slap publish`)"
)]
struct Cli {
    /// Full path to config file (ex: -c c:/configs/int_config.json)
    #[clap(short = 'c', long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let services = load_legacy_services(&cli.config)?;
    let options = PublishOptions {
        overwrite_output: true,
        working_dir: legacy_working_dir(&cli.config, &std::env::current_dir()?),
    };
    let mut publisher = Publisher::new(ArcPyToolkit::from_env(options.overwrite_output), options);
    match publisher.publish(&services).await {
        Ok(report) => {
            tracing::info!(services = report.services.len(), "Legacy publish complete");
            Ok(())
        }
        Err(e) => {
            eprintln!("[ERROR] Publishing failed: {}", e);
            Err(e.into())
        }
    }
}
