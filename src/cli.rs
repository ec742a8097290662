///
/// This module implements the CLI interface for slap: command parsing, argument
/// validation and the `publish`/`init` entrypoints.
///
/// The publishing logic lives in [`crate::publish`] and [`crate::bootstrap`]; this
/// module only wires concrete implementations ([`ArcPyToolkit`], [`AgsAdminClient`],
/// [`GitChangeLister`]) to them and reports progress.
///
/// For programmatic/integration use: call [`run`] with a constructed [`Cli`], or
/// [`publish_command`] with your own toolkit, server and change lister.
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::bootstrap::{create_site, register_data_sources};
use crate::config::SlapConfig;
use crate::config_builder::{create_config, InitRequest};
use crate::contract::{ChangeLister, GisToolkit, ServerApi};
use crate::git::GitChangeLister;
use crate::load_config::{admin_url, load_config};
use crate::publish::{PublishOptions, PublishReport, Publisher};
use crate::server::{AgsAdminClient, Credentials};
use crate::toolkit::ArcPyToolkit;

/// CLI for slap: publish map documents and toolboxes to a GIS server.
#[derive(Parser, Debug)]
#[clap(
    name = "slap",
    version,
    about = "Publish map documents and geoprocessing toolboxes to a GIS server"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish services
    Publish(PublishArgs),
    /// Initialize config from a list of directories
    Init(InitArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Portal or server username (ex: --username john)
    #[clap(short = 'u', long)]
    pub username: String,
    /// Portal or server password (ex: --password myPassword)
    #[clap(short = 'p', long)]
    pub password: String,
    /// Path to config file (ex: --config configs/int_config.json)
    #[clap(short = 'c', long, default_value = "config.json")]
    pub config: PathBuf,
    /// Create a site before publishing
    #[clap(short = 's', long)]
    pub site: bool,
    /// Override the hostname in config (ex: --name $HOSTNAME)
    #[clap(short = 'n', long)]
    pub name: Option<String>,
    /// One or more inputs to publish (ex: -i mxd/bar.mxd -i mxd/foo.mxd)
    #[clap(short = 'i', long = "input")]
    pub input: Vec<String>,
    /// Inputs to publish, same as --input
    #[clap(value_name = "INPUT")]
    pub inputs: Vec<String>,
    /// Publish all files that changed between HEAD and this commit; wins over explicit inputs
    #[clap(short = 'g', long)]
    pub git: Option<String>,
    /// Fail instead of overwriting existing .sddraft/.sd files
    #[clap(long)]
    pub no_overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// One or more directories containing files to add to config
    #[clap(short = 'i', long = "input")]
    pub input: Vec<PathBuf>,
    /// Directories to scan, same as --input (defaults to the current directory)
    #[clap(value_name = "DIR")]
    pub directories: Vec<PathBuf>,
    /// Path to output config file
    #[clap(short = 'c', long, default_value = "config.json")]
    pub config: PathBuf,
    /// Find all data sources in inputs and record them for registration
    #[clap(short = 'r', long)]
    pub register: bool,
    /// Set the hostname in config (ex: --name $HOSTNAME)
    #[clap(short = 'n', long, default_value = "hostname")]
    pub name: String,
}

/// Which inputs a `publish` run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelection {
    Git(String),
    Explicit(Vec<String>),
    All,
}

impl PublishArgs {
    pub fn selection(&self) -> InputSelection {
        let explicit: Vec<String> = self
            .input
            .iter()
            .chain(self.inputs.iter())
            .cloned()
            .collect();
        match &self.git {
            Some(rev) => {
                if !explicit.is_empty() {
                    tracing::warn!(git = %rev, ignored = ?explicit, "Both --git and inputs given, using --git");
                }
                InputSelection::Git(rev.clone())
            }
            None if !explicit.is_empty() => InputSelection::Explicit(explicit),
            None => InputSelection::All,
        }
    }
}

impl InitArgs {
    pub fn into_request(self, cwd: PathBuf) -> InitRequest {
        let mut directories: Vec<PathBuf> = self.input.into_iter().chain(self.directories).collect();
        if directories.is_empty() {
            directories.push(cwd);
        }
        InitRequest {
            directories,
            filename: self.config,
            hostname: self.name,
            register_data_sources: self.register,
        }
    }
}

/// The `publish` subcommand against injected collaborators.
pub async fn publish_command<T, S, C>(
    args: &PublishArgs,
    config: &SlapConfig,
    publisher: &mut Publisher<T>,
    server: &S,
    changes: &C,
) -> Result<PublishReport>
where
    T: GisToolkit,
    S: ServerApi + ?Sized,
    C: ChangeLister + ?Sized,
{
    if args.site {
        println!("Creating site...");
        create_site(server, config).await?;
    }

    println!("Registering data sources...");
    let working_dir = publisher.options().working_dir.clone();
    let registration = register_data_sources(server, config, &working_dir).await?;
    tracing::info!(
        registered = registration.registered.len(),
        already_registered = registration.already_registered.len(),
        "Data sources registered"
    );

    let mut report = PublishReport::default();
    match args.selection() {
        InputSelection::Explicit(inputs) => {
            for input in &inputs {
                report.services.push(publisher.publish_input(config, input).await?);
            }
        }
        InputSelection::Git(rev) => {
            println!("Getting changes from git...");
            let changed = changes
                .get_changed_inputs(&rev)
                .await
                .map_err(|e| anyhow::anyhow!("Listing git changes since {rev} failed: {e}"))?;
            println!("{:?}", changed);
            for input in &changed {
                report.services.push(publisher.publish_input(config, input).await?);
            }
        }
        InputSelection::All => {
            println!("Publishing all...");
            report = publisher.publish_all(config).await?;
        }
    }
    Ok(report)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Publish(args) => {
            let config = load_config(&args.config, args.name.as_deref())?;
            let working_dir = std::env::current_dir()?;
            let options = PublishOptions {
                overwrite_output: !args.no_overwrite,
                working_dir: working_dir.clone(),
            };
            let mut publisher =
                Publisher::new(ArcPyToolkit::from_env(options.overwrite_output), options);
            let server = AgsAdminClient::new(
                admin_url(&config)?,
                Credentials {
                    username: args.username.clone(),
                    password: args.password.clone(),
                },
            );
            let changes = GitChangeLister::new(working_dir);

            tracing::info!(command = "publish", "Starting publish");
            match publish_command(&args, &config, &mut publisher, &server, &changes).await {
                Ok(report) => {
                    tracing::info!(command = "publish", services = report.services.len(), "Publish complete");
                    println!("Publish complete.\nReport:");
                    println!("{:#?}", report);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "publish", error = %e, "Publish failed");
                    eprintln!("[ERROR] Publishing failed: {}", e);
                    Err(e)
                }
            }
        }
        Commands::Init(args) => {
            let request = args.into_request(std::env::current_dir()?);
            let toolkit = ArcPyToolkit::from_env(true);
            tracing::info!(command = "init", dirs = ?request.directories, "Creating config");
            create_config(&request, &toolkit).await?;
            Ok(())
        }
    }
}
