#![doc = "slap: publish map documents and geoprocessing toolboxes to a GIS server."]

//! Config-driven publishing of map documents (`.mxd`) and geoprocessing
//! toolboxes (`.tbx`), optionally scoped to files changed in git.
//!
//! The pipeline in [`publish`] drives the external SDK and server through the
//! traits in [`contract`]; [`toolkit`], [`server`] and [`git`] hold the concrete
//! implementations used by the `slap` binary.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod config_builder;
pub mod contract;
pub mod data_sources;
pub mod error;
pub mod git;
pub mod legacy;
pub mod load_config;
pub mod publish;
pub mod server;
pub mod toolkit;

pub use cli::{run, Cli, Commands};
