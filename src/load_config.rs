/// `load_config` module: reads the JSON publishing config and validates it.
///
/// This is the only place where user-supplied config files are parsed. Anything
/// malformed fails the load: unreadable files, invalid JSON, missing `agsUrl`,
/// an `agsUrl` that is not a URL, or a `site` that is not an object.
///
/// The `-n/--name` flag of `slap publish` lands here as a hostname override:
/// the host of `agsUrl` is replaced, everything else is kept.
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::{error, info};
use url::Url;

use crate::config::SlapConfig;
use crate::error::PublishError;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PublishError> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => {
            info!(config_path = ?path, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(PublishError::Config(format!(
                "Failed to read config file {:?}: {}",
                path, e
            )));
        }
    };

    match serde_json::from_str(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config JSON successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config JSON");
            Err(PublishError::Config(format!("Failed to parse config JSON: {e}")))
        }
    }
}

/// Load and validate a publishing config, applying an optional hostname override.
pub fn load_config<P: AsRef<Path>>(path: P, hostname: Option<&str>) -> Result<SlapConfig, PublishError> {
    let mut config: SlapConfig = read_json(path.as_ref())?;

    let mut url = admin_url(&config)?;
    if let Some(host) = hostname {
        url.set_host(Some(host)).map_err(|e| {
            error!(error = ?e, host, "Invalid hostname override");
            PublishError::Config(format!("Invalid hostname '{host}': {e}"))
        })?;
        info!(host, ags_url = %url, "Applied hostname override");
        config.ags_url = url.to_string();
    }

    if let Some(site) = &config.site {
        if !site.is_object() {
            error!("'site' must be a JSON object");
            return Err(PublishError::Config("'site' must be a JSON object".to_string()));
        }
    }

    config.trace_loaded();
    Ok(config)
}

/// Parse the config's `agsUrl`.
pub fn admin_url(config: &SlapConfig) -> Result<Url, PublishError> {
    Url::parse(&config.ags_url).map_err(|e| {
        error!(error = ?e, ags_url = %config.ags_url, "agsUrl is not a valid URL");
        PublishError::Config(format!("agsUrl '{}' is not a valid URL: {e}", config.ags_url))
    })
}
