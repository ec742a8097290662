//! Declarative publishing configuration.
//!
//! The JSON document has an `agsUrl` (the server admin root), an optional `site`
//! descriptor and one `{ "services": [...] }` list per service category.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlapConfig {
    pub ags_url: String,
    /// Passed verbatim to site creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<serde_json::Value>,
    #[serde(default)]
    pub map_services: ServiceList,
    #[serde(default)]
    pub gp_services: ServiceList,
    #[serde(default)]
    pub image_services: ServiceList,
}

impl SlapConfig {
    pub fn new(ags_url: impl Into<String>) -> Self {
        Self {
            ags_url: ags_url.into(),
            site: None,
            map_services: ServiceList::default(),
            gp_services: ServiceList::default(),
            image_services: ServiceList::default(),
        }
    }

    /// Entries the pipeline can publish, map services first.
    pub fn publishable_services(&self) -> impl Iterator<Item = &ServiceConfigEntry> {
        self.map_services
            .services
            .iter()
            .chain(self.gp_services.services.iter())
    }

    /// Every configured entry, including categories that are only scanned for data sources.
    pub fn all_services(&self) -> impl Iterator<Item = &ServiceConfigEntry> {
        self.publishable_services()
            .chain(self.image_services.services.iter())
    }

    pub fn trace_loaded(&self) {
        info!(
            ags_url = %self.ags_url,
            map_services = self.map_services.services.len(),
            gp_services = self.gp_services.services.len(),
            image_services = self.image_services.services.len(),
            has_site = self.site.is_some(),
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceList {
    #[serde(default)]
    pub services: Vec<ServiceConfigEntry>,
}

/// One publishable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfigEntry {
    pub input: String,
    /// Directory receiving the `.sddraft` and `.sd` files.
    pub output: PathBuf,
    pub service_name: String,
    #[serde(default = "default_server_type")]
    pub server_type: String,
    /// Server connection file the service definition is uploaded to.
    pub connection_file_path: PathBuf,
    #[serde(default)]
    pub copy_data_to_server: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sources: Option<DataSourceOverride>,

    /// Toolbox alias, geoprocessing entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default = "default_execution_type")]
    pub execution_type: String,
    #[serde(default, skip_serializing_if = "GpServiceOverrides::is_empty")]
    pub gp_options: GpServiceOverrides,
}

fn default_server_type() -> String {
    "ARCGIS_SERVER".to_string()
}

fn default_execution_type() -> String {
    "Synchronous".to_string()
}

impl ServiceConfigEntry {
    /// Minimal entry with defaults for everything but the identifying fields.
    pub fn new(
        input: impl Into<String>,
        output: impl Into<PathBuf>,
        service_name: impl Into<String>,
        connection_file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            service_name: service_name.into(),
            server_type: default_server_type(),
            connection_file_path: connection_file_path.into(),
            copy_data_to_server: false,
            folder_name: None,
            summary: String::new(),
            tags: String::new(),
            data_sources: None,
            toolbox: None,
            tool: None,
            execution_type: default_execution_type(),
            gp_options: GpServiceOverrides::default(),
        }
    }
}

/// Where a map document's layers should point after rebinding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fgdb_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_connection_file_path: Option<PathBuf>,
}

/// Operational bounds for geoprocessing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpServiceOptions {
    pub max_records: u32,
    pub min_instances: u32,
    pub max_instances: u32,
    pub max_usage_time: u32,
    pub max_wait_time: u32,
    pub max_idle_time: u32,
}

impl Default for GpServiceOptions {
    fn default() -> Self {
        Self {
            max_records: 5000,
            min_instances: 2,
            max_instances: 3,
            max_usage_time: 100,
            max_wait_time: 10,
            max_idle_time: 180,
        }
    }
}

/// Per-entry overrides of [`GpServiceOptions`]; unset fields keep the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpServiceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usage_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_time: Option<u32>,
}

impl GpServiceOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, base: GpServiceOptions) -> GpServiceOptions {
        GpServiceOptions {
            max_records: self.max_records.unwrap_or(base.max_records),
            min_instances: self.min_instances.unwrap_or(base.min_instances),
            max_instances: self.max_instances.unwrap_or(base.max_instances),
            max_usage_time: self.max_usage_time.unwrap_or(base.max_usage_time),
            max_wait_time: self.max_wait_time.unwrap_or(base.max_wait_time),
            max_idle_time: self.max_idle_time.unwrap_or(base.max_idle_time),
        }
    }
}
