//! Preconditions run before publishing: site creation and data-source registration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::SlapConfig;
use crate::contract::{DataStoreRegistration, RegistrationOutcome, ServerApi, WorkspaceKind};
use crate::data_sources::resolve_data_source;
use crate::error::PublishError;

/// Create the site named in the config, or a default site when none is configured.
pub async fn create_site<S>(server: &S, config: &SlapConfig) -> Result<(), PublishError>
where
    S: ServerApi + ?Sized,
{
    match &config.site {
        Some(site) => {
            info!("Creating site from config");
            server
                .create_site(site)
                .await
                .map_err(PublishError::external("create site"))
        }
        None => {
            info!("No site in config, creating default site");
            server
                .create_default_site()
                .await
                .map_err(PublishError::external("create default site"))
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<DataStoreRegistration>,
    pub already_registered: Vec<DataStoreRegistration>,
}

/// Data stores referenced by every service category, deduplicated by path.
///
/// Names are unique per path: distinct paths sharing a file stem get a numeric
/// suffix so the server never mistakes one for the other.
pub fn collect_data_stores(
    config: &SlapConfig,
    working_dir: &Path,
) -> Result<Vec<DataStoreRegistration>, PublishError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut names: HashSet<String> = HashSet::new();
    let mut stores = Vec::new();
    for entry in config.all_services() {
        let Some(data_sources) = &entry.data_sources else {
            continue;
        };
        let (path, kind) = resolve_data_source(data_sources, working_dir)?;
        if seen.insert(path.clone()) {
            let base = data_store_name(&path, kind);
            let mut name = base.clone();
            let mut n = 2;
            while !names.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            stores.push(DataStoreRegistration { name, path, kind });
        }
    }
    Ok(stores)
}

fn data_store_name(path: &Path, kind: WorkspaceKind) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("datastore");
    match kind {
        WorkspaceKind::FileGeodatabase => format!("{stem}_fgdb"),
        WorkspaceKind::EnterpriseDatabase => format!("{stem}_egdb"),
    }
}

/// Register every referenced data source with the server. Sources the server
/// already knows are tolerated.
pub async fn register_data_sources<S>(
    server: &S,
    config: &SlapConfig,
    working_dir: &Path,
) -> Result<RegistrationReport, PublishError>
where
    S: ServerApi + ?Sized,
{
    let mut report = RegistrationReport::default();
    for store in collect_data_stores(config, working_dir)? {
        info!(name = %store.name, path = %store.path.display(), kind = ?store.kind, "Registering data source");
        let outcome = server
            .register_data_store(&store)
            .await
            .map_err(PublishError::external("register data source"))?;
        match outcome {
            RegistrationOutcome::Registered => report.registered.push(store),
            RegistrationOutcome::AlreadyRegistered => {
                warn!(name = %store.name, "Data source already registered, skipping");
                report.already_registered.push(store);
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataSourceOverride, ServiceConfigEntry};

    fn entry_with(ds: DataSourceOverride) -> ServiceConfigEntry {
        let mut entry = ServiceConfigEntry::new("mxd/a.mxd", "out", "a", "ags.ags");
        entry.data_sources = Some(ds);
        entry
    }

    #[test]
    fn collects_across_categories_without_duplicates() {
        let mut config = SlapConfig::new("https://host:6443/arcgis/admin");
        let fgdb = DataSourceOverride {
            fgdb_path: Some("/data/city.gdb".into()),
            db_connection_file_path: None,
        };
        config.map_services.services.push(entry_with(fgdb.clone()));
        config.gp_services.services.push(entry_with(fgdb));
        config.image_services.services.push(entry_with(DataSourceOverride {
            fgdb_path: None,
            db_connection_file_path: Some("conn/prod.sde".into()),
        }));
        config
            .map_services
            .services
            .push(ServiceConfigEntry::new("mxd/b.mxd", "out", "b", "ags.ags"));

        let stores = collect_data_stores(&config, Path::new("/work")).unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].name, "city_fgdb");
        assert_eq!(stores[0].kind, WorkspaceKind::FileGeodatabase);
        assert_eq!(stores[1].path, PathBuf::from("/work/conn/prod.sde"));
        assert_eq!(stores[1].name, "prod_egdb");
    }

    #[test]
    fn same_stem_paths_get_distinct_names() {
        let mut config = SlapConfig::new("https://host:6443/arcgis/admin");
        for path in ["/east/city.gdb", "/west/city.gdb", "/east/city.gdb", "/north/city.gdb"] {
            config.map_services.services.push(entry_with(DataSourceOverride {
                fgdb_path: Some(path.into()),
                db_connection_file_path: None,
            }));
        }

        let stores = collect_data_stores(&config, Path::new("/work")).unwrap();
        let names: Vec<&str> = stores.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["city_fgdb", "city_fgdb_2", "city_fgdb_3"]);
        assert_eq!(stores[1].path, PathBuf::from("/west/city.gdb"));
    }
}
