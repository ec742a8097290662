//! `slap init`: scan directories for publishable inputs and write a starter config.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{DataSourceOverride, ServiceConfigEntry, SlapConfig};
use crate::contract::{GisToolkit, InputKind, WorkspaceKind, WorkspaceRef};
use crate::error::PublishError;

pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, Clone)]
pub struct InitRequest {
    pub directories: Vec<PathBuf>,
    pub filename: PathBuf,
    pub hostname: String,
    /// Look up each map document's data sources and record them in the config.
    pub register_data_sources: bool,
}

pub fn default_ags_url(hostname: &str) -> String {
    format!("https://{hostname}:6443/arcgis/admin")
}

/// Publishable files under `dir`, in a stable order.
pub fn find_inputs(dir: &Path) -> Vec<(PathBuf, InputKind)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = e.path().to_path_buf();
            InputKind::from_path(&path).map(|kind| (path, kind))
        })
        .collect()
}

fn as_input(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn entry_for(path: &Path, kind: InputKind, hostname: &str) -> ServiceConfigEntry {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut entry = ServiceConfigEntry::new(
        as_input(path),
        DEFAULT_OUTPUT_DIR,
        stem.clone(),
        format!("connections/{hostname}.ags"),
    );
    if kind == InputKind::Toolbox {
        entry.toolbox = Some(stem.clone());
        entry.tool = Some(stem);
    }
    entry
}

fn override_for(workspace: &WorkspaceRef) -> DataSourceOverride {
    match workspace.kind {
        WorkspaceKind::FileGeodatabase => DataSourceOverride {
            fgdb_path: Some(workspace.path.to_string_lossy().into_owned()),
            db_connection_file_path: None,
        },
        WorkspaceKind::EnterpriseDatabase => DataSourceOverride {
            fgdb_path: None,
            db_connection_file_path: Some(workspace.path.clone()),
        },
    }
}

/// Build the config for every input found under the requested directories.
pub async fn build_config<T>(request: &InitRequest, toolkit: &T) -> Result<SlapConfig, PublishError>
where
    T: GisToolkit + ?Sized,
{
    let mut config = SlapConfig::new(default_ags_url(&request.hostname));

    for dir in &request.directories {
        info!(dir = %dir.display(), "Scanning for publishable inputs");
        for (path, kind) in find_inputs(dir) {
            debug!(path = %path.display(), ?kind, "Found input");
            let mut entry = entry_for(&path, kind, &request.hostname);
            match kind {
                InputKind::MapDocument => {
                    if request.register_data_sources {
                        entry.data_sources = discover_data_source(toolkit, &path).await?;
                    }
                    config.map_services.services.push(entry);
                }
                InputKind::Toolbox => config.gp_services.services.push(entry),
            }
        }
    }
    Ok(config)
}

// An entry holds a single rebind target, so only single-workspace documents get one.
async fn discover_data_source<T>(
    toolkit: &T,
    path: &Path,
) -> Result<Option<DataSourceOverride>, PublishError>
where
    T: GisToolkit + ?Sized,
{
    let doc = toolkit
        .open_map_document(path)
        .await
        .map_err(PublishError::external("open map document"))?;
    let workspaces = toolkit
        .list_workspaces(&doc)
        .await
        .map_err(PublishError::external("list data sources"))?;
    match workspaces.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(override_for(only))),
        many => {
            warn!(
                path = %path.display(),
                count = many.len(),
                "Map document uses several data sources, leaving dataSources unset"
            );
            Ok(None)
        }
    }
}

/// Build the config and write it as pretty JSON to `request.filename`.
pub async fn create_config<T>(request: &InitRequest, toolkit: &T) -> Result<SlapConfig, PublishError>
where
    T: GisToolkit + ?Sized,
{
    let config = build_config(request, toolkit).await?;
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| PublishError::Config(format!("Failed to serialize config: {e}")))?;
    tokio::fs::write(&request.filename, json).await.map_err(|e| {
        error!(error = ?e, path = %request.filename.display(), "Failed to write config");
        PublishError::Config(format!(
            "Failed to write config {}: {e}",
            request.filename.display()
        ))
    })?;
    println!(
        "Wrote {} map and {} gp services to {}",
        config.map_services.services.len(),
        config.gp_services.services.len(),
        request.filename.display()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MapDocument, MockGisToolkit};
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn request(dir: &Path, register: bool) -> InitRequest {
        InitRequest {
            directories: vec![dir.to_path_buf()],
            filename: dir.join("config.json"),
            hostname: "gis01".into(),
            register_data_sources: register,
        }
    }

    #[tokio::test]
    async fn scans_nested_directories_without_touching_the_toolkit() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "mxd/a.mxd");
        touch(dir.path(), "mxd/nested/B.MXD");
        touch(dir.path(), "gp/Tools.tbx");
        touch(dir.path(), "readme.txt");

        let toolkit = MockGisToolkit::new();
        let config = build_config(&request(dir.path(), false), &toolkit)
            .await
            .unwrap();

        assert_eq!(config.ags_url, "https://gis01:6443/arcgis/admin");
        let maps: Vec<&str> = config
            .map_services
            .services
            .iter()
            .map(|e| e.service_name.as_str())
            .collect();
        assert_eq!(maps, vec!["a", "B"]);
        let gp = &config.gp_services.services[0];
        assert_eq!(gp.toolbox.as_deref(), Some("Tools"));
        assert_eq!(gp.tool.as_deref(), Some("Tools"));
        assert_eq!(gp.connection_file_path, PathBuf::from("connections/gis01.ags"));
    }

    #[tokio::test]
    async fn register_records_single_data_source() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "mxd/a.mxd");

        let mut toolkit = MockGisToolkit::new();
        toolkit.expect_open_map_document().returning(|p| {
            Ok(MapDocument {
                path: p.to_path_buf(),
            })
        });
        toolkit.expect_list_workspaces().returning(|_| {
            Ok(vec![WorkspaceRef {
                path: PathBuf::from("/data/city.gdb"),
                kind: WorkspaceKind::FileGeodatabase,
            }])
        });

        let req = request(dir.path(), true);
        let config = create_config(&req, &toolkit).await.unwrap();
        let ds = config.map_services.services[0].data_sources.clone().unwrap();
        assert_eq!(ds.fgdb_path.as_deref(), Some("/data/city.gdb"));

        let written: SlapConfig =
            serde_json::from_str(&fs::read_to_string(&req.filename).unwrap()).unwrap();
        assert_eq!(written, config);
    }

    #[tokio::test]
    async fn multiple_data_sources_are_left_unset() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.mxd");

        let mut toolkit = MockGisToolkit::new();
        toolkit.expect_open_map_document().returning(|p| {
            Ok(MapDocument {
                path: p.to_path_buf(),
            })
        });
        toolkit.expect_list_workspaces().returning(|_| {
            Ok(vec![
                WorkspaceRef {
                    path: PathBuf::from("/data/a.gdb"),
                    kind: WorkspaceKind::FileGeodatabase,
                },
                WorkspaceRef {
                    path: PathBuf::from("/conn/prod.sde"),
                    kind: WorkspaceKind::EnterpriseDatabase,
                },
            ])
        });

        let config = build_config(&request(dir.path(), true), &toolkit)
            .await
            .unwrap();
        assert!(config.map_services.services[0].data_sources.is_none());
    }
}
