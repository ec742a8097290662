use std::path::{Path, PathBuf};

use crate::config::DataSourceOverride;
use crate::contract::WorkspaceKind;
use crate::error::PublishError;

/// Resolve a data-source override to its rebind target.
///
/// A non-empty `fgdbPath` is used verbatim as a file geodatabase. Otherwise the
/// enterprise connection file is resolved against `working_dir`. The target is
/// not checked for existence.
pub fn resolve_data_source(
    data_sources: &DataSourceOverride,
    working_dir: &Path,
) -> Result<(PathBuf, WorkspaceKind), PublishError> {
    if let Some(fgdb) = data_sources.fgdb_path.as_deref().filter(|p| !p.is_empty()) {
        return Ok((PathBuf::from(fgdb), WorkspaceKind::FileGeodatabase));
    }
    match &data_sources.db_connection_file_path {
        Some(conn) if !conn.as_os_str().is_empty() => {
            Ok((working_dir.join(conn), WorkspaceKind::EnterpriseDatabase))
        }
        _ => Err(PublishError::Config(
            "dataSources needs a non-empty fgdbPath or a dbConnectionFilePath".to_string(),
        )),
    }
}
