//! Deprecated standalone front-end: a flat `{ "services": [...] }` file fed
//! straight into [`Publisher::publish`](crate::publish::Publisher::publish).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ServiceConfigEntry;
use crate::error::PublishError;
use crate::load_config::read_json;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyConfig {
    services: Vec<ServiceConfigEntry>,
}

/// Load the service list of a legacy config. Unknown top-level keys are rejected.
pub fn load_legacy_services<P: AsRef<Path>>(path: P) -> Result<Vec<ServiceConfigEntry>, PublishError> {
    warn!("The standalone map service publisher is deprecated, use `slap publish`");
    let legacy: LegacyConfig = read_json(path.as_ref())?;
    info!(services = legacy.services.len(), "Loaded legacy service list");
    Ok(legacy.services)
}

/// Directory relative paths in a legacy config resolve against: the config's own.
pub fn legacy_working_dir(config_path: &Path, cwd: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_service_list() {
        let file = NamedTempFile::new().unwrap();
        write(
            file.path(),
            r#"{"services": [{"input": "mxd/foo.mxd", "output": "output", "serviceName": "foo", "connectionFilePath": "ags.ags"}]}"#,
        )
        .unwrap();
        let services = load_legacy_services(file.path()).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].service_name, "foo");
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let file = NamedTempFile::new().unwrap();
        write(file.path(), r#"{"services": [], "import": "os"}"#).unwrap();
        let err = load_legacy_services(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn rejects_missing_service_list() {
        let file = NamedTempFile::new().unwrap();
        write(file.path(), r#"{}"#).unwrap();
        assert!(matches!(
            load_legacy_services(file.path()),
            Err(PublishError::Config(_))
        ));
    }

    #[test]
    fn working_dir_is_the_config_directory() {
        let cwd = Path::new("/home/ci");
        assert_eq!(
            legacy_working_dir(Path::new("/srv/publish/services.json"), cwd),
            PathBuf::from("/srv/publish")
        );
        assert_eq!(
            legacy_working_dir(Path::new("configs/services.json"), cwd),
            PathBuf::from("/home/ci/configs")
        );
        assert_eq!(legacy_working_dir(Path::new("services.json"), cwd), cwd.to_path_buf());
    }
}
