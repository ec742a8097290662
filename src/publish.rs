//! Publication pipeline: turns configured entries into hosted services.
//!
//! For every entry the pipeline:
//!   - picks a strategy from the input's extension ([`InputKind`])
//!   - derives the `.sddraft`/`.sd` paths from the input's base name and the entry's output dir
//!   - builds a draft (map documents optionally get their data sources rebound first;
//!     toolboxes get their tool looked up in the [`ToolRegistry`] and run)
//!   - analyzes the draft, and only when it has no errors stages and uploads it.
//!
//! Entries run strictly one after another. The first failure stops the batch and
//! is returned to the caller.

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::{GpServiceOptions, ServiceConfigEntry, SlapConfig};
use crate::contract::{GisToolkit, InputKind, ServiceMetadata};
use crate::data_sources::resolve_data_source;
use crate::error::PublishError;
use crate::toolkit::registry::ToolRegistry;

pub const DRAFT_EXTENSION: &str = "sddraft";
pub const DEFINITION_EXTENSION: &str = "sd";

/// Settings passed down to every publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// When false, an entry whose draft or definition already exists fails instead of overwriting.
    pub overwrite_output: bool,
    /// Base for relative input, output and connection paths.
    pub working_dir: PathBuf,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            overwrite_output: true,
            working_dir: PathBuf::from("."),
        }
    }
}

/// On-disk artifacts of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceArtifacts {
    pub draft: PathBuf,
    pub definition: PathBuf,
}

/// Derive `<output_dir>/<stem>.sddraft` and `<output_dir>/<stem>.sd` for an input.
pub fn artifact_paths(input: &str, output_dir: &Path) -> Result<ServiceArtifacts, PublishError> {
    let stem = Path::new(input)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PublishError::Config(format!("input '{input}' has no file name")))?;
    Ok(ServiceArtifacts {
        draft: output_dir.join(format!("{stem}.{DRAFT_EXTENSION}")),
        definition: output_dir.join(format!("{stem}.{DEFINITION_EXTENSION}")),
    })
}

/// Package a validated draft and upload it to `target`. Staging always precedes upload.
pub async fn stage_and_upload<T>(
    toolkit: &T,
    artifacts: &ServiceArtifacts,
    target: &Path,
) -> Result<(), PublishError>
where
    T: GisToolkit + ?Sized,
{
    println!("Staging service definition...");
    info!(draft = %artifacts.draft.display(), definition = %artifacts.definition.display(), "Staging service definition");
    toolkit
        .stage_service(&artifacts.draft, &artifacts.definition)
        .await
        .map_err(PublishError::external("stage service"))?;

    println!("Uploading service definition...");
    info!(definition = %artifacts.definition.display(), target = %target.display(), "Uploading service definition");
    toolkit
        .upload_service_definition(&artifacts.definition, target)
        .await
        .map_err(PublishError::external("upload service definition"))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedService {
    pub input: String,
    pub service_name: String,
    pub kind: InputKind,
    pub artifacts: ServiceArtifacts,
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub services: Vec<PublishedService>,
}

pub struct Publisher<T> {
    toolkit: T,
    registry: ToolRegistry,
    options: PublishOptions,
}

impl<T: GisToolkit> Publisher<T> {
    pub fn new(toolkit: T, options: PublishOptions) -> Self {
        Self {
            toolkit,
            registry: ToolRegistry::new(),
            options,
        }
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Publish entries in order, stopping at the first failure.
    pub async fn publish(
        &mut self,
        entries: &[ServiceConfigEntry],
    ) -> Result<PublishReport, PublishError> {
        let mut report = PublishReport::default();
        for entry in entries {
            println!("Publishing {}", entry.input);
            let published = self.publish_entry(entry).await.map_err(|e| {
                error!(input = %entry.input, error = %e, "Publishing failed");
                e
            })?;
            println!("{} published successfully", entry.input);
            report.services.push(published);
        }
        Ok(report)
    }

    /// Publish every map service, then every geoprocessing service, in the config.
    pub async fn publish_all(&mut self, config: &SlapConfig) -> Result<PublishReport, PublishError> {
        let entries: Vec<ServiceConfigEntry> = config.publishable_services().cloned().collect();
        info!(count = entries.len(), "Publishing all configured services");
        self.publish(&entries).await
    }

    /// Publish the configured entry whose input matches `input`.
    pub async fn publish_input(
        &mut self,
        config: &SlapConfig,
        input: &str,
    ) -> Result<PublishedService, PublishError> {
        let wanted = normalize_input(input);
        let entry = config
            .publishable_services()
            .find(|e| normalize_input(&e.input) == wanted)
            .cloned()
            .ok_or_else(|| PublishError::UnknownInput(input.to_string()))?;
        let mut report = self.publish(std::slice::from_ref(&entry)).await?;
        report
            .services
            .pop()
            .ok_or_else(|| PublishError::UnknownInput(input.to_string()))
    }

    pub async fn publish_entry(
        &mut self,
        entry: &ServiceConfigEntry,
    ) -> Result<PublishedService, PublishError> {
        let kind = InputKind::from_path(&entry.input).ok_or_else(|| {
            warn!(input = %entry.input, "Unsupported input type");
            PublishError::UnsupportedInputType {
                input: entry.input.clone(),
            }
        })?;
        let artifacts = match kind {
            InputKind::MapDocument => self.publish_mxd(entry).await?,
            InputKind::Toolbox => self.publish_gp(entry).await?,
        };
        Ok(PublishedService {
            input: entry.input.clone(),
            service_name: entry.service_name.clone(),
            kind,
            artifacts,
        })
    }

    pub async fn publish_mxd(
        &mut self,
        entry: &ServiceConfigEntry,
    ) -> Result<ServiceArtifacts, PublishError> {
        let artifacts = self.prepare_artifacts(entry).await?;
        let target = self.resolve(&entry.connection_file_path);

        let doc = self
            .toolkit
            .open_map_document(&self.resolve(&entry.input))
            .await
            .map_err(PublishError::external("open map document"))?;

        if let Some(data_sources) = &entry.data_sources {
            let (path, kind) = resolve_data_source(data_sources, &self.options.working_dir)?;
            println!("Replacing data sources with {:?}", kind);
            info!(input = %entry.input, target = %path.display(), ?kind, "Rebinding data sources");
            self.toolkit
                .replace_workspaces(&doc, &path, kind)
                .await
                .map_err(PublishError::external("replace data sources"))?;
        }

        println!("Generating service definition draft for mxd...");
        let metadata = ServiceMetadata::from_entry(entry, target.clone());
        info!(input = %entry.input, draft = %artifacts.draft.display(), service = %metadata.service_name, "Creating map service draft");
        self.toolkit
            .create_map_sddraft(&doc, &artifacts.draft, &metadata)
            .await
            .map_err(PublishError::external("create map service draft"))?;

        self.analyze_stage_upload(entry, &artifacts, &target).await?;
        Ok(artifacts)
    }

    pub async fn publish_gp(
        &mut self,
        entry: &ServiceConfigEntry,
    ) -> Result<ServiceArtifacts, PublishError> {
        let artifacts = self.prepare_artifacts(entry).await?;
        let target = self.resolve(&entry.connection_file_path);
        let toolbox_path = self.resolve(&entry.input);

        let alias = entry.toolbox.as_deref().ok_or_else(|| {
            PublishError::Config(format!("gp service '{}' is missing 'toolbox'", entry.input))
        })?;
        let tool_name = entry.tool.as_deref().ok_or_else(|| {
            PublishError::Config(format!("gp service '{}' is missing 'tool'", entry.input))
        })?;

        if !self.registry.is_imported(alias, &toolbox_path) {
            let tools = self
                .toolkit
                .import_toolbox(&toolbox_path, alias)
                .await
                .map_err(PublishError::external("import toolbox"))?;
            info!(toolbox = %toolbox_path.display(), alias, tools = tools.len(), "Imported toolbox");
            self.registry.register_toolbox(&toolbox_path, alias, tools);
        }
        let tool = self
            .registry
            .lookup(alias, tool_name)
            .cloned()
            .ok_or_else(|| PublishError::UnknownTool {
                toolbox: alias.to_string(),
                tool: tool_name.to_string(),
            })?;

        let result = self
            .toolkit
            .run_tool(&tool)
            .await
            .map_err(PublishError::external("run tool"))?;

        println!("Generating service definition draft for gp tool...");
        let mut metadata = ServiceMetadata::from_entry(entry, target.clone());
        if metadata.tags.is_empty() {
            metadata.tags = "gp".to_string();
        }
        let options = entry.gp_options.apply(GpServiceOptions::default());
        info!(input = %entry.input, tool = %tool.tool_name, draft = %artifacts.draft.display(), ?options, "Creating gp service draft");
        self.toolkit
            .create_gp_sddraft(&result, &artifacts.draft, &metadata, &options)
            .await
            .map_err(PublishError::external("create gp service draft"))?;

        self.analyze_stage_upload(entry, &artifacts, &target).await?;
        Ok(artifacts)
    }

    async fn analyze_stage_upload(
        &self,
        entry: &ServiceConfigEntry,
        artifacts: &ServiceArtifacts,
        target: &Path,
    ) -> Result<(), PublishError> {
        let analysis = self
            .toolkit
            .analyze(&artifacts.draft)
            .await
            .map_err(PublishError::external("analyze draft"))?;

        for warning in &analysis.warnings {
            warn!(input = %entry.input, code = warning.code, message = %warning.message, "Analysis warning");
        }
        if !analysis.is_successful() {
            error!(input = %entry.input, errors = analysis.errors.len(), "Analysis contained errors");
            return Err(PublishError::AnalysisFailed {
                input: entry.input.clone(),
                errors: analysis.errors,
            });
        }

        stage_and_upload(&self.toolkit, artifacts, target).await
    }

    async fn prepare_artifacts(
        &self,
        entry: &ServiceConfigEntry,
    ) -> Result<ServiceArtifacts, PublishError> {
        let output_dir = self.resolve(&entry.output);
        let artifacts = artifact_paths(&entry.input, &output_dir)?;

        if !self.options.overwrite_output {
            for path in [&artifacts.draft, &artifacts.definition] {
                if path.exists() {
                    return Err(PublishError::ArtifactExists(path.clone()));
                }
            }
        }
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            error!(error = ?e, path = %output_dir.display(), "Failed to create output directory");
            PublishError::ExternalTool {
                operation: "create output directory",
                source: Box::new(e),
            }
        })?;
        Ok(artifacts)
    }

    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.options.working_dir.join(path)
    }
}

fn normalize_input(input: &str) -> String {
    input
        .replace('\\', "/")
        .trim_start_matches("./")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_naming_is_deterministic() {
        let first = artifact_paths("mxd/foo.mxd", Path::new("out")).unwrap();
        let second = artifact_paths("mxd/foo.mxd", Path::new("out")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.draft, PathBuf::from("out/foo.sddraft"));
        assert_eq!(first.definition, PathBuf::from("out/foo.sd"));
    }

    #[test]
    fn artifact_naming_needs_a_file_name() {
        assert!(matches!(
            artifact_paths("", Path::new("out")),
            Err(PublishError::Config(_))
        ));
    }

    #[test]
    fn inputs_match_across_separators() {
        assert_eq!(normalize_input("mxd\\bar.mxd"), normalize_input("./mxd/bar.mxd"));
    }
}
