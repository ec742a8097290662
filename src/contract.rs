//! # contract: seams to the external capabilities the pipeline drives
//!
//! The publishing pipeline never talks to the geospatial SDK, the server or git
//! directly. It goes through three async traits:
//!
//! - [`GisToolkit`]: open map documents, rebind data sources, create and analyze
//!   service-definition drafts, stage and upload them.
//! - [`ServerApi`]: site creation and data-store registration on the server.
//! - [`ChangeLister`]: which publishable inputs changed since a revision.
//!
//! Errors are uniform boxed trait objects ([`ExternalError`]); the pipeline wraps
//! them into [`PublishError::ExternalTool`](crate::error::PublishError::ExternalTool).
//!
//! ## Mocking & Testing
//! Each trait carries `mockall::automock` (enabled under `test` or the
//! `test-export-mocks` feature) so integration tests can assert call order and
//! arguments without an SDK or server.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{GpServiceOptions, ServiceConfigEntry};
use crate::error::ExternalError;

/// The closed set of publishable input kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    MapDocument,
    Toolbox,
}

impl InputKind {
    pub const MAP_DOCUMENT_EXTENSION: &'static str = "mxd";
    pub const TOOLBOX_EXTENSION: &'static str = "tbx";

    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case(Self::MAP_DOCUMENT_EXTENSION) {
            Some(InputKind::MapDocument)
        } else if ext.eq_ignore_ascii_case(Self::TOOLBOX_EXTENSION) {
            Some(InputKind::Toolbox)
        } else {
            None
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Workspace type a map document's layers are rebound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkspaceKind {
    FileGeodatabase,
    EnterpriseDatabase,
}

impl WorkspaceKind {
    /// Workspace type keyword understood by the SDK.
    pub fn sdk_keyword(&self) -> &'static str {
        match self {
            WorkspaceKind::FileGeodatabase => "FILEGDB_WORKSPACE",
            WorkspaceKind::EnterpriseDatabase => "SDE_WORKSPACE",
        }
    }
}

/// An opened source map document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDocument {
    pub path: PathBuf,
}

/// A data source referenced by a map document's layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
    pub path: PathBuf,
    pub kind: WorkspaceKind,
}

/// Service metadata shared by both draft strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMetadata {
    pub service_name: String,
    pub server_type: String,
    /// Resolved server connection file.
    pub connection_file_path: PathBuf,
    pub copy_data_to_server: bool,
    pub folder_name: Option<String>,
    pub summary: String,
    pub tags: String,
    pub execution_type: String,
}

impl ServiceMetadata {
    pub fn from_entry(entry: &ServiceConfigEntry, connection_file_path: PathBuf) -> Self {
        Self {
            service_name: entry.service_name.clone(),
            server_type: entry.server_type.clone(),
            connection_file_path,
            copy_data_to_server: entry.copy_data_to_server,
            folder_name: entry.folder_name.clone(),
            summary: entry.summary.clone(),
            tags: entry.tags.clone(),
            execution_type: entry.execution_type.clone(),
        }
    }
}

/// A tool inside an imported toolbox, looked up through the
/// [`ToolRegistry`](crate::toolkit::registry::ToolRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolDescriptor {
    pub toolbox_path: PathBuf,
    pub toolbox_alias: String,
    pub tool_name: String,
}

/// Output of running a tool; the source of a geoprocessing draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool: ToolDescriptor,
    /// Toolkit-specific reference to the result. For deferred toolkits this
    /// is the tool name within the toolbox alias.
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisIssue {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub objects: Vec<String>,
}

/// Outcome of analyzing a draft. Any entry in `errors` blocks staging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub errors: Vec<AnalysisIssue>,
    #[serde(default)]
    pub warnings: Vec<AnalysisIssue>,
    #[serde(default)]
    pub messages: Vec<AnalysisIssue>,
}

impl AnalysisResult {
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Trait for the geospatial SDK operations the pipeline sequences.
///
/// Implemented by [`ArcPyToolkit`](crate::toolkit::ArcPyToolkit) and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GisToolkit: Send + Sync {
    async fn open_map_document(&self, path: &Path) -> Result<MapDocument, ExternalError>;

    /// List the workspaces referenced by the document's layers.
    async fn list_workspaces(&self, doc: &MapDocument) -> Result<Vec<WorkspaceRef>, ExternalError>;

    /// Point every layer at `target` and save the document in place.
    async fn replace_workspaces(
        &self,
        doc: &MapDocument,
        target: &Path,
        kind: WorkspaceKind,
    ) -> Result<(), ExternalError>;

    async fn create_map_sddraft(
        &self,
        doc: &MapDocument,
        draft: &Path,
        metadata: &ServiceMetadata,
    ) -> Result<(), ExternalError>;

    /// Import a toolbox under `alias`, returning the names of the tools it contains.
    async fn import_toolbox(&self, toolbox: &Path, alias: &str) -> Result<Vec<String>, ExternalError>;

    /// Resolve a registered tool for publishing. Implementations may defer
    /// execution: [`ArcPyToolkit`](crate::toolkit::ArcPyToolkit) only runs the
    /// tool inside [`create_gp_sddraft`](GisToolkit::create_gp_sddraft).
    async fn run_tool(&self, tool: &ToolDescriptor) -> Result<ToolResult, ExternalError>;

    async fn create_gp_sddraft(
        &self,
        result: &ToolResult,
        draft: &Path,
        metadata: &ServiceMetadata,
        options: &GpServiceOptions,
    ) -> Result<(), ExternalError>;

    async fn analyze(&self, draft: &Path) -> Result<AnalysisResult, ExternalError>;

    async fn stage_service(&self, draft: &Path, definition: &Path) -> Result<(), ExternalError>;

    async fn upload_service_definition(
        &self,
        definition: &Path,
        target: &Path,
    ) -> Result<(), ExternalError>;
}

/// A data source to add to the server's data-store registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStoreRegistration {
    pub name: String,
    pub path: PathBuf,
    pub kind: WorkspaceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    AlreadyRegistered,
}

/// Trait for the server administration calls made before publishing.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// Create a site from an explicit descriptor.
    async fn create_site(&self, site: &serde_json::Value) -> Result<(), ExternalError>;

    /// Create a site with the server's default settings.
    async fn create_default_site(&self) -> Result<(), ExternalError>;

    async fn register_data_store(
        &self,
        registration: &DataStoreRegistration,
    ) -> Result<RegistrationOutcome, ExternalError>;
}

/// Trait for listing publishable inputs changed since a revision.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ChangeLister: Send + Sync {
    async fn get_changed_inputs(&self, since_revision: &str) -> Result<Vec<String>, ExternalError>;
}
