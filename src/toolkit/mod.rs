//! # toolkit: drives the geospatial SDK through an external Python interpreter
//!
//! [`ArcPyToolkit`] implements [`GisToolkit`] by running one short `arcpy` script
//! per operation. Arguments go in as JSON on stdin; the script answers with a
//! single `{"result": ...}` JSON line on stdout. A non-zero exit becomes an
//! error carrying the interpreter's stderr.
//!
//! The interpreter is taken from `SLAP_PYTHON` (default `python`), the way the
//! git lister shells out to `git`.

pub mod registry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::GpServiceOptions;
use crate::contract::{
    AnalysisResult, GisToolkit, MapDocument, ServiceMetadata, ToolDescriptor, ToolResult,
    WorkspaceKind, WorkspaceRef,
};
use crate::error::ExternalError;

pub const PYTHON_ENV_VAR: &str = "SLAP_PYTHON";

const PRELUDE: &str = r#"
import json
import sys
import arcpy

ARGS = json.loads(sys.stdin.read())
arcpy.env.overwriteOutput = ARGS["overwrite"]


def done(value=None):
    sys.stdout.write("\n" + json.dumps({"result": value}) + "\n")
"#;

const OPEN_MAP_DOCUMENT: &str = r#"
mxd = arcpy.mapping.MapDocument(ARGS["mxd"])
done(mxd.filePath)
"#;

const LIST_WORKSPACES: &str = r#"
mxd = arcpy.mapping.MapDocument(ARGS["mxd"])
found = []
for layer in arcpy.mapping.ListLayers(mxd):
    if not layer.supports("WORKSPACEPATH"):
        continue
    path = layer.workspacePath
    lowered = path.lower()
    if lowered.endswith(".sde"):
        kind = "EnterpriseDatabase"
    elif lowered.endswith(".gdb"):
        kind = "FileGeodatabase"
    else:
        continue
    if {"path": path, "kind": kind} not in found:
        found.append({"path": path, "kind": kind})
done(found)
"#;

const REPLACE_WORKSPACES: &str = r#"
mxd = arcpy.mapping.MapDocument(ARGS["mxd"])
mxd.replaceWorkspaces("", "NONE", ARGS["target"], ARGS["kind"])
mxd.save()
done()
"#;

const CREATE_MAP_SDDRAFT: &str = r#"
mxd = arcpy.mapping.MapDocument(ARGS["mxd"])
arcpy.mapping.CreateMapSDDraft(map_document=mxd,
                               out_sddraft=ARGS["draft"],
                               service_name=ARGS["service_name"],
                               server_type=ARGS["server_type"],
                               connection_file_path=ARGS["connection_file_path"],
                               copy_data_to_server=ARGS["copy_data_to_server"],
                               folder_name=ARGS["folder_name"],
                               summary=ARGS["summary"],
                               tags=ARGS["tags"])
done()
"#;

const IMPORT_TOOLBOX: &str = r#"
arcpy.ImportToolbox(ARGS["toolbox"], ARGS["alias"])
suffix = "_" + ARGS["alias"]
done([name[:-len(suffix)] for name in arcpy.ListTools("*" + suffix)])
"#;

const CREATE_GP_SDDRAFT: &str = r#"
arcpy.ImportToolbox(ARGS["toolbox"], ARGS["alias"])
toolbox = getattr(arcpy, ARGS["alias"])
result = getattr(toolbox, ARGS["tool"])()
arcpy.CreateGPSDDraft(result=result,
                      out_sddraft=ARGS["draft"],
                      service_name=ARGS["service_name"],
                      server_type=ARGS["server_type"],
                      connection_file_path=ARGS["connection_file_path"],
                      copy_data_to_server=ARGS["copy_data_to_server"],
                      folder_name=ARGS["folder_name"],
                      summary=ARGS["summary"],
                      tags=ARGS["tags"],
                      executionType=ARGS["execution_type"],
                      resultMapServer=False,
                      showMessages="INFO",
                      maximumRecords=ARGS["max_records"],
                      minInstances=ARGS["min_instances"],
                      maxInstances=ARGS["max_instances"],
                      maxUsageTime=ARGS["max_usage_time"],
                      maxWaitTime=ARGS["max_wait_time"],
                      maxIdleTime=ARGS["max_idle_time"])
done()
"#;

const ANALYZE: &str = r#"
analysis = arcpy.mapping.AnalyzeForSD(ARGS["draft"])


def issues(found):
    return [{"code": code,
             "message": message,
             "objects": [getattr(o, "name", str(o)) for o in objects]}
            for (message, code), objects in found.items()]


done({"errors": issues(analysis["errors"]),
      "warnings": issues(analysis["warnings"]),
      "messages": issues(analysis["messages"])})
"#;

const STAGE_SERVICE: &str = r#"
arcpy.StageService_server(ARGS["draft"], ARGS["definition"])
done()
"#;

const UPLOAD_SERVICE_DEFINITION: &str = r#"
arcpy.UploadServiceDefinition_server(ARGS["definition"], ARGS["target"])
done()
"#;

#[derive(Deserialize)]
struct ScriptReply<T> {
    result: T,
}

#[derive(Deserialize)]
struct RawWorkspace {
    path: PathBuf,
    kind: WorkspaceKind,
}

pub struct ArcPyToolkit {
    python: PathBuf,
    overwrite_output: bool,
}

impl ArcPyToolkit {
    pub fn new(python: impl Into<PathBuf>, overwrite_output: bool) -> Self {
        Self {
            python: python.into(),
            overwrite_output,
        }
    }

    /// Interpreter from `SLAP_PYTHON`, falling back to `python` on the PATH.
    pub fn from_env(overwrite_output: bool) -> Self {
        let python = std::env::var(PYTHON_ENV_VAR).unwrap_or_else(|_| "python".to_string());
        info!(python = %python, overwrite_output, "Initialized ArcPyToolkit from environment");
        Self::new(python, overwrite_output)
    }

    async fn run_script<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &str,
        mut args: Value,
    ) -> Result<T, ExternalError> {
        args["overwrite"] = json!(self.overwrite_output);

        let mut script = tempfile::Builder::new()
            .prefix("slap_")
            .suffix(".py")
            .tempfile()?;
        script.write_all(PRELUDE.as_bytes())?;
        script.write_all(body.as_bytes())?;
        script.flush()?;

        debug!(operation, python = %self.python.display(), "Running arcpy script");
        let mut child = Command::new(&self.python)
            .arg(script.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(error = ?e, python = %self.python.display(), "Failed to launch Python interpreter");
                e
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(args.to_string().as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(operation, status = ?output.status, stderr = %stderr, "arcpy script failed");
            return Err(format!("{operation}: {stderr}").into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_reply(&stdout).map_err(|e| format!("{operation}: {e}").into())
    }
}

/// Extract the `result` of the last `{"result": ...}` line the script printed.
fn parse_reply<T: DeserializeOwned>(stdout: &str) -> Result<T, String> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("{\"result\""))
        .ok_or_else(|| "script produced no result line".to_string())?;
    serde_json::from_str::<ScriptReply<T>>(line)
        .map(|reply| reply.result)
        .map_err(|e| format!("malformed script result: {e}"))
}

fn metadata_args(draft: &Path, metadata: &ServiceMetadata) -> Value {
    json!({
        "draft": draft,
        "service_name": metadata.service_name,
        "server_type": metadata.server_type,
        "connection_file_path": metadata.connection_file_path,
        "copy_data_to_server": metadata.copy_data_to_server,
        "folder_name": metadata.folder_name,
        "summary": metadata.summary,
        "tags": metadata.tags,
        "execution_type": metadata.execution_type,
    })
}

#[async_trait]
impl GisToolkit for ArcPyToolkit {
    async fn open_map_document(&self, path: &Path) -> Result<MapDocument, ExternalError> {
        let opened: PathBuf = self
            .run_script("open map document", OPEN_MAP_DOCUMENT, json!({ "mxd": path }))
            .await?;
        Ok(MapDocument { path: opened })
    }

    async fn list_workspaces(&self, doc: &MapDocument) -> Result<Vec<WorkspaceRef>, ExternalError> {
        let raw: Vec<RawWorkspace> = self
            .run_script("list workspaces", LIST_WORKSPACES, json!({ "mxd": doc.path }))
            .await?;
        Ok(raw
            .into_iter()
            .map(|w| WorkspaceRef {
                path: w.path,
                kind: w.kind,
            })
            .collect())
    }

    async fn replace_workspaces(
        &self,
        doc: &MapDocument,
        target: &Path,
        kind: WorkspaceKind,
    ) -> Result<(), ExternalError> {
        self.run_script::<Value>(
            "replace workspaces",
            REPLACE_WORKSPACES,
            json!({ "mxd": doc.path, "target": target, "kind": kind.sdk_keyword() }),
        )
        .await?;
        Ok(())
    }

    async fn create_map_sddraft(
        &self,
        doc: &MapDocument,
        draft: &Path,
        metadata: &ServiceMetadata,
    ) -> Result<(), ExternalError> {
        let mut args = metadata_args(draft, metadata);
        args["mxd"] = json!(doc.path);
        self.run_script::<Value>("create map draft", CREATE_MAP_SDDRAFT, args)
            .await?;
        Ok(())
    }

    async fn import_toolbox(&self, toolbox: &Path, alias: &str) -> Result<Vec<String>, ExternalError> {
        self.run_script(
            "import toolbox",
            IMPORT_TOOLBOX,
            json!({ "toolbox": toolbox, "alias": alias }),
        )
        .await
    }

    // arcpy result objects do not outlive the interpreter, so the tool itself
    // runs inside the draft script, resolved through the alias module.
    async fn run_tool(&self, tool: &ToolDescriptor) -> Result<ToolResult, ExternalError> {
        Ok(ToolResult {
            tool: tool.clone(),
            handle: tool.tool_name.clone(),
        })
    }

    async fn create_gp_sddraft(
        &self,
        result: &ToolResult,
        draft: &Path,
        metadata: &ServiceMetadata,
        options: &GpServiceOptions,
    ) -> Result<(), ExternalError> {
        let mut args = metadata_args(draft, metadata);
        args["toolbox"] = json!(result.tool.toolbox_path);
        args["alias"] = json!(result.tool.toolbox_alias);
        args["tool"] = json!(result.handle);
        args["max_records"] = json!(options.max_records);
        args["min_instances"] = json!(options.min_instances);
        args["max_instances"] = json!(options.max_instances);
        args["max_usage_time"] = json!(options.max_usage_time);
        args["max_wait_time"] = json!(options.max_wait_time);
        args["max_idle_time"] = json!(options.max_idle_time);
        self.run_script::<Value>("create gp draft", CREATE_GP_SDDRAFT, args)
            .await?;
        Ok(())
    }

    async fn analyze(&self, draft: &Path) -> Result<AnalysisResult, ExternalError> {
        self.run_script("analyze draft", ANALYZE, json!({ "draft": draft }))
            .await
    }

    async fn stage_service(&self, draft: &Path, definition: &Path) -> Result<(), ExternalError> {
        self.run_script::<Value>(
            "stage service",
            STAGE_SERVICE,
            json!({ "draft": draft, "definition": definition }),
        )
        .await?;
        Ok(())
    }

    async fn upload_service_definition(
        &self,
        definition: &Path,
        target: &Path,
    ) -> Result<(), ExternalError> {
        self.run_script::<Value>(
            "upload service definition",
            UPLOAD_SERVICE_DEFINITION,
            json!({ "definition": definition, "target": target }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_takes_last_result_line() {
        let stdout = "Executing: Buffer\nStart Time: now\n\n{\"result\": [\"BufferPoints\", \"Clip\"]}\n";
        let tools: Vec<String> = parse_reply(stdout).unwrap();
        assert_eq!(tools, vec!["BufferPoints", "Clip"]);
    }

    #[test]
    fn parse_reply_reads_analysis() {
        let stdout = r#"{"result": {"errors": [{"code": 3, "message": "Broken layer", "objects": ["Roads"]}], "warnings": [], "messages": []}}"#;
        let analysis: AnalysisResult = parse_reply(stdout).unwrap();
        assert_eq!(analysis.errors.len(), 1);
        assert_eq!(analysis.errors[0].objects, vec!["Roads"]);
        assert!(!analysis.is_successful());
    }

    #[test]
    fn parse_reply_without_result_line_fails() {
        let err = parse_reply::<Value>("Traceback (most recent call last):\n").unwrap_err();
        assert!(err.contains("no result line"));
    }

    #[tokio::test]
    async fn run_tool_defers_to_the_draft_script() {
        let toolkit = ArcPyToolkit::new("python", true);
        let tool = ToolDescriptor {
            toolbox_path: PathBuf::from("gp/Buffers.tbx"),
            toolbox_alias: "buffers".into(),
            tool_name: "BufferPoints".into(),
        };
        let result = toolkit.run_tool(&tool).await.unwrap();
        assert_eq!(result.handle, "BufferPoints");
        assert_eq!(result.tool, tool);
        assert!(CREATE_GP_SDDRAFT.contains(r#"getattr(arcpy, ARGS["alias"])"#));
        assert!(!CREATE_GP_SDDRAFT.contains(r#"ARGS["handle"]"#));
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_error() {
        let toolkit = ArcPyToolkit::new("/nonexistent/slap-python", true);
        let err = toolkit
            .analyze(Path::new("output/foo.sddraft"))
            .await
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
