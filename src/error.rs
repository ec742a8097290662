use std::path::PathBuf;
use thiserror::Error;

use crate::contract::AnalysisIssue;

/// Boxed error returned across the external capability seams
/// ([`GisToolkit`](crate::contract::GisToolkit), [`ServerApi`](crate::contract::ServerApi),
/// [`ChangeLister`](crate::contract::ChangeLister)).
pub type ExternalError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Unsupported input type for '{input}': expected a .mxd or .tbx file")]
    UnsupportedInputType { input: String },

    #[error("Analysis contained errors for '{input}': {}", format_issues(.errors))]
    AnalysisFailed {
        input: String,
        errors: Vec<AnalysisIssue>,
    },

    #[error("{operation} failed: {source}")]
    ExternalTool {
        operation: &'static str,
        #[source]
        source: ExternalError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input '{0}' is not present in the config")]
    UnknownInput(String),

    #[error("Tool '{tool}' not found in toolbox '{toolbox}'")]
    UnknownTool { toolbox: String, tool: String },

    #[error("Output '{0}' already exists and overwriting is disabled")]
    ArtifactExists(PathBuf),
}

impl PublishError {
    pub(crate) fn external(operation: &'static str) -> impl FnOnce(ExternalError) -> Self {
        move |source| PublishError::ExternalTool { operation, source }
    }
}

fn format_issues(errors: &[AnalysisIssue]) -> String {
    errors
        .iter()
        .map(|issue| {
            if issue.objects.is_empty() {
                format!("[{}] {}", issue.code, issue.message)
            } else {
                format!("[{}] {} ({})", issue.code, issue.message, issue.objects.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
