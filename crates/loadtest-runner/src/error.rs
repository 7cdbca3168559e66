//! Error types for the runner crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors loading or validating a resource template. All of them are fatal:
/// they surface before any runner is started.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template is not valid YAML.
    #[error("Failed to parse template: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document parsed but is not a usable resource.
    #[error("Invalid template: {0}")]
    Invalid(String),
}
