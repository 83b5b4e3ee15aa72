//! Error types for the certificate renderer

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a certificate
#[derive(Error, Debug)]
pub enum Error {
    /// The backend was unreachable or answered with a non-success status
    #[error("Failed to fetch {what}: {reason}")]
    DataFetch { what: String, reason: String },

    /// The certificate type has no template file mapped to it
    #[error("Template not found for certificate type '{0}'")]
    TemplateNotFound(String),

    /// The mounted template has no certificate root element
    #[error("Render target '{0}' missing from template")]
    RenderTargetMissing(String),

    /// Rasterization failed
    #[error("Rasterization failed: {0}")]
    Raster(String),

    /// Document assembly failed
    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    /// Writing the finished document failed
    #[error("Failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The render task ended without producing a result
    #[error("Render aborted: {0}")]
    Aborted(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification used for logging and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or backend trouble; retrying later may help
    Transient,
    /// The template (or its type mapping) is broken and needs an author's fix
    TemplateDefect,
    /// Something failed on this machine (raster, PDF, disk)
    Local,
    /// The renderer was misconfigured
    Configuration,
}

impl Error {
    pub(crate) fn fetch(what: impl Into<String>, reason: impl ToString) -> Self {
        Error::DataFetch {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DataFetch { .. } => ErrorKind::Transient,
            Error::TemplateNotFound(_) | Error::RenderTargetMissing(_) => ErrorKind::TemplateDefect,
            Error::Raster(_) | Error::Pdf(_) | Error::Save { .. } | Error::Aborted(_) => ErrorKind::Local,
            Error::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Single combined message suitable for showing to the person who asked
    /// for the download.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Transient => format!("Download failed: {}", self),
            ErrorKind::TemplateDefect => format!(
                "Download failed: the certificate template is broken ({}). Please contact the institute.",
                self
            ),
            ErrorKind::Local => format!("Download failed while producing the document: {}", self),
            ErrorKind::Configuration => format!("Download failed: {}", self),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let what = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "request".to_string());
        Error::fetch(what, err)
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Pdf(err.to_string())
    }
}
