//! Renderer configuration
//!
//! `RendererConfig` carries every knob the pipeline reads: where the backend
//! lives, which credential to present, how large the off-screen surface is,
//! how long to wait for slow images and which template file belongs to which
//! certificate type. Defaults are usable against a backend on localhost; a TOML
//! file can override any subset of fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::template::TemplateRegistry;
use crate::{Error, Result};

/// Configuration for the certificate renderer
///
/// # Examples
///
/// ```
/// let cfg = certrender::RendererConfig::default();
/// assert_eq!(cfg.pixel_ratio, 2.0);
/// assert!(cfg.templates.resolve("Bonafide Certificate").is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Base URL of the REST API (`/certificate`, `/qrcode`, `/verify` live below it)
    pub api_base_url: String,
    /// Base URL serving `/templates/*`
    pub assets_base_url: String,
    /// Bearer token presented to authenticated endpoints
    pub token: Option<String>,
    /// User agent string to send with requests
    pub user_agent: String,
    /// Timeout for each HTTP request in milliseconds
    pub request_timeout_ms: u64,
    /// Upper bound on waiting for a single image to load, in milliseconds
    pub image_timeout_ms: u64,
    /// Raster pixels per CSS pixel
    pub pixel_ratio: f32,
    /// Size of the off-screen surface the template is laid out on
    pub viewport: Viewport,
    /// Output page format
    pub page: PageFormat,
    /// Selector of the certificate subtree inside the template
    pub root_selector: String,
    /// Stylesheet reference that is replaced with the inlined stylesheet
    pub stylesheet_link: String,
    /// TrueType/OpenType font used for text; system fonts are searched when unset
    pub font_path: Option<PathBuf>,
    /// Directory finished documents are saved to
    pub output_dir: PathBuf,
    /// Certificate type to template file table
    pub templates: TemplateRegistry,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000/api".to_string(),
            assets_base_url: "http://127.0.0.1:5000".to_string(),
            token: None,
            user_agent: concat!("certrender/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: 30000,
            image_timeout_ms: 10000,
            pixel_ratio: 2.0,
            viewport: Viewport::default(),
            page: PageFormat::a4_portrait(),
            root_selector: "#certificate".to_string(),
            stylesheet_link: r#"<link rel="stylesheet" href="styles.css">"#.to_string(),
            font_path: None,
            output_dir: PathBuf::from("."),
            templates: TemplateRegistry::default(),
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string. Missing fields keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("api_base_url", &self.api_base_url),
            ("assets_base_url", &self.assets_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::Config(format!("{} '{}' is not a URL: {}", name, value, e)))?;
        }
        if !(self.pixel_ratio > 0.0 && self.pixel_ratio <= 8.0) {
            return Err(Error::Config(format!(
                "pixel_ratio must be in (0, 8], got {}",
                self.pixel_ratio
            )));
        }
        if self.request_timeout_ms == 0 || self.image_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::Config("viewport must be non-empty".into()));
        }
        if !(self.page.width_pt > 0.0 && self.page.height_pt > 0.0) {
            return Err(Error::Config("page format must be non-empty".into()));
        }
        scraper::Selector::parse(&self.root_selector).map_err(|e| {
            Error::Config(format!("root_selector '{}' is invalid: {:?}", self.root_selector, e))
        })?;
        if self.templates.is_empty() {
            return Err(Error::Config("no certificate templates configured".into()));
        }
        Ok(())
    }
}

/// Off-screen surface dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    /// A4 at 96 CSS px per inch.
    fn default() -> Self {
        Self {
            width: 794,
            height: 1123,
        }
    }
}

/// Page size in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageFormat {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageFormat {
    pub fn a4_portrait() -> Self {
        Self {
            width_pt: 595.0,
            height_pt: 842.0,
        }
    }
}
