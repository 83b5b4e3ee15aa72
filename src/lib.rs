//! certrender
//!
//! A headless certificate renderer. Given an approved certificate request id,
//! it fetches the certificate record and its QR code from the backend, fills
//! the HTML template for the certificate type, renders the certificate subtree
//! off-screen at 2x pixel density and saves a single-page A4 PDF named
//! `{Certificate_Type}_{requestId}.pdf`.
//!
//! # Example
//!
//! ```no_run
//! use certrender::{Renderer, RendererConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RendererConfig {
//!     api_base_url: "https://backend.example.org/api".to_string(),
//!     assets_base_url: "https://app.example.org".to_string(),
//!     token: Some("session-token".to_string()),
//!     ..Default::default()
//! };
//!
//! let renderer = Renderer::new(config)?;
//! let handle = renderer.start("42");
//! println!("stage: {}", handle.stage());
//! let download = handle.wait().await?;
//! println!("saved {}", download.path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod config;
pub use config::{PageFormat, RendererConfig, Viewport};

pub mod client;
pub mod download;
pub mod pdf;
pub mod record;
pub mod renderer;
pub mod rendering;
pub mod template;
pub mod verify;

pub use client::ApiClient;
pub use download::{download_filename, DirectorySink, DownloadSink, MemorySink};
pub use record::CertificateRecord;
pub use renderer::{Download, RenderHandle, RenderStage, Renderer, FALLBACK_QR_CODE};
pub use rendering::Bitmap;
pub use template::TemplateRegistry;
pub use verify::{BlockRecord, VerificationOutcome, Verifier};
