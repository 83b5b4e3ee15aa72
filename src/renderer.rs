//! The certificate download pipeline.
//!
//! [`Renderer::render`] runs the whole pipeline for one request id: record,
//! QR code, template, substitution, off-screen mount, image readiness,
//! rasterization, PDF assembly and saving. [`Renderer::start`] runs the same
//! pipeline as a task and hands back a [`RenderHandle`] that reports the
//! stage that particular render is in, so concurrent renders never share
//! progress state.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::ApiClient;
use crate::download::{download_filename, DirectorySink, DownloadSink};
use crate::error::ErrorKind;
use crate::rendering::assets::await_images;
use crate::rendering::font::FontFace;
use crate::rendering::layout::layout_document;
use crate::rendering::paint::build_display_list;
use crate::rendering::raster::rasterize;
use crate::rendering::style::StyleSheet;
use crate::rendering::surface::Stage;
use crate::template::{fill_certificate, inline_stylesheet, ReservedSlots};
use crate::{pdf, Error, RendererConfig, Result};

/// 1x1 translucent PNG used when no QR code can be obtained.
pub const FALLBACK_QR_CODE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

/// Where a render currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Queued,
    FetchingRecord,
    ResolvingQr,
    FetchingTemplate,
    Mounting,
    AwaitingAssets,
    Rasterizing,
    Assembling,
    Saving,
    Done,
    Failed,
}

impl RenderStage {
    pub fn is_finished(self) -> bool {
        matches!(self, RenderStage::Done | RenderStage::Failed)
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RenderStage::Queued => "queued",
            RenderStage::FetchingRecord => "fetching record",
            RenderStage::ResolvingQr => "resolving QR code",
            RenderStage::FetchingTemplate => "fetching template",
            RenderStage::Mounting => "mounting",
            RenderStage::AwaitingAssets => "awaiting images",
            RenderStage::Rasterizing => "rasterizing",
            RenderStage::Assembling => "assembling document",
            RenderStage::Saving => "saving",
            RenderStage::Done => "done",
            RenderStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A finished download.
#[derive(Debug, Clone)]
pub struct Download {
    pub request_id: String,
    pub certificate_type: String,
    pub filename: String,
    /// Where the sink stored the document.
    pub path: std::path::PathBuf,
    /// Document size in bytes.
    pub size: usize,
    pub document_sha256: String,
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    pub bitmap_sha256: String,
    /// Text painted into the bitmap, in paint order.
    pub painted_text: String,
    pub images_loaded: usize,
    pub images_errored: usize,
}

/// Progress and result of one started render.
#[derive(Debug)]
pub struct RenderHandle {
    request_id: String,
    stage: watch::Receiver<RenderStage>,
    task: JoinHandle<Result<Download>>,
}

impl RenderHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Latest stage reported by this render.
    pub fn stage(&self) -> RenderStage {
        *self.stage.borrow()
    }

    /// Receiver for following stage changes.
    pub fn subscribe(&self) -> watch::Receiver<RenderStage> {
        self.stage.clone()
    }

    /// Wait for the render to finish.
    pub async fn wait(self) -> Result<Download> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Aborted(e.to_string())),
        }
    }
}

struct Inner {
    config: RendererConfig,
    client: ApiClient,
    stage: Stage,
    font: FontFace,
    sink: Arc<dyn DownloadSink>,
}

/// Renders certificates to PDF downloads. Cheap to clone.
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<Inner>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("api_base_url", &self.inner.config.api_base_url)
            .field("live_surfaces", &self.inner.stage.live_count())
            .finish()
    }
}

impl Renderer {
    /// Build a renderer that saves into `config.output_dir`.
    pub fn new(config: RendererConfig) -> Result<Self> {
        let sink = Arc::new(DirectorySink::new(config.output_dir.clone()));
        Self::with_sink(config, sink)
    }

    pub fn with_sink(config: RendererConfig, sink: Arc<dyn DownloadSink>) -> Result<Self> {
        let font = FontFace::load(config.font_path.as_deref())?;
        Self::with_parts(config, sink, font)
    }

    /// Build a renderer from an already loaded font.
    pub fn with_parts(config: RendererConfig, sink: Arc<dyn DownloadSink>, font: FontFace) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::new(&config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                stage: Stage::new(),
                font,
                sink,
            }),
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Number of surfaces currently mounted by this renderer.
    pub fn live_surfaces(&self) -> usize {
        self.inner.stage.live_count()
    }

    /// Start rendering `request_id` in the background.
    pub fn start(&self, request_id: impl Into<String>) -> RenderHandle {
        let request_id = request_id.into();
        let (tx, rx) = watch::channel(RenderStage::Queued);
        let inner = Arc::clone(&self.inner);
        let id = request_id.clone();
        let task = tokio::spawn(async move { render_reporting(&inner, &id, &tx).await });
        RenderHandle {
            request_id,
            stage: rx,
            task,
        }
    }

    /// Render `request_id` and save the document.
    pub async fn render(&self, request_id: &str) -> Result<Download> {
        let (tx, _rx) = watch::channel(RenderStage::Queued);
        render_reporting(&self.inner, request_id, &tx).await
    }
}

async fn render_reporting(inner: &Inner, request_id: &str, stage: &watch::Sender<RenderStage>) -> Result<Download> {
    let started = Instant::now();
    let result = run(inner, request_id, stage).await;
    match &result {
        Ok(download) => {
            stage.send_replace(RenderStage::Done);
            info!(
                "certificate {} rendered to {} in {}ms",
                request_id,
                download.path.display(),
                started.elapsed().as_millis()
            );
        }
        Err(e) => {
            stage.send_replace(RenderStage::Failed);
            match e.kind() {
                ErrorKind::TemplateDefect => {
                    error!("certificate {}: template defect: {}", request_id, e)
                }
                ErrorKind::Transient => warn!("certificate {}: backend unavailable: {}", request_id, e),
                ErrorKind::Local | ErrorKind::Configuration => {
                    error!("certificate {}: {}", request_id, e)
                }
            }
        }
    }
    result
}

async fn run(inner: &Inner, request_id: &str, stage: &watch::Sender<RenderStage>) -> Result<Download> {
    let config = &inner.config;
    let client = &inner.client;

    stage.send_replace(RenderStage::FetchingRecord);
    let mut record = client.fetch_record(request_id).await?;
    record.normalize_display_names();
    let certificate_type = record.certificate_type().to_string();
    debug!("record {} has type '{}'", request_id, certificate_type);

    stage.send_replace(RenderStage::ResolvingQr);
    let qr_code = match record.content_hash() {
        Some(hash) => match client.fetch_qr_code(hash).await {
            Ok(data_url) => data_url,
            Err(e) => {
                warn!("QR code unavailable for {}, using placeholder: {}", request_id, e);
                FALLBACK_QR_CODE.to_string()
            }
        },
        None => {
            debug!("record {} has no content hash; using placeholder QR code", request_id);
            FALLBACK_QR_CODE.to_string()
        }
    };

    stage.send_replace(RenderStage::FetchingTemplate);
    let file = config.templates.resolve(&certificate_type)?;
    let template = client.fetch_template(file).await?;
    let css = client.fetch_stylesheet().await?;
    let html = inline_stylesheet(&template, &config.stylesheet_link, &css);
    let slots = ReservedSlots::for_record(&record, request_id, qr_code);
    let filled = fill_certificate(&html, &record, &slots);

    stage.send_replace(RenderStage::Mounting);
    let surface = inner.stage.mount(&filled, &config.root_selector)?;
    debug!("certificate {} mounted on surface {}", request_id, surface.id());

    stage.send_replace(RenderStage::AwaitingAssets);
    let sources = surface
        .root()
        .image_sources()
        .into_iter()
        .map(str::to_string)
        .collect();
    let assets = await_images(
        sources,
        client,
        &client.templates_base()?,
        Duration::from_millis(config.image_timeout_ms),
    )
    .await;
    let images_loaded = assets.loaded();
    let images_errored = assets.errored();

    stage.send_replace(RenderStage::Rasterizing);
    let root = surface.root().clone();
    let styles = surface.styles().to_vec();
    let font = inner.font.clone();
    let viewport = config.viewport;
    let pixel_ratio = config.pixel_ratio;
    let (bitmap, painted_text) = tokio::task::spawn_blocking(move || {
        let mut sheet = StyleSheet::default();
        for css in &styles {
            sheet.append(css);
        }
        let layout = layout_document(&root, &sheet, &font, &assets, viewport);
        let list = build_display_list(&layout);
        rasterize(&list, &font, &assets, pixel_ratio).map(|bitmap| (bitmap, list.text()))
    })
    .await
    .map_err(|e| Error::Raster(format!("raster task failed: {}", e)))??;
    debug!(
        "certificate {} rasterized at {}x{}",
        request_id, bitmap.width, bitmap.height
    );

    stage.send_replace(RenderStage::Assembling);
    let page = config.page;
    let bitmap_sha256 = bitmap.sha256_hex();
    let (bitmap_width, bitmap_height) = (bitmap.width, bitmap.height);
    let document = tokio::task::spawn_blocking(move || pdf::assemble(&bitmap, page))
        .await
        .map_err(|e| Error::Pdf(format!("assembly task failed: {}", e)))??;

    stage.send_replace(RenderStage::Saving);
    let filename = download_filename(&certificate_type, request_id);
    let path = inner.sink.save(&filename, &document)?;
    drop(surface);

    Ok(Download {
        request_id: request_id.to_string(),
        certificate_type,
        filename,
        path,
        size: document.len(),
        document_sha256: hex::encode(Sha256::digest(&document)),
        bitmap_width,
        bitmap_height,
        bitmap_sha256,
        painted_text,
        images_loaded,
        images_errored,
    })
}
