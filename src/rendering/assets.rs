//! Image readiness for a mounted surface.
//!
//! Every `<img>` source in the certificate subtree is driven to a terminal
//! state before rasterization: loaded, or errored. Each source gets its own
//! time budget; a source that does not settle in time counts as errored and the
//! render goes on without it.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine as _;
use futures::future::join_all;
use log::{debug, warn};
use tiny_skia::Pixmap;
use url::Url;

use crate::client::ApiClient;

/// Terminal state of one image source.
#[derive(Debug, Clone)]
pub enum ImageState {
    Loaded(Pixmap),
    Errored(String),
}

/// Settled images keyed by their `src` attribute.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    images: HashMap<String, ImageState>,
}

impl AssetStore {
    pub fn insert(&mut self, src: impl Into<String>, state: ImageState) {
        self.images.insert(src.into(), state);
    }

    pub fn state(&self, src: &str) -> Option<&ImageState> {
        self.images.get(src)
    }

    pub fn pixmap(&self, src: &str) -> Option<&Pixmap> {
        match self.images.get(src)? {
            ImageState::Loaded(p) => Some(p),
            ImageState::Errored(_) => None,
        }
    }

    pub fn natural_size(&self, src: &str) -> Option<(u32, u32)> {
        self.pixmap(src).map(|p| (p.width(), p.height()))
    }

    pub fn loaded(&self) -> usize {
        self.images
            .values()
            .filter(|s| matches!(s, ImageState::Loaded(_)))
            .count()
    }

    pub fn errored(&self) -> usize {
        self.images.len() - self.loaded()
    }
}

/// Wait until every source is loaded or errored, each bounded by `per_image`.
pub async fn await_images(
    sources: Vec<String>,
    client: &ApiClient,
    base: &Url,
    per_image: Duration,
) -> AssetStore {
    let mut unique = sources;
    unique.sort();
    unique.dedup();

    let loads = unique.into_iter().map(|src| async move {
        let state = match tokio::time::timeout(per_image, load_image(&src, client, base)).await {
            Ok(Ok(pixmap)) => ImageState::Loaded(pixmap),
            Ok(Err(reason)) => {
                warn!("image {} failed to load: {}", abbreviate(&src), reason);
                ImageState::Errored(reason)
            }
            Err(_) => {
                warn!(
                    "image {} did not load within {}ms; skipping it",
                    abbreviate(&src),
                    per_image.as_millis()
                );
                ImageState::Errored(format!("timed out after {}ms", per_image.as_millis()))
            }
        };
        (src, state)
    });

    let mut store = AssetStore::default();
    for (src, state) in join_all(loads).await {
        store.insert(src, state);
    }
    debug!("images settled: {} loaded, {} errored", store.loaded(), store.errored());
    store
}

async fn load_image(src: &str, client: &ApiClient, base: &Url) -> std::result::Result<Pixmap, String> {
    if src.starts_with("data:") {
        let (mime, data) = parse_data_url(src).ok_or_else(|| "malformed data URL".to_string())?;
        return decode_image(&data, Some(&mime));
    }
    let url = base
        .join(src)
        .map_err(|e| format!("invalid image URL: {}", e))?;
    let (bytes, mime) = client.fetch_asset(url).await.map_err(|e| e.to_string())?;
    decode_image(&bytes, Some(&mime))
}

/// Decode PNG or JPEG bytes into a premultiplied pixmap.
pub fn decode_image(data: &[u8], mime: Option<&str>) -> std::result::Result<Pixmap, String> {
    let format = match mime {
        Some(m) if m.contains("png") => Some(image::ImageFormat::Png),
        Some(m) if m.contains("jpeg") || m.contains("jpg") => Some(image::ImageFormat::Jpeg),
        _ => image::guess_format(data).ok(),
    };
    let decoded = match format {
        Some(fmt) => image::load_from_memory_with_format(data, fmt),
        None => image::load_from_memory(data),
    }
    .map_err(|e| format!("decode failed: {}", e))?;

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| "image has no pixels".to_string())?;
    for (src, dst) in rgba.as_raw().chunks_exact(4).zip(pixmap.data_mut().chunks_exact_mut(4)) {
        let a = src[3];
        dst[0] = premultiply(src[0], a);
        dst[1] = premultiply(src[1], a);
        dst[2] = premultiply(src[2], a);
        dst[3] = a;
    }
    Ok(pixmap)
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

/// Split a `data:` URL into its media type and payload bytes.
pub fn parse_data_url(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("text/plain")
        .to_string();
    let data = if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

fn abbreviate(src: &str) -> String {
    if src.len() <= 64 {
        return src.to_string();
    }
    let cut = (0..=48).rev().find(|i| src.is_char_boundary(*i)).unwrap_or(0);
    format!("{}...", &src[..cut])
}
