//! Font loading and text metrics.
//!
//! Layout and rasterization share one [`FontFace`] so measured line widths
//! match painted glyphs. A metrics-only face (fixed proportional advances, no
//! outlines) exists for layout tests; the rasterizer refuses to paint text
//! with it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use ttf_parser::Face;

use crate::{Error, Result};

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const FALLBACK_ADVANCE_EM: f32 = 0.55;
const FALLBACK_SPACE_EM: f32 = 0.3;
const FALLBACK_ASCENT_EM: f32 = 0.8;

/// Shared font data.
#[derive(Debug, Clone, Default)]
pub struct FontFace {
    data: Option<Arc<Vec<u8>>>,
    source: Option<PathBuf>,
    /// Ascender over ascender-minus-descender, read once at load.
    ascent_em: Option<f32>,
}

impl FontFace {
    /// Load `explicit` if given, otherwise search well-known system locations.
    /// Finding no usable font is a configuration error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let bytes = std::fs::read(path)
                .map_err(|e| Error::Config(format!("cannot read font {}: {}", path.display(), e)))?;
            let mut face = Self::from_bytes(bytes)?;
            face.source = Some(path.to_path_buf());
            return Ok(face);
        }
        for candidate in SYSTEM_FONT_CANDIDATES {
            let path = Path::new(candidate);
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            if let Ok(mut face) = Self::from_bytes(bytes) {
                info!("using system font {}", path.display());
                face.source = Some(path.to_path_buf());
                return Ok(face);
            }
        }
        warn!("no usable system font found");
        Err(Error::Config(
            "no usable font found; set font_path to a TrueType or OpenType file".into(),
        ))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let face = Face::parse(&bytes, 0).map_err(|e| Error::Config(format!("font parse failed: {}", e)))?;
        let ascender = face.ascender() as f32;
        let height = (ascender - face.descender() as f32).max(1.0);
        let ascent_em = Some(ascender / height).filter(|a| a.is_finite());
        Ok(Self {
            data: Some(Arc::new(bytes)),
            source: None,
            ascent_em,
        })
    }

    pub fn metrics_only() -> Self {
        Self::default()
    }

    pub fn has_outlines(&self) -> bool {
        self.data.is_some()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Run `f` with the parsed face, if there is one.
    pub fn with_face<R>(&self, f: impl FnOnce(&Face<'_>) -> R) -> Option<R> {
        let data = self.data.as_ref()?;
        let face = Face::parse(data, 0).ok()?;
        Some(f(&face))
    }

    /// Advance width of `text` at `size` px.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        self.measure_all(&[text], size)[0]
    }

    /// Advance widths of several strings at `size` px, parsing the face once.
    pub fn measure_all(&self, texts: &[&str], size: f32) -> Vec<f32> {
        self.with_face(|face| {
            texts
                .iter()
                .map(|text| text.chars().map(|ch| char_advance(face, ch, size)).sum())
                .collect()
        })
        .unwrap_or_else(|| texts.iter().map(|text| fallback_width(text, size)).collect())
    }

    /// Distance from the top of the em box to the baseline at `size` px.
    /// Normalized so ascent plus descent spans one em.
    pub fn ascent(&self, size: f32) -> f32 {
        (size * self.ascent_em.unwrap_or(FALLBACK_ASCENT_EM)).clamp(0.0, size)
    }
}

fn fallback_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|ch| (if ch == ' ' { FALLBACK_SPACE_EM } else { FALLBACK_ADVANCE_EM }) * size)
        .sum()
}

/// Horizontal advance of `ch` at `size` px; characters the face lacks get
/// the fallback advance.
pub(crate) fn char_advance(face: &Face<'_>, ch: char, size: f32) -> f32 {
    let scale = size / face.units_per_em().max(1) as f32;
    face.glyph_index(ch)
        .and_then(|gid| face.glyph_hor_advance(gid))
        .map(|a| a as f32 * scale)
        .unwrap_or(size * FALLBACK_ADVANCE_EM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_only_face_measures_proportionally() {
        let face = FontFace::metrics_only();
        assert!(!face.has_outlines());
        assert!((face.measure("ab", 10.0) - 11.0).abs() < 1e-4);
        assert!((face.measure("a b", 10.0) - 14.0).abs() < 1e-4);
        assert!((face.ascent(10.0) - 8.0).abs() < 1e-4);
    }

    #[test]
    fn explicit_missing_font_is_config_error() {
        let err = FontFace::load(Some(Path::new("/nonexistent/font.ttf"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn fixture_font_has_outlines_and_real_metrics() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf");
        let face = FontFace::load(Some(path.as_path())).unwrap();
        assert!(face.has_outlines());
        assert_eq!(face.source(), Some(path.as_path()));

        let widths = face.measure_all(&["Asha", " ", "Rao"], 20.0);
        assert_eq!(widths.len(), 3);
        assert!(widths.iter().all(|w| *w > 0.0));
        assert!((face.measure("Asha Rao", 20.0) - widths.iter().sum::<f32>()).abs() < 1e-3);
        // "i" and "W" differ in a proportional face.
        assert!(face.measure("W", 20.0) > face.measure("i", 20.0));
        let ascent = face.ascent(20.0);
        assert!(ascent > 10.0 && ascent < 20.0, "{}", ascent);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(FontFace::from_bytes(vec![0, 1, 2, 3]).is_err());
    }
}
