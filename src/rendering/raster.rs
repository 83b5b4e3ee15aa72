//! Rasterizes a display list with tiny-skia at a device pixel ratio.

use std::io::Cursor;

use sha2::{Digest, Sha256};
use tiny_skia::{
    Color, FillRule, FilterQuality, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};
use ttf_parser::OutlineBuilder;

use crate::rendering::assets::AssetStore;
use crate::rendering::font::{char_advance, FontFace};
use crate::rendering::paint::{DisplayList, PaintCommand};
use crate::rendering::style::Rgba;
use crate::rendering::Bitmap;
use crate::{Error, Result};

/// Largest bitmap edge accepted, in device pixels.
const MAX_DIMENSION: u32 = 16_384;

/// Stroke width for synthesized bold, in em.
const BOLD_STROKE_EM: f32 = 0.035;

pub fn rasterize(list: &DisplayList, font: &FontFace, assets: &AssetStore, pixel_ratio: f32) -> Result<Bitmap> {
    let width = (list.width * pixel_ratio).ceil() as u32;
    let height = (list.height * pixel_ratio).ceil() as u32;
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::Raster(format!("unsupported bitmap size {}x{}", width, height)));
    }
    let has_text = list
        .commands
        .iter()
        .any(|c| matches!(c, PaintCommand::Text { text, .. } if !text.trim().is_empty()));
    if has_text && !font.has_outlines() {
        return Err(Error::Raster("no outline font loaded; text cannot be painted".into()));
    }
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| Error::Raster(format!("cannot allocate {}x{} bitmap", width, height)))?;
    pixmap.fill(Color::WHITE);

    let base = Transform::from_scale(pixel_ratio, pixel_ratio);
    for command in &list.commands {
        match command {
            PaintCommand::SolidRect {
                x,
                y,
                width,
                height,
                rgba,
            } => {
                if let Some(rect) = Rect::from_xywh(*x, *y, *width, *height) {
                    pixmap.fill_rect(rect, &solid(*rgba), base, None);
                }
            }
            PaintCommand::StrokeRect {
                x,
                y,
                width,
                height,
                line_width,
                rgba,
            } => {
                // Inset by half the line so the stroke stays inside the border box.
                let half = line_width / 2.0;
                if let Some(rect) = Rect::from_xywh(x + half, y + half, width - line_width, height - line_width) {
                    let stroke = Stroke {
                        width: *line_width,
                        ..Stroke::default()
                    };
                    pixmap.stroke_path(&PathBuilder::from_rect(rect), &solid(*rgba), &stroke, base, None);
                }
            }
            PaintCommand::Text {
                x,
                y,
                text,
                size,
                rgba,
                bold,
            } => draw_text(&mut pixmap, font, base, (*x, *y), text, *size, *rgba, *bold),
            PaintCommand::Image {
                x,
                y,
                width,
                height,
                src,
            } => {
                let Some(image) = assets.pixmap(src) else {
                    continue;
                };
                let sx = width / image.width() as f32;
                let sy = height / image.height() as f32;
                let placement = base.pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, *x, *y));
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, placement, None);
            }
        }
    }

    Ok(Bitmap::from_pixmap(&pixmap))
}

#[allow(clippy::too_many_arguments)]
fn draw_text(
    pixmap: &mut Pixmap,
    font: &FontFace,
    base: Transform,
    (x, baseline): (f32, f32),
    text: &str,
    size: f32,
    rgba: Rgba,
    bold: bool,
) {
    if size <= 0.0 {
        return;
    }
    let paint = solid(rgba);
    font.with_face(|face| {
        let scale = size / face.units_per_em().max(1) as f32;
        let mut pen = x;
        for ch in text.chars() {
            if let Some(gid) = face.glyph_index(ch) {
                let mut builder = GlyphPathBuilder::new(pen, baseline, scale);
                if face.outline_glyph(gid, &mut builder).is_some() {
                    if let Some(path) = builder.finish() {
                        pixmap.fill_path(&path, &paint, FillRule::Winding, base, None);
                        if bold {
                            let stroke = Stroke {
                                width: size * BOLD_STROKE_EM,
                                ..Stroke::default()
                            };
                            pixmap.stroke_path(&path, &paint, &stroke, base, None);
                        }
                    }
                }
            }
            pen += char_advance(face, ch, size);
        }
    });
}

fn solid((r, g, b, a): Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

/// Maps font units (y up) onto device space at a baseline origin (y down).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

impl Bitmap {
    fn from_pixmap(pixmap: &Pixmap) -> Self {
        let mut rgba = Vec::with_capacity(pixmap.data().len());
        for px in pixmap.pixels() {
            let c = px.demultiply();
            rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Bitmap {
            width: pixmap.width(),
            height: pixmap.height(),
            rgba,
        }
    }

    /// Color channels without alpha, row-major.
    pub fn rgb(&self) -> Vec<u8> {
        self.rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| Error::Raster("bitmap buffer does not match its size".into()))?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| Error::Raster(format!("PNG encoding failed: {}", e)))?;
        Ok(out.into_inner())
    }

    /// Hex SHA-256 of the RGBA pixels.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.rgba))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        Some((self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]))
    }
}
