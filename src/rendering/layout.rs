//! Block and inline layout for a mounted certificate subtree.
//!
//! Everything is measured in CSS px with the certificate root's border box at
//! the origin, which is also the area that ends up in the bitmap.

use crate::rendering::assets::AssetStore;
use crate::rendering::font::FontFace;
use crate::rendering::style::{ComputedStyle, Display, Rgba, StyleSheet, TextAlign};
use crate::rendering::surface::{Element, Node};
use crate::Viewport;

/// Default font size of the document the certificate is mounted in.
pub const BASE_FONT_SIZE: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// What a laid-out node draws.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Border box of a block element.
    Box {
        background: Option<Rgba>,
        border_width: f32,
        border_color: Rgba,
    },
    /// A run of words on one line; `baseline` is absolute.
    Text {
        text: String,
        baseline: f32,
        size: f32,
        color: Rgba,
        bold: bool,
    },
    Image { src: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub rect: Rect,
    pub content: Content,
}

/// Laid-out subtree, nodes in paint order.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<LayoutNode>,
}

impl Layout {
    /// Every text run in paint order, joined by spaces.
    pub fn text(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|n| match &n.content {
                Content::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lay out `root` inside a viewport-wide containing block.
pub fn layout_document(
    root: &Element,
    sheet: &StyleSheet,
    font: &FontFace,
    assets: &AssetStore,
    viewport: Viewport,
) -> Layout {
    let initial = ComputedStyle {
        width: Some(viewport.width as f32),
        ..ComputedStyle::root(BASE_FONT_SIZE)
    };
    let mut style = sheet.compute(root, &[], &initial);
    // The root is captured from its own border box, so its margins do not apply.
    style.margin = Default::default();
    style.auto_margin = (false, false);
    if style.display == Display::None {
        style.display = Display::Block;
    }

    let mut cx = LayoutContext {
        sheet,
        font,
        assets,
        nodes: Vec::new(),
        widest_line: 0.0,
    };
    let mut ancestors = Vec::new();
    let (width, height) = cx.layout_block(root, &style, &mut ancestors, 0.0, 0.0, viewport.width as f32);
    Layout {
        width: width.max(1.0),
        height: height.max(1.0),
        nodes: cx.nodes,
    }
}

struct LayoutContext<'s> {
    sheet: &'s StyleSheet,
    font: &'s FontFace,
    assets: &'s AssetStore,
    nodes: Vec<LayoutNode>,
    /// Widest line box placed so far; sizes shrink-to-fit inline blocks.
    widest_line: f32,
}

#[derive(Debug, Clone)]
enum InlineItem {
    Word {
        text: String,
        width: f32,
        size: f32,
        line_height: f32,
        color: Rgba,
        bold: bool,
    },
    Space {
        width: f32,
    },
    Image {
        src: String,
        width: f32,
        height: f32,
    },
    /// An inline block laid out at the origin; `width` and `height` are its
    /// margin box.
    Atomic {
        nodes: Vec<LayoutNode>,
        width: f32,
        height: f32,
    },
    Break,
}

#[derive(Debug, Default)]
struct Line {
    /// Items with their x offset from the line start.
    items: Vec<(f32, InlineItem)>,
    width: f32,
    pending_space: f32,
}

impl<'s> LayoutContext<'s> {
    /// Lay out a block-level element at (`x`, `y`) in a containing block of
    /// `available` px. Returns the outer (margin box) width and height.
    fn layout_block<'e>(
        &mut self,
        el: &'e Element,
        style: &ComputedStyle,
        ancestors: &mut Vec<&'e Element>,
        x: f32,
        y: f32,
        available: f32,
    ) -> (f32, f32) {
        let border = style.border_width;
        let chrome = style.padding.horizontal() + border * 2.0;
        let border_width = match style.width {
            Some(w) => w + chrome,
            None => (available - style.margin.horizontal()).max(chrome),
        };
        let left = match style.width {
            Some(_) => x + style.margin.left + auto_offset(style, available - border_width - style.margin.horizontal()),
            None => x + style.margin.left,
        };
        let top = y + style.margin.top;
        let content_x = left + border + style.padding.left;
        let content_y = top + border + style.padding.top;
        let content_width = (border_width - chrome).max(0.0);

        let slot = self.nodes.len();
        self.nodes.push(LayoutNode {
            rect: Rect::default(),
            content: Content::Box {
                background: style.background,
                border_width: border,
                border_color: style.border_color,
            },
        });

        ancestors.push(el);
        let mut cursor = content_y;
        let mut inline: Vec<InlineItem> = Vec::new();
        for child in &el.children {
            match child {
                Node::Text(text) => push_words(&mut inline, text, style, self.font),
                Node::Element(child_el) => {
                    let child_style = self.sheet.compute(child_el, ancestors, style);
                    match (child_el.tag.as_str(), child_style.display) {
                        (_, Display::None) => {}
                        ("img", Display::Block) => {
                            cursor += self.flush_inline(&mut inline, style, content_x, cursor, content_width);
                            cursor += self.block_image(child_el, &child_style, content_x, cursor, content_width);
                        }
                        ("img" | "br", _) | (_, Display::Inline) => {
                            self.collect_inline(child_el, &child_style, ancestors, content_width, &mut inline)
                        }
                        (_, Display::InlineBlock) => {
                            let item = self.atomic_box(child_el, &child_style, ancestors, content_width);
                            inline.push(item);
                        }
                        (_, Display::Block) => {
                            cursor += self.flush_inline(&mut inline, style, content_x, cursor, content_width);
                            let (_, h) = self.layout_block(
                                child_el,
                                &child_style,
                                ancestors,
                                content_x,
                                cursor,
                                content_width,
                            );
                            cursor += h;
                        }
                    }
                }
            }
        }
        cursor += self.flush_inline(&mut inline, style, content_x, cursor, content_width);
        ancestors.pop();

        let content_height = style.height.unwrap_or(cursor - content_y).max(0.0);
        let border_height = content_height + style.padding.vertical() + border * 2.0;
        self.nodes[slot].rect = Rect {
            x: left,
            y: top,
            width: border_width,
            height: border_height,
        };
        (
            border_width + style.margin.horizontal(),
            border_height + style.margin.vertical(),
        )
    }

    fn collect_inline<'e>(
        &mut self,
        el: &'e Element,
        style: &ComputedStyle,
        ancestors: &mut Vec<&'e Element>,
        available: f32,
        out: &mut Vec<InlineItem>,
    ) {
        match el.tag.as_str() {
            "br" => {
                out.push(InlineItem::Break);
                return;
            }
            "img" => {
                if let Some(item) = self.image_item(el, style) {
                    out.push(item);
                }
                return;
            }
            _ => {}
        }
        ancestors.push(el);
        for child in &el.children {
            match child {
                Node::Text(text) => push_words(out, text, style, self.font),
                Node::Element(child_el) => {
                    let child_style = self.sheet.compute(child_el, ancestors, style);
                    match child_style.display {
                        Display::None => {}
                        Display::InlineBlock if !matches!(child_el.tag.as_str(), "img" | "br") => {
                            let item = self.atomic_box(child_el, &child_style, ancestors, available);
                            out.push(item);
                        }
                        // Blocks nested in inline content flow with it.
                        _ => self.collect_inline(child_el, &child_style, ancestors, available, out),
                    }
                }
            }
        }
        ancestors.pop();
    }

    /// Lay out an inline block on its own and wrap the result as one inline
    /// item. Without a CSS width it shrinks to its widest line.
    fn atomic_box<'e>(
        &self,
        el: &'e Element,
        style: &ComputedStyle,
        ancestors: &mut Vec<&'e Element>,
        available: f32,
    ) -> InlineItem {
        let mut style = style.clone();
        style.auto_margin = (false, false);
        let mut inner = LayoutContext {
            sheet: self.sheet,
            font: self.font,
            assets: self.assets,
            nodes: Vec::new(),
            widest_line: 0.0,
        };
        if style.width.is_none() {
            inner.layout_block(el, &style, ancestors, 0.0, 0.0, available);
            let chrome = style.padding.horizontal() + style.border_width * 2.0 + style.margin.horizontal();
            style.width = Some(inner.widest_line.min(available - chrome).max(0.0));
            inner.nodes.clear();
            inner.widest_line = 0.0;
        }
        let (width, height) = inner.layout_block(el, &style, ancestors, 0.0, 0.0, available);
        InlineItem::Atomic {
            nodes: inner.nodes,
            width,
            height,
        }
    }

    /// Place a `display: block` image on its own line. Returns the height used.
    fn block_image(&mut self, el: &Element, style: &ComputedStyle, x: f32, y: f32, available: f32) -> f32 {
        let Some(InlineItem::Image { src, width, height }) = self.image_item(el, style) else {
            return 0.0;
        };
        let free = available - width - style.margin.horizontal();
        self.nodes.push(LayoutNode {
            rect: Rect {
                x: x + style.margin.left + auto_offset(style, free),
                y: y + style.margin.top,
                width,
                height,
            },
            content: Content::Image { src },
        });
        height + style.margin.vertical()
    }

    /// Size an image from its attributes, its CSS and its natural size, in
    /// that order of preference. Errored images without explicit dimensions
    /// take no space.
    fn image_item(&self, el: &Element, style: &ComputedStyle) -> Option<InlineItem> {
        let src = el.attr("src")?.to_string();
        let attr_px = |name: &str| {
            el.attr(name)
                .and_then(|v| v.trim().trim_end_matches("px").parse::<f32>().ok())
        };
        let natural = self
            .assets
            .natural_size(&src)
            .map(|(w, h)| (w as f32, h as f32));
        let mut width = style.width.or_else(|| attr_px("width"));
        let mut height = style.height.or_else(|| attr_px("height"));
        match (width, height, natural) {
            (Some(w), None, Some((nw, nh))) if nw > 0.0 => height = Some(w * nh / nw),
            (None, Some(h), Some((nw, nh))) if nh > 0.0 => width = Some(h * nw / nh),
            (None, None, Some((nw, nh))) => {
                width = Some(nw);
                height = Some(nh);
            }
            _ => {}
        }
        let width = width.or(height)?;
        let height = height.unwrap_or(width);
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(InlineItem::Image { src, width, height })
    }

    /// Break pending inline items into lines and emit them. Returns the
    /// height used.
    fn flush_inline(
        &mut self,
        items: &mut Vec<InlineItem>,
        block: &ComputedStyle,
        x: f32,
        y: f32,
        available: f32,
    ) -> f32 {
        if items.is_empty() {
            return 0.0;
        }
        let mut lines: Vec<Line> = Vec::new();
        let mut line = Line::default();
        for item in items.drain(..) {
            match item {
                InlineItem::Break => lines.push(std::mem::take(&mut line)),
                InlineItem::Space { width } => {
                    if !line.items.is_empty() {
                        line.pending_space = line.pending_space.max(width);
                    }
                }
                item => {
                    let width = item_width(&item);
                    if !line.items.is_empty() && line.width + line.pending_space + width > available {
                        lines.push(std::mem::take(&mut line));
                    }
                    let offset = line.width + line.pending_space;
                    line.width = offset + width;
                    line.pending_space = 0.0;
                    line.items.push((offset, item));
                }
            }
        }
        if !line.items.is_empty() {
            lines.push(line);
        }

        let mut top = y;
        for line in lines {
            top += self.place_line(line, block, x, top, available);
        }
        top - y
    }

    fn place_line(&mut self, line: Line, block: &ComputedStyle, x: f32, top: f32, available: f32) -> f32 {
        if line.items.is_empty() {
            // A bare `<br>` still advances by one line.
            return block.font_size * block.line_height;
        }
        self.widest_line = self.widest_line.max(line.width);
        let mut above: f32 = 0.0;
        let mut below: f32 = 0.0;
        for (_, item) in &line.items {
            match item {
                InlineItem::Word { size, line_height, .. } => {
                    let (a, b) = text_extent(self.font, *size, *line_height);
                    above = above.max(a);
                    below = below.max(b);
                }
                InlineItem::Image { height, .. } | InlineItem::Atomic { height, .. } => {
                    above = above.max(*height)
                }
                _ => {}
            }
        }
        let baseline = top + above;
        let shift = match block.text_align {
            TextAlign::Left => 0.0,
            TextAlign::Center => ((available - line.width) / 2.0).max(0.0),
            TextAlign::Right => (available - line.width).max(0.0),
        };

        let mut run: Option<TextRun> = None;
        for (offset, item) in line.items {
            let left = x + shift + offset;
            match item {
                InlineItem::Word {
                    text,
                    width,
                    size,
                    color,
                    bold,
                    ..
                } => {
                    let continues = matches!(
                        &run,
                        Some(r) if r.size == size && r.color == color && r.bold == bold
                    );
                    if continues {
                        if let Some(r) = run.as_mut() {
                            r.text.push(' ');
                            r.text.push_str(&text);
                            r.end = left + width;
                        }
                        continue;
                    }
                    self.emit_run(run.take(), baseline);
                    run = Some(TextRun {
                        start: left,
                        end: left + width,
                        text,
                        size,
                        color,
                        bold,
                    });
                }
                InlineItem::Image { src, width, height } => {
                    self.emit_run(run.take(), baseline);
                    self.nodes.push(LayoutNode {
                        rect: Rect {
                            x: left,
                            y: baseline - height,
                            width,
                            height,
                        },
                        content: Content::Image { src },
                    });
                }
                InlineItem::Atomic { nodes, height, .. } => {
                    self.emit_run(run.take(), baseline);
                    let top = baseline - height;
                    self.nodes.extend(nodes.into_iter().map(|mut node| {
                        node.rect.x += left;
                        node.rect.y += top;
                        if let Content::Text { baseline, .. } = &mut node.content {
                            *baseline += top;
                        }
                        node
                    }));
                }
                _ => {}
            }
        }
        self.emit_run(run, baseline);
        above + below
    }

    fn emit_run(&mut self, run: Option<TextRun>, baseline: f32) {
        let Some(run) = run else {
            return;
        };
        let ascent = self.font.ascent(run.size);
        self.nodes.push(LayoutNode {
            rect: Rect {
                x: run.start,
                y: baseline - ascent,
                width: run.end - run.start,
                height: run.size,
            },
            content: Content::Text {
                text: run.text,
                baseline,
                size: run.size,
                color: run.color,
                bold: run.bold,
            },
        });
    }
}

/// Adjacent words on one line sharing a style.
struct TextRun {
    start: f32,
    end: f32,
    text: String,
    size: f32,
    color: Rgba,
    bold: bool,
}

/// Space a line box needs above and below the baseline for text of `size`.
fn text_extent(font: &FontFace, size: f32, line_height: f32) -> (f32, f32) {
    let ascent = font.ascent(size);
    let leading = (size * line_height - size) / 2.0;
    let above = leading + ascent;
    let below = (size * line_height - above).max(0.0);
    (above, below)
}

fn item_width(item: &InlineItem) -> f32 {
    match item {
        InlineItem::Word { width, .. }
        | InlineItem::Image { width, .. }
        | InlineItem::Atomic { width, .. }
        | InlineItem::Space { width } => *width,
        InlineItem::Break => 0.0,
    }
}

/// Horizontal shift from `auto` margins given the `free` space left over.
fn auto_offset(style: &ComputedStyle, free: f32) -> f32 {
    match style.auto_margin {
        (true, true) => (free / 2.0).max(0.0),
        (true, false) => free.max(0.0),
        _ => 0.0,
    }
}

/// Split text on whitespace into words and collapsible spaces.
fn push_words(out: &mut Vec<InlineItem>, text: &str, style: &ComputedStyle, font: &FontFace) {
    let mut pieces: Vec<&str> = vec![" "];
    pieces.extend(text.split(char::is_whitespace));
    let widths = font.measure_all(&pieces, style.font_size);
    let space = widths[0];
    for (i, (word, width)) in pieces.iter().zip(&widths).skip(1).enumerate() {
        if i > 0 {
            out.push(InlineItem::Space { width: space });
        }
        if word.is_empty() {
            continue;
        }
        out.push(InlineItem::Word {
            text: word.to_string(),
            width: *width,
            size: style.font_size,
            line_height: style.line_height,
            color: style.color,
            bold: style.bold,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::surface::Stage;

    fn lay_out(html: &str, css: &str) -> Layout {
        let stage = Stage::new();
        let surface = stage.mount(html, "#certificate").expect("mount");
        let sheet = StyleSheet::parse(css);
        layout_document(
            surface.root(),
            &sheet,
            &FontFace::metrics_only(),
            &AssetStore::default(),
            Viewport {
                width: 800,
                height: 600,
            },
        )
    }

    #[test]
    fn blocks_stack_vertically() {
        let layout = lay_out(
            r#"<div id="certificate"><h1>Title</h1><p>Body text</p></div>"#,
            "",
        );
        assert_eq!(layout.width, 800.0);
        let texts: Vec<_> = layout
            .nodes
            .iter()
            .filter_map(|n| match &n.content {
                Content::Text { text, baseline, .. } => Some((text.clone(), *baseline)),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].0, "Title");
        assert_eq!(texts[1].0, "Body text");
        assert!(texts[1].1 > texts[0].1);
        assert!(layout.height > texts[1].1);
    }

    #[test]
    fn long_text_wraps_within_width() {
        let words = "word ".repeat(60);
        let layout = lay_out(
            &format!(r#"<div id="certificate"><p>{}</p></div>"#, words),
            "#certificate { width: 200px; }",
        );
        let runs: Vec<&LayoutNode> = layout
            .nodes
            .iter()
            .filter(|n| matches!(n.content, Content::Text { .. }))
            .collect();
        assert!(runs.len() > 1);
        for run in runs {
            assert!(run.rect.right() <= 200.0 + 0.01, "run overflows: {:?}", run.rect);
        }
    }

    #[test]
    fn centered_text_is_offset() {
        let layout = lay_out(
            r#"<div id="certificate"><p class="c">Hi</p></div>"#,
            ".c { text-align: center }",
        );
        let run = layout
            .nodes
            .iter()
            .find(|n| matches!(n.content, Content::Text { .. }))
            .unwrap();
        assert!(run.rect.x > 300.0);
    }

    #[test]
    fn padding_and_border_grow_the_box() {
        let layout = lay_out(
            r#"<div id="certificate"></div>"#,
            "#certificate { width: 100px; height: 50px; padding: 10px; border: 2px solid #000 }",
        );
        assert_eq!(layout.width, 124.0);
        assert_eq!(layout.height, 74.0);
        assert!(matches!(
            layout.nodes[0].content,
            Content::Box { border_width, .. } if border_width == 2.0
        ));
    }

    #[test]
    fn hidden_elements_are_skipped() {
        let layout = lay_out(
            r#"<div id="certificate"><p style="display:none">secret</p><span>shown</span></div>"#,
            "",
        );
        assert_eq!(layout.text(), "shown");
    }

    #[test]
    fn sized_images_take_space_even_when_errored() {
        let layout = lay_out(
            r#"<div id="certificate"><img src="qr.png" width="120" height="120"><img src="missing.png"></div>"#,
            "",
        );
        let images: Vec<_> = layout
            .nodes
            .iter()
            .filter(|n| matches!(n.content, Content::Image { .. }))
            .collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].rect.width, 120.0);
    }

    fn images(layout: &Layout) -> Vec<&LayoutNode> {
        layout
            .nodes
            .iter()
            .filter(|n| matches!(n.content, Content::Image { .. }))
            .collect()
    }

    #[test]
    fn block_images_sit_on_their_own_centred_line() {
        let html = r#"<div id="certificate"><div class="qr">Scan <img src="q.png" width="100" height="100"> to verify</div></div>"#;
        let layout = lay_out(html, ".qr img { display: block; margin: 8px auto }");
        let qr = images(&layout);
        assert_eq!(qr.len(), 1);
        assert_eq!(qr[0].rect, Rect { x: 350.0, y: qr[0].rect.y, width: 100.0, height: 100.0 });

        let runs: Vec<&LayoutNode> = layout
            .nodes
            .iter()
            .filter(|n| matches!(n.content, Content::Text { .. }))
            .collect();
        assert_eq!(layout.text(), "Scan to verify");
        assert_eq!(runs.len(), 2);
        assert!(runs[0].rect.bottom() <= qr[0].rect.y - 8.0 + 0.01);
        assert!(runs[1].rect.y >= qr[0].rect.bottom() + 8.0 - 0.01);
    }

    #[test]
    fn block_image_without_auto_margins_stays_left() {
        let layout = lay_out(
            r#"<div id="certificate"><img src="q.png" width="100" height="50"></div>"#,
            "img { display: block; margin-left: 20px }",
        );
        let qr = images(&layout);
        assert_eq!(qr.len(), 1);
        assert_eq!((qr[0].rect.x, qr[0].rect.y), (20.0, 0.0));
        assert_eq!(layout.height, 50.0);
    }

    #[test]
    fn sized_blocks_centre_with_auto_margins() {
        let layout = lay_out(
            r#"<div id="certificate"><div class="seal"></div></div>"#,
            ".seal { width: 200px; height: 20px; margin: 0 auto; background: gold }",
        );
        let seal = &layout.nodes[1];
        assert_eq!(seal.rect, Rect { x: 300.0, y: 0.0, width: 200.0, height: 20.0 });
    }

    #[test]
    fn inline_blocks_keep_their_box() {
        let html = r#"<div id="certificate"><div class="sig">Principal</div><div class="sig">Registrar</div></div>"#;
        let layout = lay_out(
            html,
            ".sig { display: inline-block; width: 150px; height: 60px; padding: 5px; border: 1px solid #000; background: #eee }",
        );
        let boxes: Vec<&LayoutNode> = layout
            .nodes
            .iter()
            .skip(1)
            .filter(|n| matches!(n.content, Content::Box { .. }))
            .collect();
        assert_eq!(boxes.len(), 2);
        for b in &boxes {
            assert_eq!((b.rect.width, b.rect.height), (162.0, 72.0));
            assert!(matches!(
                b.content,
                Content::Box { background: Some((0xee, 0xee, 0xee, 255)), border_width, .. } if border_width == 1.0
            ));
        }
        // Side by side on one line.
        assert_eq!(boxes[0].rect.y, boxes[1].rect.y);
        assert!(boxes[1].rect.x >= boxes[0].rect.right());

        let runs: Vec<&LayoutNode> = layout
            .nodes
            .iter()
            .filter(|n| matches!(n.content, Content::Text { .. }))
            .collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].rect.x, boxes[0].rect.x + 6.0);
        assert_eq!(runs[1].rect.x, boxes[1].rect.x + 6.0);
        assert_eq!(layout.height, 72.0);
    }

    #[test]
    fn inline_blocks_without_width_shrink_to_content() {
        let layout = lay_out(
            r#"<div id="certificate"><span class="tag">Seal</span></div>"#,
            ".tag { display: inline-block; padding: 0 4px }",
        );
        let tag = layout
            .nodes
            .iter()
            .skip(1)
            .find(|n| matches!(n.content, Content::Box { .. }))
            .unwrap();
        let expected = FontFace::metrics_only().measure("Seal", BASE_FONT_SIZE) + 8.0;
        assert!((tag.rect.width - expected).abs() < 0.01, "{:?}", tag.rect);
    }
}
