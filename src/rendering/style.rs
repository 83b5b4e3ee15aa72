//! Just enough CSS for certificate templates.
//!
//! Rules are parsed from the inlined stylesheet and matched with simple
//! selectors (type, `#id`, `.class`, `*`, compounds of those, and descendant
//! chains; `>` is treated as a descendant combinator). Rules with pseudo
//! classes, attribute selectors or at-rules are skipped. Only the properties
//! the layout understands are kept.

use crate::rendering::surface::Element;

pub type Rgba = (u8, u8, u8, u8);

pub const BLACK: Rgba = (0, 0, 0, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Inline,
    /// Laid out as a block, placed on a line as one atomic box.
    InlineBlock,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// Resolved style of one element, in CSS px.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub color: Rgba,
    pub background: Option<Rgba>,
    pub font_size: f32,
    pub bold: bool,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub margin: Edges,
    /// `margin-left: auto` / `margin-right: auto`; both together centre a
    /// sized block or image horizontally.
    pub auto_margin: (bool, bool),
    pub padding: Edges,
    pub border_width: f32,
    pub border_color: Rgba,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl ComputedStyle {
    pub fn root(font_size: f32) -> Self {
        Self {
            display: Display::Block,
            color: BLACK,
            background: None,
            font_size,
            bold: false,
            text_align: TextAlign::Left,
            line_height: 1.4,
            margin: Edges::default(),
            auto_margin: (false, false),
            padding: Edges::default(),
            border_width: 0.0,
            border_color: BLACK,
            width: None,
            height: None,
        }
    }

    /// Inherited properties carried over, everything else reset.
    fn inherit(parent: &ComputedStyle) -> Self {
        Self {
            color: parent.color,
            font_size: parent.font_size,
            bold: parent.bold,
            text_align: parent.text_align,
            line_height: parent.line_height,
            ..Self::root(parent.font_size)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn parse(src: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let chars = src.char_indices();
        let mut current_kind = 't';
        let mut start = 0;
        let mut parts: Vec<(char, &str)> = Vec::new();
        for (i, c) in chars {
            match c {
                '.' | '#' => {
                    parts.push((current_kind, &src[start..i]));
                    current_kind = c;
                    start = i + 1;
                }
                ':' | '[' | '(' => return None,
                _ => {}
            }
        }
        parts.push((current_kind, &src[start..]));
        for (kind, name) in parts {
            match (kind, name) {
                ('t', "") | ('t', "*") => {}
                ('t', tag) => compound.tag = Some(tag.to_ascii_lowercase()),
                (_, "") => return None,
                ('#', id) => compound.id = Some(id.to_string()),
                (_, class) => compound.classes.push(class.to_string()),
            }
        }
        Some(compound)
    }

    fn matches(&self, el: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if &el.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| el.has_class(c))
    }

    fn specificity(&self) -> u32 {
        let ids = self.id.is_some() as u32;
        let classes = self.classes.len() as u32;
        let tags = self.tag.is_some() as u32;
        ids * 10_000 + classes * 100 + tags
    }
}

#[derive(Debug, Clone)]
struct Rule {
    /// Rightmost compound last.
    chain: Vec<Compound>,
    specificity: u32,
    order: usize,
    declarations: Vec<(String, String)>,
}

impl Rule {
    fn matches(&self, el: &Element, ancestors: &[&Element]) -> bool {
        let Some((last, rest)) = self.chain.split_last() else {
            return false;
        };
        if !last.matches(el) {
            return false;
        }
        // Match the remaining compounds right to left against the ancestor chain.
        let mut remaining = rest.iter().rev().peekable();
        for ancestor in ancestors.iter().rev() {
            match remaining.peek() {
                Some(compound) if compound.matches(ancestor) => {
                    remaining.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        remaining.peek().is_none()
    }
}

/// Parsed stylesheet.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn parse(css: &str) -> Self {
        let mut sheet = StyleSheet::default();
        sheet.append(css);
        sheet
    }

    /// Parse `css` and append its rules after the existing ones.
    pub fn append(&mut self, css: &str) {
        let css = strip_comments(css);
        let mut rest = css.as_str();
        while let Some(open) = rest.find('{') {
            let Some(close) = matching_brace(&rest[open..]) else {
                break;
            };
            // Statements such as `@import ...;` end up in front of the next prelude.
            let prelude = rest[..open].rsplit(';').next().unwrap_or_default().trim();
            let body = &rest[open + 1..open + close];
            rest = &rest[open + close + 1..];

            if prelude.starts_with('@') {
                continue;
            }

            let declarations = parse_declarations(body);
            if declarations.is_empty() {
                continue;
            }
            for selector in prelude.split(',') {
                let chain: Option<Vec<Compound>> = selector
                    .split(|c: char| c.is_whitespace() || c == '>')
                    .filter(|s| !s.is_empty())
                    .map(Compound::parse)
                    .collect();
                let Some(chain) = chain.filter(|c| !c.is_empty()) else {
                    continue;
                };
                let specificity = chain.iter().map(Compound::specificity).sum();
                let order = self.rules.len();
                self.rules.push(Rule {
                    chain,
                    specificity,
                    order,
                    declarations: declarations.clone(),
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Cascade defaults, matching rules and the inline `style` attribute.
    pub fn compute(&self, el: &Element, ancestors: &[&Element], parent: &ComputedStyle) -> ComputedStyle {
        let mut style = ComputedStyle::inherit(parent);
        apply_defaults(&el.tag, &mut style);

        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.matches(el, ancestors))
            .collect();
        matched.sort_by_key(|r| (r.specificity, r.order));
        for rule in matched {
            for (name, value) in &rule.declarations {
                apply_declaration(&mut style, parent, name, value);
            }
        }
        if let Some(inline) = el.attr("style") {
            for (name, value) in parse_declarations(inline) {
                apply_declaration(&mut style, parent, &name, &value);
            }
        }
        style
    }
}

/// Offset of the brace closing the block that opens at the start of `s`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_end_matches("!important").trim().to_string();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name, value))
        })
        .collect()
}

fn apply_defaults(tag: &str, style: &mut ComputedStyle) {
    let em = style.font_size;
    match tag {
        "h1" => {
            style.font_size = em * 2.0;
            style.bold = true;
            style.margin = vertical_edges(em * 2.0 * 0.67);
        }
        "h2" => {
            style.font_size = em * 1.5;
            style.bold = true;
            style.margin = vertical_edges(em * 1.5 * 0.83);
        }
        "h3" => {
            style.font_size = em * 1.17;
            style.bold = true;
            style.margin = vertical_edges(em * 1.17);
        }
        "h4" | "h5" | "h6" => {
            style.bold = true;
            style.margin = vertical_edges(em * 1.33);
        }
        "p" => style.margin = vertical_edges(em),
        "strong" | "b" | "th" => {
            style.bold = true;
            if tag != "th" {
                style.display = Display::Inline;
            }
        }
        "small" => {
            style.font_size = em * 0.83;
            style.display = Display::Inline;
        }
        "span" | "em" | "i" | "u" | "a" | "label" | "sup" | "sub" | "code" | "img" | "br" => {
            style.display = Display::Inline
        }
        "head" | "title" | "meta" | "link" => style.display = Display::None,
        _ => {}
    }
}

fn vertical_edges(v: f32) -> Edges {
    Edges {
        top: v,
        bottom: v,
        ..Edges::default()
    }
}

fn apply_declaration(style: &mut ComputedStyle, parent: &ComputedStyle, name: &str, value: &str) {
    let em = style.font_size;
    match name {
        "display" => {
            style.display = match value {
                "none" => Display::None,
                "inline" => Display::Inline,
                "inline-block" | "inline-flex" | "inline-table" => Display::InlineBlock,
                _ => Display::Block,
            }
        }
        "color" => {
            if let Some(c) = parse_color(value) {
                style.color = c;
            }
        }
        "background-color" | "background" => {
            style.background = value
                .split_whitespace()
                .find_map(parse_color)
                .filter(|c| c.3 > 0);
        }
        "font-size" => {
            if let Some(px) = parse_length(value, parent.font_size, None) {
                style.font_size = px;
            } else if let Some(px) = keyword_font_size(value, parent.font_size) {
                style.font_size = px;
            }
        }
        "font-weight" => {
            style.bold = match value {
                "bold" | "bolder" => true,
                "normal" | "lighter" => false,
                v => v.parse::<u32>().map(|w| w >= 600).unwrap_or(style.bold),
            }
        }
        "text-align" => {
            style.text_align = match value {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "line-height" => {
            if let Ok(factor) = value.parse::<f32>() {
                style.line_height = factor;
            } else if let Some(px) = parse_length(value, em, None) {
                if em > 0.0 {
                    style.line_height = px / em;
                }
            }
        }
        "margin" => {
            style.margin = parse_edges(value, em, style.margin);
            let parts: Vec<&str> = value.split_whitespace().collect();
            let (right, left) = match parts.as_slice() {
                [all] => (*all, *all),
                [_, h] | [_, h, _] => (*h, *h),
                [_, r, _, l, ..] => (*r, *l),
                [] => ("", ""),
            };
            style.auto_margin = (left == "auto", right == "auto");
        }
        "margin-top" => set_edge(&mut style.margin.top, value, em),
        "margin-right" => {
            style.auto_margin.1 = value == "auto";
            set_edge(&mut style.margin.right, value, em)
        }
        "margin-bottom" => set_edge(&mut style.margin.bottom, value, em),
        "margin-left" => {
            style.auto_margin.0 = value == "auto";
            set_edge(&mut style.margin.left, value, em)
        }
        "padding" => style.padding = parse_edges(value, em, style.padding),
        "padding-top" => set_edge(&mut style.padding.top, value, em),
        "padding-right" => set_edge(&mut style.padding.right, value, em),
        "padding-bottom" => set_edge(&mut style.padding.bottom, value, em),
        "padding-left" => set_edge(&mut style.padding.left, value, em),
        "border" => {
            for part in value.split_whitespace() {
                if part == "none" {
                    style.border_width = 0.0;
                } else if let Some(px) = parse_length(part, em, None) {
                    style.border_width = px;
                } else if let Some(c) = parse_color(part) {
                    style.border_color = c;
                } else if let Some(px) = keyword_border_width(part) {
                    style.border_width = px;
                }
            }
        }
        "border-width" => {
            if let Some(px) = parse_length(value.split_whitespace().next().unwrap_or(value), em, None) {
                style.border_width = px;
            }
        }
        "border-color" => {
            if let Some(c) = parse_color(value) {
                style.border_color = c;
            }
        }
        "width" => style.width = parse_length(value, em, Some(parent.width)),
        "height" => style.height = parse_length(value, em, None),
        _ => {}
    }
}

fn set_edge(edge: &mut f32, value: &str, em: f32) {
    if value == "auto" {
        *edge = 0.0;
    } else if let Some(px) = parse_length(value, em, None) {
        *edge = px;
    }
}

fn parse_edges(value: &str, em: f32, current: Edges) -> Edges {
    let values: Vec<f32> = value
        .split_whitespace()
        .map(|v| parse_length(v, em, None).unwrap_or(0.0))
        .collect();
    match values.as_slice() {
        [all] => Edges {
            top: *all,
            right: *all,
            bottom: *all,
            left: *all,
        },
        [v, h] => Edges {
            top: *v,
            right: *h,
            bottom: *v,
            left: *h,
        },
        [t, h, b] => Edges {
            top: *t,
            right: *h,
            bottom: *b,
            left: *h,
        },
        [t, r, b, l, ..] => Edges {
            top: *t,
            right: *r,
            bottom: *b,
            left: *l,
        },
        [] => current,
    }
}

/// Length in CSS px. Percentages resolve against `percent_base` (outer
/// `None` means percentages are not supported for the property; inner `None`
/// means the base is not known yet, so the value is dropped).
pub fn parse_length(value: &str, em: f32, percent_base: Option<Option<f32>>) -> Option<f32> {
    let value = value.trim();
    if value == "0" {
        return Some(0.0);
    }
    if value == "auto" {
        return None;
    }
    let units: [(&str, f32); 7] = [
        ("px", 1.0),
        ("pt", 96.0 / 72.0),
        ("rem", 16.0),
        ("em", em),
        ("mm", 96.0 / 25.4),
        ("cm", 96.0 / 2.54),
        ("in", 96.0),
    ];
    for (suffix, factor) in units {
        if let Some(num) = value.strip_suffix(suffix) {
            return num.trim().parse::<f32>().ok().map(|n| n * factor);
        }
    }
    if let Some(num) = value.strip_suffix('%') {
        let base = percent_base??;
        return num.trim().parse::<f32>().ok().map(|n| n / 100.0 * base);
    }
    None
}

fn keyword_font_size(value: &str, parent: f32) -> Option<f32> {
    Some(match value {
        "xx-small" => 9.0,
        "x-small" => 10.0,
        "small" => 13.0,
        "medium" => 16.0,
        "large" => 18.0,
        "x-large" => 24.0,
        "xx-large" => 32.0,
        "smaller" => parent * 0.83,
        "larger" => parent * 1.2,
        _ => return None,
    })
}

fn keyword_border_width(value: &str) -> Option<f32> {
    match value {
        "thin" => Some(1.0),
        "medium" => Some(3.0),
        "thick" => Some(5.0),
        _ => None,
    }
}

pub fn parse_color(value: &str) -> Option<Rgba> {
    let value = value.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        let expanded: String = match hex.len() {
            3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => hex.to_string(),
            _ => return None,
        };
        let bytes = hex::decode(&expanded).ok()?;
        let alpha = bytes.get(3).copied().unwrap_or(255);
        return Some((bytes[0], bytes[1], bytes[2], alpha));
    }
    if let Some(args) = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))
        .and_then(|v| v.strip_suffix(')'))
    {
        let parts: Vec<&str> = args.split(|c: char| c == ',' || c == '/' || c == ' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |s: &str| s.trim().parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0) as u8);
        let alpha = parts
            .get(3)
            .and_then(|a| a.trim().parse::<f32>().ok())
            .map(|a| (a.clamp(0.0, 1.0) * 255.0).round() as u8)
            .unwrap_or(255);
        return Some((channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha));
    }
    let named = match value.as_str() {
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 128, 0, 255),
        "blue" => (0, 0, 255, 255),
        "navy" => (0, 0, 128, 255),
        "darkblue" => (0, 0, 139, 255),
        "maroon" => (128, 0, 0, 255),
        "darkred" => (139, 0, 0, 255),
        "gold" => (255, 215, 0, 255),
        "goldenrod" => (218, 165, 32, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        "darkgray" | "darkgrey" => (169, 169, 169, 255),
        "lightgray" | "lightgrey" => (211, 211, 211, 255),
        "silver" => (192, 192, 192, 255),
        "teal" => (0, 128, 128, 255),
        "purple" => (128, 0, 128, 255),
        "orange" => (255, 165, 0, 255),
        "transparent" => (0, 0, 0, 0),
        _ => return None,
    };
    Some(named)
}
