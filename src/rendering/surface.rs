//! Off-screen mounting of filled templates.
//!
//! A [`Stage`] stands in for the live document: every render mounts its HTML
//! on a fresh [`Surface`] with its own id, and the surface unmounts itself when
//! dropped, whichever way the render ends. The parsed document is converted to
//! an owned node tree right away so a surface can be held across await points.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use scraper::{ElementRef, Html, Selector};

use crate::{Error, Result};

/// Element in the mounted tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// `src` of every `<img>` in this subtree, in document order (self included).
    pub fn image_sources(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_images(self, &mut out);
        out
    }

    /// Concatenated text of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_images<'a>(el: &'a Element, out: &mut Vec<&'a str>) {
    if el.tag == "img" {
        if let Some(src) = el.attr("src") {
            out.push(src);
        }
    }
    for child in &el.children {
        if let Node::Element(e) = child {
            collect_images(e, out);
        }
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

/// Live mount registry shared by all renders of one renderer.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    live: Arc<Mutex<BTreeSet<u64>>>,
    next_id: Arc<AtomicU64>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surfaces currently mounted.
    pub fn live_count(&self) -> usize {
        self.live.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Mount `html` and locate the subtree matching `root_selector`.
    ///
    /// The mount is registered before parsing so the guard removes it again on
    /// every error path.
    pub fn mount(&self, html: &str, root_selector: &str) -> Result<Surface> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut live) = self.live.lock() {
            live.insert(id);
        }
        let guard = MountGuard {
            id,
            stage: self.clone(),
        };
        debug!("mounted surface {}", id);

        let selector = Selector::parse(root_selector).map_err(|e| {
            Error::Config(format!("root selector '{}' is invalid: {:?}", root_selector, e))
        })?;
        let document = Html::parse_document(html);

        let styles = Selector::parse("style")
            .map(|sel| {
                document
                    .select(&sel)
                    .map(|n| n.text().collect::<String>())
                    .filter(|s| !s.trim().is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let root = document
            .select(&selector)
            .next()
            .ok_or_else(|| Error::RenderTargetMissing(root_selector.to_string()))?;

        Ok(Surface {
            root: convert(root),
            styles,
            _guard: guard,
        })
    }
}

struct MountGuard {
    id: u64,
    stage: Stage,
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Ok(mut live) = self.stage.live.lock() {
            live.remove(&self.id);
        }
        trace!("unmounted surface {}", self.id);
    }
}

/// A mounted certificate subtree plus the style blocks of its document.
pub struct Surface {
    root: Element,
    styles: Vec<String>,
    _guard: MountGuard,
}

impl Surface {
    pub fn id(&self) -> u64 {
        self._guard.id
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Contents of every `<style>` block in the mounted document.
    pub fn styles(&self) -> &[String] {
        &self.styles
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self._guard.id)
            .field("root", &self.root.tag)
            .finish()
    }
}

fn convert(el: ElementRef) -> Element {
    let value = el.value();
    let mut children = Vec::new();
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(t) => children.push(Node::Text(String::from(&**t))),
            scraper::Node::Element(e) => {
                if matches!(e.name(), "script" | "style" | "template" | "noscript") {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    children.push(Node::Element(convert(child_ref)));
                }
            }
            _ => {}
        }
    }
    Element {
        tag: value.name().to_ascii_lowercase(),
        id: value.id().map(|s| s.to_string()),
        classes: value.classes().map(|c| c.to_string()).collect(),
        attrs: value
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><style>.name{color:red}</style></head><body>
        <div id="certificate" class="certificate-container bonafide">
            <h1>Bonafide</h1><p>Issued to <strong>Asha</strong></p>
            <img src="data:image/png;base64,AAAA"><script>alert(1)</script>
        </div></body></html>"#;

    #[test]
    fn mount_locates_root_and_collects_styles() {
        let stage = Stage::new();
        let surface = stage.mount(PAGE, "#certificate").expect("mount");
        assert_eq!(surface.root().tag, "div");
        assert!(surface.root().has_class("bonafide"));
        assert_eq!(surface.styles(), &[".name{color:red}".to_string()]);
        assert_eq!(surface.root().image_sources(), vec!["data:image/png;base64,AAAA"]);
        let text = surface.root().text_content();
        assert!(text.contains("Issued to Asha"));
        assert!(!text.contains("alert"));
        assert_eq!(stage.live_count(), 1);
        drop(surface);
        assert_eq!(stage.live_count(), 0);
    }

    #[test]
    fn missing_root_is_render_target_missing_and_unmounts() {
        let stage = Stage::new();
        let err = stage.mount("<html><body><p>no root</p></body></html>", "#certificate").unwrap_err();
        assert!(matches!(err, Error::RenderTargetMissing(ref s) if s == "#certificate"));
        assert_eq!(stage.live_count(), 0);
    }

    #[test]
    fn concurrent_mounts_get_distinct_ids() {
        let stage = Stage::new();
        let a = stage.mount(PAGE, "#certificate").unwrap();
        let b = stage.mount(PAGE, "#certificate").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(stage.live_count(), 2);
        drop(a);
        assert_eq!(stage.live_count(), 1);
        drop(b);
        assert_eq!(stage.live_count(), 0);
    }
}
