//! Display list built from a layout, in CSS px.

use crate::rendering::layout::{Content, Layout};
use crate::rendering::style::Rgba;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        rgba: Rgba,
    },
    /// Outline drawn inside the rectangle.
    StrokeRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        line_width: f32,
        rgba: Rgba,
    },
    /// `y` is the baseline.
    Text {
        x: f32,
        y: f32,
        text: String,
        size: f32,
        rgba: Rgba,
        bold: bool,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        src: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    pub width: f32,
    pub height: f32,
    pub commands: Vec<PaintCommand>,
}

impl DisplayList {
    /// Text of every text command, joined by spaces.
    pub fn text(&self) -> String {
        self.commands
            .iter()
            .filter_map(|c| match c {
                PaintCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn build_display_list(layout: &Layout) -> DisplayList {
    let mut commands = Vec::with_capacity(layout.nodes.len());
    for node in &layout.nodes {
        let r = node.rect;
        match &node.content {
            Content::Box {
                background,
                border_width,
                border_color,
            } => {
                if let Some(rgba) = background {
                    commands.push(PaintCommand::SolidRect {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                        rgba: *rgba,
                    });
                }
                if *border_width > 0.0 && border_color.3 > 0 {
                    commands.push(PaintCommand::StrokeRect {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                        line_width: *border_width,
                        rgba: *border_color,
                    });
                }
            }
            Content::Text {
                text,
                baseline,
                size,
                color,
                bold,
            } => commands.push(PaintCommand::Text {
                x: r.x,
                y: *baseline,
                text: text.clone(),
                size: *size,
                rgba: *color,
                bold: *bold,
            }),
            Content::Image { src } => commands.push(PaintCommand::Image {
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                src: src.clone(),
            }),
        }
    }
    DisplayList {
        width: layout.width,
        height: layout.height,
        commands,
    }
}
