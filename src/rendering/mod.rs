//! Off-screen rendering of a certificate subtree.
//!
//! `surface` mounts the filled HTML, `assets` settles its images, and
//! `style`, `layout`, `paint` and `raster` turn the mounted subtree into a
//! [`Bitmap`].

pub mod assets;
pub mod font;
pub mod layout;
pub mod paint;
pub mod raster;
pub mod style;
pub mod surface;

/// Rendered certificate in device pixels, straight RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}
