//! Single-page PDF assembly.
//!
//! The bitmap becomes one RGB image XObject stretched over the whole page.

use lopdf::{dictionary, Document, Object, Stream};

use crate::rendering::Bitmap;
use crate::{Error, PageFormat, Result};

/// Build a one-page document of `page` size showing `bitmap` edge to edge.
pub fn assemble(bitmap: &Bitmap, page: PageFormat) -> Result<Vec<u8>> {
    if bitmap.width == 0 || bitmap.height == 0 {
        return Err(Error::Pdf("bitmap has no pixels".into()));
    }
    if bitmap.rgba.len() != (bitmap.width as usize) * (bitmap.height as usize) * 4 {
        return Err(Error::Pdf("bitmap buffer does not match its size".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => bitmap.width as i64,
            "Height" => bitmap.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        bitmap.rgb(),
    ));

    let content = format!(
        "q {} 0 0 {} 0 0 cm /Im0 Do Q",
        page.width_pt, page.height_pt
    )
    .into_bytes();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![0.into(), 0.into(), page.width_pt.into(), page.height_pt.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| Error::Pdf(format!("serialization failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(width: u32, height: u32) -> Bitmap {
        Bitmap {
            width,
            height,
            rgba: vec![200; (width * height * 4) as usize],
        }
    }

    #[test]
    fn produces_one_a4_page() {
        let bytes = assemble(&bitmap(4, 6), PageFormat::a4_portrait()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).expect("reload");
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.get(&1).unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let media_box = page.get(b"MediaBox").and_then(Object::as_array).unwrap();
        let dims: Vec<f32> = media_box
            .iter()
            .map(|o| o.as_float().or_else(|_| o.as_i64().map(|v| v as f32)).unwrap())
            .collect();
        assert_eq!(dims, vec![0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn image_carries_bitmap_dimensions() {
        let bytes = assemble(&bitmap(3, 2), PageFormat::a4_portrait()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let image = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .find(|s| s.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Image"[..]))
            .expect("image xobject");
        assert_eq!(image.dict.get(b"Width").and_then(Object::as_i64).unwrap(), 3);
        assert_eq!(image.dict.get(b"Height").and_then(Object::as_i64).unwrap(), 2);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let broken = Bitmap {
            width: 2,
            height: 2,
            rgba: vec![0; 3],
        };
        assert!(matches!(assemble(&broken, PageFormat::a4_portrait()), Err(Error::Pdf(_))));
    }
}
