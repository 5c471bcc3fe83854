use eframe::egui::ColorImage;

/// Longest edge of the preview shown next to the status line.
const PREVIEW_EDGE: u32 = 160;

/// Downloads and decodes the thumbnail the extractor reported for a job.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    // Perform a blocking HTTP GET request, returning None on any error
    let resp = reqwest::blocking::get(url).ok()?.error_for_status().ok()?;
    let bytes = resp.bytes().ok()?;
    decode_thumbnail(&bytes)
}

/// Decodes image bytes into a small egui image.
pub fn decode_thumbnail(bytes: &[u8]) -> Option<ColorImage> {
    let img = image::load_from_memory(bytes)
        .ok()?
        .thumbnail(PREVIEW_EDGE, PREVIEW_EDGE)
        .to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_and_shrinks() {
        let big = image::RgbaImage::from_pixel(640, 360, image::Rgba([200, 10, 10, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(big)
            .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();

        let decoded = decode_thumbnail(&png).unwrap();
        assert_eq!(decoded.size[0], PREVIEW_EDGE as usize);
        assert!(decoded.size[1] <= PREVIEW_EDGE as usize);
    }

    #[test]
    fn garbage_is_none() {
        assert!(decode_thumbnail(b"not an image").is_none());
    }
}
