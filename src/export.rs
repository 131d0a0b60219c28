//! Encoding finished composites for download

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, RgbaImage};

use crate::error::Result;

/// Default JPEG quality for exports
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Output encoding for an exported canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jpeg { quality: u8 },
    Png,
}

impl ExportFormat {
    /// JPEG for `.jpg`/`.jpeg` filenames, PNG for anything else
    pub fn from_filename(filename: &str, jpeg_quality: u8) -> Self {
        let lower = filename.to_lowercase();
        if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            ExportFormat::Jpeg {
                quality: jpeg_quality,
            }
        } else {
            ExportFormat::Png
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Jpeg { .. } => "image/jpeg",
            ExportFormat::Png => "image/png",
        }
    }
}

/// Encode a canvas. JPEG output drops the alpha channel.
pub fn encode_canvas(canvas: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut cursor = Cursor::new(&mut data);

    match format {
        ExportFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
            DynamicImage::ImageRgb8(rgb)
                .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality.clamp(1, 100)))?;
        }
        ExportFormat::Png => {
            DynamicImage::ImageRgba8(canvas.clone()).write_to(&mut cursor, ImageOutputFormat::Png)?;
        }
    }

    Ok(data)
}

/// Download name for a mockup, e.g. "Living Room  Frame" -> "mockup-living-room-frame.jpg".
/// Each whitespace run becomes a single '-', leading and trailing runs included.
pub fn export_filename(mockup_name: &str) -> String {
    let mut slug = String::with_capacity(mockup_name.len());
    let mut in_space = false;
    for c in mockup_name.chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
        } else {
            slug.extend(c.to_lowercase());
            in_space = false;
        }
    }
    format!("mockup-{}.jpg", slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_format_from_filename() {
        assert_eq!(
            ExportFormat::from_filename("mockup-shirt.JPG", 85),
            ExportFormat::Jpeg { quality: 85 }
        );
        assert_eq!(
            ExportFormat::from_filename("a.jpeg", 70),
            ExportFormat::Jpeg { quality: 70 }
        );
        assert_eq!(ExportFormat::from_filename("a.png", 85), ExportFormat::Png);
        assert_eq!(ExportFormat::from_filename("noext", 85), ExportFormat::Png);
    }

    #[test]
    fn test_export_filename() {
        assert_eq!(export_filename("Living Room  Frame"), "mockup-living-room-frame.jpg");
        assert_eq!(export_filename("Tee"), "mockup-tee.jpg");
    }

    #[test]
    fn test_export_filename_keeps_edge_whitespace_as_dashes() {
        assert_eq!(export_filename(" Tee "), "mockup--tee-.jpg");
        assert_eq!(export_filename("Mug\t\n Front"), "mockup-mug-front.jpg");
        assert_eq!(export_filename(""), "mockup-.jpg");
    }

    #[test]
    fn test_encode_round_trips_dimensions() {
        let canvas = RgbaImage::from_pixel(7, 5, Rgba([200, 100, 50, 255]));

        let png = encode_canvas(&canvas, ExportFormat::Png).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded, canvas);

        let jpeg = encode_canvas(&canvas, ExportFormat::Jpeg { quality: 85 }).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 5));
    }
}
