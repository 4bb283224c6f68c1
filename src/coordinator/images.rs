use crate::rendering::surface::Bitmap;
use crate::{MapError, Result};

/// Turns fetched image bytes into a premultiplied bitmap
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap>;
}

/// Decodes any format the `image` crate understands (PNG for sprites)
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterImageDecoder;

impl ImageDecoder for RasterImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| MapError::Image(e.to_string()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let mut pixels = image.into_raw();
        for px in pixels.chunks_exact_mut(4) {
            let alpha = px[3] as u16;
            for channel in &mut px[..3] {
                *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
            }
        }
        Bitmap::new(width, height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(pixel: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(2, 3, Rgba(pixel));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_premultiplies() {
        let bitmap = RasterImageDecoder.decode(&png([200, 100, 0, 128])).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (2, 3));
        assert_eq!(bitmap.pixel(1, 2), Some([100, 50, 0, 128]));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(RasterImageDecoder.decode(b"definitely not a png").is_err());
    }
}
