//! Guide-frame to image-pixel mapping
//!
//! The camera preview is shown under a "cover" fit: the image fills the
//! screen and the overflowing dimension is clipped symmetrically. The guide
//! frame is drawn in screen coordinates, so it has to be translated through
//! that clipping and scaled back up to raw pixel space before cropping.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

/// Guide-frame rectangle in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideFrame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Screen size and the guide frame drawn on it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: f64,
    pub height: f64,
    pub frame: GuideFrame,
}

/// Raw camera output
#[derive(Debug, Clone)]
pub struct RawPhoto {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Crop rectangle in image-pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRectangle {
    /// Width over height
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Whether the rectangle lies entirely inside an image of the given size
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= image_width as u64
            && self.y as u64 + self.height as u64 <= image_height as u64
    }
}

/// Result of mapping a capture onto its raw image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CropOutcome {
    /// The guide frame mapped to a valid rectangle
    Cropped { rect: CropRectangle },
    /// The uncropped image is used instead
    FullImage { reason: String },
}

impl CropOutcome {
    pub fn is_cropped(&self) -> bool {
        matches!(self, CropOutcome::Cropped { .. })
    }
}

/// Geometry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Invalid crop geometry: {0}")]
    InvalidCropGeometry(String),
}

/// Image bytes ready for recognition and storage
#[derive(Debug, Clone)]
pub struct CroppedPhoto {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub outcome: CropOutcome,
}

/// Maps guide frames to crop rectangles and performs the crop
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMapper;

impl FrameMapper {
    pub fn new() -> Self {
        Self
    }

    /// Map the guide frame of `screen` onto an image of the given pixel size.
    ///
    /// `x`/`y` are clamped to zero and `width`/`height` are shrunk to fit the
    /// image; the origin is never moved to make room.
    pub fn map(
        &self,
        screen: &ScreenGeometry,
        image_width: u32,
        image_height: u32,
    ) -> Result<CropRectangle, GeometryError> {
        if image_width == 0 || image_height == 0 {
            return Err(GeometryError::InvalidCropGeometry(format!(
                "image has no pixels ({}x{})",
                image_width, image_height
            )));
        }
        if !(screen.width > 0.0 && screen.height > 0.0)
            || !screen.width.is_finite()
            || !screen.height.is_finite()
        {
            return Err(GeometryError::InvalidCropGeometry(format!(
                "screen size {}x{} is not usable",
                screen.width, screen.height
            )));
        }
        let frame = screen.frame;
        if ![frame.x, frame.y, frame.width, frame.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(GeometryError::InvalidCropGeometry(
                "guide frame has non-finite coordinates".to_string(),
            ));
        }

        let raw_width = image_width as f64;
        let raw_height = image_height as f64;
        let image_aspect = raw_width / raw_height;
        let screen_aspect = screen.width / screen.height;

        let (display_width, offset_x, offset_y) = if image_aspect > screen_aspect {
            // Clipped left and right
            let display_width = screen.height * image_aspect;
            (display_width, (display_width - screen.width) / 2.0, 0.0)
        } else {
            // Clipped top and bottom
            let display_height = screen.width / image_aspect;
            (screen.width, 0.0, (display_height - screen.height) / 2.0)
        };

        let scale = raw_width / display_width;

        let mut x = ((frame.x + offset_x) * scale).round() as i64;
        let mut y = ((frame.y + offset_y) * scale).round() as i64;
        let mut width = (frame.width * scale).round() as i64;
        let mut height = (frame.height * scale).round() as i64;

        x = x.max(0);
        y = y.max(0);
        if x.saturating_add(width) > image_width as i64 {
            width = image_width as i64 - x;
        }
        if y.saturating_add(height) > image_height as i64 {
            height = image_height as i64 - y;
        }

        if width <= 0 || height <= 0 {
            return Err(GeometryError::InvalidCropGeometry(format!(
                "frame maps to empty rectangle (x={}, y={}, w={}, h={}) in {}x{} image",
                x, y, width, height, image_width, image_height
            )));
        }

        Ok(CropRectangle {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        })
    }

    /// Map using the dimensions the camera reported for `raw`
    pub fn crop(&self, screen: &ScreenGeometry, raw: &RawPhoto) -> CropOutcome {
        match self.map(screen, raw.width, raw.height) {
            Ok(rect) => CropOutcome::Cropped { rect },
            Err(e) => CropOutcome::FullImage {
                reason: e.to_string(),
            },
        }
    }

    /// Produce the image used for recognition and storage.
    ///
    /// Never fails: any geometry or codec problem yields the raw bytes with a
    /// `FullImage` outcome.
    pub fn crop_photo(&self, screen: &ScreenGeometry, raw: RawPhoto) -> CroppedPhoto {
        let decoded = match image::load_from_memory(&raw.bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!("Could not decode captured image, using it uncropped: {}", e);
                return full_image(raw, format!("image could not be decoded: {}", e));
            }
        };

        if decoded.width() != raw.width || decoded.height() != raw.height {
            tracing::debug!(
                reported_width = raw.width,
                reported_height = raw.height,
                decoded_width = decoded.width(),
                decoded_height = decoded.height(),
                "Reported dimensions differ from decoded image, mapping against decoded size"
            );
        }

        let rect = match self.map(screen, decoded.width(), decoded.height()) {
            Ok(rect) => rect,
            Err(e) => {
                tracing::warn!("{}; falling back to full image", e);
                return full_image(raw, e.to_string());
            }
        };

        let cropped = decoded.crop_imm(rect.x, rect.y, rect.width, rect.height);
        let format = output_format(&raw);

        match encode(&cropped, format) {
            Ok(bytes) => CroppedPhoto {
                bytes,
                mime_type: format.to_mime_type().to_string(),
                width: rect.width,
                height: rect.height,
                outcome: CropOutcome::Cropped { rect },
            },
            Err(e) => {
                tracing::warn!("Failed to encode cropped image: {}", e);
                full_image(raw, format!("cropped image could not be encoded: {}", e))
            }
        }
    }
}

fn full_image(raw: RawPhoto, reason: String) -> CroppedPhoto {
    CroppedPhoto {
        width: raw.width,
        height: raw.height,
        mime_type: raw.mime_type,
        bytes: raw.bytes,
        outcome: CropOutcome::FullImage { reason },
    }
}

/// Keep the camera's format where the encoder supports it
fn output_format(raw: &RawPhoto) -> ImageFormat {
    match ImageFormat::from_mime_type(&raw.mime_type)
        .or_else(|| image::guess_format(&raw.bytes).ok())
    {
        Some(ImageFormat::Png) => ImageFormat::Png,
        Some(ImageFormat::WebP) => ImageFormat::WebP,
        _ => ImageFormat::Jpeg,
    }
}

fn encode(img: &DynamicImage, format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut buffer), format)?,
        _ => img.write_to(&mut Cursor::new(&mut buffer), format)?,
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn screen(width: f64, height: f64, x: f64, y: f64, w: f64, h: f64) -> ScreenGeometry {
        ScreenGeometry {
            width,
            height,
            frame: GuideFrame {
                x,
                y,
                width: w,
                height: h,
            },
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_portrait_phone_capture() {
        let mapper = FrameMapper::new();
        let geometry = screen(1080.0, 1920.0, 100.0, 400.0, 880.0, 827.0);

        let rect = mapper.map(&geometry, 3024, 4032).unwrap();

        assert_eq!(rect, CropRectangle { x: 588, y: 840, width: 1848, height: 1737 });
        assert!(rect.fits_within(3024, 4032));

        let frame_aspect = 880.0 / 827.0;
        assert!((rect.aspect() - frame_aspect).abs() / frame_aspect < 0.01);
    }

    #[test]
    fn test_landscape_screen_clips_top_and_bottom() {
        let mapper = FrameMapper::new();
        // 4:3 image on a 16:9 screen
        let geometry = screen(1600.0, 900.0, 400.0, 0.0, 800.0, 900.0);

        let rect = mapper.map(&geometry, 4000, 3000).unwrap();

        // display 1600x1200, offset_y 150, scale 2.5
        assert_eq!(rect, CropRectangle { x: 1000, y: 375, width: 2000, height: 2250 });
    }

    #[test]
    fn test_frame_overflow_shrinks_size_not_origin() {
        let mapper = FrameMapper::new();
        let geometry = screen(1000.0, 1000.0, 900.0, 900.0, 500.0, 500.0);

        let rect = mapper.map(&geometry, 1000, 1000).unwrap();

        assert_eq!(rect, CropRectangle { x: 900, y: 900, width: 100, height: 100 });
    }

    #[test]
    fn test_negative_origin_clamps_to_zero() {
        let mapper = FrameMapper::new();
        let geometry = screen(1000.0, 1000.0, -50.0, -20.0, 300.0, 200.0);

        let rect = mapper.map(&geometry, 1000, 1000).unwrap();

        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.width, 300);
        assert_eq!(rect.height, 200);
    }

    #[test]
    fn test_frame_outside_image_is_invalid() {
        let mapper = FrameMapper::new();
        let geometry = screen(1000.0, 1000.0, 1200.0, 100.0, 100.0, 100.0);

        let result = mapper.map(&geometry, 1000, 1000);
        assert!(matches!(result, Err(GeometryError::InvalidCropGeometry(_))));

        let raw = RawPhoto {
            width: 1000,
            height: 1000,
            bytes: vec![],
            mime_type: "image/jpeg".to_string(),
        };
        assert!(!mapper.crop(&geometry, &raw).is_cropped());
    }

    #[test]
    fn test_degenerate_inputs_are_invalid() {
        let mapper = FrameMapper::new();

        let geometry = screen(1080.0, 1920.0, 100.0, 400.0, 880.0, 827.0);
        assert!(mapper.map(&geometry, 0, 4032).is_err());

        let geometry = screen(0.0, 1920.0, 100.0, 400.0, 880.0, 827.0);
        assert!(mapper.map(&geometry, 3024, 4032).is_err());

        let geometry = screen(1080.0, 1920.0, 100.0, 400.0, 0.0, 827.0);
        assert!(mapper.map(&geometry, 3024, 4032).is_err());

        let geometry = screen(1080.0, 1920.0, f64::NAN, 400.0, 880.0, 827.0);
        assert!(mapper.map(&geometry, 3024, 4032).is_err());
    }

    #[test]
    fn test_mapped_rectangles_stay_in_bounds() {
        let mapper = FrameMapper::new();
        let screens = [(1080.0, 1920.0), (1920.0, 1080.0), (750.0, 1334.0), (1000.0, 1000.0)];
        let images = [(3024, 4032), (4032, 3024), (640, 480), (1, 1), (4000, 100)];
        let frames = [
            (0.0, 0.0, 2000.0, 2000.0),
            (-300.0, 50.0, 400.0, 900.0),
            (100.0, 400.0, 880.0, 827.0),
            (10.0, 10.0, 1.0, 1.0),
        ];

        for &(sw, sh) in &screens {
            for &(iw, ih) in &images {
                for &(fx, fy, fw, fh) in &frames {
                    let geometry = screen(sw, sh, fx, fy, fw, fh);
                    if let Ok(rect) = mapper.map(&geometry, iw, ih) {
                        assert!(
                            rect.fits_within(iw, ih),
                            "{:?} escapes {}x{} for {:?}",
                            rect,
                            iw,
                            ih,
                            geometry
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_crop_photo_produces_cropped_image() {
        let mapper = FrameMapper::new();
        let raw = RawPhoto {
            width: 300,
            height: 400,
            bytes: png(300, 400),
            mime_type: "image/png".to_string(),
        };
        let geometry = screen(300.0, 400.0, 30.0, 40.0, 120.0, 200.0);

        let cropped = mapper.crop_photo(&geometry, raw);

        assert!(cropped.outcome.is_cropped());
        assert_eq!((cropped.width, cropped.height), (120, 200));
        assert_eq!(cropped.mime_type, "image/png");

        let decoded = image::load_from_memory(&cropped.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 200));
    }

    #[test]
    fn test_crop_photo_jpeg_output() {
        let mapper = FrameMapper::new();
        let raw = RawPhoto {
            width: 200,
            height: 200,
            bytes: png(200, 200),
            mime_type: "image/jpeg".to_string(),
        };
        let geometry = screen(200.0, 200.0, 50.0, 50.0, 100.0, 100.0);

        let cropped = mapper.crop_photo(&geometry, raw);

        assert_eq!(cropped.mime_type, "image/jpeg");
        assert_eq!(image::guess_format(&cropped.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_crop_photo_falls_back_on_undecodable_bytes() {
        let mapper = FrameMapper::new();
        let raw = RawPhoto {
            width: 3024,
            height: 4032,
            bytes: b"not an image".to_vec(),
            mime_type: "image/jpeg".to_string(),
        };
        let geometry = screen(1080.0, 1920.0, 100.0, 400.0, 880.0, 827.0);

        let cropped = mapper.crop_photo(&geometry, raw);

        assert!(matches!(cropped.outcome, CropOutcome::FullImage { .. }));
        assert_eq!(cropped.bytes, b"not an image");
        assert_eq!(cropped.mime_type, "image/jpeg");
    }
}
