//! Collage compositor: a pure transformation from a template plus an ordered
//! list of encoded photos to one encoded output image.
//!
//! Each photo is cover-fit resized so it fully covers its frame on at least
//! one axis, center-cropped to the exact frame size, optionally bordered, and
//! pasted at the frame origin. The compositor holds no state between calls.

use crate::config::CollageConfig;
use crate::error::{BoothError, Result};
use crate::template::{Color, Template};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// The composed, encoded output of one `compose` call
#[derive(Debug, Clone)]
pub struct EncodedCollage {
    /// JPEG bytes at the template's canvas dimensions
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Compositor {
    config: CollageConfig,
}

impl Compositor {
    pub fn new(config: CollageConfig) -> Self {
        Self { config }
    }

    /// Compose `images` into the template's layout.
    ///
    /// Fails with `FrameCountMismatch` before touching any pixel data when
    /// the photo count does not equal the template's frame count, and with
    /// `CompositionFailed` if any single photo cannot be decoded; no partial
    /// output is ever produced.
    pub fn compose(&self, template: &Template, images: &[&[u8]]) -> Result<EncodedCollage> {
        if images.len() != template.frame_count() {
            return Err(BoothError::FrameCountMismatch {
                expected: template.frame_count(),
                actual: images.len(),
            });
        }

        let canvas_color = to_rgb(template.canvas.background_color);
        let mut canvas = RgbImage::from_pixel(
            template.canvas.width,
            template.canvas.height,
            canvas_color,
        );

        for (frame, bytes) in template.frames.iter().zip(images.iter()) {
            let decoded = image::load_from_memory(bytes).map_err(|e| {
                BoothError::composition(format!(
                    "photo for frame {} failed to decode: {}",
                    frame.frame_index, e
                ))
            })?;

            let mut piece = cover_fit_crop(&decoded.to_rgb8(), frame.width, frame.height);

            if self.config.apply_border && template.styling.border_width > 0 {
                piece = expand_with_border(
                    &piece,
                    template.styling.border_width,
                    template.styling.border_color,
                );
            }

            // Top-left of the (possibly bordered) piece lands on the frame
            // origin; border pixels extend past the nominal frame rectangle.
            imageops::replace(&mut canvas, &piece, frame.x as i64, frame.y as i64);

            debug!(
                "Placed photo {} ({}x{} source) into frame at ({}, {})",
                frame.frame_index,
                decoded.width(),
                decoded.height(),
                frame.x,
                frame.y
            );
        }

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(canvas)
            .write_to(
                &mut Cursor::new(&mut buf),
                image::ImageOutputFormat::Jpeg(self.config.jpeg_quality),
            )
            .map_err(|e| BoothError::composition(format!("output encoding failed: {}", e)))?;

        Ok(EncodedCollage {
            data: Arc::new(buf),
            width: template.canvas.width,
            height: template.canvas.height,
        })
    }
}

fn to_rgb(color: Color) -> Rgb<u8> {
    Rgb(color.0)
}

/// Resize `source` so it covers `frame_width x frame_height` on both axes,
/// then crop the overflow symmetrically to the exact frame size.
fn cover_fit_crop(source: &RgbImage, frame_width: u32, frame_height: u32) -> RgbImage {
    let (resize_width, resize_height) = cover_dimensions(
        source.width(),
        source.height(),
        frame_width,
        frame_height,
    );

    let resized = if (resize_width, resize_height) == (source.width(), source.height()) {
        source.clone()
    } else {
        imageops::resize(source, resize_width, resize_height, FilterType::Lanczos3)
    };

    let left = (resize_width - frame_width) / 2;
    let top = (resize_height - frame_height) / 2;
    imageops::crop_imm(&resized, left, top, frame_width, frame_height).to_image()
}

/// Scaled dimensions that cover the frame on both axes.
///
/// Wider-than-frame sources match the frame height and overflow in width;
/// everything else matches the frame width and overflows in height. Rounding
/// is upward so coverage is never lost to truncation.
fn cover_dimensions(src_w: u32, src_h: u32, frame_w: u32, frame_h: u32) -> (u32, u32) {
    // src_w / src_h > frame_w / frame_h, cross-multiplied to stay in integers
    let wider_than_frame = src_w as u64 * frame_h as u64 > src_h as u64 * frame_w as u64;

    if wider_than_frame {
        let scaled_w = (src_w as u64 * frame_h as u64).div_ceil(src_h as u64) as u32;
        (scaled_w.max(frame_w), frame_h)
    } else {
        let scaled_h = (src_h as u64 * frame_w as u64).div_ceil(src_w as u64) as u32;
        (frame_w, scaled_h.max(frame_h))
    }
}

/// Surround `piece` with a `border_width`-pixel border on every side
fn expand_with_border(piece: &RgbImage, border_width: u32, color: Color) -> RgbImage {
    let mut bordered = RgbImage::from_pixel(
        piece.width() + 2 * border_width,
        piece.height() + 2 * border_width,
        to_rgb(color),
    );
    imageops::replace(&mut bordered, piece, border_width as i64, border_width as i64);
    bordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::catalog;

    fn test_config() -> CollageConfig {
        CollageConfig {
            jpeg_quality: 95,
            apply_border: true,
        }
    }

    fn solid_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut Cursor::new(&mut buf),
                image::ImageOutputFormat::Jpeg(95),
            )
            .unwrap();
        buf
    }

    fn assert_near(actual: Rgb<u8>, expected: [u8; 3], tolerance: u8) {
        for c in 0..3 {
            let diff = (actual.0[c] as i16 - expected[c] as i16).unsigned_abs() as u8;
            assert!(
                diff <= tolerance,
                "channel {} of {:?} not within {} of {:?}",
                c,
                actual,
                tolerance,
                expected
            );
        }
    }

    #[test]
    fn test_cover_dimensions_cover_on_both_axes() {
        let cases = [
            (4000, 3000, 850, 850),
            (3000, 4000, 850, 850),
            (100, 900, 600, 450),
            (1280, 720, 1000, 750),
            (721, 720, 720, 720),
        ];
        for (sw, sh, fw, fh) in cases {
            let (w, h) = cover_dimensions(sw, sh, fw, fh);
            assert!(w >= fw && h >= fh, "{}x{} -> {}x{} misses {}x{}", sw, sh, w, h, fw, fh);
            assert!(w == fw || h == fh, "one axis must match the frame exactly");
        }
    }

    #[test]
    fn test_cover_fit_crop_yields_exact_frame_size() {
        let source = RgbImage::from_pixel(1280, 720, Rgb([10, 200, 30]));
        let piece = cover_fit_crop(&source, 850, 850);
        assert_eq!((piece.width(), piece.height()), (850, 850));
    }

    #[test]
    fn test_cover_fit_crop_is_idempotent_on_sized_input() {
        let mut source = RgbImage::new(640, 480);
        for (x, y, pixel) in source.enumerate_pixels_mut() {
            *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        let once = cover_fit_crop(&source, 640, 480);
        assert_eq!(once, source);
        let twice = cover_fit_crop(&once, 640, 480);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_compose_rejects_frame_count_mismatch() {
        let template = catalog::template_by_name("4 Fotos Grid").unwrap();
        let photo = solid_jpeg(640, 480, [200, 40, 40]);
        let images: Vec<&[u8]> = vec![photo.as_slice(); 3];

        let err = Compositor::new(test_config())
            .compose(&template, &images)
            .unwrap_err();
        assert!(matches!(
            err,
            BoothError::FrameCountMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_compose_rejects_undecodable_photo() {
        let template = catalog::template_by_name("2 Fotos Vertical").unwrap();
        let good = solid_jpeg(640, 480, [200, 40, 40]);
        let bad = vec![0u8; 32];
        let images: Vec<&[u8]> = vec![good.as_slice(), bad.as_slice()];

        let err = Compositor::new(test_config())
            .compose(&template, &images)
            .unwrap_err();
        assert!(matches!(err, BoothError::CompositionFailed { .. }));
    }

    #[test]
    fn test_compose_output_matches_canvas_for_arbitrary_sources() {
        let template = catalog::template_by_name("4 Fotos Grid").unwrap();
        let photos = [
            solid_jpeg(4000, 1000, [200, 40, 40]),
            solid_jpeg(300, 2200, [40, 200, 40]),
            solid_jpeg(851, 851, [40, 40, 200]),
            solid_jpeg(64, 64, [200, 200, 40]),
        ];
        let images: Vec<&[u8]> = photos.iter().map(|p| p.as_slice()).collect();

        let collage = Compositor::new(test_config())
            .compose(&template, &images)
            .unwrap();
        assert_eq!((collage.width, collage.height), (2000, 2000));

        let decoded = image::load_from_memory(&collage.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2000, 2000));
    }

    #[test]
    fn test_compose_two_horizontal_scenario() {
        let template = catalog::template_by_name("2 Fotos Horizontal").unwrap();
        let photos = [
            solid_jpeg(333, 500, [180, 20, 20]),
            solid_jpeg(800, 200, [20, 20, 180]),
        ];
        let images: Vec<&[u8]> = photos.iter().map(|p| p.as_slice()).collect();

        let collage = Compositor::new(test_config())
            .compose(&template, &images)
            .unwrap();
        assert_eq!((collage.width, collage.height), (2400, 1200));

        let decoded = image::load_from_memory(&collage.data).unwrap().to_rgb8();

        // untouched canvas corner keeps the background color
        assert_near(*decoded.get_pixel(10, 10), [0x34, 0x49, 0x5E], 8);

        for frame in &template.frames {
            // white border margin starts at the frame origin; generous
            // tolerance since the sharp edge sits mid-JPEG-block
            assert_near(*decoded.get_pixel(frame.x + 5, frame.y + 5), [255, 255, 255], 40);

            // photo content sits inside the 10px border
            let inside = *decoded.get_pixel(frame.x + 10 + 40, frame.y + 10 + 40);
            let background_delta = (inside.0[0] as i16 - 0x34).abs()
                + (inside.0[1] as i16 - 0x49).abs()
                + (inside.0[2] as i16 - 0x5E).abs();
            assert!(
                background_delta > 60,
                "expected photo content at frame offset, got {:?}",
                inside
            );
        }
    }

    #[test]
    fn test_compose_without_border_fills_frame_exactly() {
        let template = catalog::template_by_name("2 Fotos Vertical").unwrap();
        let photos = [
            solid_jpeg(500, 500, [180, 20, 20]),
            solid_jpeg(500, 500, [20, 180, 20]),
        ];
        let images: Vec<&[u8]> = photos.iter().map(|p| p.as_slice()).collect();

        let config = CollageConfig {
            jpeg_quality: 95,
            apply_border: false,
        };
        let collage = Compositor::new(config).compose(&template, &images).unwrap();

        let decoded = image::load_from_memory(&collage.data).unwrap().to_rgb8();
        let first = &template.frames[0];
        // no border: the frame interior is photo content, not white margin
        assert_near(*decoded.get_pixel(first.x + 20, first.y + 20), [180, 20, 20], 20);
    }
}
