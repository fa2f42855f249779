//! Output frame synthesis: face crops, letterboxing and watermarking.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};

use super::geometry::BoundingBox;
use crate::error::{MediaError, MediaResult};

/// Rows sampled at each content edge for the gradient reference colors.
const EDGE_STRIP_ROWS: u32 = 10;
/// Brightness of a gradient band's outer edge relative to its reference color.
const GRADIENT_OUTER_SHADE: f32 = 0.5;
/// Watermark height as a fraction of the output height.
const WATERMARK_HEIGHT_RATIO: f64 = 0.05;
const WATERMARK_MARGIN: u32 = 10;

/// Reference colors for the letterbox bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradientColors {
    pub top: Rgb<u8>,
    pub bottom: Rgb<u8>,
}

/// Vertical placement of the scaled content on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop `bbox` out of `frame` and scale it to `width` x `height`.
pub fn crop_and_scale(frame: &RgbImage, bbox: BoundingBox, width: u32, height: u32) -> MediaResult<RgbImage> {
    let (fw, fh) = frame.dimensions();
    if bbox.is_empty() || !bbox.fits_within(fw, fh) {
        return Err(MediaError::composition(format!(
            "crop {:?} outside {}x{} frame",
            bbox, fw, fh
        )));
    }
    let crop = imageops::crop_imm(frame, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
    Ok(imageops::resize(&crop, width, height, FilterType::Triangle))
}

/// Plain resize used by the landscape path.
pub fn scale_exact(frame: &RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Scale `frame` to the canvas width (or height, for very tall sources),
/// center it vertically and paint the remaining bands with gradients.
///
/// Without `gradient` the bands are derived from the frame's own content.
pub fn letterbox(
    frame: &RgbImage,
    canvas_width: u32,
    canvas_height: u32,
    gradient: Option<GradientColors>,
) -> (RgbImage, ContentRect) {
    let (fw, fh) = frame.dimensions();
    let rect = fit_rect(fw, fh, canvas_width, canvas_height);
    let content = imageops::resize(frame, rect.width, rect.height, FilterType::Triangle);

    let gradient = gradient.unwrap_or_else(|| edge_colors(&content));
    let mut canvas = RgbImage::new(canvas_width, canvas_height);

    let top_band = rect.y;
    for row in 0..top_band {
        // outer edge (row 0) is the shaded color, the edge touching content is the reference
        let t = row as f32 / top_band as f32;
        fill_row(&mut canvas, row, shade_towards(gradient.top, t));
    }

    let bottom_start = rect.y + rect.height;
    let bottom_band = canvas_height - bottom_start;
    for i in 0..bottom_band {
        let row = canvas_height - 1 - i;
        let t = i as f32 / bottom_band as f32;
        fill_row(&mut canvas, row, shade_towards(gradient.bottom, t));
    }

    imageops::replace(&mut canvas, &content, rect.x as i64, rect.y as i64);
    (canvas, rect)
}

/// Median colors of the top and bottom edge strips of `content`.
pub fn edge_colors(content: &RgbImage) -> GradientColors {
    let (_, h) = content.dimensions();
    let rows = EDGE_STRIP_ROWS.min(h);
    GradientColors {
        top: median_color(content, 0, rows),
        bottom: median_color(content, h - rows, h),
    }
}

/// Edge colors of the content region of a composed frame.
pub fn content_edge_colors(frame: &RgbImage, rect: ContentRect) -> GradientColors {
    let view = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    edge_colors(&view)
}

fn fit_rect(fw: u32, fh: u32, cw: u32, ch: u32) -> ContentRect {
    if fw == 0 || fh == 0 {
        return ContentRect { x: 0, y: 0, width: cw, height: ch };
    }
    let scaled_height = ((cw as f64 * fh as f64 / fw as f64).round() as u32).max(1);
    if scaled_height <= ch {
        return ContentRect {
            x: 0,
            y: (ch - scaled_height) / 2,
            width: cw,
            height: scaled_height,
        };
    }
    let scaled_width = ((ch as f64 * fw as f64 / fh as f64).round() as u32).clamp(1, cw);
    ContentRect {
        x: (cw - scaled_width) / 2,
        y: 0,
        width: scaled_width,
        height: ch,
    }
}

fn shade_towards(reference: Rgb<u8>, t: f32) -> Rgb<u8> {
    let weight = GRADIENT_OUTER_SHADE + (1.0 - GRADIENT_OUTER_SHADE) * t.clamp(0.0, 1.0);
    Rgb(reference.0.map(|c| (c as f32 * weight).round().min(255.0) as u8))
}

fn fill_row(canvas: &mut RgbImage, row: u32, color: Rgb<u8>) {
    for x in 0..canvas.width() {
        canvas.put_pixel(x, row, color);
    }
}

fn median_color(img: &RgbImage, row_start: u32, row_end: u32) -> Rgb<u8> {
    let mut channels: [Vec<u8>; 3] = Default::default();
    for y in row_start..row_end {
        for x in 0..img.width() {
            let px = img.get_pixel(x, y);
            for (c, values) in channels.iter_mut().enumerate() {
                values.push(px[c]);
            }
        }
    }

    let mut out = [0u8; 3];
    for (c, values) in channels.iter_mut().enumerate() {
        if values.is_empty() {
            continue;
        }
        let mid = values.len() / 2;
        out[c] = *values.select_nth_unstable(mid).1;
    }
    Rgb(out)
}

/// Semi-transparent logo composited bottom-right.
#[derive(Debug, Clone)]
pub struct Watermark {
    image: RgbaImage,
}

impl Watermark {
    pub fn load(path: impl AsRef<Path>) -> MediaResult<Self> {
        Ok(Self {
            image: image::open(path)?.to_rgba8(),
        })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Scale the logo for frames `frame_height` pixels tall.
    pub fn prepare(&self, frame_height: u32) -> PlacedWatermark {
        let (w, h) = self.image.dimensions();
        let target_h = ((frame_height as f64 * WATERMARK_HEIGHT_RATIO) as u32).max(1);
        let target_w = if h == 0 {
            1
        } else {
            ((target_h as f64 * w as f64 / h as f64).round() as u32).max(1)
        };
        PlacedWatermark {
            image: imageops::resize(&self.image, target_w, target_h, FilterType::Triangle),
        }
    }
}

/// A watermark scaled for one output size.
#[derive(Debug, Clone)]
pub struct PlacedWatermark {
    image: RgbaImage,
}

impl PlacedWatermark {
    /// Alpha-blend onto `frame` with a fixed margin from the bottom-right corner.
    pub fn apply(&self, frame: &mut RgbImage) {
        let (fw, fh) = frame.dimensions();
        let (ww, wh) = self.image.dimensions();
        if ww + WATERMARK_MARGIN > fw || wh + WATERMARK_MARGIN > fh {
            return;
        }
        let ox = fw - ww - WATERMARK_MARGIN;
        let oy = fh - wh - WATERMARK_MARGIN;

        for (x, y, px) in self.image.enumerate_pixels() {
            let alpha = px[3] as f32 / 255.0;
            if alpha <= 0.0 {
                continue;
            }
            let dst = frame.get_pixel_mut(ox + x, oy + y);
            for c in 0..3 {
                let blended = px[c] as f32 * alpha + dst[c] as f32 * (1.0 - alpha);
                dst[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
