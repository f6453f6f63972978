/// Image utilities for drawing detections onto frames
use crate::config::PipelineConfig;
use crate::error::{DetectionError, Result};
use crate::types::{ClassNames, Detection, Frame, ImageFormat};
use image::{Rgb, RgbImage};

/// Glyph cell width of the bitmap font, including one column of spacing
const GLYPH_ADVANCE: i32 = 6;

/// Labels sit this many pixels above the top edge of their box
const LABEL_OFFSET: i32 = 10;

/// 5x7 bitmap glyphs, one row per byte, most significant of the low 5 bits on the left
const GLYPHS: &[(char, [u8; 7])] = &[
    ('A', [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('B', [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E]),
    ('C', [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E]),
    ('D', [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E]),
    ('E', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F]),
    ('F', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10]),
    ('G', [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F]),
    ('H', [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('I', [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('J', [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C]),
    ('K', [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11]),
    ('L', [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F]),
    ('M', [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11]),
    ('N', [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11]),
    ('O', [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('P', [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10]),
    ('Q', [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D]),
    ('R', [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11]),
    ('S', [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E]),
    ('T', [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
    ('U', [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('V', [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04]),
    ('W', [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11]),
    ('X', [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11]),
    ('Y', [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04]),
    ('Z', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F]),
    ('0', [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E]),
    ('1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
    ('3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
    ('4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
    ('5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
    ('6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
    ('7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
    ('8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
    ('9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
    (' ', [0x00; 7]),
    ('.', [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C]),
    ('_', [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F]),
    ('-', [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00]),
];

/// Hollow box for characters the font does not cover
const UNKNOWN_GLYPH: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

fn glyph(ch: char) -> [u8; 7] {
    let ch = ch.to_ascii_uppercase();
    GLYPHS
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, rows)| *rows)
        .unwrap_or(UNKNOWN_GLYPH)
}

fn put_clipped(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Draw text with the 5x7 bitmap font, top-left at (x, y); off-image pixels are clipped
pub fn draw_text(img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as i32 * GLYPH_ADVANCE;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..5 {
                if (bits >> (4 - col)) & 1 == 1 {
                    put_clipped(img, origin_x + col, y + row as i32, color);
                }
            }
        }
    }
}

/// Draw a hollow rectangle whose border grows outward to `thickness` pixels.
/// Zero-sized rectangles draw nothing.
pub fn draw_rect(
    img: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
    thickness: u32,
) {
    use imageproc::drawing::draw_hollow_rect_mut;
    use imageproc::rect::Rect;

    if width == 0 || height == 0 {
        log::debug!("Skipping zero-sized rectangle {}x{}", width, height);
        return;
    }

    // Edges are kept within one pixel of the image so off-image sides stay invisible
    let (max_x, max_y) = (i64::from(img.width()), i64::from(img.height()));
    for offset in 0..i64::from(thickness) {
        let left = (i64::from(x) - offset).max(-1);
        let top = (i64::from(y) - offset).max(-1);
        let right = (i64::from(x) + i64::from(width) - 1 + offset).min(max_x);
        let bottom = (i64::from(y) + i64::from(height) - 1 + offset).min(max_y);
        if right < left || bottom < top {
            continue;
        }

        let grown = Rect::at(left as i32, top as i32)
            .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
        draw_hollow_rect_mut(img, grown, color);
    }
}

/// How detections are rendered onto a frame
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    /// Box and label color, RGB
    pub color: [u8; 3],
    pub thickness: u32,
    pub draw_labels: bool,
}

impl OverlayStyle {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            color: config.box_color,
            thickness: config.box_thickness,
            draw_labels: config.draw_labels,
        }
    }

    /// Color expressed in the channel order of `format`
    fn color_for(&self, format: ImageFormat) -> Rgb<u8> {
        let [r, g, b] = self.color;
        match format {
            ImageFormat::Rgb => Rgb([r, g, b]),
            ImageFormat::Bgr => Rgb([b, g, r]),
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Label text drawn above a box, e.g. `person 0.87`
pub fn detection_label(detection: &Detection, names: &ClassNames) -> String {
    format!("{} {:.2}", names.name(detection.class_id), detection.confidence)
}

/// Burn detections into the frame in place, in the frame's own channel order
pub fn overlay_detections(
    frame: &mut Frame,
    detections: &[Detection],
    names: &ClassNames,
    style: &OverlayStyle,
) -> Result<()> {
    if !frame.validate() {
        return Err(DetectionError::postprocessing(format!(
            "Cannot draw on malformed frame {} ({}x{}, {} bytes)",
            frame.sequence,
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let data = std::mem::take(&mut frame.data);
    let mut canvas = RgbImage::from_raw(frame.width, frame.height, data).ok_or_else(|| {
        DetectionError::postprocessing("Frame buffer does not match its dimensions".to_string())
    })?;

    let color = style.color_for(frame.format);
    let (frame_w, frame_h) = (frame.width as f32, frame.height as f32);
    for detection in detections {
        let bbox = &detection.bbox;
        let finite = bbox.x.is_finite() && bbox.y.is_finite();
        if !finite || !(bbox.width > 0.0 && bbox.height > 0.0) {
            continue;
        }

        // Clip to the frame before converting to pixels
        let left = bbox.x.clamp(0.0, frame_w) as i32;
        let top = bbox.y.clamp(0.0, frame_h) as i32;
        let right = (bbox.x + bbox.width).clamp(0.0, frame_w) as i32;
        let bottom = (bbox.y + bbox.height).clamp(0.0, frame_h) as i32;
        if right <= left || bottom <= top {
            continue;
        }

        draw_rect(
            &mut canvas,
            left,
            top,
            (right - left) as u32,
            (bottom - top) as u32,
            color,
            style.thickness,
        );

        if style.draw_labels {
            let label = detection_label(detection, names);
            draw_text(&mut canvas, &label, left, top - LABEL_OFFSET, color);
        }
    }

    frame.data = canvas.into_raw();
    Ok(())
}
