//! Drawing recognized faces and diagnostics onto RGB images.

use crate::types::BoundingBox;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const DIAGNOSTIC_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: u32 = 2;
const GLYPH_WIDTH: i32 = 3;
const GLYPH_HEIGHT: i32 = 5;
const GLYPH_SCALE: i32 = 2;
/// Where diagnostics are written on a pass-through frame.
const DIAGNOSTIC_ORIGIN: (i32, i32) = (10, 30);

/// A box and the caption drawn above it.
pub struct Annotation<'a> {
    pub bbox: BoundingBox,
    pub caption: &'a str,
}

/// Draw every annotation onto a copy of `image`. The input is left untouched.
pub fn annotate(image: &RgbImage, annotations: &[Annotation<'_>]) -> RgbImage {
    let mut canvas = image.clone();
    for a in annotations {
        let bbox = a.bbox.clamp_to(canvas.width(), canvas.height());
        draw_box(&mut canvas, &bbox, BOX_COLOR);
        let text_y = bbox.y - (GLYPH_HEIGHT * GLYPH_SCALE + 4);
        let text_y = if text_y < 0 { bbox.y + 4 } else { text_y };
        draw_text(&mut canvas, bbox.x + 2, text_y, a.caption, BOX_COLOR);
    }
    canvas
}

/// Write a diagnostic message near the top-left corner, in place.
pub fn overlay_message(image: &mut RgbImage, message: &str) {
    let (x, y) = DIAGNOSTIC_ORIGIN;
    draw_text(image, x, y - GLYPH_HEIGHT * GLYPH_SCALE, message, DIAGNOSTIC_COLOR);
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let w = bbox.width.saturating_sub(2 * inset);
        let h = bbox.height.saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at(bbox.x + inset as i32, bbox.y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Render `text` with the built-in 3×5 glyphs. Letters are drawn upper-case;
/// characters without a glyph leave a blank cell.
pub fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let advance = (GLYPH_WIDTH + 1) * GLYPH_SCALE;
    let mut cursor_x = x;
    for ch in text.chars() {
        draw_glyph(image, cursor_x, y, glyph(ch), color);
        cursor_x += advance;
    }
}

fn draw_glyph(image: &mut RgbImage, x: i32, y: i32, rows: [u8; 5], color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    let px = x + col * GLYPH_SCALE + dx;
                    let py = y + row as i32 * GLYPH_SCALE + dy;
                    if px >= 0 && py >= 0 && px < width && py < height {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b101, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b101, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '\'' => [0b010, 0b010, 0b000, 0b000, 0b000],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        _ => [0; 5],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_color(image: &RgbImage, color: Rgb<u8>) -> usize {
        image.pixels().filter(|&&p| p == color).count()
    }

    #[test]
    fn test_annotate_leaves_input_untouched() {
        let image = RgbImage::new(100, 100);
        let boxes = [Annotation {
            bbox: BoundingBox { x: 20, y: 30, width: 40, height: 40 },
            caption: "Carol Lee (0.92)",
        }];
        let out = annotate(&image, &boxes);
        assert_eq!(count_color(&image, BOX_COLOR), 0);
        assert!(count_color(&out, BOX_COLOR) > 0);
    }

    #[test]
    fn test_box_outline_drawn() {
        let image = RgbImage::new(100, 100);
        let boxes = [Annotation {
            bbox: BoundingBox { x: 20, y: 30, width: 40, height: 40 },
            caption: "",
        }];
        let out = annotate(&image, &boxes);
        // Both outline rings at the corner, nothing in the interior.
        assert_eq!(out.get_pixel(20, 30), &BOX_COLOR);
        assert_eq!(out.get_pixel(21, 31), &BOX_COLOR);
        assert_eq!(out.get_pixel(40, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_box_outside_image() {
        let image = RgbImage::new(50, 50);
        let boxes = [Annotation {
            bbox: BoundingBox { x: -30, y: -30, width: 500, height: 500 },
            caption: "Unknown",
        }];
        let out = annotate(&image, &boxes);
        assert_eq!(out.get_pixel(0, 0), &BOX_COLOR);
    }

    #[test]
    fn test_overlay_message_draws_text() {
        let mut image = RgbImage::new(200, 50);
        overlay_message(&mut image, "No face detected");
        assert!(count_color(&image, DIAGNOSTIC_COLOR) > 0);
    }

    #[test]
    fn test_unknown_glyph_is_blank() {
        let mut image = RgbImage::new(20, 20);
        draw_text(&mut image, 0, 0, "~", BOX_COLOR);
        assert_eq!(count_color(&image, BOX_COLOR), 0);
    }

    #[test]
    fn test_lowercase_matches_uppercase() {
        assert_eq!(glyph('a'), glyph('A'));
    }
}
