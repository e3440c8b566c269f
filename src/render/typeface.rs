use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

/// Font used for captions.
///
/// `Outline` is a TrueType/OpenType face loaded from disk. `Bitmap` is a
/// built-in 5x7 pixel font used when no font file is usable and for the
/// error image, so drawing never depends on an external resource.
#[derive(Clone)]
pub enum Typeface {
    Outline(FontArc),
    Bitmap,
}

impl Typeface {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("parsing font {}", path.display()))?;
        Ok(Typeface::Outline(font))
    }

    /// Preferred font if it loads, else the built-in bitmap font.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path.map(Self::from_file) {
            Some(Ok(face)) => face,
            Some(Err(e)) => {
                log::warn!("Custom font not usable ({:#}), using built-in font", e);
                Typeface::Bitmap
            }
            None => Typeface::Bitmap,
        }
    }

    /// Rendered width of `text` in pixels at `size` px.
    pub fn text_width(&self, size: u32, text: &str) -> u32 {
        match self {
            Typeface::Outline(font) => text_size(PxScale::from(size as f32), font, text).0,
            Typeface::Bitmap => text.chars().count() as u32 * GLYPH_ADVANCE * cell(size),
        }
    }

    pub fn draw(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, size: u32, text: &str) {
        match self {
            Typeface::Outline(font) => {
                draw_text_mut(canvas, color, x, y, PxScale::from(size as f32), font, text)
            }
            Typeface::Bitmap => draw_bitmap(canvas, color, x, y, size, text),
        }
    }
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Typeface::Outline(_) => f.write_str("Typeface::Outline"),
            Typeface::Bitmap => f.write_str("Typeface::Bitmap"),
        }
    }
}

const GLYPH_ROWS: u32 = 7;
const GLYPH_COLS: u32 = 5;
/// Glyph width plus one column of spacing.
const GLYPH_ADVANCE: u32 = GLYPH_COLS + 1;

/// Side of one bitmap "pixel" so a glyph is roughly `size` tall.
fn cell(size: u32) -> u32 {
    (size / (GLYPH_ROWS + 1)).max(1)
}

fn draw_bitmap(canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, size: u32, text: &str) {
    let cell = cell(size);
    let top = y + cell as i32 / 2;
    for (i, ch) in text.chars().enumerate() {
        let left = x + (i as u32 * GLYPH_ADVANCE * cell) as i32;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                    continue;
                }
                let rect = Rect::at(
                    left + (col * cell) as i32,
                    top + (row as u32 * cell) as i32,
                )
                .of_size(cell, cell);
                draw_filled_rect_mut(canvas, rect, color);
            }
        }
    }
}

/// 5x7 patterns, one byte per row, bit 4 is the leftmost column. Letters are
/// drawn upper-case; anything unknown is an empty box.
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ' ' => [0; 7],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0, 0b00100],
        '?' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0, 0b00100],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        ';' => [0, 0b01100, 0b01100, 0, 0b01100, 0b00100, 0b01000],
        '\'' => [0b00100, 0b00100, 0b01000, 0, 0, 0, 0],
        '"' => [0b01010, 0b01010, 0b01010, 0, 0, 0, 0],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_width_scales_with_size() {
        let face = Typeface::Bitmap;
        // cell 2 at 16px, 6 cells per glyph
        assert_eq!(face.text_width(16, "abc"), 36);
        assert_eq!(face.text_width(4, "abc"), 18);
        assert_eq!(face.text_width(16, ""), 0);
    }

    #[test]
    fn bitmap_draws_inside_measured_box() {
        let mut canvas = RgbImage::new(100, 40);
        let face = Typeface::Bitmap;
        let white = Rgb([255, 255, 255]);
        face.draw(&mut canvas, white, 10, 5, 16, "HI");
        let width = face.text_width(16, "HI");

        let lit: Vec<(u32, u32)> = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == white)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|&(x, y)| x >= 10 && x < 10 + width && y >= 5 && y < 5 + 16));
    }

    #[test]
    fn bitmap_clips_at_canvas_edge() {
        let mut canvas = RgbImage::new(8, 8);
        Typeface::Bitmap.draw(&mut canvas, Rgb([255, 0, 0]), -4, -4, 32, "W");
    }

    #[test]
    fn missing_font_falls_back() {
        let face = Typeface::load_or_default(Some(Path::new("/nonexistent/font.ttf")));
        assert!(matches!(face, Typeface::Bitmap));
    }
}
