//! Caption compositing.
//!
//! [`MemeRenderer::render`] always hands back a PNG: either the captioned
//! meme or, when one of the conditions in [`RenderError`] occurs, a small
//! red error card carrying the message.

pub mod layout;
pub mod typeface;

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub use layout::BlockLayout;
pub use typeface::Typeface;

const FILL: Rgb<u8> = Rgb([255, 255, 255]);
const OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);

const ERROR_CARD_WIDTH: u32 = 400;
const ERROR_CARD_HEIGHT: u32 = 200;
const ERROR_CARD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ERROR_TEXT_SIZE: u32 = 16;
const ERROR_MARGIN: u32 = 10;

/// What to draw the captions on.
#[derive(Debug, Clone, Copy)]
pub enum ImageRef<'a> {
    Path(&'a Path),
    Image(&'a DynamicImage),
}

/// The conditions that turn a render into the error card.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("cannot read image {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image {width}x{height} is too small for captions")]
    TooSmall { width: u32, height: u32 },

    #[error("encoding PNG failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct MemeRenderer {
    typeface: Typeface,
}

impl MemeRenderer {
    pub fn new(typeface: Typeface) -> Self {
        Self { typeface }
    }

    /// Use the font at `font_path`, falling back to the built-in font.
    pub fn with_font(font_path: Option<&Path>) -> Self {
        Self::new(Typeface::load_or_default(font_path))
    }

    /// Captioned PNG, or the error card when rendering cannot proceed.
    pub fn render(&self, source: ImageRef<'_>, top: &str, bottom: &str) -> Vec<u8> {
        match self.try_render(source, top, bottom) {
            Ok(png) => {
                log::info!("Meme image with text generated successfully");
                png
            }
            Err(e) => {
                log::error!("Error adding text to image: {}", e);
                error_image(&e.to_string())
            }
        }
    }

    pub fn try_render(
        &self,
        source: ImageRef<'_>,
        top: &str,
        bottom: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let mut canvas = match source {
            ImageRef::Path(path) => {
                log::info!("Adding text to image: {}", path.display());
                image::open(path)
                    .map_err(|source| RenderError::Unreadable {
                        path: path.to_path_buf(),
                        source,
                    })?
                    .to_rgb8()
            }
            ImageRef::Image(img) => img.to_rgb8(),
        };

        let (width, height) = canvas.dimensions();
        let blocks = [
            BlockLayout::top(width, height, top),
            BlockLayout::bottom(width, height, bottom),
        ];
        if width == 0 || blocks.iter().any(|b| !b.lines.is_empty() && b.font_size == 0) {
            return Err(RenderError::TooSmall { width, height });
        }

        for block in &blocks {
            self.draw_block(&mut canvas, block);
        }
        encode_png(&canvas)
    }

    fn draw_block(&self, canvas: &mut RgbImage, block: &BlockLayout) {
        let width = canvas.width();
        let size = block.font_size;
        let t = layout::outline_thickness(size);

        for (i, line) in block.lines.iter().enumerate() {
            let y = (block.start_y + i as f64 * block.line_height) as i32;
            let text_width = self.typeface.text_width(size, line);
            let x = ((width as f64 - text_width as f64) / 2.0) as i32;

            for dx in [-t, 0, t] {
                for dy in [-t, 0, t] {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    self.typeface.draw(canvas, OUTLINE, x + dx, y + dy, size, line);
                }
            }
            self.typeface.draw(canvas, FILL, x, y, size, line);
        }
    }
}

fn encode_png(canvas: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    canvas.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Fixed-size red card with "Error: <message>" in white, wrapped to fit.
pub fn error_image(message: &str) -> Vec<u8> {
    let mut canvas = RgbImage::from_pixel(ERROR_CARD_WIDTH, ERROR_CARD_HEIGHT, ERROR_CARD_COLOR);
    let face = Typeface::Bitmap;
    let advance = face.text_width(ERROR_TEXT_SIZE, "M").max(1);
    let per_line = ((ERROR_CARD_WIDTH - 2 * ERROR_MARGIN) / advance) as usize;
    let line_height = (ERROR_TEXT_SIZE as f64 * layout::LINE_SPACING) as u32;

    let text = format!("Error: {}", message);
    let mut y = ERROR_MARGIN;
    for line in layout::wrap(&text, per_line) {
        if y + line_height > ERROR_CARD_HEIGHT {
            break;
        }
        face.draw(
            &mut canvas,
            FILL,
            ERROR_MARGIN as i32,
            y as i32,
            ERROR_TEXT_SIZE,
            &line,
        );
        y += line_height;
    }

    match encode_png(&canvas) {
        Ok(png) => png,
        Err(e) => {
            log::error!("encoding error image failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn photo(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn decode(png: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(png, ImageFormat::Png).unwrap()
    }

    #[test]
    fn renders_png_same_size_as_source() {
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let src = photo(320, 240);
        let png = renderer.render(ImageRef::Image(&src), "top line", "bottom line");
        let out = decode(&png);
        assert_eq!(out.dimensions(), (320, 240));
        assert_ne!(out.to_rgb8(), src.to_rgb8());
    }

    #[test]
    fn render_is_deterministic() {
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let src = photo(300, 300);
        let a = renderer.render(ImageRef::Image(&src), "same words", "every time");
        let b = renderer.render(ImageRef::Image(&src), "same words", "every time");
        assert_eq!(a, b);
    }

    #[test]
    fn middle_band_is_untouched() {
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let src = photo(400, 400);
        let out = decode(&renderer.render(ImageRef::Image(&src), "TOP", "BOTTOM")).to_rgb8();
        let src = src.to_rgb8();
        for y in 170..230 {
            for x in 0..400 {
                assert_eq!(out.get_pixel(x, y), src.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn caption_is_outlined_and_centred() {
        const GREY: Rgb<u8> = Rgb([128, 128, 128]);
        let (width, height) = (400u32, 400u32);
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, GREY));
        let out = decode(&renderer.render(ImageRef::Image(&src), "HOH", "")).to_rgb8();

        // top band only; font 24px gives 3px cells and a 2px outline
        let band = (height as f64 * layout::BAND_FRACTION) as u32;
        let cell = 3i64;
        let t = layout::outline_thickness(24) as i64;

        let mut lit = Vec::new();
        for y in 0..band {
            for x in 0..width {
                let p = *out.get_pixel(x, y);
                if p != GREY {
                    assert!(p == FILL || p == OUTLINE, "stray colour {:?}", p);
                    lit.push((x as i64, y as i64, p));
                }
            }
        }
        assert!(lit.iter().any(|&(_, _, p)| p == OUTLINE));

        let black_near = |x: i64, y: i64| {
            (-t..=t).any(|dx| {
                (-t..=t).any(|dy| {
                    let (nx, ny) = (x + dx, y + dy);
                    nx >= 0
                        && ny >= 0
                        && *out.get_pixel(nx as u32, ny as u32) == OUTLINE
                })
            })
        };
        assert!(lit
            .iter()
            .any(|&(x, y, p)| p == FILL && black_near(x, y)));

        let min_x = lit.iter().map(|&(x, _, _)| x).min().unwrap();
        let max_x = lit.iter().map(|&(x, _, _)| x).max().unwrap();
        let mid = (min_x + max_x) as f64 / 2.0;
        assert!(
            (mid - width as f64 / 2.0).abs() <= cell as f64,
            "caption spans {}..={}",
            min_x,
            max_x
        );
    }

    #[test]
    fn unreadable_path_gives_error_card() {
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let path = Path::new("/nonexistent/meme/source.png");
        assert!(matches!(
            renderer.try_render(ImageRef::Path(path), "a", "b"),
            Err(RenderError::Unreadable { .. })
        ));

        let out = decode(&renderer.render(ImageRef::Path(path), "a", "b")).to_rgb8();
        assert_eq!(out.dimensions(), (ERROR_CARD_WIDTH, ERROR_CARD_HEIGHT));
        assert_eq!(*out.get_pixel(ERROR_CARD_WIDTH - 1, ERROR_CARD_HEIGHT - 1), ERROR_CARD_COLOR);
        assert!(out.pixels().any(|p| *p == FILL));
    }

    #[test]
    fn corrupt_file_gives_error_card() {
        let path = std::env::temp_dir().join(format!("memegen-corrupt-{}.png", std::process::id()));
        std::fs::write(&path, b"definitely not a png").unwrap();
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let out = decode(&renderer.render(ImageRef::Path(&path), "a", "b"));
        std::fs::remove_file(&path).ok();
        assert_eq!(out.dimensions(), (ERROR_CARD_WIDTH, ERROR_CARD_HEIGHT));
    }

    #[test]
    fn tiny_image_is_rejected() {
        let renderer = MemeRenderer::new(Typeface::Bitmap);
        let src = photo(40, 10);
        assert!(matches!(
            renderer.try_render(ImageRef::Image(&src), "hello", "world"),
            Err(RenderError::TooSmall { .. })
        ));
    }

    #[test]
    fn error_card_survives_long_messages() {
        let png = error_image(&"very long failure ".repeat(100));
        assert_eq!(decode(&png).dimensions(), (ERROR_CARD_WIDTH, ERROR_CARD_HEIGHT));
    }
}
