//! Caption geometry. Everything here is a pure function of image size and
//! text, so rendering the same inputs twice lays out identically.

/// Line advance as a multiple of font size.
pub const LINE_SPACING: f64 = 1.2;
/// Each caption band covers this fraction of the image height.
pub const BAND_FRACTION: f64 = 0.4;
/// The bottom band starts here.
pub const BOTTOM_BAND_START: f64 = 0.6;

const HEIGHT_FRACTION: f64 = 0.06;
const LENGTH_BUDGET: f64 = 1000.0;
const CHAR_WIDTH_RATIO: f64 = 0.6;
const USABLE_WIDTH: f64 = 0.8;

/// `min(0.06 * height, 1000 / max(chars / 2, 1))`, truncated to whole pixels.
pub fn font_size(image_height: u32, text: &str) -> u32 {
    let by_height = (image_height as f64 * HEIGHT_FRACTION) as u32;
    let half_len = text.chars().count() as f64 / 2.0;
    let by_length = (LENGTH_BUDGET / half_len.max(1.0)) as u32;
    by_height.min(by_length)
}

/// How many estimated character widths fit in 80% of the image width.
pub fn chars_per_line(image_width: u32, font_size: u32) -> usize {
    let char_width = (font_size as f64 * CHAR_WIDTH_RATIO).max(1.0);
    ((image_width as f64 * USABLE_WIDTH / char_width) as usize).max(1)
}

pub fn outline_thickness(font_size: u32) -> i32 {
    (font_size as i32 / 10).max(2)
}

/// Greedy word wrap on whitespace. Words longer than `width` are split so
/// that no line holds more than `width` characters.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut rest: Vec<char> = word.chars().collect();
        while !rest.is_empty() {
            let needed = if current_len == 0 {
                rest.len()
            } else {
                current_len + 1 + rest.len()
            };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(rest.iter());
                current_len += rest.len();
                break;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            // a single word wider than the line
            let tail = rest.split_off(width);
            lines.push(rest.into_iter().collect());
            rest = tail;
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Placement of one caption block inside its band.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    pub font_size: u32,
    pub chars_per_line: usize,
    pub lines: Vec<String>,
    /// Baseline-free top of the first line, may be negative when the text
    /// overflows its band.
    pub start_y: f64,
    pub line_height: f64,
}

impl BlockLayout {
    /// Lay out `text` in the band starting at `band_top` with height
    /// `BAND_FRACTION * image_height`, vertically centred.
    pub fn plan(image_width: u32, image_height: u32, band_top: f64, text: &str) -> Self {
        let font_size = font_size(image_height, text);
        let chars_per_line = chars_per_line(image_width, font_size);
        let lines = wrap(text, chars_per_line);
        let line_height = font_size as f64 * LINE_SPACING;
        let band_height = image_height as f64 * BAND_FRACTION;
        let block_height = lines.len() as f64 * line_height;
        Self {
            font_size,
            chars_per_line,
            lines,
            start_y: band_top + (band_height - block_height) / 2.0,
            line_height,
        }
    }

    pub fn top(image_width: u32, image_height: u32, text: &str) -> Self {
        Self::plan(image_width, image_height, 0.0, text)
    }

    pub fn bottom(image_width: u32, image_height: u32, text: &str) -> Self {
        let band_top = image_height as f64 * BOTTOM_BAND_START;
        Self::plan(image_width, image_height, band_top, text)
    }
}
