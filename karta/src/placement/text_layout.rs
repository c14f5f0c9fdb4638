//! Layout of point labels and labels along lines.

use std::f64::consts::{FRAC_PI_2, PI};

use karta_types::{Point2, Rect, Vector2};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RTL_CHARS: Regex = Regex::new(
        r"[\x{0590}-\x{08FF}\x{FB1D}-\x{FDFF}\x{FE70}-\x{FEFF}\x{10800}-\x{10FFF}\x{1E800}-\x{1EFFF}]"
    )
    .expect("valid regex");
}

/// Height of a text line relative to the font size.
pub const LINE_HEIGHT: f64 = 1.2;

/// True if the text contains characters of a right-to-left script.
pub fn is_rtl(text: &str) -> bool {
    RTL_CHARS.is_match(text)
}

/// Splits the text into lines of at most `max_chars` characters.
///
/// Words are never broken: the limit is raised to the length of the longest word.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let limit = words
        .iter()
        .map(|w| w.chars().count())
        .max()
        .unwrap_or(0)
        .max(max_chars);

    let mut lines: Vec<String> = vec![];
    let mut current = String::new();
    for word in words {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= limit {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Line of a point label.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Text of the line.
    pub text: String,
    /// Measured width.
    pub width: f64,
    /// Vertical offset of the line center from the center of the block.
    pub offset_y: f64,
}

/// Horizontally centered lines of a point label.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Lines from top to bottom.
    pub lines: Vec<TextLine>,
    /// Width of the widest line.
    pub width: f64,
    /// Height of all lines.
    pub height: f64,
}

impl TextBlock {
    /// Lays the lines out one under another, vertically centered around the anchor.
    pub fn new(lines: Vec<String>, font_size: f64, measure: &dyn Fn(&str) -> f64) -> Self {
        let line_height = font_size * LINE_HEIGHT;
        let middle = (lines.len() as f64 - 1.0) / 2.0;

        let lines: Vec<TextLine> = lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| TextLine {
                width: measure(&text),
                text,
                offset_y: (i as f64 - middle) * line_height,
            })
            .collect();

        Self {
            width: lines.iter().map(|l| l.width).fold(0.0, f64::max),
            height: lines.len() as f64 * line_height,
            lines,
        }
    }

    /// Bounding box of the block centered at `center`.
    pub fn bounds(&self, center: Point2) -> Rect {
        Rect::from_center(center, self.width, self.height)
    }
}

/// Character of a label placed along a line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGlyph {
    /// Character (or grapheme) drawn.
    pub text: String,
    /// Center of the glyph box in tile pixels.
    pub center: Point2,
    /// Rotation in radians, clockwise in pixel space.
    pub angle: f64,
    /// Axis-aligned box of the rotated glyph.
    pub bounds: Rect,
}

/// Places the characters of `text` along the line, centered on its middle.
///
/// Returns `None` if the text is longer than the line or if the line turns by more than 90
/// degrees under the text. Lines running right to left are reversed so the text is never upside
/// down, and right-to-left text is laid out in reverse character order.
pub fn layout_along_line(
    text: &str,
    line: &[Point2],
    font_size: f64,
    measure: &dyn Fn(&str) -> f64,
) -> Option<Vec<PlacedGlyph>> {
    let mut chars: Vec<String> = text.chars().map(String::from).collect();
    if is_rtl(text) {
        chars.reverse();
    }

    let widths: Vec<f64> = chars.iter().map(|c| measure(c)).collect();
    let text_width: f64 = widths.iter().sum();

    let mut points = line.to_vec();
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        if last.x < first.x {
            points.reverse();
        }
    }

    let mut distances = Vec::with_capacity(points.len());
    let mut total = 0.0;
    distances.push(0.0);
    for segment in points.windows(2) {
        total += (segment[1] - segment[0]).norm();
        distances.push(total);
    }

    if chars.is_empty() || total <= 0.0 || text_width > total {
        return None;
    }

    let mut glyphs = Vec::with_capacity(chars.len());
    let mut distance = (total - text_width) / 2.0;
    let mut segment = 0;
    let mut prev_angle = None;
    let mut turn = 0.0;

    for (text, width) in chars.into_iter().zip(widths) {
        let at = distance + width / 2.0;
        while segment + 2 < distances.len() && distances[segment + 1] < at {
            segment += 1;
        }

        let (start, end) = (points[segment], points[segment + 1]);
        let direction: Vector2 = end - start;
        let length = direction.norm();
        if length <= 0.0 {
            return None;
        }

        let center = start + direction * ((at - distances[segment]) / length);
        let angle = direction.y.atan2(direction.x);

        if let Some(prev) = prev_angle {
            turn += normalize_angle(angle - prev).abs();
            if turn > FRAC_PI_2 + 1e-9 {
                return None;
            }
        }
        prev_angle = Some(angle);

        let (sin, cos) = angle.sin_cos();
        let bounds = Rect::from_center(
            center,
            (width * cos).abs() + (font_size * sin).abs(),
            (width * sin).abs() + (font_size * cos).abs(),
        );

        glyphs.push(PlacedGlyph {
            text,
            center,
            angle,
            bounds,
        });
        distance += width;
    }

    Some(glyphs)
}

fn normalize_angle(angle: f64) -> f64 {
    let mut angle = angle % (2.0 * PI);
    if angle > PI {
        angle -= 2.0 * PI;
    } else if angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn monospace(text: &str) -> f64 {
        text.chars().count() as f64 * 10.0
    }

    fn line(points: &[(f64, f64)]) -> Vec<Point2> {
        points.iter().map(|(x, y)| Point2::new(*x, *y)).collect()
    }

    #[test]
    fn detects_rtl_scripts() {
        assert!(is_rtl("שלום"));
        assert!(is_rtl("مرحبا"));
        assert!(is_rtl("Tel Aviv תל אביב"));
        assert!(!is_rtl("Main street"));
        assert!(!is_rtl("Москва"));
    }

    #[test]
    fn wraps_by_words() {
        assert_eq!(
            wrap_text("Central Park Zoo Entrance", 10),
            vec!["Central", "Park Zoo", "Entrance"]
        );
        assert_eq!(
            wrap_text("Internationalization Road", 5),
            vec!["Internationalization", "Road"]
        );
        assert_eq!(wrap_text("  a   b ", 10), vec!["a b"]);
        assert!(wrap_text("", 10).is_empty());
    }

    #[test]
    fn block_is_vertically_centered() {
        let block = TextBlock::new(
            vec!["one".into(), "three".into(), "two".into()],
            10.0,
            &monospace,
        );

        let offsets: Vec<_> = block.lines.iter().map(|l| l.offset_y).collect();
        assert_abs_diff_eq!(offsets[0], -12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(offsets[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(offsets[2], 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(block.width, 50.0);
        assert_abs_diff_eq!(block.height, 36.0, epsilon = 1e-9);

        let bounds = block.bounds(Point2::new(100.0, 100.0));
        assert_abs_diff_eq!(bounds.x_min(), 75.0);
        assert_abs_diff_eq!(bounds.y_min(), 82.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.y_max(), 118.0, epsilon = 1e-9);
    }

    #[test]
    fn centers_text_on_straight_line() {
        let glyphs = layout_along_line("abc", &line(&[(0.0, 0.0), (100.0, 0.0)]), 12.0, &monospace)
            .expect("text fits");

        let centers: Vec<_> = glyphs.iter().map(|g| g.center.x).collect();
        assert_eq!(centers, vec![40.0, 50.0, 60.0]);
        assert!(glyphs.iter().all(|g| g.angle == 0.0));
        assert_eq!(glyphs[0].bounds, Rect::new(35.0, -6.0, 45.0, 6.0));
    }

    #[test]
    fn skips_text_longer_than_line() {
        let result = layout_along_line(
            "a long street name",
            &line(&[(0.0, 0.0), (100.0, 0.0)]),
            12.0,
            &monospace,
        );
        assert!(result.is_none());
    }

    #[test]
    fn follows_gentle_bends() {
        let glyphs = layout_along_line(
            "abcdef",
            &line(&[(0.0, 0.0), (50.0, 0.0), (100.0, 50.0)]),
            12.0,
            &monospace,
        )
        .expect("bend is readable");

        assert_abs_diff_eq!(glyphs[0].angle, 0.0);
        assert_abs_diff_eq!(glyphs[5].angle, PI / 4.0);
    }

    #[test]
    fn rejects_sharp_turns() {
        let result = layout_along_line(
            "abcdefghij",
            &line(&[(0.0, 0.0), (50.0, 0.0), (50.0, 20.0), (0.0, 20.0)]),
            12.0,
            &monospace,
        );
        assert!(result.is_none());
    }

    #[test]
    fn reverses_lines_running_left() {
        let glyphs = layout_along_line("ab", &line(&[(100.0, 0.0), (0.0, 0.0)]), 12.0, &monospace)
            .expect("text fits");
        assert_eq!(glyphs[0].text, "a");
        assert_eq!(glyphs[0].center.x, 45.0);
        assert_eq!(glyphs[0].angle, 0.0);
    }

    #[test]
    fn reverses_rtl_text() {
        let glyphs = layout_along_line("אב", &line(&[(0.0, 0.0), (100.0, 0.0)]), 12.0, &monospace)
            .expect("text fits");
        assert_eq!(glyphs[0].text, "ב");
        assert_eq!(glyphs[1].text, "א");
    }
}
