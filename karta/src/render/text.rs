//! Text shaping with `rustybuzz`.

use std::sync::Arc;

use rustybuzz::ttf_parser::{GlyphId, OutlineBuilder};
use rustybuzz::{Face, UnicodeBuffer};
use tiny_skia::{Path, PathBuilder};

use crate::error::KartaError;

/// Width of a character relative to the font size when no font is available.
const FALLBACK_ADVANCE: f64 = 0.6;

/// Validated font file.
#[derive(Debug, Clone)]
pub struct FontData {
    data: Arc<Vec<u8>>,
}

impl FontData {
    /// Checks that the bytes hold a TrueType or OpenType face.
    pub fn new(data: Vec<u8>) -> Result<Self, KartaError> {
        if Face::from_slice(&data, 0).is_none() {
            return Err(KartaError::Generic("invalid font data".into()));
        }

        Ok(Self {
            data: Arc::new(data),
        })
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::from_slice(&self.data, 0)
    }

    /// Advance width of the shaped text in pixels.
    pub fn measure(&self, text: &str, font_size: f64) -> f64 {
        let Some(face) = self.face() else {
            return 0.0;
        };

        let scale = font_size / face.units_per_em() as f64;
        let glyphs = rustybuzz::shape(&face, &[], buffer(text));
        glyphs
            .glyph_positions()
            .iter()
            .map(|p| p.x_advance as f64 * scale)
            .sum()
    }

    /// Shapes the text into a single path with the origin at the start of the baseline.
    ///
    /// Returns `None` if the text has no visible glyphs.
    pub fn outline(&self, text: &str, font_size: f64) -> Option<ShapedText> {
        let face = self.face()?;
        let scale = font_size / face.units_per_em() as f64;
        let glyphs = rustybuzz::shape(&face, &[], buffer(text));

        let mut builder = GlyphPathBuilder {
            builder: PathBuilder::new(),
            scale: scale as f32,
            offset_x: 0.0,
            offset_y: 0.0,
        };

        let mut advance = 0.0;
        for (info, position) in glyphs.glyph_infos().iter().zip(glyphs.glyph_positions()) {
            builder.offset_x = (advance + position.x_offset as f64 * scale) as f32;
            builder.offset_y = (position.y_offset as f64 * scale) as f32;
            face.outline_glyph(GlyphId(info.glyph_id as u16), &mut builder);
            advance += position.x_advance as f64 * scale;
        }

        Some(ShapedText {
            path: builder.builder.finish()?,
            width: advance,
            ascent: face.ascender() as f64 * scale,
            descent: -(face.descender() as f64) * scale,
        })
    }
}

fn buffer(text: &str) -> UnicodeBuffer {
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.guess_segment_properties();
    buffer
}

/// Glyph outlines of a shaped text in pixels, y growing down.
#[derive(Debug, Clone)]
pub struct ShapedText {
    /// Outlines of all glyphs.
    pub path: Path,
    /// Advance width of the whole text.
    pub width: f64,
    /// Distance from the baseline to the top of the line.
    pub ascent: f64,
    /// Distance from the baseline to the bottom of the line.
    pub descent: f64,
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl GlyphPathBuilder {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.offset_x,
            -(y * self.scale + self.offset_y),
        )
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Width of the text in pixels, estimated from the font size if the font is not available.
pub fn measure_text(font: Option<&FontData>, text: &str, font_size: f64) -> f64 {
    match font {
        Some(font) => font.measure(text, font_size),
        None => text.chars().count() as f64 * font_size * FALLBACK_ADVANCE,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rejects_invalid_font() {
        assert_matches!(
            FontData::new(b"not a font".to_vec()),
            Err(KartaError::Generic(_))
        );
    }

    #[test]
    fn fallback_metrics() {
        assert_abs_diff_eq!(measure_text(None, "Main", 10.0), 24.0);
        assert_abs_diff_eq!(measure_text(None, "", 10.0), 0.0);
        // Characters, not bytes.
        assert_abs_diff_eq!(measure_text(None, "Öl", 10.0), 12.0);
    }

    #[test]
    fn glyph_coordinates_are_flipped() {
        let builder = GlyphPathBuilder {
            builder: PathBuilder::new(),
            scale: 0.5,
            offset_x: 10.0,
            offset_y: 0.0,
        };
        assert_eq!(builder.map(100.0, 200.0), (60.0, -100.0));
    }
}
