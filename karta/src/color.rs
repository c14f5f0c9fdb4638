use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref CSS_RGB: Regex = Regex::new(
        r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$"
    )
    .expect("valid regex");
}

/// RGBA color as used in style documents.
///
/// Deserialized from `#RGB`, `#RRGGBB`, `#RRGGBBAA` or `rgb(r, g, b)` / `rgba(r, g, b, a)`
/// strings. Unparsable strings become opaque black.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl From<String> for Color {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_else(|| {
            log::warn!("Invalid color string {value:?}, using black");
            Color::BLACK
        })
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_hex()
    }
}

impl Color {
    /// `#00000000`
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// `#000000FF`
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    /// `#FFFFFFFF`
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    /// Constructs color from its RGBA channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from the lower 24 bits of `value` (`0xRRGGBB`).
    pub const fn from_rgb24(value: u32) -> Self {
        Self::rgba(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
            255,
        )
    }

    /// Packs RGB channels as `0xRRGGBB`, ignoring alpha.
    pub fn to_rgb24(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Converts the color into HEX8 string: `#RRGGBBAA`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// Parses any of the supported color notations.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('#') {
            return Self::try_from_hex(value);
        }

        let captures = CSS_RGB.captures(value)?;
        let channel = |i: usize| captures.get(i)?.as_str().parse::<u8>().ok();
        let a = match captures.get(4) {
            Some(alpha) => {
                let alpha = alpha.as_str().parse::<f64>().ok()?.clamp(0.0, 1.0);
                (alpha * 255.0).round() as u8
            }
            None => 255,
        };

        Some(Self::rgba(channel(1)?, channel(2)?, channel(3)?, a))
    }

    /// Parses `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
    pub fn try_from_hex(hex_string: &str) -> Option<Self> {
        let digits = hex_string.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }

        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        match digits.len() {
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&digits[i..i + 1], 16)
                        .ok()
                        .map(|v| v * 17)
                };
                Some(Self::rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255))
            }
            6 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    /// Returns the color with alpha multiplied by `alpha` (`0.0..=1.0`).
    pub fn with_opacity(&self, alpha: f64) -> Self {
        let a = (self.a as f64 * alpha.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..*self }
    }

    /// Opacity component of the color.
    pub fn a(&self) -> u8 {
        self.a
    }

    /// Returns true if the color is fully transparent (`a == 0`).
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notations() {
        assert_eq!(Color::parse("#F00"), Some(Color::rgba(255, 0, 0, 255)));
        assert_eq!(Color::parse("#102030"), Some(Color::rgba(16, 32, 48, 255)));
        assert_eq!(Color::parse("#10203080"), Some(Color::rgba(16, 32, 48, 128)));
        assert_eq!(
            Color::parse("rgba(1, 2, 3, 0.5)"),
            Some(Color::rgba(1, 2, 3, 128))
        );
        assert_eq!(Color::parse("rgb(1,2,3)"), Some(Color::rgba(1, 2, 3, 255)));
        assert_eq!(Color::parse("red"), None);
        assert_eq!(Color::parse("#12345"), None);
    }

    #[test]
    fn serialization() {
        let color: Color = serde_json::from_str("\"#FF1000AA\"").expect("valid json");
        assert_eq!(color.to_hex(), "#FF1000AA");
        assert_eq!(
            serde_json::to_string(&color).expect("serializable"),
            "\"#FF1000AA\""
        );
    }

    #[test]
    fn rgb24_round_trip() {
        let color = Color::from_rgb24(0x12_34_56);
        assert_eq!(color, Color::rgba(0x12, 0x34, 0x56, 255));
        assert_eq!(color.to_rgb24(), 0x12_34_56);
        assert_eq!(color.with_opacity(0.5).a(), 128);
    }
}
