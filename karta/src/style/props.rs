use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::Color;

/// Style document as served by the style endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StyleDocument {
    /// Names of the layers in drawing order.
    pub order: Vec<String>,
    /// Layer definitions by name.
    pub layers: HashMap<String, LayerDef>,
    /// Color the tile is cleared with.
    pub background_color: Option<Color>,
    /// Opacity of the background color.
    pub background_alpha: Option<f64>,
    /// Formula producing the name of a pattern drawn over the background.
    pub background_pattern_function: Option<String>,
}

/// Definition of one style layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerDef {
    /// `[min, max]` zoom levels (inclusive) at which the layer is drawn.
    #[serde(default = "default_zoom_range")]
    pub zoom_range: [f64; 2],
    /// Disabled layers are never drawn.
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Style type the layer belongs to. Untyped layers belong to every type.
    #[serde(rename = "Type", default)]
    pub layer_type: Option<String>,
    /// Dataset the objects are taken from. Defaults to the layer name.
    #[serde(default)]
    pub data: Option<DataRef>,
    /// Style used when no filter matches.
    #[serde(default)]
    pub style: Option<StyleProps>,
    /// Conditional styles, the first matching one wins.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Makes the layer draw generated lattice points instead of dataset objects.
    #[serde(default)]
    pub grid: Option<GridDef>,
    /// Draws objects on the save surface in unique colors.
    #[serde(default)]
    pub save: bool,
    /// Arbitrary data for the host application.
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
    /// Blend mode of the layer.
    #[serde(default)]
    pub composite_operation: Option<CompositeOperation>,
    /// Displacement layers labels of this layer are checked against.
    #[serde(default = "default_displacement")]
    pub displacement: Vec<String>,
}

fn default_zoom_range() -> [f64; 2] {
    [0.0, 32.0]
}

fn default_true() -> bool {
    true
}

fn default_displacement() -> Vec<String> {
    vec!["default".into()]
}

/// Reference to a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DataRef {
    /// Dataset key. The layer name is used if absent.
    pub key: Option<String>,
    /// Dataset value.
    pub value: Option<String>,
}

/// Conditional style.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    /// Formula deciding if the filter applies to an object.
    pub condition: String,
    /// Style of matching objects.
    pub style: StyleProps,
}

/// Lattice of generated points.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GridDef {
    /// Distance between lattice points in pixels.
    pub step: f64,
    /// Horizontal shift of every next row in pixels.
    pub skew: f64,
    /// Maximum random displacement of a point in pixels.
    pub jitter: f64,
}

impl Default for GridDef {
    fn default() -> Self {
        Self {
            step: 64.0,
            skew: 0.0,
            jitter: 0.0,
        }
    }
}

/// Paint and label attributes of an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StyleProps {
    /// Polygon fill.
    pub fill_color: Option<Color>,
    /// Opacity of the fill, `0..=1`.
    pub fill_alpha: Option<f64>,
    /// Outline and line color.
    pub stroke_color: Option<Color>,
    /// Opacity of the stroke, `0..=1`.
    pub stroke_alpha: Option<f64>,
    /// Stroke width in pixels.
    pub line_width: Option<f64>,
    /// Dash pattern in pixels.
    pub line_dash: Option<Vec<f64>>,
    /// Line ends.
    pub line_cap: Option<LineCap>,
    /// Line corners.
    pub line_join: Option<LineJoin>,
    /// Formula producing the name of the fill pattern.
    pub pattern_function: Option<String>,
    /// Formula producing the name of the icon.
    pub icon_function: Option<String>,
    /// Scale of the icon image.
    pub icon_scale: Option<f64>,
    /// Offset of the icon in pixels.
    pub icon_offset: Option<[f64; 2]>,
    /// Point of the icon placed at the anchor, as a fraction of its size. `[0.5, 0.5]` is the
    /// center.
    pub icon_anchor: Option<[f64; 2]>,
    /// Formula producing the label text.
    pub text_function: Option<String>,
    /// Font asset name.
    pub font_family: Option<String>,
    /// Font size in pixels.
    pub font_size: Option<f64>,
    /// Label fill.
    pub text_color: Option<Color>,
    /// Opacity of the label, `0..=1`.
    pub text_alpha: Option<f64>,
    /// Color of the halo around the label.
    pub text_stroke_color: Option<Color>,
    /// Width of the halo in pixels.
    pub text_stroke_width: Option<f64>,
    /// Candidate positions of the label around the anchor, tried in order.
    pub text_placements: Option<Vec<TextPlacement>>,
    /// Offset of the label in pixels.
    pub text_offset: Option<[f64; 2]>,
    /// Lays the label out along the line geometry.
    pub text_along_line: bool,
    /// Maximum number of characters in a line of a point label.
    pub text_wrap: Option<usize>,
    /// Radius of the circle drawn for point geometries.
    pub point_radius: Option<f64>,
    /// Formula producing the drawing order key of the objects of the layer.
    pub sort_function: Option<String>,
    /// Exponent of the display density scaling of the sizes.
    pub zoom_scale: f64,
}

pub(crate) const DEFAULT_FONT_SIZE: f64 = 12.0;

impl StyleProps {
    /// Applies density scaling to all sizes of the style.
    pub fn scale(&mut self, config: &EngineConfig) {
        let zoom_scale = self.zoom_scale;
        let scale = |v: f64| config.style_scale(v, zoom_scale);

        self.line_width = self.line_width.map(scale);
        self.font_size = Some(scale(self.font_size.unwrap_or(DEFAULT_FONT_SIZE)));
        self.point_radius = self.point_radius.map(scale);
        self.icon_scale = Some(scale(self.icon_scale.unwrap_or(1.0)));
        self.text_stroke_width = self.text_stroke_width.map(scale);
        if let Some(dash) = &mut self.line_dash {
            dash.iter_mut().for_each(|v| *v = scale(*v));
        }
    }

    /// Fill color with its alpha applied.
    pub fn fill(&self) -> Option<Color> {
        paint(self.fill_color, self.fill_alpha)
    }

    /// Stroke color with its alpha applied.
    pub fn stroke(&self) -> Option<Color> {
        paint(self.stroke_color, self.stroke_alpha)
    }

    /// Label text color, black by default.
    pub fn text_paint(&self) -> Color {
        paint(self.text_color, self.text_alpha).unwrap_or(Color::BLACK)
    }

    /// True if objects get an icon or a label instead of their geometry drawn.
    pub fn has_label(&self) -> bool {
        self.icon_function.is_some() || self.text_function.is_some()
    }

    /// Font size in pixels.
    pub fn font_size(&self) -> f64 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }
}

fn paint(color: Option<Color>, alpha: Option<f64>) -> Option<Color> {
    let color = color?;
    let color = match alpha {
        Some(alpha) => color.with_opacity(alpha),
        None => color,
    };

    (!color.is_transparent()).then_some(color)
}

/// Position of a label relative to its anchor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextPlacement {
    /// Above the anchor.
    N,
    /// Above and to the right.
    NE,
    /// To the right.
    E,
    /// Below and to the right.
    SE,
    /// Below the anchor.
    S,
    /// Below and to the left.
    SW,
    /// To the left.
    W,
    /// Above and to the left.
    NW,
}

impl TextPlacement {
    /// Direction from the anchor to the label in pixel space (y grows down).
    pub fn direction(&self) -> (f64, f64) {
        match self {
            TextPlacement::N => (0.0, -1.0),
            TextPlacement::NE => (1.0, -1.0),
            TextPlacement::E => (1.0, 0.0),
            TextPlacement::SE => (1.0, 1.0),
            TextPlacement::S => (0.0, 1.0),
            TextPlacement::SW => (-1.0, 1.0),
            TextPlacement::W => (-1.0, 0.0),
            TextPlacement::NW => (-1.0, -1.0),
        }
    }
}

/// Shape of line ends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Flat end at the last point.
    Butt,
    /// Half circle around the last point.
    Round,
    /// Flat end extended by half of the line width.
    Square,
}

impl LineCap {
    pub(crate) fn to_skia(self) -> tiny_skia::LineCap {
        match self {
            LineCap::Butt => tiny_skia::LineCap::Butt,
            LineCap::Round => tiny_skia::LineCap::Round,
            LineCap::Square => tiny_skia::LineCap::Square,
        }
    }
}

/// Shape of line corners.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    /// Sharp corner.
    Miter,
    /// Rounded corner.
    Round,
    /// Cut-off corner.
    Bevel,
}

impl LineJoin {
    pub(crate) fn to_skia(self) -> tiny_skia::LineJoin {
        match self {
            LineJoin::Miter => tiny_skia::LineJoin::Miter,
            LineJoin::Round => tiny_skia::LineJoin::Round,
            LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
        }
    }
}

/// Canvas composite operation names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeOperation {
    /// Draws over the existing content.
    #[default]
    SourceOver,
    /// Keeps the new content where both overlap.
    SourceIn,
    /// Keeps the new content where the existing content is empty.
    SourceOut,
    /// Draws the new content only over the existing content.
    SourceAtop,
    /// Draws behind the existing content.
    DestinationOver,
    /// Keeps the existing content where both overlap.
    DestinationIn,
    /// Keeps the existing content where the new content is empty.
    DestinationOut,
    /// Keeps the existing content only where it overlaps the new content.
    DestinationAtop,
    /// Adds the colors.
    Lighter,
    /// Replaces the existing content.
    Copy,
    /// Keeps the parts that do not overlap.
    Xor,
    /// Multiplies the colors.
    Multiply,
    /// Inverted multiplication of inverted colors.
    Screen,
    /// Multiply or screen depending on the existing color.
    Overlay,
    /// Darker of the two colors.
    Darken,
    /// Lighter of the two colors.
    Lighten,
    /// Brightens the existing color.
    ColorDodge,
    /// Darkens the existing color.
    ColorBurn,
    /// Multiply or screen depending on the new color.
    HardLight,
    /// Softer version of hard light.
    SoftLight,
    /// Absolute difference of the colors.
    Difference,
    /// Lower contrast version of difference.
    Exclusion,
    /// Hue of the new color.
    Hue,
    /// Saturation of the new color.
    Saturation,
    /// Hue and saturation of the new color.
    Color,
    /// Luminosity of the new color.
    Luminosity,
}

impl CompositeOperation {
    pub(crate) fn blend_mode(self) -> tiny_skia::BlendMode {
        use tiny_skia::BlendMode;

        match self {
            CompositeOperation::SourceOver => BlendMode::SourceOver,
            CompositeOperation::SourceIn => BlendMode::SourceIn,
            CompositeOperation::SourceOut => BlendMode::SourceOut,
            CompositeOperation::SourceAtop => BlendMode::SourceAtop,
            CompositeOperation::DestinationOver => BlendMode::DestinationOver,
            CompositeOperation::DestinationIn => BlendMode::DestinationIn,
            CompositeOperation::DestinationOut => BlendMode::DestinationOut,
            CompositeOperation::DestinationAtop => BlendMode::DestinationAtop,
            CompositeOperation::Lighter => BlendMode::Plus,
            CompositeOperation::Copy => BlendMode::Source,
            CompositeOperation::Xor => BlendMode::Xor,
            CompositeOperation::Multiply => BlendMode::Multiply,
            CompositeOperation::Screen => BlendMode::Screen,
            CompositeOperation::Overlay => BlendMode::Overlay,
            CompositeOperation::Darken => BlendMode::Darken,
            CompositeOperation::Lighten => BlendMode::Lighten,
            CompositeOperation::ColorDodge => BlendMode::ColorDodge,
            CompositeOperation::ColorBurn => BlendMode::ColorBurn,
            CompositeOperation::HardLight => BlendMode::HardLight,
            CompositeOperation::SoftLight => BlendMode::SoftLight,
            CompositeOperation::Difference => BlendMode::Difference,
            CompositeOperation::Exclusion => BlendMode::Exclusion,
            CompositeOperation::Hue => BlendMode::Hue,
            CompositeOperation::Saturation => BlendMode::Saturation,
            CompositeOperation::Color => BlendMode::Color,
            CompositeOperation::Luminosity => BlendMode::Luminosity,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn parses_layer_definition() {
        let json = r##"{
            "ZoomRange": [10, 18],
            "Type": "night",
            "Data": {"Key": "roads"},
            "Style": {
                "StrokeColor": "#FF0000",
                "StrokeAlpha": 0.5,
                "LineWidth": 2,
                "LineCap": "round"
            },
            "Filters": [
                {
                    "Condition": "data.kind == 'motorway'",
                    "Style": {"StrokeColor": "#0000FF", "LineWidth": 4}
                }
            ],
            "CompositeOperation": "multiply",
            "Displacement": ["labels", "icons"]
        }"##;

        let layer: LayerDef = serde_json::from_str(json).expect("valid layer");
        assert_eq!(layer.zoom_range, [10.0, 18.0]);
        assert!(layer.enable);
        assert!(!layer.save);
        assert_eq!(layer.layer_type.as_deref(), Some("night"));
        assert_eq!(layer.data.and_then(|d| d.key).as_deref(), Some("roads"));
        assert_eq!(layer.filters.len(), 1);
        assert_eq!(layer.composite_operation, Some(CompositeOperation::Multiply));
        assert_eq!(layer.displacement, vec!["labels", "icons"]);

        let style = layer.style.expect("style is set");
        assert_eq!(style.line_cap, Some(LineCap::Round));
        assert_eq!(style.stroke(), Some(Color::rgba(255, 0, 0, 128)));
        assert_eq!(style.fill(), None);
    }

    #[test]
    fn layer_defaults() {
        let layer: LayerDef = serde_json::from_str("{}").expect("valid layer");
        assert_eq!(layer.displacement, vec!["default"]);
        assert_eq!(layer.zoom_range, [0.0, 32.0]);
        assert!(layer.grid.is_none());
    }

    #[test]
    fn parses_placements() {
        let style: StyleProps =
            serde_json::from_str(r#"{"TextPlacements": ["NE", "S", "W"], "TextWrap": 12}"#)
                .expect("valid style");
        assert_eq!(
            style.text_placements,
            Some(vec![TextPlacement::NE, TextPlacement::S, TextPlacement::W])
        );
        assert_eq!(style.text_wrap, Some(12));
        assert_eq!(TextPlacement::NW.direction(), (-1.0, -1.0));
    }

    #[test]
    fn scales_sizes() {
        let config = EngineConfig {
            display_dpi: 192.0,
            ..Default::default()
        };
        let mut style = StyleProps {
            line_width: Some(4.0),
            line_dash: Some(vec![2.0, 6.0]),
            zoom_scale: 1.0,
            ..Default::default()
        };
        style.scale(&config);

        assert_abs_diff_eq!(style.line_width.unwrap_or_default(), 2.0);
        assert_eq!(style.line_dash, Some(vec![1.0, 3.0]));
        assert_abs_diff_eq!(style.font_size(), 6.0);
    }
}
