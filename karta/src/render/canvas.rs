use karta_types::{Point2, Rect};
use karta_wkb::GeometrySink;
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, Paint, Path, PathBuilder, Pattern, Pixmap, PixmapPaint,
    SpreadMode, Stroke, StrokeDash, Transform,
};

use crate::error::KartaError;
use crate::style::StyleProps;
use crate::Color;

/// Maps projected meters to pixels of a raster covering a tile and a padding around it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PixelTransform {
    left: f64,
    top: f64,
    resolution: f64,
    padding: f64,
}

impl PixelTransform {
    /// Transform for a tile with the given bounds (meters) rendered at `size` pixels.
    pub fn new(bounds: Rect, size: f64, padding: f64) -> Self {
        Self {
            left: bounds.x_min(),
            top: bounds.y_max(),
            resolution: bounds.width() / size,
            padding,
        }
    }

    /// Meters per pixel.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Same transform with another padding.
    pub fn with_padding(&self, padding: f64) -> Self {
        Self { padding, ..*self }
    }

    /// Pixel position of a projected point.
    pub fn to_pixels(&self, x: f64, y: f64) -> Point2 {
        Point2::new(
            (x - self.left) / self.resolution + self.padding,
            (self.top - y) / self.resolution + self.padding,
        )
    }

    /// Projected position of a pixel.
    pub fn to_meters(&self, px: f64, py: f64) -> Point2 {
        Point2::new(
            (px - self.padding) * self.resolution + self.left,
            self.top - (py - self.padding) * self.resolution,
        )
    }
}

/// Collects the primitives of a walked geometry as raster paths.
pub(crate) struct PathCollector {
    transform: PixelTransform,
    builder: PathBuilder,
    pub polygons: Vec<Path>,
    pub lines: Vec<Path>,
    pub points: Vec<Point2>,
}

impl PathCollector {
    pub fn new(transform: PixelTransform) -> Self {
        Self {
            transform,
            builder: PathBuilder::new(),
            polygons: vec![],
            lines: vec![],
            points: vec![],
        }
    }

    fn take_path(&mut self) -> Option<Path> {
        std::mem::take(&mut self.builder).finish()
    }
}

impl GeometrySink for PathCollector {
    fn point(&mut self, x: f64, y: f64) {
        self.points.push(self.transform.to_pixels(x, y));
    }

    fn move_to(&mut self, x: f64, y: f64) {
        let p = self.transform.to_pixels(x, y);
        self.builder.move_to(p.x as f32, p.y as f32);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        let p = self.transform.to_pixels(x, y);
        self.builder.line_to(p.x as f32, p.y as f32);
    }

    fn close_ring(&mut self) {
        self.builder.close();
    }

    fn finish_line(&mut self) {
        if let Some(path) = self.take_path() {
            self.lines.push(path);
        }
    }

    fn finish_polygon(&mut self) {
        if let Some(path) = self.take_path() {
            self.polygons.push(path);
        }
    }
}

/// Raster surface with the drawing state of the current style layer.
#[derive(Debug)]
pub(crate) struct Canvas {
    pixmap: Pixmap,
    anti_alias: bool,
    blend_mode: BlendMode,
}

impl Canvas {
    pub fn new(width: u32, height: u32, anti_alias: bool) -> Result<Self, KartaError> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| KartaError::Generic(format!("invalid raster size {width}x{height}")))?;

        Ok(Self {
            pixmap,
            anti_alias,
            blend_mode: BlendMode::SourceOver,
        })
    }

    /// Restores the default state before a new style layer is drawn.
    pub fn reset_layer(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    pub fn clear(&mut self, color: Color) {
        self.pixmap.fill(color.to_skia());
    }

    fn paint(&self, color: Color) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(color.to_skia());
        paint.anti_alias = self.anti_alias;
        paint.blend_mode = self.blend_mode;
        paint
    }

    pub fn fill_path(&mut self, path: &Path, color: Color) {
        let paint = self.paint(color);
        self.pixmap.fill_path(path, &paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    pub fn fill_pattern(&mut self, path: &Path, pattern: &Pixmap) {
        let paint = Paint {
            shader: Pattern::new(
                pattern.as_ref(),
                SpreadMode::Repeat,
                FilterQuality::Nearest,
                1.0,
                Transform::identity(),
            ),
            anti_alias: self.anti_alias,
            blend_mode: self.blend_mode,
            ..Default::default()
        };
        self.pixmap.fill_path(path, &paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    /// Covers the whole surface with the pattern.
    pub fn fill_pattern_everywhere(&mut self, pattern: &Pixmap) {
        let rect = tiny_skia::Rect::from_xywh(
            0.0,
            0.0,
            self.pixmap.width() as f32,
            self.pixmap.height() as f32,
        );
        if let Some(rect) = rect {
            self.fill_pattern(&PathBuilder::from_rect(rect), pattern);
        }
    }

    pub fn stroke_path(&mut self, path: &Path, color: Color, stroke: &Stroke) {
        let paint = self.paint(color);
        self.pixmap.stroke_path(path, &paint, stroke, Transform::identity(), None);
    }

    pub fn fill_circle(
        &mut self,
        center: Point2,
        radius: f64,
        fill: Option<Color>,
        stroke: Option<(Color, f64)>,
    ) {
        let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius as f32)
        else {
            return;
        };

        if let Some(color) = fill {
            self.fill_path(&path, color);
        }
        if let Some((color, width)) = stroke {
            let stroke = Stroke {
                width: width as f32,
                ..Default::default()
            };
            self.stroke_path(&path, color, &stroke);
        }
    }

    /// Draws an image with its top left corner at `position`, scaled by `scale`.
    pub fn draw_image(&mut self, image: &Pixmap, position: Point2, scale: f64) {
        let paint = PixmapPaint {
            blend_mode: self.blend_mode,
            quality: FilterQuality::Bilinear,
            ..Default::default()
        };
        let transform = Transform::from_translate(position.x as f32, position.y as f32)
            .pre_scale(scale as f32, scale as f32);
        self.pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
    }

    /// Fills (and optionally outlines) a path given in its own coordinate space.
    pub fn draw_glyphs(
        &mut self,
        path: &Path,
        transform: Transform,
        color: Color,
        halo: Option<(Color, f64)>,
    ) {
        if let Some((halo_color, width)) = halo {
            let stroke = Stroke {
                width: width as f32,
                line_join: tiny_skia::LineJoin::Round,
                ..Default::default()
            };
            let paint = self.paint(halo_color);
            self.pixmap.stroke_path(path, &paint, &stroke, transform, None);
        }

        let paint = self.paint(color);
        self.pixmap.fill_path(path, &paint, FillRule::Winding, transform, None);
    }
}

/// Stroke of lines and polygon outlines.
pub(crate) fn line_stroke(style: &StyleProps) -> Stroke {
    let dash = style
        .line_dash
        .as_ref()
        .filter(|dash| dash.len() >= 2)
        .and_then(|dash| StrokeDash::new(dash.iter().map(|v| *v as f32).collect(), 0.0));

    Stroke {
        width: style.line_width.unwrap_or(1.0) as f32,
        line_cap: style.line_cap.map(|c| c.to_skia()).unwrap_or_default(),
        line_join: style.line_join.map(|j| j.to_skia()).unwrap_or_default(),
        dash,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use karta_types::tile_math::{tile_bounds_meters, HALF_WORLD_METERS};
    use karta_types::ZoomBase;

    use super::*;

    #[test]
    fn pixel_transform() {
        let bounds = tile_bounds_meters(0.0, 0.0, 0.0, ZoomBase::WEB);
        let transform = PixelTransform::new(bounds, 256.0, 0.0);

        let p = transform.to_pixels(-HALF_WORLD_METERS, HALF_WORLD_METERS);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-9);

        let p = transform.to_pixels(0.0, 0.0);
        assert_abs_diff_eq!(p.x, 128.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 128.0, epsilon = 1e-9);

        let padded = transform.with_padding(64.0);
        let p = padded.to_pixels(0.0, 0.0);
        assert_abs_diff_eq!(p.x, 192.0, epsilon = 1e-9);

        let m = padded.to_meters(192.0, 192.0);
        assert_abs_diff_eq!(m.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(m.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn collects_paths() {
        let transform = PixelTransform::new(Rect::new(0.0, 0.0, 256.0, 256.0), 256.0, 0.0);
        let mut collector = PathCollector::new(transform);

        collector.move_to(10.0, 10.0);
        collector.line_to(20.0, 10.0);
        collector.line_to(20.0, 20.0);
        collector.close_ring();
        collector.finish_polygon();

        collector.move_to(0.0, 0.0);
        collector.line_to(5.0, 5.0);
        collector.finish_line();

        collector.point(1.0, 255.0);

        assert_eq!(collector.polygons.len(), 1);
        assert_eq!(collector.lines.len(), 1);
        assert_eq!(collector.points, vec![Point2::new(1.0, 1.0)]);

        let bounds = collector.polygons[0].bounds();
        assert_eq!(bounds.left(), 10.0);
        assert_eq!(bounds.top(), 236.0);
    }

    #[test]
    fn fills_without_anti_aliasing() {
        let mut canvas = Canvas::new(16, 16, false).expect("valid size");
        let rect = tiny_skia::Rect::from_ltrb(4.0, 4.0, 8.0, 8.0).expect("valid rect");
        canvas.fill_path(&PathBuilder::from_rect(rect), Color::rgba(255, 0, 0, 255));

        let filled = canvas
            .pixmap()
            .pixels()
            .iter()
            .filter(|p| p.alpha() == 255)
            .count();
        assert_eq!(filled, 16);
    }

    #[test]
    fn dash_needs_two_values() {
        let style = StyleProps {
            line_dash: Some(vec![4.0]),
            line_width: Some(3.0),
            ..Default::default()
        };
        let stroke = line_stroke(&style);
        assert!(stroke.dash.is_none());
        assert_eq!(stroke.width, 3.0);
    }
}
