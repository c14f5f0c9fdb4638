//! Drawing of tiles: the visible raster and the save surface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use karta_types::tile_math::tile_bounds_meters;
use karta_types::{Point2, Rect};
use karta_wkb::{
    Center, DecodedTile, Envelope, Geometry, GeometrySink, GeometryWalker, MapObject, ObjectInfo,
    WalkMode,
};
use tiny_skia::{Pixmap, Transform};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::KartaError;
use crate::placement::text_layout::{layout_along_line, wrap_text, PlacedGlyph, TextBlock};
use crate::placement::{place_label, Displacement, IconSpec, LabelCandidate};
use crate::style::{grid_points, GridDef, Style, StyleLayer, StyleProps};
use crate::tile::{DataLayerId, TileCoords};
use crate::tile_provider::loader::AssetKind;
use crate::Color;

mod assets;
mod canvas;
mod save_surface;
pub mod text;

pub use assets::{decode_image, AssetStore};
use canvas::{line_stroke, Canvas, PathCollector};
pub use canvas::PixelTransform;
pub use save_surface::SaveSurface;
use text::{measure_text, FontData};

/// Everything needed to draw one tile.
pub struct RenderJob {
    /// Display tile.
    pub coords: TileCoords,
    /// Projected bounds of the tile in meters.
    pub bounds: Rect,
    /// Display zoom.
    pub zoom: f64,
    tiles: HashMap<DataLayerId, Vec<Arc<DecodedTile>>, ahash::RandomState>,
}

impl RenderJob {
    /// Creates a job without any data.
    ///
    /// Tiles outside of the world are drawn with the bounds of the tile they wrap onto, since
    /// that is the tile their data is fetched for.
    pub fn new(coords: TileCoords, config: &EngineConfig) -> Self {
        let (x, y) = coords.wrapped();
        let bounds = tile_bounds_meters(x as f64, y as f64, coords.z as f64, config.zoom_base);

        Self {
            coords,
            bounds,
            zoom: coords.z as f64,
            tiles: HashMap::default(),
        }
    }

    /// Adds the decoded tiles of a data layer.
    pub fn add_tiles(&mut self, layer: DataLayerId, tiles: Vec<Arc<DecodedTile>>) {
        self.tiles.entry(layer).or_default().extend(tiles);
    }

    /// Decoded tiles of a data layer.
    pub fn tiles(&self, layer: &DataLayerId) -> &[Arc<DecodedTile>] {
        self.tiles.get(layer).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Result of a tile render.
#[derive(Debug)]
pub struct RenderedTile {
    image: Pixmap,
    save: SaveSurface,
    labels: Vec<Rect>,
    lookup_radius: u32,
}

impl RenderedTile {
    /// Visible raster.
    pub fn image(&self) -> &Pixmap {
        &self.image
    }

    /// Surface with the objects of the save layers.
    pub fn save_surface(&self) -> &SaveSurface {
        &self.save
    }

    /// Boxes of the icons, labels and along-line glyphs placed on the tile, in tile pixels and
    /// placement order.
    pub fn label_boxes(&self) -> &[Rect] {
        &self.labels
    }

    /// Object of a save layer drawn at the tile pixel `(x, y)`.
    pub fn lookup(&self, x: f64, y: f64) -> Option<Arc<ObjectInfo>> {
        self.save.lookup(x, y, self.lookup_radius)
    }

    /// Visible raster as a PNG file.
    pub fn encode_png(&self) -> Result<Vec<u8>, KartaError> {
        self.image
            .encode_png()
            .map_err(|e| KartaError::Generic(format!("failed to encode png: {e}")))
    }
}

/// Draws render jobs according to a style.
pub struct Compositor {
    config: Arc<EngineConfig>,
    assets: Arc<AssetStore>,
}

impl Compositor {
    /// Creates a new compositor.
    pub fn new(config: Arc<EngineConfig>, assets: Arc<AssetStore>) -> Self {
        Self { config, assets }
    }

    /// Draws the eligible style layers in order.
    ///
    /// Fails with [`KartaError::Cancelled`] if the token is cancelled between layers, and with
    /// [`KartaError::Decoding`] if any drawn geometry is malformed.
    pub async fn render(
        &self,
        style: &Style,
        job: &RenderJob,
        token: &CancellationToken,
    ) -> Result<RenderedTile, KartaError> {
        let mut renderer = TileRenderer::new(&self.config, &self.assets, job)?;
        renderer.draw_background(style).await;

        for layer in style.eligible_layers(job.zoom, &self.config) {
            if token.is_cancelled() {
                return Err(KartaError::Cancelled);
            }

            log::trace!("Drawing layer {} of tile {:?}", layer.name(), job.coords);
            renderer.begin_layer(layer);

            if let Some(grid) = &layer.definition().grid {
                renderer.draw_grid(layer, grid).await?;
            } else if let Some(data_layer) = layer.data_layer() {
                let objects = renderer.visible_objects(layer, job.tiles(data_layer));
                for object in objects {
                    renderer.draw_object(layer, object).await?;
                }
            }
        }

        Ok(renderer.finish())
    }
}

struct TileRenderer<'a> {
    config: &'a EngineConfig,
    assets: &'a AssetStore,
    job: &'a RenderJob,
    transform: PixelTransform,
    canvas: Canvas,
    save: SaveSurface,
    displacement: Displacement,
    labels: Vec<Rect>,
    padded_bounds: Rect,
}

impl<'a> TileRenderer<'a> {
    fn new(
        config: &'a EngineConfig,
        assets: &'a AssetStore,
        job: &'a RenderJob,
    ) -> Result<Self, KartaError> {
        let size = config.tile_size;
        let padding = config.save_padding as f64;
        let transform = PixelTransform::new(job.bounds, size as f64, 0.0);
        let far_edge = size as f64 + padding;
        let allowed_area = Rect::new(-padding, -padding, far_edge, far_edge);

        Ok(Self {
            config,
            assets,
            job,
            transform,
            canvas: Canvas::new(size, size, config.anti_alias)?,
            save: SaveSurface::new(size, config.save_padding)?,
            displacement: Displacement::new(config.displacement_shift, Some(allowed_area)),
            labels: vec![],
            padded_bounds: job.bounds.expand(padding * transform.resolution()),
        })
    }

    fn finish(self) -> RenderedTile {
        RenderedTile {
            image: self.canvas.into_pixmap(),
            save: self.save,
            labels: self.labels,
            lookup_radius: self.config.lookup_radius,
        }
    }

    async fn draw_background(&mut self, style: &Style) {
        if let Some(color) = style.background() {
            self.canvas.clear(color);
        }

        if let Some(name) = style.background_pattern(self.job.zoom) {
            if let Some(pattern) = self.assets.image(AssetKind::Pattern, &name).await {
                self.canvas.fill_pattern_everywhere(&pattern);
            }
        }
    }

    fn begin_layer(&mut self, layer: &StyleLayer) {
        let blend_mode = layer
            .definition()
            .composite_operation
            .unwrap_or_default()
            .blend_mode();
        self.canvas.reset_layer(blend_mode);
        self.save.reset_layer();
    }

    /// Objects of the tiles that touch the padded tile area, in drawing order.
    fn visible_objects<'t>(
        &self,
        layer: &StyleLayer,
        tiles: &'t [Arc<DecodedTile>],
    ) -> Vec<&'t MapObject> {
        let mut seen = HashSet::new();
        let mut objects: Vec<&MapObject> = tiles
            .iter()
            .flat_map(|tile| tile.objects.iter())
            .filter(|object| overlaps(&object_bounds(&object.info), &self.padded_bounds))
            // The same object may come from a parent and a child tile.
            .filter(|object| object.info.hash.map_or(true, |hash| seen.insert(hash)))
            .collect();

        let sort_function = layer
            .definition()
            .style
            .as_ref()
            .and_then(|style| style.sort_function.as_deref());
        if let Some(formula) = sort_function {
            let mut keyed: Vec<(f64, &MapObject)> = objects
                .into_iter()
                .map(|object| {
                    let key = layer.attribute(formula, &object.info, self.job.zoom).as_number();
                    (key, object)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
            objects = keyed.into_iter().map(|(_, object)| object).collect();
        }

        objects
    }

    async fn draw_object(
        &mut self,
        layer: &StyleLayer,
        object: &MapObject,
    ) -> Result<(), KartaError> {
        let zoom = self.job.zoom;
        let Some(props) = layer.resolve(&object.info, zoom) else {
            return Ok(());
        };

        if layer.definition().save {
            return self.draw_saved(props, object);
        }

        if !props.has_label() {
            let collector = self.collect(object, self.transform)?;
            return self.draw_shapes(layer, props, &object.info, collector).await;
        }

        if let Some(geometry) = &object.geometry {
            GeometryWalker::walk_exact(geometry, &mut WalkMode::Skip)?;
        }

        let line = match (&object.geometry, props.text_along_line) {
            (Some(geometry), true) => self.longest_line(&Geometry::decode(geometry)?),
            _ => None,
        };

        let anchor = self.transform.to_pixels(object.info.center.x, object.info.center.y);
        self.draw_label(layer, props, &object.info, anchor, line).await;

        Ok(())
    }

    /// Walks the geometry of the object into raster paths.
    fn collect(
        &self,
        object: &MapObject,
        transform: PixelTransform,
    ) -> Result<PathCollector, KartaError> {
        let mut collector = PathCollector::new(transform);
        match &object.geometry {
            Some(geometry) => {
                GeometryWalker::walk_exact(geometry, &mut WalkMode::Draw(&mut collector))?;
            }
            None => collector.point(object.info.center.x, object.info.center.y),
        }

        Ok(collector)
    }

    async fn draw_shapes(
        &mut self,
        layer: &StyleLayer,
        props: &StyleProps,
        info: &ObjectInfo,
        collector: PathCollector,
    ) -> Result<(), KartaError> {
        let pattern = match &props.pattern_function {
            Some(formula) => match layer.attribute(formula, info, self.job.zoom).as_text() {
                Some(name) => self.assets.image(AssetKind::Pattern, &name).await,
                None => None,
            },
            None => None,
        };

        let fill = props.fill();
        let stroke = props.stroke();
        let line_stroke = line_stroke(props);

        for polygon in &collector.polygons {
            match (&pattern, fill) {
                (Some(pattern), _) => self.canvas.fill_pattern(polygon, pattern),
                (None, Some(color)) => self.canvas.fill_path(polygon, color),
                (None, None) => {}
            }
            if let Some(color) = stroke {
                self.canvas.stroke_path(polygon, color, &line_stroke);
            }
        }

        if let Some(color) = stroke {
            for line in &collector.lines {
                self.canvas.stroke_path(line, color, &line_stroke);
            }
        }

        if let Some(radius) = props.point_radius {
            let outline = stroke.map(|color| (color, line_stroke.width as f64));
            for point in &collector.points {
                self.canvas.fill_circle(*point, radius, fill, outline);
            }
        }

        Ok(())
    }

    /// Draws the object on the save surface in its own color.
    fn draw_saved(&mut self, props: &StyleProps, object: &MapObject) -> Result<(), KartaError> {
        let transform = self.transform.with_padding(self.config.save_padding as f64);
        let collector = self.collect(object, transform)?;
        let color = self.save.color_for(&object.info);

        let mut stroke = line_stroke(props);
        stroke.dash = None;
        let radius = props.point_radius.unwrap_or(1.0);

        let canvas = self.save.canvas();
        for polygon in &collector.polygons {
            canvas.fill_path(polygon, color);
        }
        for line in &collector.lines {
            canvas.stroke_path(line, color, &stroke);
        }
        for point in &collector.points {
            canvas.fill_circle(*point, radius, Some(color), None);
        }

        Ok(())
    }

    /// Longest line of the geometry in tile pixels.
    fn longest_line(&self, geometry: &Geometry) -> Option<Vec<Point2>> {
        geometry
            .lines()
            .into_iter()
            .map(|line| {
                line.iter()
                    .map(|p| self.transform.to_pixels(p.x, p.y))
                    .collect::<Vec<_>>()
            })
            .map(|line| (line_length(&line), line))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, line)| line)
    }

    async fn draw_grid(&mut self, layer: &StyleLayer, grid: &GridDef) -> Result<(), KartaError> {
        let tile_size = self.config.tile_size as f64;
        let points = grid_points(
            grid,
            self.job.coords.x,
            self.job.coords.y,
            tile_size,
            self.config.save_padding as f64,
        );
        log::trace!("Grid layer {} has {} points", layer.name(), points.len());

        // Labels of the grid only collide with each other and with labels placed before.
        let displacement = self.displacement.clone();

        for point in points {
            let position = self.transform.to_meters(point.x, point.y);
            let center = Center {
                x: position.x,
                y: position.y,
            };
            let info = match self.save.lookup(point.x, point.y, self.config.lookup_radius) {
                Some(found) => ObjectInfo {
                    center,
                    ..(*found).clone()
                },
                None => ObjectInfo {
                    center,
                    ..Default::default()
                },
            };

            let Some(props) = layer.resolve(&info, self.job.zoom) else {
                continue;
            };

            if props.has_label() {
                self.draw_label(layer, props, &info, point, None).await;
            } else if let Some(radius) = props.point_radius {
                let outline = props
                    .stroke()
                    .map(|color| (color, props.line_width.unwrap_or(1.0)));
                self.canvas.fill_circle(point, radius, props.fill(), outline);
            }
        }

        self.displacement = displacement;
        Ok(())
    }

    /// Places and draws the icon and the label of an object.
    async fn draw_label(
        &mut self,
        layer: &StyleLayer,
        props: &StyleProps,
        info: &ObjectInfo,
        anchor: Point2,
        line: Option<Vec<Point2>>,
    ) {
        let zoom = self.job.zoom;
        let text = props
            .text_function
            .as_deref()
            .and_then(|formula| layer.attribute(formula, info, zoom).as_text());

        let icon = match props.icon_function.as_deref() {
            Some(formula) => match layer.attribute(formula, info, zoom).as_text() {
                Some(name) => self.assets.image(AssetKind::Icon, &name).await,
                None => None,
            },
            None => None,
        };

        let font = match (&text, &props.font_family) {
            (Some(_), Some(family)) => self.assets.font(family).await,
            _ => None,
        };

        let displacement_layers = &layer.definition().displacement;
        let font_size = props.font_size();

        if let (Some(text), Some(line)) = (&text, &line) {
            let glyphs = layout_along_line(text, line, font_size, &|s: &str| {
                measure_text(font.as_deref(), s, font_size)
            });
            if let Some(glyphs) = glyphs {
                let boxes: Vec<Rect> = glyphs.iter().map(|g| g.bounds).collect();
                if self.displacement.check_and_set(displacement_layers, &boxes) {
                    self.labels.extend(boxes);
                    self.draw_glyphs(props, font.as_deref(), &glyphs);
                }
            }
            return;
        }

        let block = text.map(|text| {
            let lines = match props.text_wrap {
                Some(max_chars) => wrap_text(&text, max_chars),
                None => vec![text],
            };
            TextBlock::new(lines, font_size, &|s: &str| {
                measure_text(font.as_deref(), s, font_size)
            })
        });

        let scale = props.icon_scale.unwrap_or(1.0);
        let icon_spec = icon.as_ref().map(|image| IconSpec {
            width: image.width() as f64 * scale,
            height: image.height() as f64 * scale,
            anchor: props.icon_anchor.unwrap_or([0.5, 0.5]),
            offset: props.icon_offset.unwrap_or([0.0, 0.0]),
        });

        if icon_spec.is_none() && block.is_none() {
            return;
        }

        let candidate = LabelCandidate {
            anchor,
            icon: icon_spec,
            text: block.as_ref(),
            placements: props.text_placements.as_deref().unwrap_or_default(),
            text_offset: props.text_offset.unwrap_or([0.0, 0.0]),
        };
        let Some(placed) = place_label(&mut self.displacement, displacement_layers, &candidate)
        else {
            return;
        };
        self.labels.extend(placed.icon.into_iter().chain(placed.text));

        if let (Some(image), Some(bounds)) = (&icon, placed.icon) {
            let top_left = Point2::new(bounds.x_min(), bounds.y_min());
            self.canvas.draw_image(image, top_left, scale);
        }

        if let (Some(block), Some(bounds), Some(font)) = (&block, placed.text, &font) {
            let center = bounds.center();
            for line in &block.lines {
                let Some(shaped) = font.outline(&line.text, font_size) else {
                    continue;
                };
                let baseline = center.y + line.offset_y + (shaped.ascent - shaped.descent) / 2.0;
                let transform = Transform::from_translate(
                    (center.x - shaped.width / 2.0) as f32,
                    baseline as f32,
                );
                self.canvas
                    .draw_glyphs(&shaped.path, transform, props.text_paint(), halo(props));
            }
        }
    }

    fn draw_glyphs(&mut self, props: &StyleProps, font: Option<&FontData>, glyphs: &[PlacedGlyph]) {
        let Some(font) = font else {
            return;
        };

        let font_size = props.font_size();
        for glyph in glyphs {
            let Some(shaped) = font.outline(&glyph.text, font_size) else {
                continue;
            };

            let transform = Transform::from_translate(glyph.center.x as f32, glyph.center.y as f32)
                .pre_concat(Transform::from_rotate(glyph.angle.to_degrees() as f32))
                .pre_translate(
                    (-shaped.width / 2.0) as f32,
                    ((shaped.ascent - shaped.descent) / 2.0) as f32,
                );
            self.canvas
                .draw_glyphs(&shaped.path, transform, props.text_paint(), halo(props));
        }
    }
}

fn halo(props: &StyleProps) -> Option<(Color, f64)> {
    let color = props.text_stroke_color?;
    let width = props.text_stroke_width.unwrap_or(1.0);
    (width > 0.0 && !color.is_transparent()).then_some((color, width))
}

fn object_bounds(info: &ObjectInfo) -> Rect {
    if info.envelope == Envelope::default() {
        Rect::new(info.center.x, info.center.y, info.center.x, info.center.y)
    } else {
        info.envelope.rect()
    }
}

/// Overlap test that counts touching and degenerate rectangles.
fn overlaps(a: &Rect, b: &Rect) -> bool {
    a.x_min() <= b.x_max()
        && a.x_max() >= b.x_min()
        && a.y_min() <= b.y_max()
        && a.y_max() >= b.y_min()
}

fn line_length(line: &[Point2]) -> f64 {
    line.windows(2).map(|s| (s[1] - s[0]).norm()).sum()
}
