use std::collections::HashMap;
use std::sync::Arc;

use karta_wkb::ObjectInfo;
use tiny_skia::BlendMode;

use super::canvas::Canvas;
use crate::error::KartaError;
use crate::style::object_seed;
use crate::Color;

const COLOR_MASK: u32 = 0x00FF_FFFF;

/// Raster where every object of the save layers is drawn in its own flat color, with the map
/// from colors back to objects.
///
/// The surface covers the tile and a padding around it and is drawn without anti-aliasing, so a
/// pixel is either empty or holds exactly one object color.
#[derive(Debug)]
pub struct SaveSurface {
    canvas: Canvas,
    padding: u32,
    objects: HashMap<u32, Arc<ObjectInfo>, ahash::RandomState>,
}

impl SaveSurface {
    /// Creates an empty surface for a tile of `tile_size` pixels.
    pub fn new(tile_size: u32, padding: u32) -> Result<Self, KartaError> {
        let size = tile_size + 2 * padding;
        Ok(Self {
            canvas: Canvas::new(size, size, false)?,
            padding,
            objects: HashMap::default(),
        })
    }

    /// Padding around the tile in pixels.
    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Number of objects drawn on the surface.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing was drawn.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn canvas(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub(crate) fn reset_layer(&mut self) {
        self.canvas.reset_layer(BlendMode::Source);
    }

    /// Unique color of the object.
    ///
    /// The color is derived from the object hash. If another object already took it, the next
    /// free color is used. Black (`0`) is never assigned since it cannot be told apart from an
    /// empty pixel.
    pub fn color_for(&mut self, info: &Arc<ObjectInfo>) -> Color {
        let mut id = object_seed(info) & COLOR_MASK;
        loop {
            if id == 0 {
                id = 1;
            }

            match self.objects.get(&id) {
                None => {
                    self.objects.insert(id, info.clone());
                    break;
                }
                Some(existing) if Arc::ptr_eq(existing, info) || existing == info => break,
                Some(_) => id = (id + 1) & COLOR_MASK,
            }
        }

        Color::from_rgb24(id)
    }

    /// Object drawn at the tile pixel `(x, y)`, or at the nearest pixel within `radius`.
    pub fn lookup(&self, x: f64, y: f64, radius: u32) -> Option<Arc<ObjectInfo>> {
        let pixmap = self.canvas.pixmap();
        let px = (x + self.padding as f64).floor() as i64;
        let py = (y + self.padding as f64).floor() as i64;
        let radius = radius as i64;

        let mut offsets: Vec<(i64, i64)> = (-radius..=radius)
            .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= radius * radius)
            .collect();
        offsets.sort_by_key(|(dx, dy)| dx * dx + dy * dy);

        offsets.into_iter().find_map(|(dx, dy)| {
            let (x, y) = (px + dx, py + dy);
            if x < 0 || y < 0 {
                return None;
            }

            let pixel = pixmap.pixel(x as u32, y as u32)?;
            if pixel.alpha() != 255 {
                return None;
            }

            let id = ((pixel.red() as u32) << 16)
                | ((pixel.green() as u32) << 8)
                | pixel.blue() as u32;
            self.objects.get(&id).cloned()
        })
    }
}
