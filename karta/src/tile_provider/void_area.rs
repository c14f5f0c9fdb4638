use std::collections::HashMap;

use crate::tile::{DataLayerId, TileKey};

/// Zoom level of the index space void rectangles are stored in.
const VOID_ZOOM: u32 = 16;

/// Half-open rectangle of level-16 tile indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct VoidRect {
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
}

impl VoidRect {
    fn from_key(key: &TileKey) -> Self {
        if key.z <= VOID_ZOOM {
            let shift = VOID_ZOOM - key.z;
            let size = 1 << shift;
            Self {
                x_min: key.x << shift,
                y_min: key.y << shift,
                x_max: (key.x << shift) + size,
                y_max: (key.y << shift) + size,
            }
        } else {
            let shift = (key.z - VOID_ZOOM).min(31);
            let x = key.x >> shift;
            let y = key.y >> shift;
            Self {
                x_min: x,
                y_min: y,
                x_max: x + 1,
                y_max: y + 1,
            }
        }
    }

    fn contains(&self, other: &VoidRect) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && self.x_max >= other.x_max
            && self.y_max >= other.y_max
    }
}

/// Areas the server confirmed to have no data, per data layer.
#[derive(Debug, Default)]
pub struct VoidAreas {
    layers: HashMap<DataLayerId, Vec<VoidRect>, ahash::RandomState>,
}

impl VoidAreas {
    /// Records an empty response for the tile.
    ///
    /// Tiles deeper than level 16 are smaller than one cell of the void index and are not recorded.
    pub fn record(&mut self, layer: &DataLayerId, key: &TileKey) {
        if key.z > VOID_ZOOM {
            log::trace!("Empty tile {key} of layer {layer} is too small to be recorded as void");
            return;
        }

        let rect = VoidRect::from_key(key);
        let rects = self.layers.entry(layer.clone()).or_default();
        if rects.iter().any(|existing| existing.contains(&rect)) {
            return;
        }

        rects.retain(|existing| !rect.contains(existing));
        rects.push(rect);
        log::debug!("Recorded void area {key} for layer {layer}");
    }

    /// True if the whole tile lies inside of a recorded void area.
    pub fn contains(&self, layer: &DataLayerId, key: &TileKey) -> bool {
        let rect = VoidRect::from_key(key);
        self.layers
            .get(layer)
            .is_some_and(|rects| rects.iter().any(|void| void.contains(&rect)))
    }
}
