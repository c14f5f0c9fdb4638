//! Engine configuration.

use karta_types::ZoomBase;
use serde::{Deserialize, Serialize};

use crate::error::KartaError;

/// Configuration of a [`RenderEngine`](crate::RenderEngine).
///
/// All fields have defaults, so a configuration can be loaded from a partial JSON document:
///
/// ```
/// use karta::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{
///     "tile_url": "https://tiles.example.com/{key}/{value}/{z}/{x}/{y}",
///     "zoom_offset": 1
/// }"#).unwrap();
///
/// assert_eq!(config.zoom_offset, 1);
/// assert_eq!(config.cache_capacity, 600);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Template of the tile data url.
    pub tile_url: String,
    /// Template of the style document url.
    pub style_url: String,
    /// Template of icon, pattern and font urls. `{key}` is the asset kind, `{value}` its name.
    pub assets_url: String,
    /// Template of the dataset metadata url.
    pub metadata_url: String,
    /// Identifier of the style to load.
    pub style_id: String,
    /// If set, only style layers of this type (or without a type) are rendered.
    pub style_type: Option<String>,
    /// Size of a rendered tile in pixels.
    pub tile_size: u32,
    /// Zoom base of the display tile pyramid.
    pub zoom_base: ZoomBase,
    /// Added to the display zoom to get the detail zoom of the requested data.
    pub zoom_offset: i32,
    /// Maximum number of decoded tiles kept in memory across all data layers.
    pub cache_capacity: usize,
    /// Number of decode workers. Defaults to `max(cores - 1, 4)`.
    pub worker_count: Option<usize>,
    /// Bucket size of displacement regions as a power of two, in pixels.
    pub displacement_shift: u32,
    /// Extra pixels rendered around a tile on the save surface and allowed for labels.
    pub save_padding: u32,
    /// Search radius for the nearest valid pixel of the save surface.
    pub lookup_radius: u32,
    /// Anti-aliasing of the visible raster.
    pub anti_alias: bool,
    /// Resolution of the display.
    pub display_dpi: f64,
    /// Resolution the style was designed for.
    pub tile_dpi: f64,
    /// User-controlled scale of the map.
    pub user_scale: f64,
    /// Device pixel ratio.
    pub pixel_ratio: f64,
    /// Number of icons, patterns and fonts kept in memory.
    pub asset_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_url: String::new(),
            style_url: String::new(),
            assets_url: String::new(),
            metadata_url: String::new(),
            style_id: "default".into(),
            style_type: None,
            tile_size: 256,
            zoom_base: ZoomBase::WEB,
            zoom_offset: 0,
            cache_capacity: 600,
            worker_count: None,
            displacement_shift: 6,
            save_padding: 64,
            lookup_radius: 3,
            anti_alias: true,
            display_dpi: 96.0,
            tile_dpi: 96.0,
            user_scale: 1.0,
            pixel_ratio: 1.0,
            asset_cache_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Parses configuration from a JSON document. Missing fields take default values.
    pub fn from_json(json: &str) -> Result<Self, KartaError> {
        serde_json::from_str(json).map_err(|e| KartaError::Generic(format!("invalid config: {e}")))
    }

    /// Number of decode workers to start.
    pub fn workers(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(4))
            .max(1)
    }

    /// Scales a numeric style value according to its `ZoomScale` exponent:
    /// `base / user_scale / (display_dpi * pixel_ratio / user_scale / tile_dpi) ^ zoom_scale`.
    pub fn style_scale(&self, base: f64, zoom_scale: f64) -> f64 {
        let density = self.display_dpi * self.pixel_ratio / self.user_scale / self.tile_dpi;
        base / self.user_scale / density.powf(zoom_scale)
    }
}
