use std::collections::HashMap;
use std::sync::Arc;

use quick_cache::sync::Cache;
use tiny_skia::{ColorU8, Pixmap};

use super::text::FontData;
use crate::error::KartaError;
use crate::tile_provider::loader::{AssetKind, TileLoader};

/// Icons, patterns and fonts referenced by the style.
///
/// Every asset is loaded once. Assets that fail to load are remembered as missing and drawing
/// continues without them.
pub struct AssetStore {
    loader: Arc<dyn TileLoader>,
    images: Cache<(AssetKind, String), Option<Arc<Pixmap>>>,
    fonts: Cache<String, Option<Arc<FontData>>>,
    preloaded_fonts: HashMap<String, Arc<FontData>>,
}

impl AssetStore {
    /// Creates an empty store keeping up to `capacity` images and fonts each.
    pub fn new(loader: Arc<dyn TileLoader>, capacity: usize) -> Self {
        Self {
            loader,
            images: Cache::new(capacity.max(1)),
            fonts: Cache::new(capacity.max(1)),
            preloaded_fonts: HashMap::new(),
        }
    }

    /// Registers a font that is never evicted or loaded from the loader.
    pub fn add_font(&mut self, family: impl Into<String>, font: FontData) {
        self.preloaded_fonts.insert(family.into(), Arc::new(font));
    }

    /// Icon or pattern by name.
    pub async fn image(&self, kind: AssetKind, name: &str) -> Option<Arc<Pixmap>> {
        let key = (kind, name.to_string());
        match self.images.get_value_or_guard_async(&key).await {
            Ok(image) => image,
            Err(guard) => {
                let image = match self.load_image(kind, name).await {
                    Ok(image) => Some(Arc::new(image)),
                    Err(e) => {
                        log::warn!("Failed to load {kind} {name}: {e}");
                        None
                    }
                };

                let _ = guard.insert(image.clone());
                image
            }
        }
    }

    /// Font by family name.
    pub async fn font(&self, family: &str) -> Option<Arc<FontData>> {
        if let Some(font) = self.preloaded_fonts.get(family) {
            return Some(font.clone());
        }

        match self.fonts.get_value_or_guard_async(family).await {
            Ok(font) => font,
            Err(guard) => {
                let font = match self.load_font(family).await {
                    Ok(font) => Some(Arc::new(font)),
                    Err(e) => {
                        log::warn!("Failed to load font {family}: {e}");
                        None
                    }
                };

                let _ = guard.insert(font.clone());
                font
            }
        }
    }

    async fn load_image(&self, kind: AssetKind, name: &str) -> Result<Pixmap, KartaError> {
        let bytes = self.loader.load_asset(kind, name).await?;
        decode_image(&bytes)
    }

    async fn load_font(&self, family: &str) -> Result<FontData, KartaError> {
        let bytes = self.loader.load_asset(AssetKind::Font, family).await?;
        FontData::new(bytes.to_vec())
    }
}

/// Decodes a PNG or JPEG image into a premultiplied raster.
pub fn decode_image(bytes: &[u8]) -> Result<Pixmap, KartaError> {
    let decoded = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = decoded.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| KartaError::ImageDecode(format!("invalid image size {width}x{height}")))?;

    for (target, source) in pixmap.pixels_mut().iter_mut().zip(decoded.pixels()) {
        let [r, g, b, a] = source.0;
        *target = ColorU8::from_rgba(r, g, b, a).premultiply();
    }

    Ok(pixmap)
}
