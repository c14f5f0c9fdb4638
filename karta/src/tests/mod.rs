//! Test doubles shared by the unit tests of the crate.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageOutputFormat, Rgba, RgbaImage};
use karta_types::tile_math::tile_bounds_meters;
use karta_types::ZoomBase;
use karta_wkb::writer::{GeometryWriter, TilePayloadWriter};
use karta_wkb::{Center, Envelope, ObjectInfo};
use parking_lot::Mutex;

use crate::error::KartaError;
use crate::tile::{DataLayerId, TileKey, TileRequest};
use crate::tile_provider::loader::{AssetKind, TileLoader};
use crate::tile_provider::metadata::DatasetMetadata;

/// Loader serving everything from memory. Tiles that were not added are empty (void).
#[derive(Default)]
pub struct MemoryLoader {
    delay: Option<Duration>,
    tiles: Mutex<HashMap<(DataLayerId, TileKey), Bytes>>,
    failing: Mutex<HashMap<DataLayerId, u16>>,
    metadata: Mutex<HashMap<DataLayerId, DatasetMetadata>>,
    style: Mutex<Option<Bytes>>,
    assets: Mutex<HashMap<(AssetKind, String), Bytes>>,
    tile_requests: AtomicUsize,
    style_requests: AtomicUsize,
    asset_requests: AtomicUsize,
}

impl MemoryLoader {
    /// Delays every tile response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_tile(&self, layer: &DataLayerId, key: TileKey, payload: Bytes) {
        self.tiles.lock().insert((layer.clone(), key), payload);
    }

    /// Makes every tile request of the layer fail with the given status.
    pub fn fail_layer(&self, layer: &DataLayerId, status: u16) {
        self.failing.lock().insert(layer.clone(), status);
    }

    pub fn set_max_zoom(&self, layer: &DataLayerId, max_zoom: u32) {
        self.metadata
            .lock()
            .entry(layer.clone())
            .or_default()
            .max_zoom = Some(max_zoom);
    }

    pub fn set_style(&self, style: Bytes) {
        *self.style.lock() = Some(style);
    }

    pub fn add_asset(&self, kind: AssetKind, name: &str, data: Bytes) {
        self.assets.lock().insert((kind, name.to_string()), data);
    }

    pub fn tile_requests(&self) -> usize {
        self.tile_requests.load(Ordering::SeqCst)
    }

    pub fn style_requests(&self) -> usize {
        self.style_requests.load(Ordering::SeqCst)
    }

    pub fn asset_requests(&self) -> usize {
        self.asset_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileLoader for MemoryLoader {
    async fn load_tile(&self, request: &TileRequest) -> Result<Bytes, KartaError> {
        self.tile_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = self.failing.lock().get(&request.layer) {
            return Err(KartaError::Network {
                url: format!("memory://{}/{}", request.layer, request.key),
                status: *status,
            });
        }

        Ok(self
            .tiles
            .lock()
            .get(&(request.layer.clone(), request.key))
            .cloned()
            .unwrap_or_default())
    }

    async fn load_style(
        &self,
        _style_id: &str,
        _style_type: Option<&str>,
    ) -> Result<Bytes, KartaError> {
        self.style_requests.fetch_add(1, Ordering::SeqCst);
        self.style.lock().clone().ok_or(KartaError::NotFound)
    }

    async fn load_metadata(&self, layer: &DataLayerId) -> Result<Bytes, KartaError> {
        let metadata = self
            .metadata
            .lock()
            .get(layer)
            .cloned()
            .ok_or(KartaError::NotFound)?;
        let json = serde_json::to_vec(&metadata).map_err(|e| KartaError::Generic(e.to_string()))?;
        Ok(json.into())
    }

    async fn load_asset(&self, kind: AssetKind, name: &str) -> Result<Bytes, KartaError> {
        self.asset_requests.fetch_add(1, Ordering::SeqCst);
        self.assets
            .lock()
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or(KartaError::NotFound)
    }
}

/// Payload with a single tile `(x, y, z)` holding one polygon covering the middle of the tile.
pub fn polygon_payload(x: u32, y: u32, z: u32) -> Bytes {
    let bounds = tile_bounds_meters(x as f64, y as f64, z as f64, ZoomBase::WEB);
    let inner = bounds.expand(-bounds.width() / 4.0);
    let (left, bottom, right, top) = (inner.x_min(), inner.y_min(), inner.x_max(), inner.y_max());

    let mut geometry = GeometryWriter::new();
    geometry.polygon(&[vec![
        (left as f32, bottom as f32),
        (right as f32, bottom as f32),
        (right as f32, top as f32),
        (left as f32, top as f32),
        (left as f32, bottom as f32),
    ]]);
    let geometry = geometry.finish();

    let center = inner.center();
    let info = ObjectInfo {
        envelope: Envelope {
            left,
            right,
            top,
            bottom,
        },
        center: Center {
            x: center.x,
            y: center.y,
        },
        hash: Some(x ^ (y << 8) ^ (z << 16)),
        ..Default::default()
    };

    let mut payload = TilePayloadWriter::new();
    payload.begin_tile(x, y, z, z).add_object(&info, Some(geometry.as_slice()));
    payload.finish()
}

/// Single-colored PNG image.
pub fn png(width: u32, height: u32, color: [u8; 4]) -> Bytes {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .expect("encodes png");
    Bytes::from(bytes.into_inner())
}
