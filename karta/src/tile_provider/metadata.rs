use std::collections::HashMap;
use std::sync::Arc;

use karta_types::tile_math::{tile_to_latitude, tile_to_longitude};
use karta_types::ZoomBase;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::loader::TileLoader;
use crate::error::KartaError;
use crate::tile::{DataLayerId, TileKey};

/// Description of a dataset returned by the metadata endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetMetadata {
    /// `[west, south, east, north]` in degrees.
    pub bounding_box: Option<[f64; 4]>,
    /// Deepest level the dataset has data for.
    pub max_zoom: Option<u32>,
}

impl DatasetMetadata {
    /// Detail zoom and tile key to request for the display tile `(x, y, z)`.
    ///
    /// The detail zoom is `z + zoom_offset` clamped to `0..=max_zoom`. If `z` is deeper than the
    /// dataset, the parent tile at `max_zoom` is requested instead.
    pub fn resolve(&self, x: u32, y: u32, z: u32, zoom_offset: i32) -> TileKey {
        let max_zoom = self.max_zoom.unwrap_or(u32::MAX);
        let detail_zoom = (z as i64 + zoom_offset as i64).clamp(0, max_zoom as i64) as u32;

        let fetch_z = z.min(max_zoom);
        let shift = (z - fetch_z).min(31);

        TileKey::new(x >> shift, y >> shift, fetch_z, detail_zoom)
    }

    /// False if the tile lies completely outside of the dataset bounds.
    pub fn intersects(&self, key: &TileKey) -> bool {
        let Some([west, south, east, north]) = self.bounding_box else {
            return true;
        };

        let z = key.z as f64;
        let base = ZoomBase::WEB;
        let tile_west = tile_to_longitude(key.x as f64, z, base);
        let tile_east = tile_to_longitude(key.x as f64 + 1.0, z, base);
        let tile_north = tile_to_latitude(key.y as f64, z, base);
        let tile_south = tile_to_latitude(key.y as f64 + 1.0, z, base);

        tile_west < east && tile_east > west && tile_south < north && tile_north > south
    }
}

/// Metadata of all datasets, loaded once per dataset.
#[derive(Default)]
pub struct MetadataStore {
    cells: Mutex<HashMap<DataLayerId, Arc<OnceCell<Arc<DatasetMetadata>>>, ahash::RandomState>>,
}

impl MetadataStore {
    /// Returns the metadata of the dataset, loading it on first use.
    ///
    /// A dataset without metadata (`NotFound`) is treated as unbounded. Other failures are not
    /// cached and are retried by the next request.
    pub async fn get(
        &self,
        layer: &DataLayerId,
        loader: &dyn TileLoader,
    ) -> Result<Arc<DatasetMetadata>, KartaError> {
        let cell = self.cells.lock().entry(layer.clone()).or_default().clone();

        cell.get_or_try_init(|| async {
            let metadata = match loader.load_metadata(layer).await {
                Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                    KartaError::Generic(format!("invalid metadata of {layer}: {e}"))
                })?,
                Err(KartaError::NotFound) => {
                    log::debug!("No metadata for {layer}, assuming unbounded dataset");
                    DatasetMetadata::default()
                }
                Err(e) => return Err(e),
            };

            Ok(Arc::new(metadata))
        })
        .await
        .cloned()
    }
}
