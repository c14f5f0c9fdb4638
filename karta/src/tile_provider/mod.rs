//! Fetching, decoding and caching of data tiles.

use std::collections::HashMap;
use std::sync::Arc;

use karta_wkb::DecodedTile;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::error::KartaError;
use crate::tile::{DataLayerId, TileCoords, TileKey, TileRequest};

pub mod loader;
pub mod metadata;
mod tile_store;
mod void_area;
mod worker_pool;

use loader::TileLoader;
use metadata::MetadataStore;
pub use tile_store::TileStore;
pub use void_area::VoidAreas;
pub use worker_pool::{DecodePool, PoolStats};

/// Responses of this size or smaller mean the area has no data.
const EMPTY_RESPONSE_SIZE: usize = 4;

/// Result of a tile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Data for the tile is in the [`TileStore`] under the given request.
    Ready(TileRequest),
    /// The area has no data.
    Void,
    /// The request was cancelled before completion.
    Cancelled,
}

type FetchCell = Arc<OnceCell<Result<FetchOutcome, KartaError>>>;

/// Resolves tile requests into cached decoded tiles.
///
/// Concurrent requests of the same tile share one fetch. Fetches of one data layer are performed
/// one at a time, while different layers progress independently.
pub struct TileFetchManager {
    loader: Arc<dyn TileLoader>,
    pool: DecodePool,
    store: RwLock<TileStore>,
    voids: RwLock<VoidAreas>,
    metadata: MetadataStore,
    in_flight: Mutex<HashMap<TileRequest, FetchCell, ahash::RandomState>>,
    layer_queues: Mutex<HashMap<DataLayerId, Arc<tokio::sync::Mutex<()>>, ahash::RandomState>>,
    zoom_offset: i32,
}

impl TileFetchManager {
    /// Creates a new manager.
    pub fn new(
        loader: Arc<dyn TileLoader>,
        pool: DecodePool,
        cache_capacity: usize,
        zoom_offset: i32,
    ) -> Self {
        Self {
            loader,
            pool,
            store: RwLock::new(TileStore::new(cache_capacity)),
            voids: RwLock::default(),
            metadata: MetadataStore::default(),
            in_flight: Mutex::default(),
            layer_queues: Mutex::default(),
            zoom_offset,
        }
    }

    /// Cache of decoded tiles.
    pub fn store(&self) -> &RwLock<TileStore> {
        &self.store
    }

    /// Recorded void areas.
    pub fn voids(&self) -> &RwLock<VoidAreas> {
        &self.voids
    }

    /// Statistics of the decode pool.
    pub fn pool_stats(&self) -> &PoolStats {
        self.pool.stats()
    }

    /// Makes sure the data of the display tile `coords` in the data layer is cached.
    ///
    /// The tile coordinates are wrapped around the world and the request is downgraded to the
    /// deepest level available in the dataset. Nothing is fetched if the area is a known void or
    /// is already covered by cached tiles.
    pub async fn request_tile(
        &self,
        layer: &DataLayerId,
        coords: TileCoords,
        token: &CancellationToken,
    ) -> Result<FetchOutcome, KartaError> {
        let metadata = tokio::select! {
            _ = token.cancelled() => return Ok(FetchOutcome::Cancelled),
            metadata = self.metadata.get(layer, self.loader.as_ref()) => metadata?,
        };

        let (x, y) = coords.wrapped();
        let key = metadata.resolve(x, y, coords.z, self.zoom_offset);
        let request = TileRequest {
            layer: layer.clone(),
            key,
        };

        if !metadata.intersects(&key) {
            log::trace!("Tile {key} is outside of the bounds of {layer}");
            return Ok(FetchOutcome::Void);
        }

        loop {
            if let Some(outcome) = self.check_cached(&request) {
                return Ok(outcome);
            }

            let cell = self.in_flight.lock().entry(request.clone()).or_default().clone();
            let outcome = cell
                .get_or_init(|| self.fetch(request.clone(), token.clone()))
                .await
                .clone();

            {
                let mut in_flight = self.in_flight.lock();
                if in_flight
                    .get(&request)
                    .is_some_and(|current| Arc::ptr_eq(current, &cell))
                {
                    in_flight.remove(&request);
                }
            }

            match outcome {
                // The fetch was started by another tile that has been removed since.
                Ok(FetchOutcome::Cancelled) if !token.is_cancelled() => continue,
                outcome => return outcome,
            }
        }
    }

    /// Cached tiles to draw for a request resolved by [`TileFetchManager::request_tile`].
    pub fn covering(&self, request: &TileRequest) -> Vec<Arc<DecodedTile>> {
        self.store.read().covering(&request.layer, &request.key)
    }

    fn check_cached(&self, request: &TileRequest) -> Option<FetchOutcome> {
        if self.voids.read().contains(&request.layer, &request.key) {
            log::trace!("Tile {} of {} is void", request.key, request.layer);
            return Some(FetchOutcome::Void);
        }

        if self.store.read().is_covered(&request.layer, &request.key) {
            log::trace!("Tile {} of {} is cached", request.key, request.layer);
            return Some(FetchOutcome::Ready(request.clone()));
        }

        None
    }

    async fn fetch(
        &self,
        request: TileRequest,
        token: CancellationToken,
    ) -> Result<FetchOutcome, KartaError> {
        let queue = self
            .layer_queues
            .lock()
            .entry(request.layer.clone())
            .or_default()
            .clone();

        let _guard = tokio::select! {
            _ = token.cancelled() => return Ok(FetchOutcome::Cancelled),
            guard = queue.lock() => guard,
        };

        // Previous item of the queue could have loaded this area.
        if let Some(outcome) = self.check_cached(&request) {
            return Ok(outcome);
        }

        let payload = tokio::select! {
            _ = token.cancelled() => return Ok(FetchOutcome::Cancelled),
            payload = self.loader.load_tile(&request) => payload?,
        };

        if payload.len() <= EMPTY_RESPONSE_SIZE {
            self.voids.write().record(&request.layer, &request.key);
            return Ok(FetchOutcome::Void);
        }

        let Some(tiles) = self.pool.decode(payload, token.clone()).await? else {
            return Ok(FetchOutcome::Cancelled);
        };

        if token.is_cancelled() {
            return Ok(FetchOutcome::Cancelled);
        }

        let mut store = self.store.write();
        for tile in tiles {
            store.insert(&request.layer, tile);
        }

        Ok(FetchOutcome::Ready(request))
    }
}
