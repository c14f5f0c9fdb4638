use std::collections::HashMap;
use std::sync::Arc;

use karta_wkb::DecodedTile;

use crate::tile::{DataLayerId, TileKey};

type LayerTiles = HashMap<TileKey, Arc<DecodedTile>, ahash::RandomState>;

/// Fixed-capacity cache of decoded tiles shared by all data layers.
///
/// Entries occupy the slots of a ring buffer. When the ring is full, a new entry takes the slot of
/// the oldest one, which makes eviction strictly first-in first-out. Cached tiles are never
/// modified.
pub struct TileStore {
    slots: Vec<Option<(DataLayerId, TileKey)>>,
    next_slot: usize,
    layers: HashMap<DataLayerId, LayerTiles, ahash::RandomState>,
}

impl TileStore {
    /// Creates an empty store holding at most `capacity` tiles.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next_slot: 0,
            layers: HashMap::default(),
        }
    }

    /// Maximum number of tiles.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of cached tiles in all layers.
    pub fn len(&self) -> usize {
        self.layers.values().map(|tiles| tiles.len()).sum()
    }

    /// True if no tiles are cached.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Cached tile by its key.
    pub fn get(&self, layer: &DataLayerId, key: &TileKey) -> Option<Arc<DecodedTile>> {
        self.layers.get(layer)?.get(key).cloned()
    }

    /// Adds a tile, evicting the oldest entry if the store is full.
    ///
    /// Returns `false` and keeps the existing tile if the key is already cached.
    pub fn insert(&mut self, layer: &DataLayerId, tile: DecodedTile) -> bool {
        let key = TileKey::new(tile.x, tile.y, tile.z, tile.detail_zoom);
        if self.get(layer, &key).is_some() {
            log::trace!("Tile {key} of layer {layer} is already cached");
            return false;
        }

        if let Some((evicted_layer, evicted_key)) = self.slots[self.next_slot].take() {
            self.remove_entry(&evicted_layer, &evicted_key);
            log::trace!("Evicted tile {evicted_key} of layer {evicted_layer}");
        }

        self.slots[self.next_slot] = Some((layer.clone(), key));
        self.next_slot = (self.next_slot + 1) % self.slots.len();
        self.layers
            .entry(layer.clone())
            .or_default()
            .insert(key, Arc::new(tile));

        true
    }

    /// Accumulated weight of cached tiles that overlap `key`, stopping as soon as the tile is
    /// covered.
    ///
    /// Only tiles with the same detail zoom that are ancestors or descendants of the requested
    /// tile participate. Each contributes `4^(16 - z)`.
    pub fn coverage(&self, layer: &DataLayerId, key: &TileKey) -> f64 {
        let Some(tiles) = self.layers.get(layer) else {
            return 0.0;
        };

        let required = key.weight();
        let mut accumulated = 0.0;
        for cached in tiles.keys() {
            if cached.detail_zoom == key.detail_zoom && cached.is_related(key) {
                accumulated += cached.weight();
                if accumulated >= required {
                    break;
                }
            }
        }

        accumulated
    }

    /// True if cached tiles cover the whole area of `key`, so it does not need to be fetched.
    pub fn is_covered(&self, layer: &DataLayerId, key: &TileKey) -> bool {
        self.coverage(layer, key) >= key.weight()
    }

    /// Cached tiles participating in the coverage of `key`, oldest first.
    pub fn covering(&self, layer: &DataLayerId, key: &TileKey) -> Vec<Arc<DecodedTile>> {
        let Some(tiles) = self.layers.get(layer) else {
            return vec![];
        };

        let (newer, older) = self.slots.split_at(self.next_slot);
        older
            .iter()
            .chain(newer)
            .flatten()
            .filter(|(slot_layer, cached)| {
                slot_layer == layer
                    && cached.detail_zoom == key.detail_zoom
                    && cached.is_related(key)
            })
            .filter_map(|(_, cached)| tiles.get(cached).cloned())
            .collect()
    }

    fn remove_entry(&mut self, layer: &DataLayerId, key: &TileKey) {
        if let Some(tiles) = self.layers.get_mut(layer) {
            tiles.remove(key);
            if tiles.is_empty() {
                self.layers.remove(layer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: u32, y: u32, z: u32, detail_zoom: u32) -> DecodedTile {
        DecodedTile {
            x,
            y,
            z,
            detail_zoom,
            objects: vec![],
        }
    }

    #[test]
    fn evicts_oldest_entry_first() {
        let roads = DataLayerId::new("roads", "");
        let water = DataLayerId::new("water", "");
        let mut store = TileStore::new(600);

        for i in 0..600 {
            let layer = if i % 2 == 0 { &roads } else { &water };
            assert!(store.insert(layer, tile(i, 0, 16, 16)));
        }
        assert_eq!(store.len(), 600);

        store.insert(&water, tile(1000, 0, 16, 16));
        assert_eq!(store.len(), 600);
        assert!(store.get(&roads, &TileKey::new(0, 0, 16, 16)).is_none());
        assert!(store.get(&water, &TileKey::new(1, 0, 16, 16)).is_some());
        assert!(store.get(&water, &TileKey::new(1000, 0, 16, 16)).is_some());

        store.insert(&water, tile(1001, 0, 16, 16));
        assert!(store.get(&water, &TileKey::new(1, 0, 16, 16)).is_none());
        assert_eq!(store.len(), 600);
    }

    #[test]
    fn never_exceeds_capacity() {
        let layer = DataLayerId::new("poi", "");
        let mut store = TileStore::new(10);
        for i in 0..95 {
            store.insert(&layer, tile(i, i, 10, 10));
            assert!(store.len() <= 10);
        }

        let remaining: Vec<_> = store
            .covering(&layer, &TileKey::new(0, 0, 0, 10))
            .iter()
            .map(|t| t.x)
            .collect();
        assert_eq!(remaining, (85..95).collect::<Vec<_>>());
    }

    #[test]
    fn cached_tiles_are_not_replaced() {
        let layer = DataLayerId::new("poi", "");
        let mut store = TileStore::new(10);
        assert!(store.insert(&layer, tile(0, 0, 1, 1)));
        let first = store.get(&layer, &TileKey::new(0, 0, 1, 1));

        assert!(!store.insert(&layer, tile(0, 0, 1, 1)));
        let second = store.get(&layer, &TileKey::new(0, 0, 1, 1));
        assert!(Arc::ptr_eq(
            &first.expect("cached"),
            &second.expect("cached")
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn children_cover_parent_when_all_present() {
        let layer = DataLayerId::new("land", "");
        let parent = TileKey::new(0, 0, 9, 10);
        let mut store = TileStore::new(600);

        store.insert(&layer, tile(0, 0, 10, 10));
        store.insert(&layer, tile(1, 0, 10, 10));
        store.insert(&layer, tile(0, 1, 10, 10));
        assert_eq!(store.coverage(&layer, &parent), 3.0 * 4f64.powi(6));
        assert!(!store.is_covered(&layer, &parent));

        store.insert(&layer, tile(1, 1, 10, 10));
        assert!(store.is_covered(&layer, &parent));
        assert_eq!(store.covering(&layer, &parent).len(), 4);
    }

    #[test]
    fn identical_or_ancestor_tile_covers() {
        let layer = DataLayerId::new("land", "");
        let mut store = TileStore::new(600);
        store.insert(&layer, tile(5, 7, 10, 10));
        assert!(store.is_covered(&layer, &TileKey::new(5, 7, 10, 10)));
        assert!(!store.is_covered(&layer, &TileKey::new(6, 7, 10, 10)));

        store.insert(&layer, tile(0, 0, 2, 10));
        assert!(store.is_covered(&layer, &TileKey::new(6, 7, 10, 10)));
    }

    #[test]
    fn other_detail_zoom_and_layers_do_not_count() {
        let layer = DataLayerId::new("land", "");
        let mut store = TileStore::new(600);
        store.insert(&layer, tile(0, 0, 0, 3));
        store.insert(&DataLayerId::new("water", ""), tile(0, 0, 0, 4));

        let key = TileKey::new(1, 1, 2, 4);
        assert_eq!(store.coverage(&layer, &key), 0.0);
        assert!(store.covering(&layer, &key).is_empty());
    }
}
