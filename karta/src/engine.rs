//! Tile rendering pipeline and the interface used by the host to manage tiles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use karta_types::ZoomBase;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::async_runtime;
use crate::config::EngineConfig;
use crate::error::KartaError;
use crate::messenger::{DummyMessenger, Messenger};
use crate::render::text::FontData;
use crate::render::{AssetStore, Compositor, RenderJob, RenderedTile};
use crate::style::{Style, StyleDocument};
use crate::tile::{DataLayerId, TileCoords};
use crate::tile_provider::loader::{TileLoader, UrlTemplates, WebTileLoader};
use crate::tile_provider::{DecodePool, FetchOutcome, TileFetchManager};

/// Identifier of a tile created through [`TileLifecycle::create_tile`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileHandle(u64);

/// Interface the host uses to manage displayed tiles.
pub trait TileLifecycle {
    /// Starts rendering of a tile. The [`Messenger`] is notified once the raster is filled.
    fn create_tile(&self, coords: TileCoords) -> TileHandle;
    /// Removes the tile, cancelling its rendering if it is still in progress.
    fn remove_tile(&self, handle: TileHandle);
    /// Marks the tile to be kept (or dropped) by the next [`TileLifecycle::prune`].
    fn set_retain(&self, handle: TileHandle, retain: bool);
    /// Removes every tile that is not marked to be retained.
    fn prune(&self);
}

/// State shared by all renders of an engine: configuration, caches, decode workers and the
/// style.
pub struct RenderContext {
    config: Arc<EngineConfig>,
    loader: Arc<dyn TileLoader>,
    tiles: TileFetchManager,
    style: OnceCell<Arc<Style>>,
    compositor: Compositor,
}

impl RenderContext {
    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch manager with the cache of decoded tiles.
    pub fn tile_manager(&self) -> &TileFetchManager {
        &self.tiles
    }

    /// Style of the engine, loaded on first use.
    pub async fn style(&self) -> Result<Arc<Style>, KartaError> {
        self.style
            .get_or_try_init(|| async {
                let bytes = self
                    .loader
                    .load_style(&self.config.style_id, self.config.style_type.as_deref())
                    .await?;
                log::debug!("Loaded style {}", self.config.style_id);
                Ok::<_, KartaError>(Arc::new(Style::parse(&bytes, &self.config)?))
            })
            .await
            .cloned()
    }

    /// Renders a display tile.
    ///
    /// Data of all layers is requested in parallel. Returns [`KartaError::Cancelled`] if the
    /// token is cancelled before the tile is drawn.
    pub async fn render_tile(
        &self,
        coords: TileCoords,
        token: &CancellationToken,
    ) -> Result<RenderedTile, KartaError> {
        let style = tokio::select! {
            _ = token.cancelled() => return Err(KartaError::Cancelled),
            style = self.style() => style?,
        };

        let mut data_layers: Vec<&DataLayerId> = vec![];
        for layer in style.eligible_layers(coords.z as f64, &self.config) {
            if let Some(data_layer) = layer.data_layer() {
                if !data_layers.contains(&data_layer) {
                    data_layers.push(data_layer);
                }
            }
        }

        let fetch_coords = fetch_coords(coords, self.config.zoom_base);
        log::trace!(
            "Rendering tile {coords:?} from {} data layers at {fetch_coords:?}",
            data_layers.len()
        );

        let outcomes = join_all(
            data_layers
                .iter()
                .map(|layer| self.tiles.request_tile(layer, fetch_coords, token)),
        )
        .await;

        let mut job = RenderJob::new(coords, &self.config);
        for (layer, outcome) in data_layers.into_iter().zip(outcomes) {
            match outcome? {
                FetchOutcome::Ready(request) => {
                    job.add_tiles(layer.clone(), self.tiles.covering(&request))
                }
                FetchOutcome::Void => {}
                FetchOutcome::Cancelled => return Err(KartaError::Cancelled),
            }
        }

        self.compositor.render(&style, &job, token).await
    }
}

/// Tile of the power-of-two data pyramid holding the center of a display tile.
///
/// Display pyramids with another zoom base are mapped to the data level
/// `floor(z * log2(base))`.
fn fetch_coords(coords: TileCoords, base: ZoomBase) -> TileCoords {
    if base == ZoomBase::WEB {
        return coords;
    }

    let level = (coords.z as f64 * base.value().log2()).floor().max(0.0) as u32;
    let display_tiles = base.tiles_at(coords.z as f64);
    let data_tiles = 2f64.powi(level as i32);

    TileCoords::new(
        ((coords.x as f64 + 0.5) / display_tiles * data_tiles).floor() as i64,
        ((coords.y as f64 + 0.5) / display_tiles * data_tiles).floor() as i64,
        level,
    )
}

struct TileSlot {
    coords: TileCoords,
    token: CancellationToken,
    retain: bool,
    rendered: Option<Arc<RenderedTile>>,
}

type TileSlots = Arc<Mutex<HashMap<TileHandle, TileSlot>>>;

/// Renders tiles requested by the host in the background.
///
/// Tiles are created with [`TileLifecycle::create_tile`], which must be called from within a
/// tokio runtime.
pub struct RenderEngine {
    context: Arc<RenderContext>,
    tiles: TileSlots,
    messenger: Arc<dyn Messenger>,
    next_handle: AtomicU64,
}

impl RenderEngine {
    /// Shared rendering state.
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    /// Rendered raster of a tile, if it is ready.
    pub fn tile(&self, handle: TileHandle) -> Option<Arc<RenderedTile>> {
        self.tiles.lock().get(&handle)?.rendered.clone()
    }

    /// Coordinates of a tile.
    pub fn tile_coords(&self, handle: TileHandle) -> Option<TileCoords> {
        self.tiles.lock().get(&handle).map(|slot| slot.coords)
    }

    /// Number of tiles that were created and not removed yet.
    pub fn tile_count(&self) -> usize {
        self.tiles.lock().len()
    }
}

impl TileLifecycle for RenderEngine {
    fn create_tile(&self, coords: TileCoords) -> TileHandle {
        let handle = TileHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.tiles.lock().insert(
            handle,
            TileSlot {
                coords,
                token: token.clone(),
                retain: true,
                rendered: None,
            },
        );

        let context = self.context.clone();
        let tiles = self.tiles.clone();
        let messenger = self.messenger.clone();

        async_runtime::spawn(async move {
            match context.render_tile(coords, &token).await {
                Ok(rendered) => {
                    let stored = match tiles.lock().get_mut(&handle) {
                        Some(slot) => {
                            slot.rendered = Some(Arc::new(rendered));
                            true
                        }
                        None => false,
                    };

                    if stored {
                        log::trace!("Tile {coords:?} is ready");
                        messenger.tile_ready(handle);
                    }
                }
                Err(err) if err.is_cancelled() => {
                    log::trace!("Rendering of tile {coords:?} was cancelled");
                }
                Err(err) => {
                    log::warn!("Failed to render tile {coords:?}: {err}");
                    messenger.tile_failed(handle, &err);
                }
            }
        });

        handle
    }

    fn remove_tile(&self, handle: TileHandle) {
        if let Some(slot) = self.tiles.lock().remove(&handle) {
            slot.token.cancel();
        }
    }

    fn set_retain(&self, handle: TileHandle, retain: bool) {
        if let Some(slot) = self.tiles.lock().get_mut(&handle) {
            slot.retain = retain;
        }
    }

    fn prune(&self) {
        self.tiles.lock().retain(|_, slot| {
            if !slot.retain {
                slot.token.cancel();
            }
            slot.retain
        });
    }
}

/// Constructor for a [`RenderEngine`].
///
/// ```no_run
/// use karta::{EngineBuilder, EngineConfig};
///
/// let config = EngineConfig::from_json(r#"{
///     "tile_url": "https://tiles.example.com/{key}/{value}/{z}/{x}/{y}",
///     "style_url": "https://tiles.example.com/styles/{style_id}.json"
/// }"#)?;
///
/// let engine = EngineBuilder::new(config).build()?;
/// # Ok::<(), karta::KartaError>(())
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    loader: Option<Arc<dyn TileLoader>>,
    style: Option<StyleDocument>,
    fonts: Vec<(String, Vec<u8>)>,
    messenger: Option<Arc<dyn Messenger>>,
}

impl EngineBuilder {
    /// Initializes a builder with the given configuration. Unless another loader is set, all
    /// data is loaded over HTTP using the url templates of the configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loader: None,
            style: None,
            fonts: vec![],
            messenger: None,
        }
    }

    /// Sets the source of tiles, styles, metadata and assets.
    pub fn with_loader(mut self, loader: impl TileLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Sets the source of tiles, styles, metadata and assets shared with other owners.
    pub fn with_shared_loader(mut self, loader: Arc<dyn TileLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Uses the given style instead of loading it with the loader.
    pub fn with_style(mut self, style: StyleDocument) -> Self {
        self.style = Some(style);
        self
    }

    /// Adds a font available under the family name without loading.
    pub fn with_font(mut self, family: impl Into<String>, data: Vec<u8>) -> Self {
        self.fonts.push((family.into(), data));
        self
    }

    /// Sets the receiver of tile notifications.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Arc::new(messenger));
        self
    }

    /// Consumes the builder and constructs the engine.
    ///
    /// Fails if the configuration is invalid, a font cannot be parsed or the decode workers
    /// cannot be started.
    pub fn build(self) -> Result<RenderEngine, KartaError> {
        let Self {
            config,
            loader,
            style,
            fonts,
            messenger,
        } = self;

        if config.tile_size == 0 {
            return Err(KartaError::Generic("tile size must be positive".into()));
        }

        let config = Arc::new(config);
        let loader = loader.unwrap_or_else(|| {
            Arc::new(WebTileLoader::new(UrlTemplates::from_config(&config)))
        });

        let mut assets = AssetStore::new(loader.clone(), config.asset_cache_capacity);
        for (family, data) in fonts {
            assets.add_font(family, FontData::new(data)?);
        }

        let pool = DecodePool::new(config.workers())?;
        let tiles = TileFetchManager::new(
            loader.clone(),
            pool,
            config.cache_capacity,
            config.zoom_offset,
        );

        let style = style.map(|document| Arc::new(Style::new(document, &config)));

        let context = RenderContext {
            compositor: Compositor::new(config.clone(), Arc::new(assets)),
            config,
            loader,
            tiles,
            style: OnceCell::new_with(style),
        };

        Ok(RenderEngine {
            context: Arc::new(context),
            tiles: Arc::default(),
            messenger: messenger.unwrap_or_else(|| Arc::new(DummyMessenger)),
            next_handle: AtomicU64::new(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use karta_types::tile_math::HALF_WORLD_METERS;
    use karta_wkb::writer::{GeometryWriter, TilePayloadWriter};
    use karta_wkb::{Envelope, ObjectInfo, TagValue};
    use tokio::sync::mpsc;

    use super::*;
    use crate::tests::MemoryLoader;
    use crate::tile::TileKey;

    const STYLE: &str = r##"{
        "Order": ["parks"],
        "Layers": {"parks": {"Save": false, "Style": {"FillColor": "#00FF00"}}}
    }"##;

    fn parks() -> DataLayerId {
        DataLayerId::new("parks", "")
    }

    fn config() -> EngineConfig {
        EngineConfig {
            anti_alias: false,
            worker_count: Some(2),
            ..Default::default()
        }
    }

    /// One park covering the central quarter of the world.
    fn park_payload() -> bytes::Bytes {
        let half = (HALF_WORLD_METERS / 2.0) as f32;
        let mut geometry = GeometryWriter::new();
        geometry.polygon(&[vec![
            (-half, -half),
            (half, -half),
            (half, half),
            (-half, half),
            (-half, -half),
        ]]);
        let geometry = geometry.finish();

        let info = ObjectInfo {
            envelope: Envelope {
                left: -(half as f64),
                right: half as f64,
                top: half as f64,
                bottom: -(half as f64),
            },
            tags: [("name".to_string(), TagValue::String("Central".into()))].into(),
            hash: Some(11),
            ..Default::default()
        };

        let mut payload = TilePayloadWriter::new();
        payload.begin_tile(0, 0, 0, 0).add_object(&info, Some(geometry.as_slice()));
        payload.finish()
    }

    #[derive(Debug, PartialEq)]
    enum Event {
        Ready(TileHandle),
        Failed(TileHandle),
    }

    struct ChannelMessenger(mpsc::UnboundedSender<Event>);

    impl Messenger for ChannelMessenger {
        fn tile_ready(&self, handle: TileHandle) {
            let _ = self.0.send(Event::Ready(handle));
        }

        fn tile_failed(&self, handle: TileHandle, _error: &KartaError) {
            let _ = self.0.send(Event::Failed(handle));
        }
    }

    fn engine(loader: MemoryLoader) -> (RenderEngine, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let engine = EngineBuilder::new(config())
            .with_loader(loader)
            .with_style(serde_json::from_str(STYLE).expect("valid style"))
            .with_messenger(ChannelMessenger(sender))
            .build()
            .expect("engine starts");
        (engine, receiver)
    }

    #[tokio::test]
    async fn renders_polygon_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();

        let loader = MemoryLoader::default();
        loader.add_tile(&parks(), TileKey::new(0, 0, 0, 0), park_payload());
        let (engine, mut events) = engine(loader);

        let handle = engine.create_tile(TileCoords::new(0, 0, 0));
        assert_eq!(events.recv().await, Some(Event::Ready(handle)));

        let tile = engine.tile(handle).expect("tile is rendered");
        let green = tile
            .image()
            .pixels()
            .iter()
            .filter(|p| p.alpha() == 255 && p.green() == 255 && p.red() == 0)
            .count();
        assert_eq!(green, 128 * 128);
        assert!(tile.encode_png().is_ok_and(|png| !png.is_empty()));
    }

    #[tokio::test]
    async fn wrapped_tile_matches_the_tile_it_wraps_onto() {
        let loader = MemoryLoader::default();
        loader.add_tile(&parks(), TileKey::new(0, 0, 0, 0), park_payload());
        let (engine, mut events) = engine(loader);

        let green = |handle| {
            let tile = engine.tile(handle).expect("tile is rendered");
            tile.image()
                .pixels()
                .iter()
                .filter(|p| p.alpha() == 255 && p.green() == 255 && p.red() == 0)
                .count()
        };

        let wrapped = engine.create_tile(TileCoords::new(1, 0, 0));
        assert_eq!(events.recv().await, Some(Event::Ready(wrapped)));
        let original = engine.create_tile(TileCoords::new(0, 0, 0));
        assert_eq!(events.recv().await, Some(Event::Ready(original)));

        assert_eq!(green(wrapped), 128 * 128);
        assert_eq!(green(wrapped), green(original));
    }

    #[tokio::test]
    async fn void_tile_renders_empty() {
        let (engine, mut events) = engine(MemoryLoader::default());

        let handle = engine.create_tile(TileCoords::new(1, 1, 1));
        assert_eq!(events.recv().await, Some(Event::Ready(handle)));

        let tile = engine.tile(handle).expect("tile is rendered");
        assert!(tile.image().pixels().iter().all(|p| p.alpha() == 0));
    }

    #[tokio::test]
    async fn network_error_is_reported() {
        let loader = MemoryLoader::default();
        loader.fail_layer(&parks(), 503);
        let (engine, mut events) = engine(loader);

        let handle = engine.create_tile(TileCoords::new(0, 0, 0));
        assert_eq!(events.recv().await, Some(Event::Failed(handle)));
        assert!(engine.tile(handle).is_none());
    }

    #[tokio::test]
    async fn removed_tile_is_cancelled_silently() {
        let loader = MemoryLoader::default().with_delay(Duration::from_millis(100));
        loader.add_tile(&parks(), TileKey::new(0, 0, 0, 0), park_payload());
        let (engine, mut events) = engine(loader);

        let removed = engine.create_tile(TileCoords::new(0, 0, 0));
        engine.remove_tile(removed);
        assert_eq!(engine.tile_count(), 0);

        let kept = engine.create_tile(TileCoords::new(0, 0, 0));
        assert_eq!(events.recv().await, Some(Event::Ready(kept)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn prune_removes_tiles_not_retained() {
        let (engine, _events) = engine(MemoryLoader::default());

        let a = engine.create_tile(TileCoords::new(0, 0, 1));
        let b = engine.create_tile(TileCoords::new(1, 0, 1));
        let c = engine.create_tile(TileCoords::new(0, 1, 1));

        engine.set_retain(b, false);
        engine.set_retain(c, false);
        engine.set_retain(c, true);
        engine.prune();

        assert_eq!(engine.tile_count(), 2);
        assert_eq!(engine.tile_coords(a), Some(TileCoords::new(0, 0, 1)));
        assert_eq!(engine.tile_coords(b), None);
        assert!(engine.tile_coords(c).is_some());
    }

    #[tokio::test]
    async fn style_is_loaded_once() {
        let loader = Arc::new(MemoryLoader::default());
        loader.set_style(bytes::Bytes::from_static(STYLE.as_bytes()));
        let engine = EngineBuilder::new(config())
            .with_shared_loader(loader.clone())
            .build()
            .expect("engine starts");

        let context = engine.context();
        let (first, second) = tokio::join!(context.style(), context.style());
        let (first, second) = (first.expect("style loads"), second.expect("style loads"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.style_requests(), 1);
    }

    #[tokio::test]
    async fn invalid_style_fails_render() {
        let loader = MemoryLoader::default();
        loader.set_style(bytes::Bytes::from_static(b"{not json"));
        let engine = EngineBuilder::new(config())
            .with_loader(loader)
            .build()
            .expect("engine starts");

        let result = engine
            .context()
            .render_tile(TileCoords::new(0, 0, 0), &CancellationToken::new())
            .await;
        assert_matches!(result, Err(KartaError::Style(_)));
    }

    #[test]
    fn invalid_font_fails_build() {
        let result = EngineBuilder::new(config())
            .with_font("Broken", b"nope".to_vec())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn maps_display_tiles_to_data_pyramid() {
        let web = TileCoords::new(3, 5, 4);
        assert_eq!(fetch_coords(web, ZoomBase::WEB), web);

        let base4 = ZoomBase::new(4.0).expect("valid base");
        assert_eq!(
            fetch_coords(TileCoords::new(3, 5, 2), base4),
            TileCoords::new(3, 5, 4)
        );

        let base3 = ZoomBase::new(3.0).expect("valid base");
        // 9 display tiles per row at z=2 map onto 8 data tiles at z=3.
        assert_eq!(
            fetch_coords(TileCoords::new(8, 0, 2), base3),
            TileCoords::new(7, 0, 3)
        );
    }
}
