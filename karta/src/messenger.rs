use crate::engine::TileHandle;
use crate::error::KartaError;

/// Receives notifications about tiles created through the [`TileLifecycle`](crate::TileLifecycle)
/// interface.
pub trait Messenger: Send + Sync {
    /// The raster of the tile is filled and can be displayed.
    fn tile_ready(&self, handle: TileHandle);
    /// The tile could not be rendered. Cancelled tiles are never reported.
    fn tile_failed(&self, handle: TileHandle, error: &KartaError);
}

/// Messenger that ignores all notifications.
pub struct DummyMessenger;

impl Messenger for DummyMessenger {
    fn tile_ready(&self, _handle: TileHandle) {}

    fn tile_failed(&self, _handle: TileHandle, _error: &KartaError) {}
}
