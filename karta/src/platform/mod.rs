//! Provides platform specific logic and [`PlatformService`] to access it.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::KartaError;

/// Service providing platform specific functions in a generic way.
#[async_trait]
pub trait PlatformService {
    /// Creates a new instance of the service.
    fn new() -> Self;
    /// Loads a byte array from the given url.
    ///
    /// A `404` response is reported as [`KartaError::NotFound`], other non-success statuses as
    /// [`KartaError::Network`].
    async fn load_bytes_from_url(&self, url: &str) -> Result<Bytes, KartaError>;
}

pub mod native;

/// Default implementation of the [`PlatformService`] for the current platform.
pub type PlatformServiceImpl = native::NativePlatformService;
