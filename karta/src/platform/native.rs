use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use reqwest::StatusCode;

use crate::error::KartaError;
use crate::platform::PlatformService;

/// Loads data over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct NativePlatformService {
    http_client: reqwest::Client,
}

#[async_trait]
impl PlatformService for NativePlatformService {
    fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("karta/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to configure http client: {e}");
                reqwest::Client::new()
            });

        Self { http_client }
    }

    async fn load_bytes_from_url(&self, url: &str) -> Result<Bytes, KartaError> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(KartaError::NotFound);
        }

        if !status.is_success() {
            info!("Failed to load {url}: {status}");
            return Err(KartaError::Network {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        info!("Loaded {url}: {} bytes", bytes.len());

        Ok(bytes)
    }
}
