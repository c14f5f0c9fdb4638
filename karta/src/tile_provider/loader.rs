//! Loading of tiles, styles, dataset metadata and assets.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use bytes::Bytes;
use strfmt::strfmt;

use crate::config::EngineConfig;
use crate::error::KartaError;
use crate::platform::{PlatformService, PlatformServiceImpl};
use crate::tile::{DataLayerId, TileRequest};

/// Kind of an asset referenced by a style.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Image drawn at a point.
    Icon,
    /// Image repeated to fill a polygon.
    Pattern,
    /// TrueType or OpenType font.
    Font,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetKind::Icon => "icon",
            AssetKind::Pattern => "pattern",
            AssetKind::Font => "font",
        };
        f.write_str(name)
    }
}

/// Source of the raw data consumed by the engine.
#[async_trait]
pub trait TileLoader: Send + Sync {
    /// Loads the payload of a data tile. A response of 4 bytes or less means "no data here".
    async fn load_tile(&self, request: &TileRequest) -> Result<Bytes, KartaError>;
    /// Loads a style document.
    async fn load_style(&self, style_id: &str, style_type: Option<&str>)
        -> Result<Bytes, KartaError>;
    /// Loads the metadata of a dataset.
    async fn load_metadata(&self, layer: &DataLayerId) -> Result<Bytes, KartaError>;
    /// Loads an asset by its name.
    async fn load_asset(&self, kind: AssetKind, name: &str) -> Result<Bytes, KartaError>;
}

/// Url templates with `{x} {y} {z} {key} {value} {type} {style_id}` placeholders.
#[derive(Debug, Clone)]
pub struct UrlTemplates {
    tile: String,
    style: String,
    metadata: String,
    assets: String,
    style_id: String,
    style_type: String,
}

impl UrlTemplates {
    /// Takes the templates from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            tile: config.tile_url.clone(),
            style: config.style_url.clone(),
            metadata: config.metadata_url.clone(),
            assets: config.assets_url.clone(),
            style_id: config.style_id.clone(),
            style_type: config.style_type.clone().unwrap_or_default(),
        }
    }

    /// Url of a data tile.
    pub fn tile_url(&self, request: &TileRequest) -> Result<String, KartaError> {
        let mut vars = self.vars(request.layer.key(), request.layer.value());
        vars.insert("x".into(), request.key.x.to_string());
        vars.insert("y".into(), request.key.y.to_string());
        vars.insert("z".into(), request.key.z.to_string());
        expand(&self.tile, &vars)
    }

    /// Url of the style document.
    pub fn style_url(&self) -> Result<String, KartaError> {
        expand(&self.style, &self.vars("", ""))
    }

    /// Url of the dataset metadata.
    pub fn metadata_url(&self, layer: &DataLayerId) -> Result<String, KartaError> {
        expand(&self.metadata, &self.vars(layer.key(), layer.value()))
    }

    /// Url of an asset.
    pub fn asset_url(&self, kind: AssetKind, name: &str) -> Result<String, KartaError> {
        expand(&self.assets, &self.vars(&kind.to_string(), name))
    }

    fn vars(&self, key: &str, value: &str) -> HashMap<String, String> {
        HashMap::from([
            ("x".to_string(), String::new()),
            ("y".to_string(), String::new()),
            ("z".to_string(), String::new()),
            ("key".to_string(), key.to_string()),
            ("value".to_string(), value.to_string()),
            ("type".to_string(), self.style_type.clone()),
            ("style_id".to_string(), self.style_id.clone()),
        ])
    }
}

fn expand(template: &str, vars: &HashMap<String, String>) -> Result<String, KartaError> {
    if template.is_empty() {
        return Err(KartaError::NotFound);
    }

    strfmt(template, vars).map_err(|e| KartaError::Generic(format!("invalid url template: {e}")))
}

/// Loads everything over HTTP using the url templates of the configuration.
pub struct WebTileLoader {
    platform_service: PlatformServiceImpl,
    urls: UrlTemplates,
}

impl WebTileLoader {
    /// Create a new instance.
    pub fn new(urls: UrlTemplates) -> Self {
        Self {
            platform_service: PlatformServiceImpl::new(),
            urls,
        }
    }
}

#[async_trait]
impl TileLoader for WebTileLoader {
    async fn load_tile(&self, request: &TileRequest) -> Result<Bytes, KartaError> {
        let url = self.urls.tile_url(request)?;
        log::trace!("Loading tile {} of {} from url {url}", request.key, request.layer);

        let bytes = self.platform_service.load_bytes_from_url(&url).await?;
        log::trace!("Tile {} loaded. Byte size: {}", request.key, bytes.len());

        Ok(bytes)
    }

    async fn load_style(
        &self,
        _style_id: &str,
        _style_type: Option<&str>,
    ) -> Result<Bytes, KartaError> {
        let url = self.urls.style_url()?;
        self.platform_service.load_bytes_from_url(&url).await
    }

    async fn load_metadata(&self, layer: &DataLayerId) -> Result<Bytes, KartaError> {
        let url = self.urls.metadata_url(layer)?;
        self.platform_service.load_bytes_from_url(&url).await
    }

    async fn load_asset(&self, kind: AssetKind, name: &str) -> Result<Bytes, KartaError> {
        let url = self.urls.asset_url(kind, name)?;
        self.platform_service.load_bytes_from_url(&url).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::tile::TileKey;

    fn templates() -> UrlTemplates {
        UrlTemplates::from_config(&EngineConfig {
            tile_url: "https://example.com/{key}/{value}/{z}/{x}/{y}.bin".into(),
            style_url: "https://example.com/styles/{style_id}.json?type={type}".into(),
            assets_url: "https://example.com/{key}s/{value}".into(),
            style_type: Some("night".into()),
            ..Default::default()
        })
    }

    #[test]
    fn expands_templates() {
        let urls = templates();
        let request = TileRequest {
            layer: DataLayerId::new("roads", "major"),
            key: TileKey::new(3, 5, 4, 6),
        };

        assert_eq!(
            urls.tile_url(&request).expect("valid template"),
            "https://example.com/roads/major/4/3/5.bin"
        );
        assert_eq!(
            urls.style_url().expect("valid template"),
            "https://example.com/styles/default.json?type=night"
        );
        assert_eq!(
            urls.asset_url(AssetKind::Icon, "pin.png")
                .expect("valid template"),
            "https://example.com/icons/pin.png"
        );
    }

    #[test]
    fn missing_template_is_not_found() {
        assert_matches!(
            templates().metadata_url(&DataLayerId::new("a", "b")),
            Err(KartaError::NotFound)
        );
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let urls = UrlTemplates::from_config(&EngineConfig {
            style_url: "https://example.com/{unknown}".into(),
            ..Default::default()
        });
        assert_matches!(urls.style_url(), Err(KartaError::Generic(_)));
    }
}
