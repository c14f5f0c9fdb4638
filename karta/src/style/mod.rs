//! Style documents and their evaluation against map objects.

use std::collections::HashMap;
use std::sync::Arc;

use karta_wkb::ObjectInfo;
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::KartaError;
use crate::tile::DataLayerId;
use crate::Color;

pub mod formula;
mod grid;
mod props;
mod random;

use formula::{EvalContext, Expr, Value};
pub use grid::grid_points;
pub use props::{
    CompositeOperation, DataRef, Filter, GridDef, LayerDef, LineCap, LineJoin, StyleDocument,
    StyleProps, TextPlacement,
};
pub use random::XorShift32;

/// Compiled style document.
pub struct Style {
    layers: Vec<StyleLayer>,
    background: Option<Color>,
    background_pattern: Option<String>,
}

impl Style {
    /// Parses a JSON style document.
    pub fn parse(json: &[u8], config: &EngineConfig) -> Result<Self, KartaError> {
        let document: StyleDocument =
            serde_json::from_slice(json).map_err(|e| KartaError::Style(e.to_string()))?;
        Ok(Self::new(document, config))
    }

    /// Compiles a style document. Layers missing from `Order` are not drawn.
    pub fn new(mut document: StyleDocument, config: &EngineConfig) -> Self {
        let mut layers = Vec::with_capacity(document.order.len());
        for name in &document.order {
            let Some(def) = document.layers.remove(name) else {
                log::warn!("Style layer {name} is listed in the order but not defined");
                continue;
            };

            layers.push(StyleLayer::new(name, def, config));
        }

        let background = document.background_color.map(|color| match document.background_alpha {
            Some(alpha) => color.with_opacity(alpha),
            None => color,
        });

        Self {
            layers,
            background,
            background_pattern: document.background_pattern_function,
        }
    }

    /// All layers in drawing order.
    pub fn layers(&self) -> &[StyleLayer] {
        &self.layers
    }

    /// Layers drawn at the given display zoom.
    pub fn eligible_layers<'a>(
        &'a self,
        zoom: f64,
        config: &'a EngineConfig,
    ) -> impl Iterator<Item = &'a StyleLayer> + 'a {
        let zoom = zoom + config.zoom_offset as f64;
        self.layers
            .iter()
            .filter(move |layer| layer.is_eligible(zoom, config.style_type.as_deref()))
    }

    /// Background color of the tiles.
    pub fn background(&self) -> Option<Color> {
        self.background
    }

    /// Name of the pattern drawn over the background.
    pub fn background_pattern(&self, zoom: f64) -> Option<String> {
        let expr = Expr::parse(self.background_pattern.as_deref()?)
            .map_err(|e| log::warn!("Invalid background pattern function: {e}"))
            .ok()?;
        let info = ObjectInfo::default();
        let mut rng = XorShift32::new(0);
        expr.eval(&mut EvalContext {
            info: &info,
            zoom,
            rng: &mut rng,
        })
        .as_text()
    }
}

/// Parsed formulas of a layer. Invalid formulas are stored as `None` so they are reported once.
type FormulaCache = Mutex<HashMap<String, Option<Arc<Expr>>, ahash::RandomState>>;

/// Style layer ready for drawing.
pub struct StyleLayer {
    name: String,
    def: LayerDef,
    data_layer: Option<DataLayerId>,
    formulas: FormulaCache,
}

impl StyleLayer {
    fn new(name: &str, mut def: LayerDef, config: &EngineConfig) -> Self {
        if let Some(style) = &mut def.style {
            style.scale(config);
        }
        for filter in &mut def.filters {
            filter.style.scale(config);
        }

        let data_layer = match (&def.grid, &def.data) {
            (Some(_), _) => None,
            (None, Some(data)) => Some(DataLayerId::new(
                data.key.as_deref().unwrap_or(name),
                data.value.as_deref().unwrap_or_default(),
            )),
            (None, None) => Some(DataLayerId::new(name, "")),
        };

        Self {
            name: name.to_string(),
            def,
            data_layer,
            formulas: Mutex::default(),
        }
    }

    /// Name of the layer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition of the layer with scaled sizes.
    pub fn definition(&self) -> &LayerDef {
        &self.def
    }

    /// Dataset the objects of the layer come from. `None` for grid layers.
    pub fn data_layer(&self) -> Option<&DataLayerId> {
        self.data_layer.as_ref()
    }

    /// True if the layer is enabled, `zoom` is inside of its zoom range and it belongs to the
    /// requested style type.
    pub fn is_eligible(&self, zoom: f64, style_type: Option<&str>) -> bool {
        let [min, max] = self.def.zoom_range;
        let type_matches = match (style_type, &self.def.layer_type) {
            (Some(requested), Some(layer_type)) => requested == layer_type,
            _ => true,
        };

        self.def.enable && zoom >= min && zoom <= max && type_matches
    }

    /// Style of the object: the style of the first filter whose condition holds, or the base
    /// style.
    pub fn resolve(&self, info: &ObjectInfo, zoom: f64) -> Option<&StyleProps> {
        let mut rng = XorShift32::new(object_seed(info));
        let mut ctx = EvalContext {
            info,
            zoom,
            rng: &mut rng,
        };

        self.def
            .filters
            .iter()
            .find(|filter| self.eval(&filter.condition, &mut ctx).is_truthy())
            .map(|filter| &filter.style)
            .or(self.def.style.as_ref())
    }

    /// Evaluates an attribute function of the layer for the object.
    pub fn attribute(&self, formula: &str, info: &ObjectInfo, zoom: f64) -> Value {
        let mut rng = XorShift32::new(object_seed(info));
        self.eval(
            formula,
            &mut EvalContext {
                info,
                zoom,
                rng: &mut rng,
            },
        )
    }

    fn eval(&self, formula: &str, ctx: &mut EvalContext) -> Value {
        let expr = {
            let mut formulas = self.formulas.lock();
            if let Some(expr) = formulas.get(formula) {
                expr.clone()
            } else {
                let expr = match Expr::parse(formula) {
                    Ok(expr) => Some(Arc::new(expr)),
                    Err(e) => {
                        log::warn!("Invalid formula {formula:?} in layer {}: {e}", self.name);
                        None
                    }
                };
                formulas.insert(formula.to_string(), expr.clone());
                expr
            }
        };

        expr.map_or(Value::Null, |expr| expr.eval(ctx))
    }
}

const FNV_OFFSET: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(mut hash: u32, bytes: &[u8]) -> u32 {
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic identifier of an object: its `Hash` attribute, or FNV-1a of its tags and center.
pub fn object_seed(info: &ObjectInfo) -> u32 {
    if let Some(hash) = info.hash {
        return hash;
    }

    let mut tags: Vec<_> = info.tags.iter().collect();
    tags.sort_by(|a, b| a.0.cmp(b.0));

    let mut hash = FNV_OFFSET;
    for (key, value) in tags {
        hash = fnv1a(hash, key.as_bytes());
        hash = fnv1a(hash, value.to_string().as_bytes());
    }
    hash = fnv1a(hash, &info.center.x.to_le_bytes());
    fnv1a(hash, &info.center.y.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use karta_wkb::TagValue;

    use super::*;

    const STYLE: &str = r##"{
        "Order": ["water", "roads", "night-only", "missing", "grid"],
        "BackgroundColor": "#FFFFFF",
        "BackgroundAlpha": 0.5,
        "Layers": {
            "water": {"ZoomRange": [0, 20], "Style": {"FillColor": "#0000FF"}},
            "roads": {
                "ZoomRange": [10, 18],
                "Data": {"Key": "transport", "Value": "roads"},
                "Style": {"StrokeColor": "#888888", "LineWidth": 1},
                "Filters": [
                    {
                        "Condition": "data.kind == 'motorway'",
                        "Style": {"StrokeColor": "#FF0000", "LineWidth": 3}
                    },
                    {"Condition": "data.lanes >", "Style": {"StrokeColor": "#00FF00"}},
                    {"Condition": "data.lanes >= 2", "Style": {"StrokeColor": "#0000FF"}}
                ]
            },
            "night-only": {"Type": "night", "Style": {"FillColor": "#000000"}},
            "grid": {"Grid": {"Step": 32}, "Enable": false},
            "unused": {}
        }
    }"##;

    fn style(config: &EngineConfig) -> Style {
        Style::parse(STYLE.as_bytes(), config).expect("valid style")
    }

    fn road(tags: &[(&str, TagValue)]) -> ObjectInfo {
        ObjectInfo {
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
            length: Some(10.0),
            ..Default::default()
        }
    }

    #[test]
    fn keeps_order_and_skips_undefined_layers() {
        let style = style(&EngineConfig::default());
        let names: Vec<_> = style.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["water", "roads", "night-only", "grid"]);
        assert_eq!(style.background(), Some(Color::rgba(255, 255, 255, 128)));
    }

    #[test]
    fn layer_eligibility() {
        let config = EngineConfig::default();
        let style = style(&config);
        let names = |zoom| {
            style
                .eligible_layers(zoom, &config)
                .map(|l| l.name().to_string())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(5.0), vec!["water", "night-only"]);
        assert_eq!(names(12.0), vec!["water", "roads", "night-only"]);

        let config = EngineConfig {
            zoom_offset: 3,
            style_type: Some("day".into()),
            ..Default::default()
        };
        let names: Vec<_> = style.eligible_layers(8.0, &config).map(|l| l.name()).collect();
        assert_eq!(names, vec!["water", "roads"]);
    }

    #[test]
    fn data_layers() {
        let style = style(&EngineConfig::default());
        assert_eq!(
            style.layers()[0].data_layer(),
            Some(&DataLayerId::new("water", ""))
        );
        assert_eq!(
            style.layers()[1].data_layer(),
            Some(&DataLayerId::new("transport", "roads"))
        );
        assert_eq!(style.layers()[3].data_layer(), None);
    }

    #[test]
    fn first_matching_filter_wins() {
        let style = style(&EngineConfig::default());
        let roads = &style.layers()[1];

        let motorway = road(&[
            ("kind", TagValue::String("motorway".into())),
            ("lanes", TagValue::Number(4.0)),
        ]);
        let wide = road(&[("lanes", TagValue::Number(2.0))]);
        let path = road(&[("kind", TagValue::String("path".into()))]);

        let paint = |info: &ObjectInfo| roads.resolve(info, 12.0).and_then(|s| s.stroke());
        assert_eq!(paint(&motorway), Some(Color::rgba(255, 0, 0, 255)));
        // The invalid condition never matches.
        assert_eq!(paint(&wide), Some(Color::rgba(0, 0, 255, 255)));
        assert_eq!(paint(&path), Some(Color::rgba(0x88, 0x88, 0x88, 255)));
    }

    #[test]
    fn attribute_functions() {
        let style = style(&EngineConfig::default());
        let info = road(&[("name", TagValue::String("Main".into()))]);
        let value = style.layers()[1].attribute("concat(data.name, ' st')", &info, 12.0);
        assert_eq!(value.as_text().as_deref(), Some("Main st"));
    }

    #[test]
    fn object_seed_is_stable() {
        let a = road(&[("name", TagValue::String("A".into()))]);
        let b = road(&[("name", TagValue::String("B".into()))]);
        assert_eq!(object_seed(&a), object_seed(&a.clone()));
        assert_ne!(object_seed(&a), object_seed(&b));

        let hashed = ObjectInfo {
            hash: Some(42),
            ..a
        };
        assert_eq!(object_seed(&hashed), 42);
    }
}
