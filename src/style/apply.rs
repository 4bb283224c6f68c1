//! Turning style layers into paint rules for a vector tile layer
//!
//! Covers the subset of the style language the relay draws: `fill`, `line`,
//! `circle` and `symbol` layers, legacy filters, constant and zoom-stop
//! numbers, and CSS-style colors.

use super::document::{StyleDocument, StyleLayer};
use super::sprite::SpriteAtlas;
use crate::core::constants::FALLBACK_FONT_FAMILY;
use crate::layers::vector_tile::VectorTileLayer;
use crate::prelude::Arc;
use crate::rendering::surface::Rgba;
use crate::tiles::decoder::Feature;
use crate::{MapError, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// Applies the style layers of one bucket to a vector tile layer
pub trait StyleApplier: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        layer: &mut VectorTileLayer,
        style: &StyleDocument,
        layer_ids: &[String],
        resolutions: &[f64],
        sprite: Option<&SpriteAtlas>,
        sprite_image_url: Option<&str>,
        font: &dyn Fn(&[String]) -> String,
    ) -> Result<()>;
}

/// Every font family is drawn with the generic sans-serif face
pub fn substitute_font(_families: &[String]) -> String {
    FALLBACK_FONT_FAMILY.to_string()
}

/// Fractional zoom level for a resolution on a decreasing resolution ladder
pub fn zoom_for_resolution(resolutions: &[f64], resolution: f64) -> f64 {
    let (Some(&first), Some(&last)) = (resolutions.first(), resolutions.last()) else {
        return 0.0;
    };
    if resolution >= first {
        return 0.0;
    }
    if resolution <= last {
        return (resolutions.len() - 1) as f64;
    }
    for (i, pair) in resolutions.windows(2).enumerate() {
        let (hi, lo) = (pair[0], pair[1]);
        if resolution <= hi && resolution > lo {
            return i as f64 + (hi / resolution).ln() / (hi / lo).ln();
        }
    }
    (resolutions.len() - 1) as f64
}

/// A number that is either constant or interpolated over zoom stops
#[derive(Debug, Clone, PartialEq)]
pub enum NumberValue {
    Constant(f64),
    Stops { base: f64, stops: Vec<(f64, f64)> },
}

impl NumberValue {
    fn parse(value: Option<&Value>, default: f64) -> Result<Self> {
        let Some(value) = value else {
            return Ok(NumberValue::Constant(default));
        };
        if let Some(n) = value.as_f64() {
            return Ok(NumberValue::Constant(n));
        }
        let stops = value
            .get("stops")
            .and_then(Value::as_array)
            .ok_or_else(|| MapError::Style(format!("unsupported number value: {value}")))?;
        let stops = stops
            .iter()
            .filter_map(|stop| Some((stop.get(0)?.as_f64()?, stop.get(1)?.as_f64()?)))
            .collect::<Vec<_>>();
        if stops.is_empty() {
            return Err(MapError::Style(format!("empty zoom stops: {value}")).into());
        }
        let base = value.get("base").and_then(Value::as_f64).unwrap_or(1.0);
        Ok(NumberValue::Stops { base, stops })
    }

    pub fn at(&self, zoom: f64) -> f64 {
        match self {
            NumberValue::Constant(v) => *v,
            NumberValue::Stops { base, stops } => {
                let (z0, v0) = stops[0];
                if zoom <= z0 {
                    return v0;
                }
                for pair in stops.windows(2) {
                    let ((za, va), (zb, vb)) = (pair[0], pair[1]);
                    if zoom <= zb {
                        let t = interpolation_factor(*base, zoom - za, zb - za);
                        return va + (vb - va) * t;
                    }
                }
                stops[stops.len() - 1].1
            }
        }
    }
}

fn interpolation_factor(base: f64, progress: f64, range: f64) -> f64 {
    if range == 0.0 {
        0.0
    } else if (base - 1.0).abs() < f64::EPSILON {
        progress / range
    } else {
        (base.powf(progress) - 1.0) / (base.powf(range) - 1.0)
    }
}

/// Parse `#rgb`, `#rrggbb`, `rgb()`, `rgba()`, `hsl()`, `hsla()` and a few names
pub fn parse_color(text: &str) -> Result<Rgba> {
    let text = text.trim();
    let invalid = || MapError::Style(format!("invalid color: {text}"));
    if let Some(hex) = text.strip_prefix('#') {
        let digits = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_string(),
            _ => return Err(invalid().into()),
        };
        let value = u32::from_str_radix(&digits, 16).map_err(|_| invalid())?;
        return Ok(Rgba::new((value >> 16) as u8, (value >> 8) as u8, value as u8, 255));
    }
    match text {
        "black" => return Ok(Rgba::BLACK),
        "white" => return Ok(Rgba::new(255, 255, 255, 255)),
        "transparent" => return Ok(Rgba::TRANSPARENT),
        _ => {}
    }
    let (name, args) = text
        .strip_suffix(')')
        .and_then(|t| t.split_once('('))
        .ok_or_else(invalid)?;
    let args = args
        .split(',')
        .map(|a| a.trim().trim_end_matches('%').parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    let alpha = |i: usize| args.get(i).copied().unwrap_or(1.0).clamp(0.0, 1.0);
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    match (name.trim(), args.len()) {
        ("rgb", 3) | ("rgba", 4) => Ok(Rgba::new(
            channel(args[0]),
            channel(args[1]),
            channel(args[2]),
            channel(alpha(3) * 255.0),
        )),
        ("hsl", 3) | ("hsla", 4) => {
            let [r, g, b] = hsl_to_rgb(args[0], args[1] / 100.0, args[2] / 100.0);
            Ok(Rgba::new(channel(r), channel(g), channel(b), channel(alpha(3) * 255.0)))
        }
        _ => Err(invalid().into()),
    }
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [f64; 3] {
    let h = h.rem_euclid(360.0) / 360.0;
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |mut t: f64| {
        t = t.rem_euclid(1.0);
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        v * 255.0
    };
    [hue(h + 1.0 / 3.0), hue(h), hue(h - 1.0 / 3.0)]
}

fn color_property(props: &serde_json::Map<String, Value>, key: &str, default: Rgba) -> Result<Rgba> {
    match props.get(key) {
        None => Ok(default),
        Some(Value::String(s)) => parse_color(s),
        // Zoom-dependent colors use the first stop
        Some(v) => v
            .get("stops")
            .and_then(|s| s.get(0))
            .and_then(|s| s.get(1))
            .and_then(Value::as_str)
            .map(parse_color)
            .unwrap_or_else(|| Err(MapError::Style(format!("unsupported color: {v}")).into())),
    }
}

fn opacity_property(props: &serde_json::Map<String, Value>, key: &str) -> f64 {
    props.get(key).and_then(Value::as_f64).unwrap_or(1.0)
}

/// Comparison operators of legacy filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Always,
    All(Vec<Filter>),
    Any(Vec<Filter>),
    None(Vec<Filter>),
    Has(String),
    NotHas(String),
    Compare { op: CompareOp, key: String, value: Value },
    In { key: String, values: Vec<Value>, negate: bool },
}

impl Filter {
    pub fn parse(value: Option<&Value>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Filter::Always);
        };
        let invalid = || MapError::Style(format!("unsupported filter: {value}"));
        let parts = value.as_array().ok_or_else(invalid)?;
        let (op, args) = parts.split_first().ok_or_else(invalid)?;
        let op = op.as_str().ok_or_else(invalid)?;
        let key = |i: usize| -> Result<String> { filter_key(args.get(i)).ok_or_else(|| invalid().into()) };
        let nested = || -> Result<Vec<Filter>> { args.iter().map(|a| Filter::parse(Some(a))).collect() };
        let compare = |op: CompareOp| -> Result<Filter> {
            Ok(Filter::Compare {
                op,
                key: key(0)?,
                value: args.get(1).cloned().ok_or_else(invalid)?,
            })
        };
        match op {
            "all" => Ok(Filter::All(nested()?)),
            "any" => Ok(Filter::Any(nested()?)),
            "none" => Ok(Filter::None(nested()?)),
            "has" => Ok(Filter::Has(key(0)?)),
            "!has" => Ok(Filter::NotHas(key(0)?)),
            "==" => compare(CompareOp::Eq),
            "!=" => compare(CompareOp::Ne),
            "<" => compare(CompareOp::Lt),
            "<=" => compare(CompareOp::Le),
            ">" => compare(CompareOp::Gt),
            ">=" => compare(CompareOp::Ge),
            "in" | "!in" => Ok(Filter::In {
                key: key(0)?,
                values: args[1..].to_vec(),
                negate: op == "!in",
            }),
            _ => Err(invalid().into()),
        }
    }

    pub fn evaluate(&self, feature: &Feature) -> bool {
        match self {
            Filter::Always => true,
            Filter::All(filters) => filters.iter().all(|f| f.evaluate(feature)),
            Filter::Any(filters) => filters.iter().any(|f| f.evaluate(feature)),
            Filter::None(filters) => !filters.iter().any(|f| f.evaluate(feature)),
            Filter::Has(key) => lookup(feature, key).is_some(),
            Filter::NotHas(key) => lookup(feature, key).is_none(),
            Filter::Compare { op, key, value } => {
                let actual = lookup(feature, key);
                match op {
                    CompareOp::Eq => actual.as_ref().is_some_and(|a| values_equal(a, value)),
                    CompareOp::Ne => !actual.as_ref().is_some_and(|a| values_equal(a, value)),
                    _ => actual
                        .as_ref()
                        .and_then(|a| compare_values(a, value))
                        .is_some_and(|ord| match op {
                            CompareOp::Lt => ord == Ordering::Less,
                            CompareOp::Le => ord != Ordering::Greater,
                            CompareOp::Gt => ord == Ordering::Greater,
                            _ => ord != Ordering::Less,
                        }),
                }
            }
            Filter::In { key, values, negate } => {
                let found = lookup(feature, key)
                    .is_some_and(|a| values.iter().any(|v| values_equal(&a, v)));
                found != *negate
            }
        }
    }
}

fn filter_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        // Expression form `["get", "name"]`
        Value::Array(parts) if parts.first().and_then(Value::as_str) == Some("get") => {
            parts.get(1)?.as_str().map(str::to_string)
        }
        Value::Array(parts) if parts.first().and_then(Value::as_str) == Some("geometry-type") => {
            Some("$type".to_string())
        }
        _ => None,
    }
}

fn lookup(feature: &Feature, key: &str) -> Option<Value> {
    if key == "$type" {
        return Some(Value::String(feature.geometry.type_name().to_string()));
    }
    feature.properties.get(key).cloned()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// How features of one style layer are drawn
#[derive(Debug, Clone, PartialEq)]
pub enum PaintRule {
    Fill {
        color: Rgba,
        outline: Option<Rgba>,
    },
    Line {
        color: Rgba,
        width: NumberValue,
    },
    Circle {
        color: Rgba,
        radius: NumberValue,
    },
    Symbol {
        /// Sprite icon name, may contain `{property}` placeholders
        icon: Option<String>,
        /// Label text field; labels are drawn as markers
        label: Option<String>,
        color: Rgba,
        size: NumberValue,
        font: String,
    },
}

impl PaintRule {
    pub fn is_symbol(&self) -> bool {
        matches!(self, PaintRule::Symbol { .. })
    }
}

/// Icon name for a feature, with `{property}` placeholders filled in
pub fn resolve_icon(template: &str, feature: &Feature) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(end) => {
                let key = &rest[start + 1..start + end];
                match feature.properties.get(key) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(v) if !v.is_null() => out.push_str(&v.to_string()),
                    _ => {}
                }
                rest = &rest[start + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub layer_id: String,
    pub source_layer: String,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub filter: Filter,
    pub paint: PaintRule,
}

impl StyleRule {
    pub fn applies_at(&self, zoom: f64) -> bool {
        zoom >= self.min_zoom && zoom < self.max_zoom
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        self.filter.evaluate(feature)
    }

    /// Build a rule, or `None` for layer types that are not drawn
    pub fn from_style_layer(layer: &StyleLayer, font: &dyn Fn(&[String]) -> String) -> Result<Option<Self>> {
        let Some(source_layer) = layer.source_layer.clone() else {
            return Ok(None);
        };
        let paint = &layer.paint;
        let layout = &layer.layout;
        let paint_rule = match layer.kind.as_str() {
            "fill" => PaintRule::Fill {
                color: color_property(paint, "fill-color", Rgba::BLACK)?
                    .with_opacity(opacity_property(paint, "fill-opacity")),
                outline: paint
                    .get("fill-outline-color")
                    .and_then(Value::as_str)
                    .map(parse_color)
                    .transpose()?,
            },
            "line" => PaintRule::Line {
                color: color_property(paint, "line-color", Rgba::BLACK)?
                    .with_opacity(opacity_property(paint, "line-opacity")),
                width: NumberValue::parse(paint.get("line-width"), 1.0)?,
            },
            "circle" => PaintRule::Circle {
                color: color_property(paint, "circle-color", Rgba::BLACK)?
                    .with_opacity(opacity_property(paint, "circle-opacity")),
                radius: NumberValue::parse(paint.get("circle-radius"), 5.0)?,
            },
            "symbol" => {
                let families = layout
                    .get("text-font")
                    .and_then(Value::as_array)
                    .map(|fonts| fonts.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_else(|| vec!["Open Sans Regular".to_string()]);
                PaintRule::Symbol {
                    icon: layout.get("icon-image").and_then(Value::as_str).map(str::to_string),
                    label: layout.get("text-field").and_then(Value::as_str).map(str::to_string),
                    color: color_property(paint, "text-color", Rgba::BLACK)?
                        .with_opacity(opacity_property(paint, "text-opacity")),
                    size: NumberValue::parse(layout.get("text-size"), 16.0)?,
                    font: font(&families),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(Self {
            layer_id: layer.id.clone(),
            source_layer,
            min_zoom: layer.minzoom.unwrap_or(0.0),
            max_zoom: layer.maxzoom.unwrap_or(f64::INFINITY),
            filter: Filter::parse(layer.filter.as_ref())?,
            paint: paint_rule,
        }))
    }
}

/// Applier for the built-in subset of the style language
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicStyleApplier;

impl StyleApplier for BasicStyleApplier {
    fn apply(
        &self,
        layer: &mut VectorTileLayer,
        style: &StyleDocument,
        layer_ids: &[String],
        resolutions: &[f64],
        sprite: Option<&SpriteAtlas>,
        sprite_image_url: Option<&str>,
        font: &dyn Fn(&[String]) -> String,
    ) -> Result<()> {
        let mut rules = Vec::with_capacity(layer_ids.len());
        for id in layer_ids {
            let Some(style_layer) = style.layer(id) else {
                log::warn!("style layer {} not found", id);
                continue;
            };
            if !style_layer.is_visible() {
                continue;
            }
            match StyleRule::from_style_layer(style_layer, font) {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => log::debug!("style layer {} ({}) is not drawn", id, style_layer.kind),
                Err(e) => log::warn!("skipping style layer {}: {}", id, e),
            }
        }
        log::debug!("layer {} gets {} rule(s)", layer.id(), rules.len());
        layer.set_resolutions(resolutions.to_vec());
        layer.set_sprite(sprite.cloned().map(Arc::new), sprite_image_url.map(str::to_string));
        layer.set_rules(rules);
        Ok(())
    }
}
