//! STAC Normalizer (C4): promotes `properties` to the top level, converts
//! `bbox` to a struct-shaped value, and strips geometry paths out to be
//! encoded as WKB separately.
//!
//! Grounded in `_to_arrow.py`'s per-item preprocessing
//! (`_to_arrow.py::_to_arrow_schema`/`stac_items_to_arrow`) and the teacher's
//! `TableBuilder::add_items`, which performs the same promotion via
//! `item.into_flat_item(...)`.

use crate::config::{Config, TOP_LEVEL_KEYS};
use crate::wkb::{self, GeometryPath};
use crate::{Error, Item, Result};
use serde_json::{Map, Value, json};

/// One item, flattened for arrow-json ingestion, plus the WKB-encoded
/// geometries that were pulled out of it.
pub struct Normalized {
    /// The item with `properties` merged to the top level, `bbox` converted
    /// to a struct, and every geometry path removed.
    pub flat: Map<String, Value>,
    /// `(path, wkb bytes)` for each geometry path present (and non-null) on
    /// this item.
    pub geometries: Vec<(GeometryPath, Vec<u8>)>,
}

/// Normalizes one item.
pub fn normalize(mut item: Item, config: &Config) -> Result<Normalized> {
    let paths = wkb::resolve_paths(&item, config);
    let mut geometries = Vec::with_capacity(paths.len());
    for path in &paths {
        if let Some(value) = path.take_from(&mut item) {
            if !value.is_null() {
                geometries.push((path.clone(), wkb::encode(value)?));
            }
        }
    }

    if let Some(bbox) = item.remove("bbox") {
        if !bbox.is_null() {
            item.insert("bbox".to_string(), convert_bbox(bbox, config.downcast_bbox)?);
        }
    }

    if let Some(properties) = item.remove("properties") {
        let properties = match properties {
            Value::Object(properties) => properties,
            other => {
                return Err(Error::MalformedInput(format!(
                    "\"properties\" was not an object: {other}"
                )));
            }
        };
        for (key, value) in properties {
            if TOP_LEVEL_KEYS.contains(&key.as_str()) {
                return Err(Error::SchemaConflict(format!(
                    "properties.{key} collides with the top-level STAC key `{key}`"
                )));
            }
            item.insert(key, value);
        }
    }

    Ok(Normalized {
        flat: item,
        geometries,
    })
}

/// Converts a 4- or 6-element bbox array to a struct-shaped JSON value.
///
/// When `downcast` is set, each bound is narrowed to `f32` and nudged
/// outward by one ULP so the box still covers the original extent,
/// mirroring `_convert_bbox_to_struct(..., downcast=True)` in the original
/// Python.
pub fn convert_bbox(value: Value, downcast: bool) -> Result<Value> {
    let array = value
        .as_array()
        .ok_or_else(|| Error::MalformedInput("bbox must be a JSON array".to_string()))?;
    let numbers = array
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| Error::MalformedInput("bbox values must be numbers".to_string()))
        })
        .collect::<Result<Vec<f64>>>()?;

    let bound = |v: f64, is_max: bool| -> Value {
        if downcast {
            json!(widen_f32(v, is_max))
        } else {
            json!(v)
        }
    };

    match numbers.len() {
        4 => Ok(json!({
            "xmin": bound(numbers[0], false),
            "ymin": bound(numbers[1], false),
            "xmax": bound(numbers[2], true),
            "ymax": bound(numbers[3], true),
        })),
        6 => Ok(json!({
            "xmin": bound(numbers[0], false),
            "ymin": bound(numbers[1], false),
            "zmin": bound(numbers[2], false),
            "xmax": bound(numbers[3], true),
            "ymax": bound(numbers[4], true),
            "zmax": bound(numbers[5], true),
        })),
        _ => Err(Error::InvalidBbox(numbers)),
    }
}

/// Narrows `v` to `f32`, nudging outward by one ULP if the narrowing
/// shrank the extent, so the resulting box still covers `v`.
fn widen_f32(v: f64, is_max: bool) -> f32 {
    let narrowed = v as f32;
    let shrank = if is_max {
        (narrowed as f64) < v
    } else {
        (narrowed as f64) > v
    };
    if shrank {
        next_after_f32(narrowed, is_max)
    } else {
        narrowed
    }
}

fn next_after_f32(x: f32, towards_positive: bool) -> f32 {
    if x == 0.0 {
        return if towards_positive {
            f32::from_bits(1)
        } else {
            f32::from_bits(0x8000_0001)
        };
    }
    let bits = x.to_bits();
    let next_bits = if (x > 0.0) == towards_positive {
        bits + 1
    } else {
        bits - 1
    };
    f32::from_bits(next_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_properties() {
        let item: Item = serde_json::from_value(json!({
            "id": "a",
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
            "properties": {"datetime": "2020-01-01T00:00:00Z", "eo:cloud_cover": 10},
        }))
        .unwrap();
        let config = Config::default();
        let normalized = normalize(item, &config).unwrap();
        assert_eq!(normalized.flat.get("eo:cloud_cover"), Some(&json!(10)));
        assert!(normalized.flat.get("properties").is_none());
        assert_eq!(normalized.geometries.len(), 1);
    }

    #[test]
    fn rejects_property_collision() {
        let item: Item = serde_json::from_value(json!({
            "id": "a",
            "properties": {"id": "collides"},
        }))
        .unwrap();
        let config = Config::default();
        assert!(matches!(
            normalize(item, &config),
            Err(Error::SchemaConflict(_))
        ));
    }

    #[test]
    fn bbox_to_struct_2d() {
        let value = convert_bbox(json!([1.0, 2.0, 3.0, 4.0]), false).unwrap();
        assert_eq!(value, json!({"xmin": 1.0, "ymin": 2.0, "xmax": 3.0, "ymax": 4.0}));
    }

    #[test]
    fn bbox_to_struct_3d() {
        let value = convert_bbox(json!([1.0, 2.0, 0.0, 3.0, 4.0, 10.0]), false).unwrap();
        assert_eq!(
            value,
            json!({"xmin": 1.0, "ymin": 2.0, "zmin": 0.0, "xmax": 3.0, "ymax": 4.0, "zmax": 10.0})
        );
    }

    #[test]
    fn bbox_invalid_length() {
        assert!(matches!(
            convert_bbox(json!([1.0, 2.0]), false),
            Err(Error::InvalidBbox(_))
        ));
    }

    #[test]
    fn downcast_widens_outward() {
        let value = convert_bbox(json!([0.1, 0.1, 0.2, 0.2]), true).unwrap();
        let xmin = value["xmin"].as_f64().unwrap();
        let xmax = value["xmax"].as_f64().unwrap();
        assert!(xmin <= 0.1);
        assert!(xmax >= 0.2);
    }
}
