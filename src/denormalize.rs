//! STAC Denormalizer (C6): the inverse of [`crate::normalize`] and
//! [`crate::encode`] — turns a [`RecordBatch`] back into a sequence of
//! items.
//!
//! Grounded in the teacher's `geoarrow::json::{record_batch_to_json_rows,
//! unflatten, convert_bbox}`: re-nest promoted properties, re-stringify
//! timestamps, turn the bbox struct back into a list, and drop any asset
//! slot that came back all-null (an item that simply didn't have that
//! asset key).

use crate::config::{Config, TOP_LEVEL_KEYS};
use crate::timestamp;
use crate::wkb::{self, ASSET_GEOMETRY_PREFIX};
use crate::{Error, Item, Result};
use arrow_array::{Array, RecordBatch, cast::AsArray};
use arrow_schema::{DataType, SchemaBuilder};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Turns one [`RecordBatch`] back into items.
pub fn denormalize_batch(record_batch: RecordBatch, config: &Config) -> Result<Vec<Item>> {
    check_timestamp_columns(&record_batch, config)?;
    let (stripped, geometry_columns) = extract_geometry_columns(record_batch)?;
    let mut rows = arrow_json::writer::record_batches_to_json_rows(&[&stripped])?;

    for (name, values) in &geometry_columns {
        for (row, value) in rows.iter_mut().zip(values) {
            let Some(value) = value else { continue };
            if let Some(asset_field) = name.strip_prefix(ASSET_GEOMETRY_PREFIX) {
                let Some((asset, field)) = asset_field.split_once(':') else {
                    continue;
                };
                if let Some(asset) = row
                    .get_mut("assets")
                    .and_then(Value::as_object_mut)
                    .and_then(|assets| assets.get_mut(asset))
                    .and_then(Value::as_object_mut)
                {
                    asset.insert(field.to_string(), value.clone());
                }
            } else {
                row.insert(name.clone(), value.clone());
            }
        }
    }

    rows.into_iter()
        .map(|row| unflatten(row, config))
        .collect::<Result<Vec<_>>>()
}

/// Rejects a timestamp-named column whose arrow type isn't one a timestamp
/// could plausibly have been encoded as (`spec.md` §7): a column the
/// schema labels as one of [`Config::timestamp_fields`] but that carries,
/// say, an `Int64` value, did not come out of this crate's own encoder and
/// isn't safe to re-stringify.
fn check_timestamp_columns(record_batch: &RecordBatch, config: &Config) -> Result<()> {
    for field in record_batch.schema().fields() {
        if config.is_timestamp_field(field.name())
            && !matches!(
                field.data_type(),
                DataType::Null | DataType::Utf8 | DataType::Timestamp(_, _)
            )
        {
            return Err(Error::UnsupportedTimestamp {
                name: field.name().clone(),
                data_type: field.data_type().clone(),
            });
        }
    }
    Ok(())
}

/// Removes every `geoarrow.wkb`-tagged column from `record_batch`, decoding
/// each value back to a GeoJSON geometry `Value`, row-aligned.
fn extract_geometry_columns(
    record_batch: RecordBatch,
) -> Result<(RecordBatch, Vec<(String, Vec<Option<Value>>)>)> {
    let schema = record_batch.schema();
    let mut keep_indices = Vec::new();
    let mut geometry_columns = Vec::new();
    for (index, field) in schema.fields().iter().enumerate() {
        if field.metadata().get("ARROW:extension:name").map(String::as_str)
            == Some(wkb::GEOARROW_WKB_EXTENSION_NAME)
        {
            let array = record_batch.column(index).as_binary::<i32>();
            let mut values = Vec::with_capacity(array.len());
            for i in 0..array.len() {
                if array.is_null(i) {
                    values.push(None);
                } else {
                    values.push(Some(wkb::decode(array.value(i))?));
                }
            }
            geometry_columns.push((field.name().clone(), values));
        } else {
            keep_indices.push(index);
        }
    }

    let mut schema_builder = SchemaBuilder::new();
    let mut columns = Vec::with_capacity(keep_indices.len());
    for index in keep_indices {
        schema_builder.push(schema.field(index).clone());
        columns.push(record_batch.column(index).clone());
    }
    for (key, value) in schema.metadata() {
        schema_builder.metadata_mut().insert(key.clone(), value.clone());
    }
    let stripped = RecordBatch::try_new(Arc::new(schema_builder.finish()), columns)?;
    Ok((stripped, geometry_columns))
}

fn unflatten(mut item: Map<String, Value>, config: &Config) -> Result<Map<String, Value>> {
    if let Some(assets) = item.get_mut("assets").and_then(Value::as_object_mut) {
        assets.retain(|_, asset| asset.is_object());
    }

    if let Some(bbox) = item.remove("bbox") {
        item.insert("bbox".to_string(), convert_bbox_from_struct(bbox));
    }

    let promoted: Vec<String> = item
        .keys()
        .filter(|key| !TOP_LEVEL_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();
    let mut properties = Map::new();
    for key in promoted {
        if let Some(value) = item.remove(&key) {
            if config.is_timestamp_field(&key) {
                if let Some(s) = value.as_str() {
                    let micros = timestamp::parse_to_micros(s)?;
                    properties.insert(key, Value::String(timestamp::format_micros(micros)?));
                } else if !value.is_null() {
                    properties.insert(key, value);
                }
            } else {
                properties.insert(key, value);
            }
        }
    }
    if !properties.is_empty() {
        item.insert("properties".to_string(), Value::Object(properties));
    }
    Ok(item)
}

fn convert_bbox_from_struct(value: Value) -> Value {
    let Value::Object(obj) = value else {
        return value;
    };
    let get = |key: &str| obj.get(key).and_then(Value::as_f64);
    match (get("xmin"), get("ymin"), get("xmax"), get("ymax")) {
        (Some(xmin), Some(ymin), Some(xmax), Some(ymax)) => {
            match (get("zmin"), get("zmax")) {
                (Some(zmin), Some(zmax)) => {
                    serde_json::json!([xmin, ymin, zmin, xmax, ymax, zmax])
                }
                _ => serde_json::json!([xmin, ymin, xmax, ymax]),
            }
        }
        _ => Value::Object(obj),
    }
}
