//! GeoParquet Writer/Reader framing (C8).
//!
//! Writes/reads the `"geo"` GeoParquet file metadata (`primary_column`,
//! per-column `encoding`/`geometry_types`/`bbox`/`crs`/`edges`/`covering`)
//! alongside the `"stac-geoparquet"` file metadata (`version`, optional
//! `collections`/`collection`), following `_create_geoparquet_metadata` in
//! the original source's `_to_parquet.py` and the teacher's `geoparquet.rs`
//! framing (`default_compression`, `WriterBuilder`/`Writer`,
//! `FromGeoparquet`/`IntoGeoparquet`-style entry points, though without
//! pulling in the separate `geoparquet` crate: this crate encodes every
//! geometry column as plain WKB binary, so the "geo" metadata is built
//! directly rather than delegated to a geometry-type-aware encoder).

use crate::config::Config;
use crate::encode::VERSION;
use crate::wkb;
use arrow_array::{Array, RecordBatch, cast::AsArray};
use arrow_schema::SchemaRef;
pub use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::ChunkReader;
use serde_json::{Map, Value, json};
use std::io::Write;

use crate::{Error, Result};

/// The minimum GeoParquet version that supports `covering` metadata.
const MIN_COVERING_VERSION: &str = "1.1.0";

/// Default stac-geoparquet compression: zstd level 15, matching the
/// teacher's `default_compression`.
pub fn default_compression() -> Compression {
    Compression::ZSTD(ZstdLevel::try_new(15).unwrap())
}

/// Writes a sequence of record batches (all sharing one schema) as a
/// GeoParquet file.
///
/// `collection_id` and `collections`, if given, populate the optional
/// `collection`/`collections` entries of the `"stac-geoparquet"` file
/// metadata (spec.md §4.8, §7): the legacy single-collection pointer and
/// its plural replacement, respectively. Passing both is the deprecated
/// shape the spec calls out — it's accepted, but emits a `tracing::warn!`,
/// since downstream readers may disagree on which one to trust.
pub fn write_geoparquet<W: Write + Send>(
    writer: W,
    batches: &[RecordBatch],
    config: &Config,
    collection_id: Option<&str>,
    collections: Option<&[String]>,
) -> Result<()> {
    let Some(schema) = batches.first().map(|b| b.schema()) else {
        return Err(Error::NoItems);
    };
    if !matches!(config.geoparquet_version.as_str(), "1.0.0" | "1.1.0") {
        return Err(Error::UnsupportedGeoParquetVersion(
            config.geoparquet_version.clone(),
        ));
    }

    let mut properties_builder = WriterProperties::builder();
    if let Some(compression) = config.compression {
        properties_builder = properties_builder.set_compression(compression);
    }
    let mut arrow_writer = ArrowWriter::try_new(writer, schema.clone(), Some(properties_builder.build()))?;

    for batch in batches {
        arrow_writer.write(batch)?;
    }

    let geo = build_geo_metadata(&schema, batches, config)?;
    arrow_writer.append_key_value_metadata(parquet::format::KeyValue::new(
        "geo".to_string(),
        Some(serde_json::to_string(&geo)?),
    ));
    let stac_geoparquet = build_stac_geoparquet_metadata(collection_id, collections);
    arrow_writer.append_key_value_metadata(parquet::format::KeyValue::new(
        "stac-geoparquet".to_string(),
        Some(serde_json::to_string(&stac_geoparquet)?),
    ));

    let _ = arrow_writer.close()?;
    Ok(())
}

/// Builds the `"stac-geoparquet"` file metadata document: `{version,
/// collections?, collection?}` (spec.md §4.8).
fn build_stac_geoparquet_metadata(
    collection_id: Option<&str>,
    collections: Option<&[String]>,
) -> Value {
    if collection_id.is_some() && collections.is_some() {
        tracing::warn!(
            "writing both the deprecated `collection` entry and `collections`; \
             readers may disagree on which to trust"
        );
    }
    let mut meta = json!({"version": VERSION});
    if let Some(collections) = collections {
        meta["collections"] = json!(collections);
    }
    if let Some(collection_id) = collection_id {
        meta["collection"] = json!(collection_id);
    }
    meta
}

fn build_geo_metadata(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    config: &Config,
) -> Result<Value> {
    let mut columns = Map::new();
    for field in schema.fields() {
        if field.metadata().get("ARROW:extension:name").map(String::as_str)
            != Some(wkb::GEOARROW_WKB_EXTENSION_NAME)
        {
            continue;
        }
        let (geometry_types, bbox) = geometry_summary(schema, batches, field.name())?;
        let mut column = json!({
            "encoding": "WKB",
            "geometry_types": geometry_types,
            "crs": wkb::crs_for_column(field.name()),
            "edges": "planar",
        });
        if let Some(bbox) = bbox {
            column["bbox"] = json!(bbox);
        }
        if field.name() == wkb::PRIMARY_GEOMETRY_COLUMN
            && config.geoparquet_version.as_str() >= MIN_COVERING_VERSION
        {
            column["covering"] = json!({
                "bbox": {
                    "xmin": ["bbox", "xmin"],
                    "ymin": ["bbox", "ymin"],
                    "xmax": ["bbox", "xmax"],
                    "ymax": ["bbox", "ymax"],
                }
            });
        }
        columns.insert(field.name().clone(), column);
    }

    Ok(json!({
        "version": config.geoparquet_version,
        "primary_column": "geometry",
        "columns": columns,
    }))
}

/// Scans every batch's WKB column to report the set of geometry types
/// present and an overall bounding box, for the `"geo"` metadata.
fn geometry_summary(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    column: &str,
) -> Result<(Vec<String>, Option<[f64; 4]>)> {
    let Some((index, _)) = schema.column_with_name(column) else {
        return Ok((Vec::new(), None));
    };
    let mut types = std::collections::BTreeSet::new();
    let mut bbox: Option<[f64; 4]> = None;
    for batch in batches {
        let array = batch.column(index).as_binary::<i32>();
        for i in 0..array.len() {
            if array.is_null(i) {
                continue;
            }
            let value = wkb::decode(array.value(i))?;
            if let Some(kind) = value.get("type").and_then(Value::as_str) {
                types.insert(kind.to_string());
            }
            if let Some(extent) = bounding_box(&value) {
                bbox = Some(match bbox {
                    Some(current) => union_bbox(current, extent),
                    None => extent,
                });
            }
        }
    }
    Ok((types.into_iter().collect(), bbox))
}

fn union_bbox(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]
}

fn bounding_box(geometry: &Value) -> Option<[f64; 4]> {
    let mut extent: Option<[f64; 4]> = None;
    walk_coordinates(geometry.get("coordinates")?, &mut |x, y| {
        extent = Some(match extent {
            Some(current) => union_bbox(current, [x, y, x, y]),
            None => [x, y, x, y],
        });
    });
    extent
}

fn walk_coordinates(value: &Value, visit: &mut impl FnMut(f64, f64)) {
    match value {
        Value::Array(items) => {
            if items.len() >= 2 && items.iter().all(Value::is_number) {
                if let (Some(x), Some(y)) = (items[0].as_f64(), items[1].as_f64()) {
                    visit(x, y);
                    return;
                }
            }
            for item in items {
                walk_coordinates(item, visit);
            }
        }
        _ => {}
    }
}

/// Reads every [`RecordBatch`] from a GeoParquet file.
///
/// The `"geo"` metadata is not currently re-validated on read (any WKB
/// binary column tagged `geoarrow.wkb` is treated as a geometry column
/// regardless of what the file's `"geo"` key claims); this is a Non-goal
/// carryover (no standalone GeoParquet reader outside this crate's own
/// write format is targeted).
pub fn read_geoparquet<R>(reader: R) -> Result<Vec<RecordBatch>>
where
    R: ChunkReader + 'static,
{
    let builder = ParquetRecordBatchReaderBuilder::try_new(reader)?;
    let reader = builder.build()?;
    reader.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_items;
    use serde_json::json;
    use std::io::Cursor;

    fn item(id: &str) -> crate::Item {
        serde_json::from_value(json!({
            "type": "Feature",
            "id": id,
            "bbox": [0.0, 0.0, 1.0, 1.0],
            "geometry": {"type": "Point", "coordinates": [0.5, 0.5]},
            "properties": {"datetime": "2020-01-01T00:00:00Z"},
            "assets": {},
            "links": [],
        }))
        .unwrap()
    }

    #[test]
    fn writes_geo_metadata_with_primary_column() {
        let config = Config::default();
        let batch = encode_items(vec![item("a")], &config, None).unwrap();
        let mut buf = Cursor::new(Vec::new());
        write_geoparquet(&mut buf, &[batch], &config, None, None).unwrap();
        let bytes = buf.into_inner();
        let reader =
            parquet::file::reader::SerializedFileReader::new(bytes::Bytes::from(bytes)).unwrap();
        let key_value = parquet::file::reader::FileReader::metadata(&reader)
            .file_metadata()
            .key_value_metadata()
            .unwrap()
            .iter()
            .find(|kv| kv.key == "geo")
            .unwrap();
        let value: Value = serde_json::from_str(key_value.value.as_deref().unwrap()).unwrap();
        assert_eq!(value["primary_column"], "geometry");
        assert_eq!(value["columns"]["geometry"]["geometry_types"][0], "Point");
        assert_eq!(value["columns"]["geometry"]["edges"], "planar");
        assert_eq!(
            value["columns"]["geometry"]["crs"]["id"],
            json!({"authority": "EPSG", "code": 4326})
        );
    }

    #[test]
    fn writes_stac_geoparquet_metadata() {
        let config = Config::default();
        let batch = encode_items(vec![item("a")], &config, None).unwrap();
        let mut buf = Cursor::new(Vec::new());
        write_geoparquet(
            &mut buf,
            &[batch],
            &config,
            Some("naip"),
            Some(&["naip".to_string(), "landsat".to_string()]),
        )
        .unwrap();
        let reader = parquet::file::reader::SerializedFileReader::new(bytes::Bytes::from(
            buf.into_inner(),
        ))
        .unwrap();
        let key_value = parquet::file::reader::FileReader::metadata(&reader)
            .file_metadata()
            .key_value_metadata()
            .unwrap()
            .iter()
            .find(|kv| kv.key == "stac-geoparquet")
            .unwrap();
        let value: Value = serde_json::from_str(key_value.value.as_deref().unwrap()).unwrap();
        assert_eq!(value["version"], VERSION);
        assert_eq!(value["collection"], "naip");
        assert_eq!(value["collections"], json!(["naip", "landsat"]));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut config = Config::default();
        config.geoparquet_version = "0.9.0".to_string();
        let batch = encode_items(vec![item("a")], &config, None).unwrap();
        let mut buf = Cursor::new(Vec::new());
        assert!(matches!(
            write_geoparquet(&mut buf, &[batch], &config, None, None),
            Err(Error::UnsupportedGeoParquetVersion(_))
        ));
    }

    #[test]
    fn round_trips_through_parquet() {
        let config = Config::default();
        let batch = encode_items(vec![item("a"), item("b")], &config, None).unwrap();
        let mut buf = Cursor::new(Vec::new());
        write_geoparquet(&mut buf, &[batch], &config, None, None).unwrap();
        let batches = read_geoparquet(bytes::Bytes::from(buf.into_inner())).unwrap();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
    }
}
