//! Round-trip API (C9): the small set of entry points most callers need,
//! composing every other module into item-stream ⇄ GeoParquet-file
//! conversions.

use crate::config::Config;
use crate::orchestrator::{self, Cancellation, SchemaStrategy};
use crate::{Item, Result, denormalize, geoparquet, reader};
use arrow_array::RecordBatch;
use std::io::Write;
use std::path::Path;

/// Encodes an in-memory sequence of items into record batches.
///
/// Chooses [`SchemaStrategy::FullFile`] since the whole sequence is already
/// materialized; every batch in the returned `Vec` shares one schema.
pub fn items_to_batches(items: Vec<Item>, config: &Config) -> Result<Vec<RecordBatch>> {
    orchestrator::run(
        items.into_iter().map(Ok),
        config,
        SchemaStrategy::FullFile,
        None,
    )
}

/// Reads NDJSON/JSON-array/FeatureCollection items from `path` and encodes
/// them into record batches under `strategy`.
pub fn ndjson_to_batches(
    path: impl AsRef<Path>,
    config: &Config,
    strategy: SchemaStrategy,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<RecordBatch>> {
    let file = std::fs::File::open(path)?;
    let items = reader::ItemReader::detect(file)?;
    orchestrator::run(items, config, strategy, cancellation)
}

/// Decodes every record batch back into items, in order.
pub fn batches_to_items(batches: Vec<RecordBatch>, config: &Config) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for batch in batches {
        items.extend(denormalize::denormalize_batch(batch, config)?);
    }
    Ok(items)
}

/// Writes every record batch back out as NDJSON, one item per line.
pub fn batches_to_ndjson(
    batches: Vec<RecordBatch>,
    config: &Config,
    mut writer: impl Write,
) -> Result<()> {
    for batch in batches {
        for item in denormalize::denormalize_batch(batch, config)? {
            serde_json::to_writer(&mut writer, &item)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Reads items from `input_path` and writes a single GeoParquet file to
/// `output_path`, end to end.
#[allow(clippy::too_many_arguments)]
pub fn ndjson_to_parquet(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &Config,
    strategy: SchemaStrategy,
    collection_id: Option<&str>,
    collections: Option<&[String]>,
    cancellation: Option<&Cancellation>,
) -> Result<()> {
    let batches = ndjson_to_batches(input_path, config, strategy, cancellation)?;
    write_parquet(output_path, &batches, config, collection_id, collections)
}

/// Writes already-encoded, schema-aligned record batches to a GeoParquet
/// file at `output_path`.
pub fn write_parquet(
    output_path: impl AsRef<Path>,
    batches: &[RecordBatch],
    config: &Config,
    collection_id: Option<&str>,
    collections: Option<&[String]>,
) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    geoparquet::write_geoparquet(file, batches, config, collection_id, collections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn item(id: &str) -> Item {
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
    fn round_trips_through_batches() {
        use assert_json_diff::{CompareMode, Config as DiffConfig, NumericMode, assert_json_matches};

        let config = Config::default();
        let before = vec![item("a"), item("b")];
        let batches = items_to_batches(before.clone(), &config).unwrap();
        let round_tripped = batches_to_items(batches, &config).unwrap();
        assert_eq!(round_tripped.len(), 2);
        for (before, after) in before.iter().zip(&round_tripped) {
            assert_json_matches!(
                serde_json::Value::Object(before.clone()),
                serde_json::Value::Object(after.clone()),
                DiffConfig::new(CompareMode::Strict).numeric_mode(NumericMode::AssumeFloat)
            );
        }
        assert_eq!(round_tripped[0]["id"], "a");
        assert_eq!(round_tripped[1]["id"], "b");
    }

    #[test]
    fn round_trips_to_ndjson() {
        let config = Config::default();
        let batches = items_to_batches(vec![item("a")], &config).unwrap();
        let mut buf = Vec::new();
        batches_to_ndjson(batches, &config, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(value["id"], "a");
    }

    #[test]
    fn round_trips_through_geoparquet_bytes() {
        let config = Config::default();
        let batches = items_to_batches(vec![item("a"), item("b")], &config).unwrap();
        let mut buf = Cursor::new(Vec::new());
        crate::geoparquet::write_geoparquet(
            &mut buf,
            &batches,
            &config,
            Some("test-collection"),
            None,
        )
        .unwrap();
        let read_back =
            crate::geoparquet::read_geoparquet(bytes::Bytes::from(buf.into_inner())).unwrap();
        let items = batches_to_items(read_back, &config).unwrap();
        assert_eq!(items.len(), 2);
    }
}
