//! Item-to-Arrow Encoder (C3).
//!
//! Turns a batch of normalized items into one [`RecordBatch`]: non-geometry
//! fields go through `arrow-json`'s schema inference and decoder (so typed
//! timestamp columns fall out of RFC-3339 strings for free, the same trick
//! `TableBuilder::add_items` uses), and every geometry path collected by
//! [`crate::normalize`] becomes its own `geoarrow.wkb`-tagged binary column.

use crate::config::Config;
use crate::normalize::{self, Normalized};
use crate::timestamp::TIME_UNIT;
use crate::wkb::GEOARROW_WKB_EXTENSION_NAME;
use crate::{Error, Item, Result};
use arrow_array::{RecordBatch, builder::BinaryBuilder};
use arrow_cast::cast;
use arrow_json::ReaderBuilder;
use arrow_schema::{DataType, Field, Schema, SchemaBuilder, SchemaRef};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The schema-level metadata key recording the internal table format
/// version (distinct from the GeoParquet file metadata written by
/// [`crate::geoparquet`]).
pub const VERSION_KEY: &str = "stac:geoparquet_version";

/// The internal table format version.
pub const VERSION: &str = "1.0.0";

/// Encodes a non-empty batch of items into one [`RecordBatch`].
///
/// If `conform_to` is given, the result is cast and reordered to exactly
/// that schema (the `FirstBatch` and `Provided` schema strategies need
/// this); fields present in `conform_to` but absent from this batch are
/// filled with nulls.
pub fn encode_items(
    items: Vec<Item>,
    config: &Config,
    conform_to: Option<&SchemaRef>,
) -> Result<RecordBatch> {
    if items.is_empty() {
        return Err(Error::NoItems);
    }

    let mut flats = Vec::with_capacity(items.len());
    // Column name -> (arrow-side index within each row's geometries, in
    // insertion order across the whole batch).
    let mut geometry_columns: BTreeMap<String, Vec<Option<Vec<u8>>>> = BTreeMap::new();
    let row_count = items.len();

    for (row, item) in items.into_iter().enumerate() {
        let Normalized { flat, geometries } = normalize::normalize(item, config)?;
        for (path, bytes) in geometries {
            let column = geometry_columns
                .entry(path.column_name())
                .or_insert_with(|| vec![None; row]);
            column.push(Some(bytes));
        }
        // Any geometry column that didn't appear on this row needs a null
        // placeholder so all columns stay aligned with `row`.
        for column in geometry_columns.values_mut() {
            if column.len() == row {
                column.push(None);
            }
        }
        flats.push(serde_json::Value::Object(flat));
    }
    for column in geometry_columns.values_mut() {
        while column.len() < row_count {
            column.push(None);
        }
    }

    let inferred = arrow_json::reader::infer_json_schema_from_iterator(flats.iter().map(Ok))?;
    let mut schema_builder = SchemaBuilder::new();
    for field in inferred.fields() {
        if config.is_timestamp_field(field.name()) {
            schema_builder.push(Field::new(
                field.name(),
                DataType::Timestamp(TIME_UNIT, Some("UTC".into())),
                true,
            ));
        } else if let Some(coercion) = config
            .property_coercions
            .iter()
            .find(|c| c.name == field.name() && matches!(field.data_type(), DataType::Null))
        {
            schema_builder.push(Field::new(field.name(), coercion.data_type.clone(), true));
        } else {
            schema_builder.push(field.clone());
        }
    }
    let schema = Arc::new(schema_builder.finish());

    let mut decoder = ReaderBuilder::new(schema.clone()).build_decoder()?;
    decoder.serialize(&flats)?;
    let record_batch = decoder.flush()?.ok_or(Error::NoItems)?;

    let record_batch = append_geometry_columns(record_batch, geometry_columns)?;
    let record_batch = with_version_metadata(record_batch);

    match conform_to {
        Some(target) => conform(record_batch, target),
        None => Ok(record_batch),
    }
}

fn append_geometry_columns(
    record_batch: RecordBatch,
    geometry_columns: BTreeMap<String, Vec<Option<Vec<u8>>>>,
) -> Result<RecordBatch> {
    let mut schema_builder = SchemaBuilder::from(&*record_batch.schema());
    let mut columns = record_batch.columns().to_vec();
    for (name, values) in geometry_columns {
        let mut builder = BinaryBuilder::with_capacity(values.len(), 0);
        for value in &values {
            match value {
                Some(bytes) => builder.append_value(bytes),
                None => builder.append_null(),
            }
        }
        let array = builder.finish();
        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "ARROW:extension:name".to_string(),
            GEOARROW_WKB_EXTENSION_NAME.to_string(),
        );
        metadata.insert(
            "ARROW:extension:metadata".to_string(),
            serde_json::json!({"crs": crate::wkb::crs_for_column(&name)}).to_string(),
        );
        let field = Field::new(&name, DataType::Binary, true).with_metadata(metadata);
        schema_builder.push(field);
        columns.push(Arc::new(array));
    }
    let schema = Arc::new(schema_builder.finish());
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn with_version_metadata(record_batch: RecordBatch) -> RecordBatch {
    let mut schema_builder = SchemaBuilder::from(&*record_batch.schema());
    schema_builder
        .metadata_mut()
        .insert(VERSION_KEY.to_string(), VERSION.to_string());
    let schema = Arc::new(schema_builder.finish());
    record_batch
        .with_schema(schema)
        .expect("same fields, only metadata changed")
}

/// Casts and reorders `record_batch` to exactly match `target`, filling
/// any field absent from `record_batch` with an all-null column.
///
/// Grounded in the original source's `update_batch_schema`, generalized
/// here into the `FirstBatch`/`Provided` schema strategies' per-batch
/// conformance step (SPEC_FULL.md §F).
pub fn conform(record_batch: RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    let row_count = record_batch.num_rows();
    let mut columns = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        match record_batch.schema().column_with_name(field.name()) {
            Some((index, source_field)) => {
                let column = record_batch.column(index);
                if source_field.data_type() == field.data_type() {
                    columns.push(column.clone());
                } else {
                    columns.push(cast(column, field.data_type())?);
                }
            }
            None => columns.push(arrow_array::new_null_array(field.data_type(), row_count)),
        }
    }
    let schema: SchemaRef = Arc::new(Schema::new_with_metadata(
        target.fields().clone(),
        target.metadata().clone(),
    ));
    Ok(RecordBatch::try_new(schema, columns)?)
}
