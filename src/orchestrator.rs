//! Schema Strategy Orchestrator (C7): turns a lazy item sequence into a
//! sequence of [`RecordBatch`]es that all share one fixed schema.
//!
//! The spec names four strategies (`spec.md` §4.7); which one is right
//! depends on whether the caller already knows the target schema, is
//! willing to hold the whole file in memory, or needs to stream arbitrarily
//! large input with bounded memory at the cost of a second pass over disk.

use crate::batch::batched;
use crate::config::Config;
use crate::encode::{conform, encode_items};
use crate::schema::InferredSchema;
use crate::{Error, Item, Result};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// How the orchestrator settles on the one schema every output batch will
/// share.
#[derive(Debug, Clone)]
pub enum SchemaStrategy {
    /// The caller already knows the schema; every batch is cast/padded to
    /// match it as it streams through, never materializing more than one
    /// batch at a time.
    Provided(SchemaRef),
    /// Take the first batch's inferred schema as the target for every
    /// subsequent batch. Streaming, but a later batch carrying a field the
    /// first batch never saw is a [`Error::SchemaConflict`], not a widen.
    FirstBatch,
    /// Read every item up front, infer a schema permissively unified across
    /// every batch, then conform each batch to it. Correct for arbitrary
    /// input but holds the whole input in memory as decoded batches.
    FullFile,
    /// Like `FullFile`, but each batch is spilled to a temporary Parquet
    /// file as it's encoded instead of held in memory, and re-read in a
    /// second pass once the unified schema is known. Bounded memory, cost
    /// of disk I/O and a temp directory.
    ChunksToDisk,
}

/// A cooperative cancellation flag, polled between batches (`spec.md` §5).
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// A fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Cancellation(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Takes effect the next time a batch boundary
    /// is polled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs the orchestrator, returning every output batch.
///
/// `items` need not be pre-batched; it is grouped internally using
/// [`Config::chunk_size`].
pub fn run(
    items: impl Iterator<Item = Result<Item>>,
    config: &Config,
    strategy: SchemaStrategy,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<RecordBatch>> {
    let batches = batched(items, config.chunk_size, None)?;
    match strategy {
        SchemaStrategy::Provided(schema) => run_provided(batches, config, schema, cancellation),
        SchemaStrategy::FirstBatch => run_first_batch(batches, config, cancellation),
        SchemaStrategy::FullFile => run_full_file(batches, config, cancellation),
        SchemaStrategy::ChunksToDisk => run_chunks_to_disk(batches, config, cancellation),
    }
}

fn poll(cancellation: Option<&Cancellation>) -> Result<()> {
    match cancellation {
        Some(token) => token.check(),
        None => Ok(()),
    }
}

fn run_provided(
    batches: impl Iterator<Item = Result<Vec<Item>>>,
    config: &Config,
    schema: SchemaRef,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<RecordBatch>> {
    let mut out = Vec::new();
    for batch in batches {
        poll(cancellation)?;
        let batch = encode_items(batch?, config, Some(&schema))?;
        tracing::debug!(rows = batch.num_rows(), "encoded batch (Provided)");
        out.push(batch);
    }
    Ok(out)
}

fn run_first_batch(
    batches: impl Iterator<Item = Result<Vec<Item>>>,
    config: &Config,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<RecordBatch>> {
    let mut out = Vec::new();
    let mut target: Option<SchemaRef> = None;
    for batch in batches {
        poll(cancellation)?;
        let batch = match &target {
            None => {
                let batch = encode_items(batch?, config, None)?;
                target = Some(batch.schema());
                batch
            }
            Some(schema) => encode_items(batch?, config, Some(schema))?,
        };
        tracing::debug!(rows = batch.num_rows(), "encoded batch (FirstBatch)");
        out.push(batch);
    }
    Ok(out)
}

fn run_full_file(
    batches: impl Iterator<Item = Result<Vec<Item>>>,
    config: &Config,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<RecordBatch>> {
    let mut natural = Vec::new();
    let mut inferred = InferredSchema::new();
    for batch in batches {
        poll(cancellation)?;
        let batch = encode_items(batch?, config, None)?;
        inferred.update(batch.schema().as_ref())?;
        natural.push(batch);
    }
    inferred.apply_coercions(config);
    let schema = inferred.into_schema()?;
    natural
        .into_iter()
        .map(|batch| {
            poll(cancellation)?;
            let batch = conform(batch, &schema)?;
            tracing::debug!(rows = batch.num_rows(), "conformed batch (FullFile)");
            Ok(batch)
        })
        .collect()
}

fn run_chunks_to_disk(
    batches: impl Iterator<Item = Result<Vec<Item>>>,
    config: &Config,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<RecordBatch>> {
    let dir = tempfile::tempdir()?;
    tracing::info!(path = ?dir.path(), "created ChunksToDisk spill directory");

    let mut inferred = InferredSchema::new();
    let mut chunk_paths = Vec::new();
    for (index, batch) in batches.enumerate() {
        poll(cancellation)?;
        let batch = encode_items(batch?, config, None)?;
        inferred.update(batch.schema().as_ref())?;
        let path = dir.path().join(format!("chunk-{index}.parquet"));
        let file = File::create(&path)?;
        let mut writer =
            ArrowWriter::try_new(file, batch.schema(), Some(WriterProperties::builder().build()))?;
        writer.write(&batch)?;
        writer.close()?;
        chunk_paths.push(path);
    }
    inferred.apply_coercions(config);
    let schema = inferred.into_schema()?;

    let mut out = Vec::new();
    for path in &chunk_paths {
        poll(cancellation)?;
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        for batch in reader {
            let batch = conform(batch?, &schema)?;
            tracing::debug!(rows = batch.num_rows(), "conformed batch (ChunksToDisk)");
            out.push(batch);
        }
    }

    tracing::info!(path = ?dir.path(), "tearing down ChunksToDisk spill directory");
    drop(dir);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, cloud_cover: Option<f64>) -> Result<Item> {
        let mut properties = serde_json::Map::new();
        properties.insert("datetime".to_string(), json!("2020-01-01T00:00:00Z"));
        if let Some(cloud_cover) = cloud_cover {
            properties.insert("eo:cloud_cover".to_string(), json!(cloud_cover));
        }
        Ok(serde_json::from_value(json!({
            "type": "Feature",
            "id": id,
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]},
            "properties": properties,
            "assets": {},
            "links": [],
        }))
        .unwrap())
    }

    #[test]
    fn full_file_unifies_across_batches() {
        let mut config = Config::default();
        config.chunk_size = 1;
        let items = vec![item("a", Some(1.0)), item("b", None)];
        let batches = run(items.into_iter(), &config, SchemaStrategy::FullFile, None).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].schema(), batches[1].schema());
    }

    #[test]
    fn chunks_to_disk_matches_full_file() {
        let mut config = Config::default();
        config.chunk_size = 1;
        let items = || vec![item("a", Some(1.0)), item("b", None)].into_iter();
        let full_file = run(items(), &config, SchemaStrategy::FullFile, None).unwrap();
        let chunked = run(items(), &config, SchemaStrategy::ChunksToDisk, None).unwrap();
        assert_eq!(full_file[0].schema(), chunked[0].schema());
        assert_eq!(
            full_file.iter().map(|b| b.num_rows()).sum::<usize>(),
            chunked.iter().map(|b| b.num_rows()).sum::<usize>()
        );
    }

    #[test]
    fn cancellation_stops_the_run() {
        let config = Config::default();
        let token = Cancellation::new();
        token.cancel();
        let items = vec![item("a", Some(1.0))];
        let result = run(items.into_iter(), &config, SchemaStrategy::FullFile, Some(&token));
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
