//! Bidirectional streaming conversion between row-oriented [STAC](https://stacspec.org/)
//! Item JSON and columnar [GeoParquet](https://geoparquet.org/).
//!
//! An [`Item`] is a `serde_json` object map: this crate works directly
//! against STAC's JSON representation rather than a typed `Item` struct, so
//! it never rejects an extension field it doesn't know about.
//!
//! # Reading items
//!
//! [`reader::ItemReader`] detects whether a file is NDJSON, a bare JSON
//! array, or a GeoJSON `FeatureCollection`, and yields items lazily either
//! way.
//!
//! # Encoding and decoding
//!
//! [`encode::encode_items`] turns a batch of items into an Arrow
//! [`arrow_array::RecordBatch`]; [`denormalize::denormalize_batch`] is its
//! inverse. [`orchestrator::run`] composes these across an entire item
//! stream under one of four [`orchestrator::SchemaStrategy`]s, to cope with
//! input whose properties vary batch to batch.
//!
//! # GeoParquet
//!
//! [`geoparquet::write_geoparquet`]/[`geoparquet::read_geoparquet`] frame
//! encoded batches as a single GeoParquet file, attaching the `"geo"` file
//! metadata the GeoParquet spec requires.
//!
//! # Putting it together
//!
//! [`api`] exposes the handful of entry points most callers need
//! (`items_to_batches`, `ndjson_to_parquet`, ...) built from the modules
//! above.

#![deny(
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_abi,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    noop_method_call,
    rust_2021_incompatible_closure_captures,
    rust_2021_prelude_collisions,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications
)]

pub mod api;
pub mod batch;
pub mod config;
pub mod denormalize;
pub mod encode;
pub mod error;
pub mod geoparquet;
pub mod normalize;
pub mod orchestrator;
pub mod reader;
pub mod schema;
pub mod timestamp;
pub mod wkb;

pub use config::Config;
pub use error::{Error, Result};

/// One STAC Item, as a bare JSON object map.
///
/// This crate deliberately avoids a typed `Item` struct: STAC items carry
/// arbitrary extension fields under `properties`, and round-tripping those
/// losslessly through a fixed set of struct fields is exactly the problem
/// this crate exists to solve at the column level instead.
pub type Item = serde_json::Map<String, serde_json::Value>;
