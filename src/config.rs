//! Policy knobs that the core pipeline consults but never hard-codes.
//!
//! See `SPEC_FULL.md` §D for the rationale (these resolve the spec's three
//! Open Questions).

use parquet::basic::{Compression, ZstdLevel};

/// The closed set of STAC fields coerced to typed timestamp columns.
///
/// This is [`Config::timestamp_fields`]'s default; callers implementing the
/// `timestamps` STAC extension can extend or replace it.
pub const DEFAULT_TIMESTAMP_FIELDS: [&str; 8] = [
    "datetime",
    "start_datetime",
    "end_datetime",
    "created",
    "updated",
    "expires",
    "published",
    "unpublished",
];

/// Canonical top-level STAC Item keys.
///
/// Any `properties` field sharing one of these names is a schema conflict
/// (spec.md §3, §4.5).
pub const TOP_LEVEL_KEYS: [&str; 9] = [
    "type",
    "stac_version",
    "stac_extensions",
    "id",
    "bbox",
    "geometry",
    "collection",
    "links",
    "assets",
];

/// A null-typed `properties` field that should be coerced to a concrete type
/// even though it carries no non-null evidence in the batch.
///
/// This is the policy hook that resolves Open Question 2: whether
/// `naip:year`/`proj:epsg`-style coercions belong in the core or a
/// per-collection adapter. We keep the mechanism in the core, but make the
/// list of coercions a configuration value rather than an inline match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyCoercion {
    /// The `properties` subfield name.
    pub name: &'static str,
    /// The arrow data type to coerce a null-typed column to.
    pub data_type: arrow_schema::DataType,
}

/// A path to a WKB-eligible geometry field, beyond the primary `geometry`
/// column.
///
/// Resolves Open Question 3: rather than hard-coding `properties.proj:geometry`
/// and `assets.*.proj:geometry`, the set of extra geometry paths is data
/// (here, templates matched against the actual `assets` keys present in a
/// batch). Grounded in the original Python's `_from_arrow.py`, which builds
/// its `geometry_paths` list by scanning `assets` for any key carrying
/// `proj:geometry` rather than assuming a fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryPathTemplate {
    /// `properties.<field>`.
    Property(&'static str),
    /// `assets.*.<field>`: checked against every asset key present.
    EveryAsset(&'static str),
}

/// Pipeline-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fields coerced to typed timestamp columns. Defaults to
    /// [`DEFAULT_TIMESTAMP_FIELDS`].
    pub timestamp_fields: Vec<String>,

    /// Null-only `properties` fields coerced to a concrete type during
    /// [`crate::schema::InferredSchema::manual_updates`].
    pub property_coercions: Vec<PropertyCoercion>,

    /// Additional geometry paths to encode/decode as WKB, beyond the
    /// primary `geometry` column.
    pub geometry_path_templates: Vec<GeometryPathTemplate>,

    /// Default batch size for the batcher and round-trip API (spec.md §4.2).
    pub chunk_size: usize,

    /// If true, bbox struct fields are stored as `Float32`, rounded outward
    /// so the box still covers the original extent.
    pub downcast_bbox: bool,

    /// GeoParquet schema version to write. One of `"1.0.0"` or `"1.1.0"`.
    pub geoparquet_version: String,

    /// Parquet compression codec.
    pub compression: Option<Compression>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timestamp_fields: DEFAULT_TIMESTAMP_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            property_coercions: vec![
                PropertyCoercion {
                    name: "proj:epsg",
                    data_type: arrow_schema::DataType::Int64,
                },
                PropertyCoercion {
                    name: "proj:wkt2",
                    data_type: arrow_schema::DataType::Utf8,
                },
            ],
            geometry_path_templates: vec![
                GeometryPathTemplate::Property("proj:geometry"),
                GeometryPathTemplate::EveryAsset("proj:geometry"),
            ],
            chunk_size: 65_536,
            downcast_bbox: false,
            geoparquet_version: "1.1.0".to_string(),
            compression: Some(Compression::ZSTD(ZstdLevel::try_new(15).unwrap())),
        }
    }
}

impl Config {
    /// Returns true if `name` is one of [`Config::timestamp_fields`].
    pub fn is_timestamp_field(&self, name: &str) -> bool {
        self.timestamp_fields.iter().any(|f| f == name)
    }
}
