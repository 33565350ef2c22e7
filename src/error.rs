use thiserror::Error;

/// Error enum for crate-specific errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// JSON, or an item's geometry, bbox, or timestamp, could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A batch's schema could not be unified with the running schema, or a
    /// property name collided with a top-level STAC key.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    /// A timestamp column was typed as something other than null, string, or
    /// timestamp.
    #[error("unsupported timestamp column {name}: {data_type}")]
    UnsupportedTimestamp {
        /// The column name.
        name: String,
        /// The column's (unsupported) arrow data type.
        data_type: arrow_schema::DataType,
    },

    /// The requested GeoParquet schema version is not in the supported set.
    #[error("unsupported geoparquet version: {0}")]
    UnsupportedGeoParquetVersion(String),

    /// [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Cooperative cancellation was observed.
    #[error("pipeline cancelled")]
    Cancelled,

    /// [serde_json::Error]
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// [arrow_schema::ArrowError]
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),

    /// [parquet::errors::ParquetError]
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    /// [chrono::ParseError]
    #[error(transparent)]
    ChronoParse(#[from] chrono::ParseError),

    /// [geojson::Error]
    #[error(transparent)]
    Geojson(#[from] Box<geojson::Error>),

    /// [wkb::error::WkbError]
    #[error(transparent)]
    Wkb(#[from] wkb::error::WkbError),

    /// There are no items to encode.
    #[error("no items")]
    NoItems,

    /// A bounding box was neither 4 nor 6 numbers, or mixed dimension with
    /// others in the same input.
    #[error("invalid bbox (expected 4 or 6 numbers): {0:?}")]
    InvalidBbox(Vec<f64>),

    /// A JSON value was not an object where one was required.
    #[error("json value is not an object")]
    NotAnObject(serde_json::Value),
}

impl From<geojson::Error> for Error {
    fn from(err: geojson::Error) -> Self {
        Error::Geojson(Box::new(err))
    }
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;
