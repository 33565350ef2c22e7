//! Geometry ⇄ WKB conversion and the geometry-path registry (Open Question 3).
//!
//! A "geometry path" is anywhere in an item that carries a GeoJSON geometry
//! and should round-trip through a `geoarrow.wkb`-tagged binary column: the
//! top-level `geometry`, and any `proj:geometry` the projection extension
//! attaches to `properties` or an individual asset.

use crate::config::{Config, GeometryPathTemplate};
use crate::{Error, Result};
use geo_traits::to_geo::ToGeoGeometry;
use serde_json::{Map, Value};

/// The GeoArrow extension name written to a geometry column's field metadata.
pub const GEOARROW_WKB_EXTENSION_NAME: &str = "geoarrow.wkb";

/// The column name of the primary geometry column.
pub const PRIMARY_GEOMETRY_COLUMN: &str = "geometry";

/// The WGS84 PROJJSON `crs` value written for the primary `geometry`
/// column, matching `WGS84_CRS_JSON` in the original source's `_crs.py`
/// (`pyproj.CRS.from_epsg(4326).to_json_dict()`). Secondary geometry
/// columns (`proj:geometry`, wherever it appears) carry `crs: null`
/// instead, since their CRS is asset/collection-specific and not assumed
/// to be WGS84.
pub fn wgs84_crs_json() -> Value {
    serde_json::json!({
        "$schema": "https://proj.org/schemas/v0.7/projjson.schema.json",
        "type": "GeographicCRS",
        "name": "WGS 84",
        "datum_ensemble": {
            "name": "World Geodetic System 1984 ensemble",
            "members": [
                {"name": "World Geodetic System 1984 (Transit)", "id": {"authority": "EPSG", "code": 1166}},
                {"name": "World Geodetic System 1984 (G730)", "id": {"authority": "EPSG", "code": 1152}},
                {"name": "World Geodetic System 1984 (G873)", "id": {"authority": "EPSG", "code": 1153}},
                {"name": "World Geodetic System 1984 (G1150)", "id": {"authority": "EPSG", "code": 1154}},
                {"name": "World Geodetic System 1984 (G1674)", "id": {"authority": "EPSG", "code": 1155}},
                {"name": "World Geodetic System 1984 (G1762)", "id": {"authority": "EPSG", "code": 1156}},
                {"name": "World Geodetic System 1984 (G2139)", "id": {"authority": "EPSG", "code": 1309}}
            ],
            "ellipsoid": {
                "name": "WGS 84",
                "semi_major_axis": 6378137,
                "inverse_flattening": 298.257223563
            },
            "accuracy": "2.0",
            "id": {"authority": "EPSG", "code": 6326}
        },
        "coordinate_system": {
            "subtype": "ellipsoidal",
            "axis": [
                {"name": "Geodetic latitude", "abbreviation": "Lat", "direction": "north", "unit": "degree"},
                {"name": "Geodetic longitude", "abbreviation": "Lon", "direction": "east", "unit": "degree"}
            ]
        },
        "scope": "Horizontal component of 3D system.",
        "area": "World.",
        "bbox": {
            "south_latitude": -90,
            "west_longitude": -180,
            "north_latitude": 90,
            "east_longitude": 180
        },
        "id": {"authority": "EPSG", "code": 4326}
    })
}

/// The `crs` value for a geometry column named `column`: the WGS84
/// PROJJSON for the primary `geometry` column, `null` for every other
/// geometry column (`proj:geometry` paths, whose CRS is not assumed).
pub fn crs_for_column(column: &str) -> Value {
    if column == PRIMARY_GEOMETRY_COLUMN {
        wgs84_crs_json()
    } else {
        Value::Null
    }
}

/// Encodes a GeoJSON geometry `Value` as ISO WKB bytes.
pub fn encode(value: Value) -> Result<Vec<u8>> {
    let geometry = geojson::Geometry::from_json_value(value)?;
    let geometry = geo_types::Geometry::try_from(geometry)?;
    let mut buf = Vec::new();
    wkb::writer::write_geometry(&mut buf, &geometry, &Default::default())
        .map_err(Error::Wkb)?;
    Ok(buf)
}

/// Decodes WKB bytes back to a GeoJSON geometry `Value`.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let parsed = wkb::reader::read_wkb(bytes)?;
    let geometry = parsed.to_geometry();
    let value = geojson::Value::from(&geometry);
    Ok(serde_json::to_value(geojson::Geometry::new(value))?)
}

/// A concrete field path within an item, resolved from a
/// [`GeometryPathTemplate`] against that item's actual `assets` keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeometryPath {
    /// The top-level `geometry` key.
    Geometry,
    /// `properties.<field>`.
    Property(String),
    /// `assets.<asset key>.<field>`.
    Asset(String, String),
}

/// Prefix used for the flattened column name of an asset-level geometry
/// path, so it can be routed back under the right asset key on the way out.
/// See [`GeometryPath::column_name`] and [`crate::denormalize`].
pub const ASSET_GEOMETRY_PREFIX: &str = "assets:";

impl GeometryPath {
    /// The flattened column name this path is stored under once encoded.
    ///
    /// `properties.<field>` paths use the bare field name, since they
    /// naturally re-nest under `properties` the same way any other
    /// promoted property does. Asset paths use a `assets:<asset>:<field>`
    /// name, since two different assets may carry the same field name and
    /// they don't share the generic re-nesting path.
    pub fn column_name(&self) -> String {
        match self {
            GeometryPath::Geometry => "geometry".to_string(),
            GeometryPath::Property(field) => field.clone(),
            GeometryPath::Asset(asset, field) => {
                format!("{ASSET_GEOMETRY_PREFIX}{asset}:{field}")
            }
        }
    }

    /// Removes and returns the JSON value at this path from a flattened item.
    pub fn take_from(&self, item: &mut Map<String, Value>) -> Option<Value> {
        match self {
            GeometryPath::Geometry => item.remove("geometry"),
            GeometryPath::Property(field) => item
                .get_mut("properties")
                .and_then(Value::as_object_mut)
                .and_then(|props| props.remove(field.as_str())),
            GeometryPath::Asset(asset, field) => item
                .get_mut("assets")
                .and_then(Value::as_object_mut)
                .and_then(|assets| assets.get_mut(asset.as_str()))
                .and_then(Value::as_object_mut)
                .and_then(|asset| asset.remove(field.as_str())),
        }
    }
}

/// Resolves the configured [`GeometryPathTemplate`]s against one item,
/// discovering e.g. which asset keys actually carry `proj:geometry`.
///
/// Mirrors the original Python's dynamic scan of `assets` for
/// `proj:geometry`, rather than assuming a fixed asset key.
pub fn resolve_paths(item: &Map<String, Value>, config: &Config) -> Vec<GeometryPath> {
    let mut paths = vec![GeometryPath::Geometry];
    for template in &config.geometry_path_templates {
        match template {
            GeometryPathTemplate::Property(field) => {
                if item
                    .get("properties")
                    .and_then(Value::as_object)
                    .is_some_and(|props| props.contains_key(*field))
                {
                    paths.push(GeometryPath::Property((*field).to_string()));
                }
            }
            GeometryPathTemplate::EveryAsset(field) => {
                if let Some(assets) = item.get("assets").and_then(Value::as_object) {
                    for (key, asset) in assets {
                        if asset
                            .as_object()
                            .is_some_and(|asset| asset.contains_key(*field))
                        {
                            paths.push(GeometryPath::Asset(key.clone(), (*field).to_string()));
                        }
                    }
                }
            }
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point() -> Value {
        json!({"type": "Point", "coordinates": [1.0, 2.0]})
    }

    #[test]
    fn round_trip_point() {
        let bytes = encode(point()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, point());
    }

    #[test]
    fn primary_column_gets_wgs84_crs() {
        let crs = crs_for_column("geometry");
        assert_eq!(crs["id"], json!({"authority": "EPSG", "code": 4326}));
    }

    #[test]
    fn secondary_columns_get_null_crs() {
        assert_eq!(crs_for_column("proj:geometry"), Value::Null);
        assert_eq!(crs_for_column("assets:data:proj:geometry"), Value::Null);
    }

    #[test]
    fn round_trip_polygon() {
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        });
        let bytes = encode(polygon.clone()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, polygon);
    }

    #[test]
    fn resolves_asset_proj_geometry() {
        let config = Config::default();
        let item: Map<String, Value> = serde_json::from_value(json!({
            "geometry": point(),
            "assets": {
                "thumbnail": {"href": "a.png"},
                "data": {"href": "a.tif", "proj:geometry": point()},
            },
        }))
        .unwrap();
        let paths = resolve_paths(&item, &config);
        assert!(paths.contains(&GeometryPath::Geometry));
        assert!(paths.contains(&GeometryPath::Asset("data".to_string(), "proj:geometry".to_string())));
        assert!(!paths.iter().any(|p| matches!(p, GeometryPath::Asset(a, _) if a == "thumbnail")));
    }
}
