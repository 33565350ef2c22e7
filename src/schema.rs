//! Schema Inferencer (C4): accumulates a single fixed schema across many
//! batches under permissive-unification rules.
//!
//! Mirrors `pyarrow.unify_schemas(schemas, promote_options="permissive")` as
//! used by the original source's `arrow/_schema/ingest.py`: a null-typed
//! field promotes to whatever concrete type the other side has, numeric
//! types widen to their common supertype, and struct fields union with any
//! field missing from one side becoming nullable. Anything else is a
//! genuine conflict and fails closed with [`Error::SchemaConflict`].

use crate::config::{Config, PropertyCoercion};
use crate::{Error, Result};
use arrow_schema::{DataType, Field, FieldRef, Fields, Schema, SchemaRef};
use std::sync::Arc;

/// Accumulates a permissively-unified schema across many record batches.
#[derive(Debug, Default)]
pub struct InferredSchema {
    schema: Option<Schema>,
}

impl InferredSchema {
    /// An empty inferencer.
    pub fn new() -> Self {
        InferredSchema { schema: None }
    }

    /// Folds `schema` into the running unified schema.
    pub fn update(&mut self, schema: &Schema) -> Result<()> {
        self.schema = Some(match self.schema.take() {
            None => schema.clone(),
            Some(current) => unify_schemas(&current, schema)?,
        });
        Ok(())
    }

    /// Applies [`Config::property_coercions`] to any field that is still
    /// null-typed after folding in every batch (i.e. every batch saw only
    /// nulls for that property), matching the original's `manual_updates`
    /// pass in `arrow/_schema/models.py`.
    pub fn apply_coercions(&mut self, config: &Config) {
        let Some(schema) = self.schema.take() else {
            return;
        };
        let fields: Fields = schema
            .fields()
            .iter()
            .map(|field| coerce(field, &config.property_coercions))
            .collect();
        self.schema = Some(Schema::new_with_metadata(fields, schema.metadata().clone()));
    }

    /// Consumes the inferencer, returning the final schema.
    ///
    /// Errors if no batch was ever folded in.
    pub fn into_schema(self) -> Result<SchemaRef> {
        self.schema.map(Arc::new).ok_or(Error::NoItems)
    }
}

fn coerce(field: &FieldRef, coercions: &[PropertyCoercion]) -> FieldRef {
    if !matches!(field.data_type(), DataType::Null) {
        return field.clone();
    }
    match coercions.iter().find(|c| c.name == field.name()) {
        Some(coercion) => Arc::new(Field::new(field.name(), coercion.data_type.clone(), true)),
        None => field.clone(),
    }
}

/// Permissively unifies two schemas.
pub fn unify_schemas(a: &Schema, b: &Schema) -> Result<Schema> {
    let mut fields: Vec<FieldRef> = Vec::new();
    for field in a.fields() {
        match b.fields().find(field.name()) {
            Some((_, other)) => fields.push(unify_field(field, other)?),
            None => fields.push(Arc::new(field.as_ref().clone().with_nullable(true))),
        }
    }
    for field in b.fields() {
        if a.fields().find(field.name()).is_none() {
            fields.push(Arc::new(field.as_ref().clone().with_nullable(true)));
        }
    }
    let mut metadata = a.metadata().clone();
    metadata.extend(b.metadata().clone());
    Ok(Schema::new_with_metadata(fields, metadata))
}

fn unify_field(a: &FieldRef, b: &FieldRef) -> Result<FieldRef> {
    let data_type = unify_data_type(a.data_type(), b.data_type(), a.name())?;
    let nullable = a.nullable() || b.nullable() || a.data_type() != b.data_type();
    let mut metadata = a.metadata().clone();
    metadata.extend(b.metadata().clone());
    Ok(Arc::new(
        Field::new(a.name(), data_type, nullable).with_metadata(metadata),
    ))
}

/// The element field of any of arrow's three list variants.
fn list_item_field(data_type: &DataType) -> Option<&FieldRef> {
    match data_type {
        DataType::List(field) | DataType::LargeList(field) | DataType::FixedSizeList(field, _) => {
            Some(field)
        }
        _ => None,
    }
}

fn unify_data_type(a: &DataType, b: &DataType, field_name: &str) -> Result<DataType> {
    if a == b {
        return Ok(a.clone());
    }
    match (a, b) {
        (DataType::Null, other) | (other, DataType::Null) => Ok(other.clone()),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(widen_numeric(a, b)),
        (a, b) if list_item_field(a).is_some() && list_item_field(b).is_some() => {
            let item = unify_field(list_item_field(a).unwrap(), list_item_field(b).unwrap())?;
            if matches!(a, DataType::LargeList(_)) || matches!(b, DataType::LargeList(_)) {
                Ok(DataType::LargeList(item))
            } else {
                Ok(DataType::List(item))
            }
        }
        (DataType::Struct(a_fields), DataType::Struct(b_fields)) => {
            let mut fields: Vec<FieldRef> = Vec::new();
            for field in a_fields {
                match b_fields.find(field.name()) {
                    Some((_, other)) => fields.push(unify_field(field, other)?),
                    None => fields.push(Arc::new(field.as_ref().clone().with_nullable(true))),
                }
            }
            for field in b_fields {
                if a_fields.find(field.name()).is_none() {
                    fields.push(Arc::new(field.as_ref().clone().with_nullable(true)));
                }
            }
            Ok(DataType::Struct(fields.into()))
        }
        (DataType::Utf8, DataType::Utf8) => Ok(DataType::Utf8),
        _ => Err(Error::SchemaConflict(format!(
            "field `{field_name}` has incompatible types across batches: {a:?} vs {b:?}"
        ))),
    }
}

/// Widens two numeric arrow types to their common supertype: any float
/// wins over any int, and width widens to the larger of the two.
fn widen_numeric(a: &DataType, b: &DataType) -> DataType {
    fn rank(data_type: &DataType) -> (u8, u8) {
        use DataType::*;
        match data_type {
            Int8 | UInt8 => (0, 1),
            Int16 | UInt16 => (0, 2),
            Int32 | UInt32 => (0, 4),
            Int64 | UInt64 => (0, 8),
            Float32 => (1, 4),
            Float64 => (1, 8),
            _ => (0, 0),
        }
    }
    let (a_is_float, a_width) = rank(a);
    let (b_is_float, b_width) = rank(b);
    let is_float = a_is_float == 1 || b_is_float == 1;
    let width = a_width.max(b_width);
    match (is_float, width) {
        (true, w) if w <= 4 => DataType::Float32,
        (true, _) => DataType::Float64,
        (false, w) if w <= 4 => DataType::Int32,
        (false, _) => DataType::Int64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropertyCoercion;

    fn schema(fields: Vec<Field>) -> Schema {
        Schema::new(fields)
    }

    #[test]
    fn null_promotes_to_concrete_type() {
        let a = schema(vec![Field::new("x", DataType::Null, true)]);
        let b = schema(vec![Field::new("x", DataType::Utf8, false)]);
        let merged = unify_schemas(&a, &b).unwrap();
        assert_eq!(merged.field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn numerics_widen() {
        let a = schema(vec![Field::new("x", DataType::Int32, true)]);
        let b = schema(vec![Field::new("x", DataType::Float64, true)]);
        let merged = unify_schemas(&a, &b).unwrap();
        assert_eq!(merged.field(0).data_type(), &DataType::Float64);
    }

    #[test]
    fn lists_promote_item_type() {
        let a = schema(vec![Field::new(
            "stac_extensions",
            DataType::List(Arc::new(Field::new("item", DataType::Null, true))),
            true,
        )]);
        let b = schema(vec![Field::new(
            "stac_extensions",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        )]);
        let merged = unify_schemas(&a, &b).unwrap();
        let (_, item) = match merged.field(0).data_type() {
            DataType::List(item) => ((), item),
            other => panic!("expected a list, got {other:?}"),
        };
        assert_eq!(item.data_type(), &DataType::Utf8);
    }

    #[test]
    fn list_and_large_list_promote_to_large_list() {
        let a = schema(vec![Field::new(
            "tags",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        )]);
        let b = schema(vec![Field::new(
            "tags",
            DataType::LargeList(Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        )]);
        let merged = unify_schemas(&a, &b).unwrap();
        assert!(matches!(merged.field(0).data_type(), DataType::LargeList(_)));
    }

    #[test]
    fn missing_field_becomes_nullable() {
        let a = schema(vec![
            Field::new("x", DataType::Utf8, false),
            Field::new("y", DataType::Int32, false),
        ]);
        let b = schema(vec![Field::new("x", DataType::Utf8, false)]);
        let merged = unify_schemas(&a, &b).unwrap();
        let (_, y) = merged.fields().find("y").unwrap();
        assert!(y.is_nullable());
    }

    #[test]
    fn incompatible_types_conflict() {
        let a = schema(vec![Field::new("x", DataType::Utf8, true)]);
        let b = schema(vec![Field::new("x", DataType::Boolean, true)]);
        assert!(matches!(unify_schemas(&a, &b), Err(Error::SchemaConflict(_))));
    }

    #[test]
    fn coercion_applies_to_all_null_fields_only() {
        let mut inferred = InferredSchema::new();
        inferred
            .update(&schema(vec![Field::new("proj:epsg", DataType::Null, true)]))
            .unwrap();
        let config = Config {
            property_coercions: vec![PropertyCoercion {
                name: "proj:epsg",
                data_type: DataType::Int64,
            }],
            ..Config::default()
        };
        inferred.apply_coercions(&config);
        let schema = inferred.into_schema().unwrap();
        assert_eq!(
            schema.field_with_name("proj:epsg").unwrap().data_type(),
            &DataType::Int64
        );
    }
}
