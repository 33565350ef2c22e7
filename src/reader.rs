//! Lazy item sequences from NDJSON, JSON arrays, or GeoJSON FeatureCollections (C1).
//!
//! Detection follows spec.md §4.1: try a line-wise parse first; if the first
//! non-empty line parses as a list or an object carrying `features`, yield
//! its members and stop. If the first line fails to parse at all, rewind and
//! parse the whole file once, as either a list or a FeatureCollection.
//! Otherwise, stream the rest of the file line by line as NDJSON.

use crate::{Error, Item, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

fn value_to_item(value: Value) -> Result<Item> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::MalformedInput(format!(
            "expected a JSON object for an item, got: {other}"
        ))),
    }
}

fn members_of(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if let Some(features) = map.remove("features") {
                match features {
                    Value::Array(items) => Ok(items),
                    other => Err(Error::MalformedInput(format!(
                        "\"features\" was not an array: {other}"
                    ))),
                }
            } else {
                // A single bare item, treated as a one-element sequence.
                Ok(vec![Value::Object(map)])
            }
        }
        other => Err(Error::MalformedInput(format!(
            "expected a JSON array or FeatureCollection, got: {other}"
        ))),
    }
}

enum Mode<R> {
    /// A single already-parsed item, followed by the rest of the file as NDJSON.
    Ndjson {
        first: Option<Item>,
        lines: std::io::Lines<BufReader<R>>,
    },
    /// Everything was already materialized (JSON array or FeatureCollection).
    Buffered(std::vec::IntoIter<Value>),
}

/// A lazy sequence of items read from one file.
#[allow(missing_debug_implementations)]
pub struct ItemReader<R> {
    mode: Mode<R>,
}

impl<R: Read + Seek> ItemReader<R> {
    /// Detects the on-disk shape of `reader` and returns a lazy item sequence.
    pub fn detect(mut reader: R) -> Result<ItemReader<R>> {
        let mut first_line = String::new();
        let mut probe = BufReader::new(&mut reader);
        loop {
            first_line.clear();
            let n = probe.read_line(&mut first_line)?;
            if n == 0 {
                // Empty file.
                return Ok(ItemReader {
                    mode: Mode::Buffered(Vec::new().into_iter()),
                });
            }
            if !first_line.trim().is_empty() {
                break;
            }
        }
        let trimmed = first_line.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(items)) => Ok(ItemReader {
                mode: Mode::Buffered(items.into_iter()),
            }),
            Ok(Value::Object(map)) if map.contains_key("features") => {
                let items = members_of(Value::Object(map))?;
                Ok(ItemReader {
                    mode: Mode::Buffered(items.into_iter()),
                })
            }
            Ok(value) => {
                let first = Some(value_to_item(value)?);
                let reader = BufReader::new(reader);
                Ok(ItemReader {
                    mode: Mode::Ndjson {
                        first,
                        lines: reader.lines(),
                    },
                })
            }
            Err(_) => {
                reader.seek(SeekFrom::Start(0))?;
                let mut contents = String::new();
                reader.read_to_string(&mut contents)?;
                let value: Value = serde_json::from_str(contents.trim())
                    .map_err(|err| Error::MalformedInput(err.to_string()))?;
                let items = members_of(value)?;
                Ok(ItemReader {
                    mode: Mode::Buffered(items.into_iter()),
                })
            }
        }
    }
}

impl<R: Read> Iterator for ItemReader<R> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.mode {
            Mode::Buffered(iter) => iter.next().map(value_to_item),
            Mode::Ndjson { first, lines } => {
                if let Some(item) = first.take() {
                    return Some(Ok(item));
                }
                loop {
                    let line = lines.next()?;
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => return Some(Err(err.into())),
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<Value>(line.trim())
                            .map_err(Error::from)
                            .and_then(value_to_item),
                    );
                }
            }
        }
    }
}

/// Reads all items at `path` eagerly into a `Vec`.
///
/// Used by the `FullFile` schema strategy, which needs all items in memory
/// anyway to infer a schema.
pub fn read_all(path: impl AsRef<std::path::Path>) -> Result<Vec<Item>> {
    let file = std::fs::File::open(path)?;
    ItemReader::detect(file)?.collect()
}
