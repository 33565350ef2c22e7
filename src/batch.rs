//! Batcher (C2): groups a lazy item sequence into fixed-size, contiguous
//! chunks.
//!
//! Grounded in the original source's `_util.py::batched_iter`, generalized
//! here to operate over a fallible item iterator so a read error surfaces
//! mid-batch instead of being silently dropped.

use crate::{Error, Item, Result};

/// Groups `items` into chunks of `size` items each.
///
/// `size` must be at least 1. If `limit` is given, iteration stops once that
/// many items total have been yielded (the final batch may be shorter than
/// `size` but is still emitted as long as it's non-empty). The final batch
/// of the whole sequence is also allowed to be shorter than `size`; an empty
/// batch is never emitted.
pub fn batched<I>(items: I, size: usize, limit: Option<usize>) -> Result<Batched<I>>
where
    I: Iterator<Item = Result<Item>>,
{
    if size == 0 {
        return Err(Error::MalformedInput(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(Batched {
        items,
        size,
        remaining: limit,
        done: false,
    })
}

/// An iterator of `Vec<Item>` batches. See [`batched`].
#[allow(missing_debug_implementations)]
pub struct Batched<I> {
    items: I,
    size: usize,
    remaining: Option<usize>,
    done: bool,
}

impl<I> Iterator for Batched<I>
where
    I: Iterator<Item = Result<Item>>,
{
    type Item = Result<Vec<Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            if self.remaining == Some(0) {
                break;
            }
            match self.items.next() {
                Some(Ok(item)) => {
                    batch.push(item);
                    if let Some(remaining) = &mut self.remaining {
                        *remaining -= 1;
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(n: usize) -> Vec<Result<Item>> {
        (0..n)
            .map(|i| Ok(serde_json::from_value(json!({"id": i})).unwrap()))
            .collect()
    }

    #[test]
    fn even_chunks() {
        let batches: Vec<_> = batched(items(10).into_iter(), 5, None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[1].len(), 5);
    }

    #[test]
    fn short_final_batch() {
        let batches: Vec<_> = batched(items(7).into_iter(), 5, None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn never_emits_empty_batch() {
        let batches: Vec<_> = batched(items(5).into_iter(), 5, None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn respects_global_limit() {
        let batches: Vec<_> = batched(items(10).into_iter(), 5, Some(7))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 7);
    }

    #[test]
    fn rejects_zero_size() {
        assert!(batched(items(1).into_iter(), 0, None).is_err());
    }

    #[test]
    fn propagates_errors() {
        let items = vec![
            Ok(serde_json::from_value(json!({"id": 0})).unwrap()),
            Err(Error::MalformedInput("boom".to_string())),
        ];
        let mut batches = batched(items.into_iter(), 5, None).unwrap();
        assert!(batches.next().unwrap().is_err());
    }
}
