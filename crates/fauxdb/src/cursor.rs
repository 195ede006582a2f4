use std::collections::{HashMap, VecDeque};

use bson::Document;

use crate::error::{DispatchError, Result};

/// Default `find`/`aggregate` batch size, matching real `mongod`'s default.
pub const DEFAULT_BATCH_SIZE: usize = 101;

struct OpenCursor {
    ns: String,
    remaining: VecDeque<Document>,
}

/// Owns cursors opened by `find`/`aggregate` when a result exceeds one
/// batch. `getMore` drains the next batch; `killCursors` disposes of them
/// outright. Keyed the same way the transaction manager keys sessions by
/// `lsid` — an opaque id the caller must present on every follow-up call.
#[derive(Default)]
pub struct CursorTable {
    next_id: i64,
    cursors: HashMap<i64, OpenCursor>,
}

impl CursorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `documents` into a first batch and, if anything remains,
    /// opens a cursor for the rest. Returns `(first_batch, cursor_id)` where
    /// `cursor_id == 0` means the result was exhausted in one batch.
    pub fn open(&mut self, ns: String, mut documents: Vec<Document>, batch_size: usize) -> (Vec<Document>, i64) {
        if documents.len() <= batch_size {
            return (documents, 0);
        }
        let rest = documents.split_off(batch_size);
        self.next_id += 1;
        let id = self.next_id;
        self.cursors.insert(
            id,
            OpenCursor {
                ns,
                remaining: rest.into(),
            },
        );
        (documents, id)
    }

    /// Drains up to `batch_size` more documents from an open cursor,
    /// returning the batch and the cursor id to report back (0 once
    /// exhausted, which also removes the cursor).
    pub fn get_more(&mut self, id: i64, batch_size: usize) -> Result<(String, Vec<Document>, i64)> {
        let cursor = self.cursors.get_mut(&id).ok_or(DispatchError::CursorNotFound(id))?;
        let take = batch_size.min(cursor.remaining.len());
        let batch: Vec<Document> = cursor.remaining.drain(..take).collect();
        let ns = cursor.ns.clone();
        if cursor.remaining.is_empty() {
            self.cursors.remove(&id);
            Ok((ns, batch, 0))
        } else {
            Ok((ns, batch, id))
        }
    }

    /// Disposes of the named cursors, returning the subset that were
    /// actually open (mirrors `killCursors`'s `cursorsKilled` field).
    pub fn kill(&mut self, ids: &[i64]) -> Vec<i64> {
        ids.iter().copied().filter(|id| self.cursors.remove(id).is_some()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn small_result_never_opens_a_cursor() {
        let mut table = CursorTable::new();
        let (batch, id) = table.open("db.c".into(), vec![doc! { "a": 1 }], 101);
        assert_eq!(batch.len(), 1);
        assert_eq!(id, 0);
    }

    #[test]
    fn large_result_opens_and_drains_a_cursor() {
        let mut table = CursorTable::new();
        let docs: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        let (first, id) = table.open("db.c".into(), docs, 2);
        assert_eq!(first.len(), 2);
        assert_ne!(id, 0);

        let (_, second, id2) = table.get_more(id, 2).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(id2, id);

        let (_, third, id3) = table.get_more(id, 2).unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(id3, 0);

        assert!(table.get_more(id, 2).is_err());
    }

    #[test]
    fn kill_cursors_reports_only_open_ones() {
        let mut table = CursorTable::new();
        let docs: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        let (_, id) = table.open("db.c".into(), docs, 1);
        let killed = table.kill(&[id, 999]);
        assert_eq!(killed, vec![id]);
    }
}
