//! Lazy materialization of `get_items` results.

use crate::backend::Fetched;
use crate::item::CacheItem;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Iterator over `(key, item)` pairs produced by
/// [`CachePool::get_items`](crate::CachePool::get_items).
///
/// Hits come first, in the order the backend returned them, followed by the
/// remaining requested keys as misses in request order. Each distinct
/// requested key is yielded exactly once. Items are built as the iterator is
/// advanced; call `get_items` again to start over.
#[derive(Debug)]
pub struct ItemIter {
    fetched: std::vec::IntoIter<(String, Value)>,
    /// Requested `(id, key)` pairs in request order; `None` once yielded.
    requested: Vec<Option<(String, String)>>,
    /// Pending id -> position in `requested`.
    pending: HashMap<String, usize>,
    cursor: usize,
    default_lifetime: Option<Duration>,
}

impl ItemIter {
    /// `pairs` holds `(id, key)` in request order; repeated ids keep their
    /// first position.
    pub(crate) fn new(
        pairs: Vec<(String, String)>,
        fetched: Fetched,
        default_lifetime: Option<Duration>,
    ) -> Self {
        let mut requested = Vec::with_capacity(pairs.len());
        let mut pending = HashMap::with_capacity(pairs.len());

        for (id, key) in pairs {
            if pending.contains_key(&id) {
                continue;
            }
            pending.insert(id.clone(), requested.len());
            requested.push(Some((id, key)));
        }

        Self {
            fetched: fetched.into_iter(),
            requested,
            pending,
            cursor: 0,
            default_lifetime,
        }
    }

    /// Number of pairs still to be yielded.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for ItemIter {
    type Item = (String, CacheItem);

    fn next(&mut self) -> Option<Self::Item> {
        for (id, value) in self.fetched.by_ref() {
            // Ids the pool did not ask for, or already served, are skipped.
            let Some(position) = self.pending.remove(&id) else {
                continue;
            };
            if let Some((_, key)) = self.requested[position].take() {
                let item = CacheItem::hit(key.clone(), value, self.default_lifetime);
                return Some((key, item));
            }
        }

        while self.cursor < self.requested.len() {
            let slot = self.requested[self.cursor].take();
            self.cursor += 1;

            if let Some((id, key)) = slot {
                self.pending.remove(&id);
                let item = CacheItem::miss(key.clone(), self.default_lifetime);
                return Some((key, item));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}

impl ExactSizeIterator for ItemIter {}

impl std::iter::FusedIterator for ItemIter {}
