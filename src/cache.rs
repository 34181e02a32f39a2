//! Ordered, id-indexed in-memory copy of a document's records. The cache does
//! no locking of its own; the controller wraps it in a `RwLock` and is the
//! only code that ever touches it.

use std::collections::HashMap;

use crate::models::{Column, Manufacturer};

#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    records: Vec<Manufacturer>,
    /// id -> position in `records`. Rebuilt whenever positions shift.
    index: HashMap<u32, usize>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Manufacturer>) -> Self {
        let mut cache = Self {
            records,
            index: HashMap::new(),
        };
        cache.reindex();
        cache
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Manufacturer] {
        &self.records
    }

    pub fn get(&self, id: u32) -> Option<&Manufacturer> {
        self.index.get(&id).map(|&pos| &self.records[pos])
    }

    pub fn get_index(&self, index: usize) -> Option<&Manufacturer> {
        self.records.get(index)
    }

    /// Highest id currently stored, 0 when empty.
    pub fn max_id(&self) -> u32 {
        self.records.iter().map(|m| m.id).max().unwrap_or(0)
    }

    pub fn push(&mut self, record: Manufacturer) {
        self.index.insert(record.id, self.records.len());
        self.records.push(record);
    }

    /// Swap in `record` at the position of the entry with the same id and
    /// hand back the previous value.
    pub fn replace(&mut self, record: Manufacturer) -> Option<Manufacturer> {
        let pos = *self.index.get(&record.id)?;
        Some(std::mem::replace(&mut self.records[pos], record))
    }

    pub fn remove(&mut self, id: u32) -> Option<Manufacturer> {
        let pos = *self.index.get(&id)?;
        let removed = self.records.remove(pos);
        self.reindex();
        Some(removed)
    }

    /// Close the gap left by `removed_id`: every higher id moves down by one.
    pub fn renumber_after(&mut self, removed_id: u32) {
        for record in self.records.iter_mut().filter(|m| m.id > removed_id) {
            record.id -= 1;
        }
        self.reindex();
    }

    pub fn set_records(&mut self, records: Vec<Manufacturer>) {
        self.records = records;
        self.reindex();
    }

    /// Stable in-place reorder on `column`.
    pub fn reorder(&mut self, column: Column, ascending: bool) {
        sort_slice(&mut self.records, column, ascending);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, m)| (m.id, pos))
            .collect();
    }
}

/// Stable sort used by both the cache and read-side copies. Descending order
/// flips the comparison rather than reversing the output so ties keep their
/// original relative order.
pub fn sort_slice(records: &mut [Manufacturer], column: Column, ascending: bool) {
    if ascending {
        records.sort_by(|a, b| column.compare(a, b));
    } else {
        records.sort_by(|a, b| column.compare(b, a));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: u32, name: &str, revenue: f64) -> Manufacturer {
        Manufacturer {
            id,
            name: name.into(),
            revenue,
            ..Default::default()
        }
    }

    fn ids(cache: &RecordCache) -> Vec<u32> {
        cache.records().iter().map(|m| m.id).collect()
    }

    #[test]
    fn lookup_by_id_follows_removals() {
        let mut cache = RecordCache::from_records(vec![
            named(1, "a", 1.0),
            named(2, "b", 2.0),
            named(3, "c", 3.0),
        ]);
        assert_eq!(cache.remove(2).map(|m| m.name), Some("b".into()));
        assert_eq!(cache.get(3).map(|m| m.name.as_str()), Some("c"));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn renumbering_closes_the_gap() {
        let mut cache = RecordCache::from_records(vec![
            named(1, "a", 1.0),
            named(2, "b", 2.0),
            named(3, "c", 3.0),
        ]);
        cache.remove(1);
        cache.renumber_after(1);
        assert_eq!(ids(&cache), vec![1, 2]);
        assert_eq!(cache.get(1).map(|m| m.name.as_str()), Some("b"));
        assert_eq!(cache.max_id(), 2);
    }

    #[test]
    fn replace_keeps_position() {
        let mut cache = RecordCache::from_records(vec![named(1, "a", 1.0), named(2, "b", 2.0)]);
        let old = cache.replace(named(2, "bee", 5.0));
        assert_eq!(old.map(|m| m.name), Some("b".into()));
        assert_eq!(cache.get_index(1).map(|m| m.name.as_str()), Some("bee"));
        assert!(cache.replace(named(9, "nine", 0.0)).is_none());
    }

    #[test]
    fn descending_sort_is_stable_for_ties() {
        let mut records = vec![
            named(1, "a", 5.0),
            named(2, "b", 9.0),
            named(3, "c", 5.0),
        ];
        sort_slice(&mut records, Column::Revenue, false);
        let order: Vec<u32> = records.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
