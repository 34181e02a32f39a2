//! Concurrency-safe façade over one document's [`RecordCache`].
//!
//! Every mutation follows the same template: take the write lock, snapshot the
//! cache, apply the change, persist the whole cache if a file is bound, and put
//! the snapshot back if persisting fails. The write lock is held across the
//! persist step, so readers never observe a change whose durable write has not
//! at least started. Reads copy data out under the read lock and never hand
//! out references into the live cache.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::cache::{sort_slice, RecordCache};
use crate::error::{Result, StoreError};
use crate::models::{Column, Manufacturer};
use crate::store;

/// How ids are handed out and what happens to them on delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Ids always form `1..=N`; deleting a record shifts every higher id down
    /// by one.
    #[default]
    Dense,
    /// Ids are never reused within a session; deletes leave gaps.
    Monotonic,
}

impl fmt::Display for IdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPolicy::Dense => f.write_str("dense"),
            IdPolicy::Monotonic => f.write_str("monotonic"),
        }
    }
}

impl FromStr for IdPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(IdPolicy::Dense),
            "monotonic" => Ok(IdPolicy::Monotonic),
            other => Err(format!("unknown id policy '{other}' (expected dense or monotonic)")),
        }
    }
}

/// Behaviour switches handed to every controller by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Reject invalid records on create/update.
    pub validate: bool,
    pub id_policy: IdPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            validate: true,
            id_policy: IdPolicy::Dense,
        }
    }
}

#[derive(Debug)]
struct State {
    cache: RecordCache,
    path: Option<PathBuf>,
    dirty: bool,
    last_modified: DateTime<Local>,
    /// Bumped on every change to the cache; lets callers detect stale copies.
    revision: u64,
    /// Highest id ever handed out or loaded, for the monotonic policy.
    high_water: u32,
}

#[derive(Debug)]
pub struct ManufacturerController {
    options: ControllerOptions,
    state: RwLock<State>,
}

impl ManufacturerController {
    /// An empty controller with no file bound. It starts dirty because its
    /// contents exist nowhere on disk.
    pub fn new(options: ControllerOptions) -> Self {
        Self::with_records(Vec::new(), None, options)
    }

    /// Wrap already loaded records. Bound controllers start clean.
    pub fn with_records(
        records: Vec<Manufacturer>,
        path: Option<PathBuf>,
        options: ControllerOptions,
    ) -> Self {
        let cache = RecordCache::from_records(records);
        let high_water = cache.max_id();
        Self {
            options,
            state: RwLock::new(State {
                cache,
                dirty: path.is_none(),
                path,
                last_modified: Local::now(),
                revision: 0,
                high_water,
            }),
        }
    }

    /// Load `path` through the durable store and bind to it.
    pub fn open(path: impl Into<PathBuf>, options: ControllerOptions) -> Result<Self> {
        let path = path.into();
        let records = store::load(&path)?;
        Ok(Self::with_records(records, Some(path), options))
    }

    pub fn options(&self) -> ControllerOptions {
        self.options
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Validate, assign the next id and append. Returns the stored copy.
    pub fn create(&self, mut record: Manufacturer) -> Result<Manufacturer> {
        self.check(&record)?;
        let policy = self.options.id_policy;
        let created = self.mutate(|state| {
            record.id = next_id(state, policy)?;
            state.high_water = state.high_water.max(record.id);
            state.cache.push(record.clone());
            Ok(record)
        })?;
        tracing::debug!(id = created.id, name = %created.name, "created manufacturer");
        Ok(created)
    }

    /// Alias of [`ManufacturerController::create`].
    pub fn add(&self, record: Manufacturer) -> Result<Manufacturer> {
        self.create(record)
    }

    /// Replace the record with the same id.
    pub fn update(&self, record: Manufacturer) -> Result<()> {
        self.update_checked(None, record)
    }

    /// Like [`ManufacturerController::update`], but only while the data is
    /// still at `revision`. Under the dense policy an id read at an older
    /// revision may name a different manufacturer by now.
    pub fn update_at(&self, revision: u64, record: Manufacturer) -> Result<()> {
        self.update_checked(Some(revision), record)
    }

    /// Remove the record with `id`, renumbering under the dense policy.
    pub fn delete(&self, id: u32) -> Result<Manufacturer> {
        self.delete_checked(None, id)
    }

    /// Like [`ManufacturerController::delete`], but fails with
    /// [`StoreError::Stale`] once the data has moved past `revision`.
    pub fn delete_at(&self, revision: u64, id: u32) -> Result<Manufacturer> {
        self.delete_checked(Some(revision), id)
    }

    fn update_checked(&self, revision: Option<u64>, record: Manufacturer) -> Result<()> {
        self.check(&record)?;
        let id = record.id;
        self.mutate(|state| {
            ensure_revision(state, revision)?;
            state
                .cache
                .replace(record)
                .map(|_| ())
                .ok_or(StoreError::NotFound(id))
        })?;
        tracing::debug!(id, "updated manufacturer");
        Ok(())
    }

    fn delete_checked(&self, revision: Option<u64>, id: u32) -> Result<Manufacturer> {
        let policy = self.options.id_policy;
        let removed = self.mutate(|state| {
            ensure_revision(state, revision)?;
            let removed = state.cache.remove(id).ok_or(StoreError::NotFound(id))?;
            if policy == IdPolicy::Dense {
                state.cache.renumber_after(id);
            }
            Ok(removed)
        })?;
        tracing::debug!(id, policy = %policy, "deleted manufacturer");
        Ok(removed)
    }

    /// Swap the whole data set in one persisted step.
    pub fn replace_all(&self, records: Vec<Manufacturer>) -> Result<()> {
        let count = records.len();
        self.mutate(|state| {
            state.cache.set_records(records);
            state.high_water = state.high_water.max(state.cache.max_id());
            Ok(())
        })?;
        tracing::debug!(count, "replaced all manufacturers");
        Ok(())
    }

    /// Reorder the canonical data (ids untouched) and persist the new order.
    pub fn commit_sort(&self, column: &str, ascending: bool) -> Result<()> {
        let column: Column = column.parse()?;
        self.mutate(|state| {
            state.cache.reorder(column, ascending);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the cache to the bound path.
    pub fn save(&self) -> Result<()> {
        let mut state = self.write();
        let path = state.path.clone().ok_or(StoreError::Unbound)?;
        store::save(&path, state.cache.records())?;
        state.dirty = false;
        state.last_modified = Local::now();
        Ok(())
    }

    /// Write the cache to `path` and bind to it once the write succeeded.
    pub fn save_as(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let mut state = self.write();
        store::save(&path, state.cache.records())?;
        state.path = Some(path);
        state.dirty = false;
        state.last_modified = Local::now();
        Ok(())
    }

    /// Throw away in-memory changes and re-read the bound file.
    pub fn reload(&self) -> Result<()> {
        let mut state = self.write();
        let path = state.path.clone().ok_or(StoreError::Unbound)?;
        let records = store::load(&path)?;
        state.cache.set_records(records);
        state.high_water = state.cache.max_id();
        state.dirty = false;
        state.revision += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Copy of every record in canonical order.
    pub fn all(&self) -> Vec<Manufacturer> {
        self.read().cache.records().to_vec()
    }

    pub fn len(&self) -> usize {
        self.read().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().cache.is_empty()
    }

    /// The id the next `create` would assign.
    pub fn next_id(&self) -> Result<u32> {
        next_id(&self.read(), self.options.id_policy)
    }

    pub fn get_by_id(&self, id: u32) -> Result<Manufacturer> {
        self.read()
            .cache
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// 0-based position in canonical order.
    pub fn get_by_index(&self, index: usize) -> Result<Manufacturer> {
        let state = self.read();
        state
            .cache
            .get_index(index)
            .cloned()
            .ok_or(StoreError::InvalidIndex {
                index,
                len: state.cache.len(),
            })
    }

    /// Table row, where row 0 is the header and row 1 the first record.
    pub fn get_by_row(&self, row: usize) -> Result<Manufacturer> {
        match row.checked_sub(1) {
            Some(index) => self.get_by_index(index),
            None => Err(StoreError::InvalidIndex {
                index: row,
                len: self.len(),
            }),
        }
    }

    /// Sorted copy; the canonical order is left alone.
    pub fn sort(&self, column: &str, ascending: bool) -> Result<Vec<Manufacturer>> {
        let column: Column = column.parse()?;
        Ok(self.sort_by(column, ascending))
    }

    pub fn sort_by(&self, column: Column, ascending: bool) -> Vec<Manufacturer> {
        let mut records = self.all();
        sort_slice(&mut records, column, ascending);
        records
    }

    /// Sort an arbitrary set of records, e.g. the current search results.
    pub fn sort_records(
        records: &[Manufacturer],
        column: &str,
        ascending: bool,
    ) -> Result<Vec<Manufacturer>> {
        let column: Column = column.parse()?;
        let mut records = records.to_vec();
        sort_slice(&mut records, column, ascending);
        Ok(records)
    }

    /// Records matching `query`; a blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<Manufacturer> {
        self.read()
            .cache
            .records()
            .iter()
            .filter(|m| m.matches(query))
            .cloned()
            .collect()
    }

    /// Distinct product types, case-insensitively ordered, blanks omitted.
    /// The first spelling seen wins.
    pub fn product_types(&self) -> Vec<String> {
        let state = self.read();
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        for m in state.cache.records() {
            let kind = m.product_type.trim();
            if !kind.is_empty() {
                seen.entry(kind.to_lowercase())
                    .or_insert_with(|| kind.to_string());
            }
        }
        seen.into_values().collect()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.read().path.clone()
    }

    pub fn is_bound_to(&self, path: &Path) -> bool {
        self.read().path.as_deref() == Some(path)
    }

    pub fn is_dirty(&self) -> bool {
        self.read().dirty
    }

    pub fn last_modified(&self) -> DateTime<Local> {
        self.read().last_modified
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check(&self, record: &Manufacturer) -> Result<()> {
        if self.options.validate {
            record.validate()?;
        }
        Ok(())
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.write();
        let snapshot = state.cache.clone();
        let high_water = state.high_water;

        let value = match op(&mut *state) {
            Ok(value) => value,
            Err(err) => {
                state.cache = snapshot;
                state.high_water = high_water;
                return Err(err);
            }
        };

        if let Some(path) = state.path.clone() {
            if let Err(err) = store::save(&path, state.cache.records()) {
                tracing::warn!(path = %path.display(), error = %err, "persist failed, rolling back");
                state.cache = snapshot;
                state.high_water = high_water;
                return Err(err);
            }
            state.dirty = false;
        } else {
            state.dirty = true;
        }

        state.revision += 1;
        state.last_modified = Local::now();
        Ok(value)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_id(state: &State, policy: IdPolicy) -> Result<u32> {
    let highest = match policy {
        IdPolicy::Dense => state.cache.max_id(),
        IdPolicy::Monotonic => state.high_water.max(state.cache.max_id()),
    };
    highest.checked_add(1).ok_or(StoreError::IdSpaceExhausted)
}

fn ensure_revision(state: &State, expected: Option<u64>) -> Result<()> {
    match expected {
        Some(expected) if expected != state.revision => Err(StoreError::Stale {
            expected,
            actual: state.revision,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn maker(name: &str, revenue: f64) -> Manufacturer {
        Manufacturer {
            name: name.into(),
            country: "US".into(),
            email: format!("info@{}.example", name.to_lowercase().replace(' ', "")),
            product_type: "Bricks".into(),
            founded_year: 1990,
            revenue,
            ..Default::default()
        }
    }

    fn ids(controller: &ManufacturerController) -> Vec<u32> {
        controller.all().iter().map(|m| m.id).collect()
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        assert_eq!(controller.create(maker("Acme", 1.0)).unwrap().id, 1);
        assert_eq!(controller.create(maker("Beta", 2.0)).unwrap().id, 2);
        assert_eq!(controller.next_id().unwrap(), 3);
    }

    #[test]
    fn delete_renumbers_higher_ids() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        for name in ["one", "two", "three"] {
            controller.create(maker(name, 1.0)).unwrap();
        }
        controller.delete(1).unwrap();
        assert_eq!(ids(&controller), vec![1, 2]);
        assert_eq!(controller.get_by_id(1).unwrap().name, "two");
        assert_eq!(controller.get_by_id(2).unwrap().name, "three");
    }

    #[test]
    fn monotonic_policy_never_reuses_ids() {
        let options = ControllerOptions {
            id_policy: IdPolicy::Monotonic,
            ..Default::default()
        };
        let controller = ManufacturerController::new(options);
        for name in ["one", "two", "three"] {
            controller.create(maker(name, 1.0)).unwrap();
        }
        controller.delete(3).unwrap();
        controller.delete(1).unwrap();
        assert_eq!(ids(&controller), vec![2]);
        assert_eq!(controller.create(maker("four", 1.0)).unwrap().id, 4);
    }

    #[test]
    fn validation_can_be_switched_off() {
        let strict = ManufacturerController::new(ControllerOptions::default());
        let mut bad = maker("Acme", -5.0);
        bad.email = "nope".into();
        assert!(matches!(
            strict.create(bad.clone()),
            Err(StoreError::Validation(_))
        ));
        assert!(strict.is_empty());

        let lax = ManufacturerController::new(ControllerOptions {
            validate: false,
            ..Default::default()
        });
        assert_eq!(lax.create(bad).unwrap().id, 1);
    }

    #[test]
    fn update_and_delete_report_missing_ids() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        let mut ghost = maker("Ghost", 1.0);
        ghost.id = 42;
        assert!(matches!(controller.update(ghost), Err(StoreError::NotFound(42))));
        assert!(matches!(controller.delete(42), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn index_and_row_reads_are_bounds_checked() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        controller.create(maker("Acme", 1.0)).unwrap();
        assert_eq!(controller.get_by_index(0).unwrap().name, "Acme");
        assert_eq!(controller.get_by_row(1).unwrap().name, "Acme");
        assert!(matches!(
            controller.get_by_index(1),
            Err(StoreError::InvalidIndex { index: 1, len: 1 })
        ));
        assert!(matches!(
            controller.get_by_row(0),
            Err(StoreError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn sort_returns_copy_and_rejects_unknown_columns() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        controller.create(maker("b", 5.0)).unwrap();
        controller.create(maker("a", 9.0)).unwrap();
        controller.create(maker("c", 5.0)).unwrap();

        let sorted = controller.sort("revenue", false).unwrap();
        let names: Vec<&str> = sorted.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(ids(&controller), vec![1, 2, 3]);

        assert!(matches!(
            controller.sort("employees", true),
            Err(StoreError::UnknownColumn(_))
        ));
    }

    #[test]
    fn commit_sort_reorders_canonical_data() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        controller.create(maker("b", 5.0)).unwrap();
        controller.create(maker("a", 9.0)).unwrap();
        controller.commit_sort("name", true).unwrap();
        let names: Vec<String> = controller.all().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn product_types_are_distinct_and_ordered() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        for (name, kind) in [("a", "Cement"), ("b", "bricks"), ("c", "cement"), ("d", "")] {
            let mut m = maker(name, 1.0);
            m.product_type = kind.into();
            controller.create(m).unwrap();
        }
        assert_eq!(controller.product_types(), vec!["bricks", "Cement"]);
    }

    #[test]
    fn bound_mutations_persist_and_clear_dirty_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let controller = ManufacturerController::open(&path, ControllerOptions::default()).unwrap();
        assert!(!controller.is_dirty());

        controller.create(maker("Acme", 10.0)).unwrap();
        assert!(!controller.is_dirty());
        assert_eq!(store::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn persist_failure_rolls_back_every_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let controller = ManufacturerController::open(&path, ControllerOptions::default()).unwrap();
        for name in ["one", "two", "three"] {
            controller.create(maker(name, 1.0)).unwrap();
        }
        let before = controller.all();
        let revision = controller.revision();

        // A directory squatting on the temp path makes every save fail.
        std::fs::create_dir(store::temp_path_for(&path)).unwrap();

        assert!(controller.create(maker("four", 1.0)).is_err());
        let mut changed = before[1].clone();
        changed.name = "TWO".into();
        assert!(controller.update(changed).is_err());
        assert!(controller.delete(1).is_err());

        assert_eq!(controller.all(), before);
        assert_eq!(controller.revision(), revision);
        assert_eq!(controller.next_id().unwrap(), 4);
    }

    #[test]
    fn save_requires_a_path_and_save_as_binds_one() {
        let dir = tempdir().unwrap();
        let controller = ManufacturerController::new(ControllerOptions::default());
        controller.create(maker("Acme", 1.0)).unwrap();
        assert!(controller.is_dirty());
        assert!(matches!(controller.save(), Err(StoreError::Unbound)));

        let path = dir.path().join("saved.csv");
        controller.save_as(&path).unwrap();
        assert!(!controller.is_dirty());
        assert!(controller.is_bound_to(&path));
        assert_eq!(store::load(&path).unwrap()[0].name, "Acme");
    }

    #[test]
    fn ids_from_an_older_revision_are_refused() {
        let controller = ManufacturerController::new(ControllerOptions::default());
        for name in ["Alpha", "Bravo", "Charlie", "Delta"] {
            controller.create(maker(name, 1.0)).unwrap();
        }
        let seen = controller.revision();
        let mut charlie = controller.get_by_id(3).unwrap();

        // Deleting Alpha shifts Delta down to id 3.
        controller.delete(1).unwrap();
        charlie.name = "CharlieX".into();
        assert!(matches!(
            controller.update_at(seen, charlie),
            Err(StoreError::Stale { expected, .. }) if expected == seen
        ));
        assert!(matches!(
            controller.delete_at(seen, 3),
            Err(StoreError::Stale { .. })
        ));

        let names: Vec<String> = controller.all().into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["Bravo", "Charlie", "Delta"]);

        let current = controller.revision();
        let mut delta = controller.get_by_id(3).unwrap();
        delta.country = "FR".into();
        controller.update_at(current, delta).unwrap();
        assert_eq!(controller.delete_at(controller.revision(), 3).unwrap().country, "FR");
    }

    #[test]
    fn create_after_the_largest_id_is_refused() {
        let loaded = Manufacturer {
            id: u32::MAX,
            ..maker("Last", 1.0)
        };
        for id_policy in [IdPolicy::Dense, IdPolicy::Monotonic] {
            let options = ControllerOptions {
                id_policy,
                ..Default::default()
            };
            let controller = ManufacturerController::with_records(vec![loaded.clone()], None, options);
            assert!(matches!(controller.next_id(), Err(StoreError::IdSpaceExhausted)));
            assert!(matches!(
                controller.create(maker("Next", 1.0)),
                Err(StoreError::IdSpaceExhausted)
            ));
            assert_eq!(controller.all(), vec![loaded.clone()]);
        }
    }

    #[test]
    fn id_policy_parses_from_text() {
        assert_eq!("Dense".parse::<IdPolicy>(), Ok(IdPolicy::Dense));
        assert_eq!("monotonic".parse::<IdPolicy>(), Ok(IdPolicy::Monotonic));
        assert!("random".parse::<IdPolicy>().is_err());
    }
}
