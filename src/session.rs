//! Open documents and the one the user is looking at.
//!
//! Each [`Document`] owns its own controller plus the transient search and sort
//! state the front end shows for it, so switching tabs swaps that state in
//! without leaking one document's filter into another.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::cache::sort_slice;
use crate::controller::{ControllerOptions, ManufacturerController};
use crate::error::{Result, StoreError};
use crate::models::{Column, Manufacturer};

/// Opaque per-session document handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(Uuid);

impl DocumentId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Column and direction a document is currently displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub column: Column,
    pub ascending: bool,
}

#[derive(Debug)]
struct SearchState {
    query: String,
    /// Results computed for the controller revision they were taken at.
    results: Option<(u64, Vec<Manufacturer>)>,
}

#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    controller: Arc<ManufacturerController>,
    search: Option<SearchState>,
    sort: Option<SortState>,
}

impl Document {
    /// A document over `records`. Without a path it starts unsaved; with one
    /// it starts clean until the first mutation.
    pub fn new(path: Option<PathBuf>, records: Vec<Manufacturer>, options: ControllerOptions) -> Self {
        Self::from_controller(ManufacturerController::with_records(records, path, options))
    }

    /// Load `path` into a new document.
    pub fn open(path: impl Into<PathBuf>, options: ControllerOptions) -> Result<Self> {
        Ok(Self::from_controller(ManufacturerController::open(path, options)?))
    }

    fn from_controller(controller: ManufacturerController) -> Self {
        Self {
            id: DocumentId::new(),
            controller: Arc::new(controller),
            search: None,
            sort: None,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Shared handle for background work against this document.
    pub fn controller(&self) -> &Arc<ManufacturerController> {
        &self.controller
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.controller.path()
    }

    pub fn manufacturers(&self) -> Vec<Manufacturer> {
        self.controller.all()
    }

    pub fn is_unsaved(&self) -> bool {
        self.controller.is_dirty()
    }

    pub fn last_modified(&self) -> DateTime<Local> {
        self.controller.last_modified()
    }

    /// File name for tab labels, `Untitled` for new documents.
    pub fn title(&self) -> String {
        self.file_path()
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.query.as_str())
    }

    /// Start (or change) the search. A blank query ends it.
    pub fn set_search(&mut self, query: impl Into<String>) {
        let query = query.into();
        if query.trim().is_empty() {
            self.search = None;
        } else {
            self.search = Some(SearchState {
                query,
                results: None,
            });
        }
    }

    pub fn clear_search(&mut self) {
        self.search = None;
    }

    /// Current search hits, recomputed only when the data changed since the
    /// last call. `None` while not searching.
    pub fn search_results(&mut self) -> Option<&[Manufacturer]> {
        let revision = self.controller.revision();
        let controller = &self.controller;
        let search = self.search.as_mut()?;
        let stale = !matches!(&search.results, Some((seen, _)) if *seen == revision);
        if stale {
            search.results = Some((revision, controller.search(&search.query)));
        }
        search.results.as_ref().map(|(_, hits)| hits.as_slice())
    }

    pub fn sort_state(&self) -> Option<SortState> {
        self.sort
    }

    pub fn set_sort(&mut self, sort: Option<SortState>) {
        self.sort = sort;
    }

    /// Sort by `column`, flipping the direction when it is already the sort
    /// column.
    pub fn toggle_sort(&mut self, column: Column) -> SortState {
        let next = match self.sort {
            Some(current) if current.column == column => SortState {
                column,
                ascending: !current.ascending,
            },
            _ => SortState {
                column,
                ascending: true,
            },
        };
        self.sort = Some(next);
        next
    }

    /// What a table should show: search hits (or everything), in the current
    /// sort order.
    pub fn visible_records(&mut self) -> Vec<Manufacturer> {
        let mut records = match self.search_results() {
            Some(hits) => hits.to_vec(),
            None => self.controller.all(),
        };
        if let Some(sort) = self.sort {
            sort_slice(&mut records, sort.column, sort.ascending);
        }
        records
    }
}

/// The set of open documents.
#[derive(Debug)]
pub struct DocumentManager {
    options: ControllerOptions,
    documents: Vec<Document>,
    active: Option<DocumentId>,
}

impl DocumentManager {
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            options,
            documents: Vec::new(),
            active: None,
        }
    }

    pub fn options(&self) -> ControllerOptions {
        self.options
    }

    /// Create an empty unsaved document and make it active.
    pub fn new_document(&mut self) -> DocumentId {
        self.add_document(Document::new(None, Vec::new(), self.options))
    }

    /// Open `path`, or activate it if it is already open.
    pub fn open_document(&mut self, path: impl Into<PathBuf>) -> Result<DocumentId> {
        let path = path.into();
        if let Some(existing) = self
            .documents
            .iter()
            .find(|doc| doc.file_path().is_some_and(|bound| same_file(&bound, &path)))
        {
            let id = existing.id();
            self.active = Some(id);
            return Ok(id);
        }
        let document = Document::open(&path, self.options)?;
        tracing::info!(path = %path.display(), "opened document");
        Ok(self.add_document(document))
    }

    /// Take ownership of `document` and make it active.
    pub fn add_document(&mut self, document: Document) -> DocumentId {
        let id = document.id();
        self.documents.push(document);
        self.active = Some(id);
        id
    }

    /// Remove a document. Closing the active one leaves nothing active.
    pub fn close_document(&mut self, id: DocumentId) -> Result<Document> {
        let pos = self.position(id).ok_or(StoreError::DocumentNotFound(id))?;
        let document = self.documents.remove(pos);
        if self.active == Some(id) {
            self.active = None;
        }
        tracing::info!(title = %document.title(), "closed document");
        Ok(document)
    }

    pub fn set_active(&mut self, id: DocumentId) -> Result<()> {
        self.position(id).ok_or(StoreError::DocumentNotFound(id))?;
        self.active = Some(id);
        Ok(())
    }

    /// Move the active marker `offset` tabs along, wrapping around. With no
    /// active document the first one is picked.
    pub fn cycle_active(&mut self, offset: isize) -> Option<DocumentId> {
        if self.documents.is_empty() {
            return None;
        }
        let len = self.documents.len() as isize;
        let next = match self.active.and_then(|id| self.position(id)) {
            Some(pos) => (pos as isize + offset).rem_euclid(len) as usize,
            None => 0,
        };
        let id = self.documents[next].id();
        self.active = Some(id);
        Some(id)
    }

    pub fn active_id(&self) -> Option<DocumentId> {
        self.active
    }

    pub fn active_document(&self) -> Option<&Document> {
        self.active.and_then(|id| self.document(id))
    }

    pub fn active_document_mut(&mut self) -> Option<&mut Document> {
        let id = self.active?;
        self.document_mut(id)
    }

    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.id() == id)
    }

    pub fn document_mut(&mut self, id: DocumentId) -> Option<&mut Document> {
        self.documents.iter_mut().find(|doc| doc.id() == id)
    }

    /// Documents in the order they were opened.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn has_unsaved(&self) -> bool {
        self.documents.iter().any(Document::is_unsaved)
    }

    fn position(&self, id: DocumentId) -> Option<usize> {
        self.documents.iter().position(|doc| doc.id() == id)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str) -> Manufacturer {
        Manufacturer {
            name: name.into(),
            founded_year: 1990,
            revenue: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn new_documents_start_unsaved_and_opened_ones_clean() {
        let dir = tempdir().unwrap();
        let mut manager = DocumentManager::new(ControllerOptions::default());

        let fresh = manager.new_document();
        assert!(manager.document(fresh).unwrap().is_unsaved());
        assert_eq!(manager.document(fresh).unwrap().title(), "Untitled");

        let opened = manager.open_document(dir.path().join("plants.csv")).unwrap();
        let doc = manager.document(opened).unwrap();
        assert!(!doc.is_unsaved());
        assert_eq!(doc.title(), "plants.csv");
        assert_eq!(manager.active_id(), Some(opened));
    }

    #[test]
    fn opening_the_same_path_twice_reuses_the_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut manager = DocumentManager::new(ControllerOptions::default());

        let first = manager.open_document(&path).unwrap();
        manager.new_document();
        let second = manager.open_document(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.active_id(), Some(first));
    }

    #[test]
    fn closing_the_active_document_leaves_none_active() {
        let mut manager = DocumentManager::new(ControllerOptions::default());
        let a = manager.new_document();
        let b = manager.new_document();
        assert_eq!(manager.active_id(), Some(b));

        manager.close_document(b).unwrap();
        assert!(manager.active_document().is_none());
        assert_eq!(manager.len(), 1);

        manager.close_document(a).unwrap();
        assert!(manager.is_empty());
        assert!(matches!(
            manager.close_document(a),
            Err(StoreError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn cycling_wraps_around() {
        let mut manager = DocumentManager::new(ControllerOptions::default());
        let a = manager.new_document();
        let b = manager.new_document();
        assert_eq!(manager.cycle_active(1), Some(a));
        assert_eq!(manager.cycle_active(1), Some(b));
        assert_eq!(manager.cycle_active(-1), Some(a));
    }

    #[test]
    fn search_state_is_per_document() {
        let mut manager = DocumentManager::new(ControllerOptions::default());
        let a = manager.new_document();
        let b = manager.new_document();
        for id in [a, b] {
            let controller = manager.document(id).unwrap().controller().clone();
            controller.create(record("ACME Corp")).unwrap();
            controller.create(record("Beton")).unwrap();
        }

        manager.document_mut(a).unwrap().set_search("acme");
        let doc_a = manager.document_mut(a).unwrap();
        assert_eq!(doc_a.search_results().map(<[_]>::len), Some(1));

        let doc_b = manager.document_mut(b).unwrap();
        assert!(!doc_b.is_searching());
        assert!(doc_b.search_results().is_none());
        assert_eq!(doc_b.visible_records().len(), 2);
    }

    #[test]
    fn cached_search_results_follow_mutations() {
        let mut doc = Document::new(None, Vec::new(), ControllerOptions::default());
        doc.controller().create(record("ACME Corp")).unwrap();
        doc.set_search("acme");
        assert_eq!(doc.search_results().unwrap().len(), 1);

        doc.controller().create(record("Acme Two")).unwrap();
        assert_eq!(doc.search_results().unwrap().len(), 2);

        doc.set_search("  ");
        assert!(!doc.is_searching());
    }

    #[test]
    fn toggling_sort_flips_direction() {
        let mut doc = Document::new(
            None,
            vec![
                Manufacturer { id: 1, revenue: 5.0, ..record("b") },
                Manufacturer { id: 2, revenue: 9.0, ..record("a") },
            ],
            ControllerOptions::default(),
        );
        assert!(doc.toggle_sort(Column::Revenue).ascending);
        assert_eq!(doc.visible_records()[0].id, 1);
        assert!(!doc.toggle_sort(Column::Revenue).ascending);
        assert_eq!(doc.visible_records()[0].id, 2);
    }
}
