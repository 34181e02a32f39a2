use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossterm::event::KeyCode;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, TableState, Tabs, Wrap,
};
use ratatui::Frame;

use crate::config::Settings;
use crate::controller::ManufacturerController;
use crate::error::StoreError;
use crate::export;
use crate::models::{Column, Manufacturer};
use crate::session::DocumentManager;
use crate::tasks::{Completion, TaskQueue};

use super::forms::{
    ChartPicker, ConfirmClose, ConfirmDelete, FormField, ManufacturerForm, PathPrompt,
    PromptPurpose,
};
use super::helpers::{centered_rect, column_widths, header_label, surface_error};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows skipped by PageUp/PageDown.
const PAGE_STEP: isize = 10;
/// How long shutdown waits for each outstanding background job.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

/// Modal states layered over the document table. Keeping this explicit makes
/// it easy to reason about which keys do what and which overlay is drawn.
enum Mode {
    Normal,
    Adding(ManufacturerForm),
    /// `revision` is the data revision `id` was read at.
    Editing {
        id: u32,
        revision: u64,
        form: ManufacturerForm,
    },
    ConfirmDelete(ConfirmDelete),
    Searching(String),
    Prompt(PathPrompt),
    ChartPicker(ChartPicker),
    ProductTypes(Vec<String>),
    ConfirmClose(ConfirmClose),
    ConfirmQuit,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    manager: DocumentManager,
    settings: Settings,
    tasks: TaskQueue,
    /// Rows of the active document as currently filtered and sorted.
    rows: Vec<Manufacturer>,
    /// Controller revision `rows` was read at. Under dense ids a later
    /// delete can hand a row's id to a different manufacturer.
    rows_revision: u64,
    selected: usize,
    mode: Mode,
    status: Option<StatusMessage>,
}

impl App {
    pub fn new(manager: DocumentManager, settings: Settings) -> Self {
        let mut app = Self {
            manager,
            settings,
            tasks: TaskQueue::new(),
            rows: Vec::new(),
            rows_revision: 0,
            selected: 0,
            mode: Mode::Normal,
            status: None,
        };
        app.refresh_rows();
        app
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn manager(&self) -> &DocumentManager {
        &self.manager
    }

    /// Collect finished background jobs and refresh the visible rows. Called
    /// once per frame.
    pub fn tick(&mut self) {
        for done in self.tasks.drain() {
            self.finish_task(done);
        }
        self.refresh_rows();
    }

    /// Let outstanding background jobs finish before the process exits.
    pub fn shutdown(&mut self) {
        while !self.tasks.is_idle() {
            match self.tasks.wait(SHUTDOWN_WAIT) {
                Some(done) => self.finish_task(done),
                None => {
                    tracing::warn!(pending = self.tasks.pending(), "gave up waiting for background tasks");
                    break;
                }
            }
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        let mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::Adding(form) => self.handle_form(code, None, form),
            Mode::Editing { id, revision, form } => {
                self.handle_form(code, Some((id, revision)), form)
            }
            Mode::ConfirmDelete(confirm) => self.handle_confirm_delete(code, confirm),
            Mode::Searching(query) => self.handle_search(code, query),
            Mode::Prompt(prompt) => self.handle_prompt(code, prompt),
            Mode::ChartPicker(picker) => self.handle_chart_picker(code, picker),
            Mode::ProductTypes(types) => match code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('t') => {
                    Mode::Normal
                }
                _ => Mode::ProductTypes(types),
            },
            Mode::ConfirmClose(confirm) => self.handle_confirm_close(code, confirm),
            Mode::ConfirmQuit => match code {
                KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                    exit = true;
                    Mode::Normal
                }
                KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Mode::Normal,
                _ => Mode::ConfirmQuit,
            },
        };

        self.mode = mode;
        Ok(exit)
    }

    /// Ctrl-S saves from anywhere except inside a dialog.
    pub(crate) fn handle_ctrl_s(&mut self) -> Result<()> {
        if matches!(self.mode, Mode::Normal | Mode::Searching(_)) {
            if let Some(mode) = self.save_active() {
                self.mode = mode;
            }
        }
        Ok(())
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        let mode = match code {
            KeyCode::Esc if self.is_searching() => {
                self.set_search(String::new());
                self.set_status("Search cleared.", StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                if self.manager.has_unsaved() || !self.tasks.is_idle() {
                    return Ok(Mode::ConfirmQuit);
                }
                *exit = true;
                Mode::Normal
            }
            KeyCode::Up | KeyCode::Char('k') => self.moved(-1),
            KeyCode::Down | KeyCode::Char('j') => self.moved(1),
            KeyCode::PageUp => self.moved(-PAGE_STEP),
            KeyCode::PageDown => self.moved(PAGE_STEP),
            KeyCode::Home => {
                self.selected = 0;
                Mode::Normal
            }
            KeyCode::End => {
                self.selected = self.rows.len().saturating_sub(1);
                Mode::Normal
            }
            KeyCode::Tab => self.switch_document(1),
            KeyCode::BackTab => self.switch_document(-1),
            KeyCode::Char('n') => {
                self.manager.new_document();
                self.after_document_switch();
                self.set_status("Created a new document.", StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Char('o') => Mode::Prompt(PathPrompt::new(
                PromptPurpose::Open,
                self.settings.recent_files.first().cloned(),
            )),
            KeyCode::Char('s') => self.save_active().unwrap_or(Mode::Normal),
            KeyCode::Char('S') => self.prompt_for_active(PromptPurpose::SaveAs, "csv"),
            KeyCode::Char('w') => self.request_close(),
            KeyCode::Char('r') => {
                self.reload_active();
                Mode::Normal
            }
            KeyCode::Char('+') | KeyCode::Char('a') => {
                if self.active_controller().is_some() {
                    Mode::Adding(ManufacturerForm::default())
                } else {
                    self.no_document()
                }
            }
            KeyCode::Char('e') | KeyCode::Enter => match self.current_record().cloned() {
                Some(record) => Mode::Editing {
                    id: record.id,
                    revision: self.rows_revision,
                    form: ManufacturerForm::from_manufacturer(&record),
                },
                None => {
                    self.set_status("No manufacturer selected.", StatusKind::Error);
                    Mode::Normal
                }
            },
            KeyCode::Char('-') | KeyCode::Char('d') | KeyCode::Delete => {
                match self.current_record().cloned() {
                    Some(record) => {
                        Mode::ConfirmDelete(ConfirmDelete::new(record, self.rows_revision))
                    }
                    None => {
                        self.set_status("No manufacturer selected.", StatusKind::Error);
                        Mode::Normal
                    }
                }
            }
            KeyCode::Char('/') | KeyCode::Char('f') => {
                if self.active_controller().is_none() {
                    return Ok(self.no_document());
                }
                let query = self
                    .manager
                    .active_document()
                    .and_then(|doc| doc.search_query())
                    .unwrap_or_default()
                    .to_string();
                Mode::Searching(query)
            }
            KeyCode::Char(digit @ '1'..='9') => {
                let column = Column::ALL[digit as usize - '1' as usize];
                self.toggle_sort(column);
                Mode::Normal
            }
            KeyCode::Char('0') => {
                if let Some(doc) = self.manager.active_document_mut() {
                    doc.set_sort(None);
                }
                self.refresh_rows();
                self.set_status("Showing file order.", StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Char('K') => {
                self.commit_sort();
                Mode::Normal
            }
            KeyCode::Char('J') => self.prompt_for_active(PromptPurpose::ExportJson, "json"),
            KeyCode::Char('p') => self.prompt_for_active(PromptPurpose::ExportPdf, "pdf"),
            KeyCode::Char('c') => {
                if self.active_controller().is_some() {
                    Mode::ChartPicker(ChartPicker::new(self.settings.chart))
                } else {
                    self.no_document()
                }
            }
            KeyCode::Char('t') => match self.active_controller() {
                Some(controller) => Mode::ProductTypes(controller.product_types()),
                None => self.no_document(),
            },
            _ => Mode::Normal,
        };
        Ok(mode)
    }

    fn handle_form(
        &mut self,
        code: KeyCode,
        target: Option<(u32, u64)>,
        mut form: ManufacturerForm,
    ) -> Mode {
        let product_types = self
            .active_controller()
            .map(|controller| controller.product_types())
            .unwrap_or_default();
        let mut keep_open = true;

        match code {
            KeyCode::Esc => {
                if !form.cancel_autocomplete() {
                    self.set_status("Edit cancelled.", StatusKind::Info);
                    keep_open = false;
                }
            }
            KeyCode::Tab => {
                let consumed = form.has_active_suggestion() && form.accept_suggestion();
                if !consumed {
                    form.move_focus(1);
                }
                form.update_suggestion(&product_types);
            }
            KeyCode::BackTab | KeyCode::Up => {
                form.move_focus(-1);
                form.update_suggestion(&product_types);
            }
            KeyCode::Down => {
                form.move_focus(1);
                form.update_suggestion(&product_types);
            }
            KeyCode::Backspace => {
                form.backspace();
                form.update_suggestion(&product_types);
            }
            KeyCode::Enter => match self.submit_form(target, &form) {
                Ok(()) => keep_open = false,
                Err(err) if is_stale(&err) => {
                    self.refresh_rows();
                    self.set_status(
                        "Records changed while the form was open. Nothing was saved; select the row again.",
                        StatusKind::Error,
                    );
                    keep_open = false;
                }
                Err(err) => {
                    let message = surface_error(&err);
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                    form.update_suggestion(&product_types);
                }
            }
            _ => {}
        }

        match (keep_open, target) {
            (false, _) => Mode::Normal,
            (true, Some((id, revision))) => Mode::Editing { id, revision, form },
            (true, None) => Mode::Adding(form),
        }
    }

    fn handle_confirm_delete(&mut self, code: KeyCode, confirm: ConfirmDelete) -> Mode {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.active_controller() {
                    Some(controller) => {
                        let ConfirmDelete { id, name, revision } = confirm;
                        self.tasks.spawn(self.manager.active_id(), "Delete", move || {
                            controller.delete_at(revision, id).map_err(|err| match err {
                                StoreError::Stale { .. } => anyhow!(
                                    "{name} was not deleted: records changed, select it again"
                                ),
                                other => anyhow::Error::new(other)
                                    .context(format!("Could not delete {name}")),
                            })?;
                            Ok(format!("Deleted {name}."))
                        });
                        self.set_status("Deleting...", StatusKind::Info);
                    }
                    None => self.set_status("No document open.", StatusKind::Error),
                }
                Mode::Normal
            }
            _ => Mode::ConfirmDelete(confirm),
        }
    }

    fn handle_search(&mut self, code: KeyCode, mut query: String) -> Mode {
        match code {
            KeyCode::Esc => {
                self.set_search(String::new());
                return Mode::Normal;
            }
            KeyCode::Enter => {
                let hits = self.rows.len();
                if query.trim().is_empty() {
                    self.clear_status();
                } else {
                    self.set_status(format!("{hits} match(es) for '{}'.", query.trim()), StatusKind::Info);
                }
                return Mode::Normal;
            }
            KeyCode::Up => {
                self.move_selection(-1);
                return Mode::Searching(query);
            }
            KeyCode::Down => {
                self.move_selection(1);
                return Mode::Searching(query);
            }
            KeyCode::Backspace => {
                query.pop();
            }
            KeyCode::Char(ch) if !ch.is_control() => query.push(ch),
            _ => return Mode::Searching(query),
        }
        self.set_search(query.clone());
        self.selected = 0;
        Mode::Searching(query)
    }

    fn handle_prompt(&mut self, code: KeyCode, mut prompt: PathPrompt) -> Mode {
        match code {
            KeyCode::Esc => {
                self.set_status(format!("{} cancelled.", prompt.purpose.title()), StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Enter => match self.run_prompt(&prompt) {
                Ok(()) => Mode::Normal,
                Err(err) => {
                    self.set_status(surface_error(&err), StatusKind::Error);
                    Mode::Prompt(prompt)
                }
            },
            KeyCode::Backspace => {
                prompt.input.pop();
                Mode::Prompt(prompt)
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                prompt.input.push(ch);
                Mode::Prompt(prompt)
            }
            _ => Mode::Prompt(prompt),
        }
    }

    fn handle_chart_picker(&mut self, code: KeyCode, mut picker: ChartPicker) -> Mode {
        match code {
            KeyCode::Esc => {
                self.set_status("Chart cancelled.", StatusKind::Info);
                return Mode::Normal;
            }
            KeyCode::Up => picker.move_selection(-1),
            KeyCode::Down | KeyCode::Tab => picker.move_selection(1),
            KeyCode::Left => picker.cycle(-1),
            KeyCode::Right | KeyCode::Char(' ') => picker.cycle(1),
            KeyCode::Enter => {
                self.settings.chart = picker.config;
                return self.prompt_for_active(PromptPurpose::ExportChart(picker.config), "png");
            }
            _ => {}
        }
        Mode::ChartPicker(picker)
    }

    fn handle_confirm_close(&mut self, code: KeyCode, confirm: ConfirmClose) -> Mode {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.close_document(confirm);
                Mode::Normal
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Close cancelled.", StatusKind::Info);
                Mode::Normal
            }
            _ => Mode::ConfirmClose(confirm),
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn submit_form(&mut self, target: Option<(u32, u64)>, form: &ManufacturerForm) -> Result<()> {
        let controller = self
            .active_controller()
            .ok_or_else(|| anyhow!("No document open."))?;
        let mut record = form.parse_inputs()?;

        let focus = match target {
            None => {
                let created = controller
                    .create(record)
                    .context("Could not add manufacturer")?;
                self.set_status(format!("Added {created}."), StatusKind::Info);
                created.id
            }
            Some((id, revision)) => {
                record.id = id;
                controller
                    .update_at(revision, record)
                    .context("Could not update manufacturer")?;
                self.set_status(format!("Updated manufacturer #{id}."), StatusKind::Info);
                id
            }
        };

        self.refresh_rows();
        if let Some(pos) = self.rows.iter().position(|m| m.id == focus) {
            self.selected = pos;
        }
        Ok(())
    }

    fn run_prompt(&mut self, prompt: &PathPrompt) -> Result<()> {
        let path = prompt.path()?;
        match prompt.purpose {
            PromptPurpose::Open => {
                self.manager
                    .open_document(&path)
                    .with_context(|| format!("Could not open {}", path.display()))?;
                self.settings.push_recent(&path);
                self.after_document_switch();
                self.set_status(format!("Opened {}.", path.display()), StatusKind::Info);
            }
            PromptPurpose::SaveAs => {
                let controller = self.require_controller()?;
                self.tasks.spawn(self.manager.active_id(), "Save as", move || {
                    controller
                        .save_as(&path)
                        .with_context(|| format!("Could not save {}", path.display()))?;
                    Ok(format!("Saved {}.", path.display()))
                });
                self.set_status("Saving...", StatusKind::Info);
            }
            PromptPurpose::ExportJson => {
                let records = self.require_controller()?.all();
                self.spawn_export("Export JSON", path, move |path| {
                    export::export_json(&records, path)
                });
            }
            PromptPurpose::ExportPdf => {
                let records = self.require_controller()?.all();
                let title = self.active_title();
                self.spawn_export("Export PDF", path, move |path| {
                    export::export_pdf(&records, &title, path)
                });
            }
            PromptPurpose::ExportChart(config) => {
                let records = self.require_controller()?.all();
                self.spawn_export("Export chart", path, move |path| {
                    export::export_chart(&records, &config, path)
                });
            }
        }
        Ok(())
    }

    /// Run an export job in the background and optionally open the result.
    fn spawn_export<F>(&mut self, label: &'static str, path: PathBuf, job: F)
    where
        F: FnOnce(&Path) -> crate::error::Result<()> + Send + 'static,
    {
        let open_after = self.settings.open_exports;
        self.tasks.spawn(self.manager.active_id(), label, move || {
            job(path.as_path()).with_context(|| format!("{label} failed"))?;
            if open_after {
                if let Err(err) = export::open_in_viewer(&path) {
                    tracing::warn!(path = %path.display(), error = %err, "could not open export");
                }
            }
            Ok(format!("Wrote {}.", path.display()))
        });
        self.set_status(format!("{label}..."), StatusKind::Info);
    }

    /// Save the active document, or ask for a path when it has none.
    fn save_active(&mut self) -> Option<Mode> {
        let Some(doc) = self.manager.active_document() else {
            return Some(self.no_document());
        };
        let Some(path) = doc.file_path() else {
            return Some(self.prompt_for_active(PromptPurpose::SaveAs, "csv"));
        };
        let controller = Arc::clone(doc.controller());
        self.tasks.spawn(Some(doc.id()), "Save", move || {
            controller.save().context("Save failed")?;
            Ok(format!("Saved {}.", path.display()))
        });
        self.set_status("Saving...", StatusKind::Info);
        None
    }

    fn reload_active(&mut self) {
        let Some(controller) = self.active_controller() else {
            self.set_status("No document open.", StatusKind::Error);
            return;
        };
        match controller.reload().context("Reload failed") {
            Ok(()) => {
                self.refresh_rows();
                self.set_status("Reloaded from disk.", StatusKind::Info);
            }
            Err(err) => self.set_status(surface_error(&err), StatusKind::Error),
        }
    }

    fn toggle_sort(&mut self, column: Column) {
        let Some(sort) = self
            .manager
            .active_document_mut()
            .map(|doc| doc.toggle_sort(column))
        else {
            return;
        };
        self.refresh_rows();
        let direction = if sort.ascending { "ascending" } else { "descending" };
        self.set_status(format!("Sorted by {column} ({direction})."), StatusKind::Info);
    }

    /// Write the displayed sort order back into the document itself.
    fn commit_sort(&mut self) {
        let Some(doc) = self.manager.active_document_mut() else {
            return;
        };
        let Some(sort) = doc.sort_state() else {
            self.set_status("Pick a sort column first (1-9).", StatusKind::Error);
            return;
        };
        doc.set_sort(None);
        let controller = Arc::clone(doc.controller());
        let id = doc.id();
        self.tasks.spawn(Some(id), "Apply sort", move || {
            controller
                .commit_sort(sort.column.header(), sort.ascending)
                .context("Could not reorder records")?;
            Ok(format!("Records reordered by {}.", sort.column))
        });
        self.set_status("Reordering...", StatusKind::Info);
    }

    fn request_close(&mut self) -> Mode {
        let Some(doc) = self.manager.active_document() else {
            return self.no_document();
        };
        let confirm = ConfirmClose {
            id: doc.id(),
            title: doc.title(),
        };
        if doc.is_unsaved() {
            Mode::ConfirmClose(confirm)
        } else {
            self.close_document(confirm);
            Mode::Normal
        }
    }

    fn close_document(&mut self, confirm: ConfirmClose) {
        match self.manager.close_document(confirm.id) {
            Ok(_) => {
                self.manager.cycle_active(0);
                self.after_document_switch();
                self.set_status(format!("Closed {}.", confirm.title), StatusKind::Info);
            }
            Err(err) => self.set_status(err.to_string(), StatusKind::Error),
        }
    }

    fn switch_document(&mut self, offset: isize) -> Mode {
        if self.manager.cycle_active(offset).is_some() {
            self.after_document_switch();
        }
        Mode::Normal
    }

    fn finish_task(&mut self, done: Completion) {
        match done.outcome {
            Ok(message) => {
                let path = done
                    .document
                    .and_then(|id| self.manager.document(id))
                    .and_then(|doc| doc.file_path());
                if let Some(path) = path {
                    self.settings.push_recent(&path);
                }
                self.set_status(message, StatusKind::Info);
            }
            Err(err) => {
                tracing::warn!(task = %done.label, error = %format!("{err:#}"), "background task failed");
                self.set_status(format!("{}: {}", done.label, surface_error(&err)), StatusKind::Error);
            }
        }
    }

    // ------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------

    fn active_controller(&self) -> Option<Arc<ManufacturerController>> {
        self.manager
            .active_document()
            .map(|doc| Arc::clone(doc.controller()))
    }

    fn require_controller(&self) -> Result<Arc<ManufacturerController>> {
        self.active_controller()
            .ok_or_else(|| anyhow!("No document open."))
    }

    fn active_title(&self) -> String {
        self.manager
            .active_document()
            .map(|doc| doc.title())
            .unwrap_or_else(|| "Manufacturers".to_string())
    }

    fn prompt_for_active(&mut self, purpose: PromptPurpose, extension: &str) -> Mode {
        let Some(doc) = self.manager.active_document() else {
            return self.no_document();
        };
        let suggestion = export::default_path(doc.file_path().as_deref(), extension);
        Mode::Prompt(PathPrompt::new(purpose, Some(suggestion)))
    }

    fn no_document(&mut self) -> Mode {
        self.set_status(
            "No document open. Press 'n' for a new one or 'o' to open a file.",
            StatusKind::Error,
        );
        Mode::Normal
    }

    fn is_searching(&self) -> bool {
        self.manager
            .active_document()
            .is_some_and(|doc| doc.is_searching())
    }

    fn set_search(&mut self, query: String) {
        if let Some(doc) = self.manager.active_document_mut() {
            doc.set_search(query);
        }
        self.refresh_rows();
    }

    fn after_document_switch(&mut self) {
        self.selected = 0;
        self.refresh_rows();
    }

    fn refresh_rows(&mut self) {
        // Revision first: a change landing in between only makes it look older.
        let (revision, rows) = self
            .manager
            .active_document_mut()
            .map(|doc| (doc.controller().revision(), doc.visible_records()))
            .unwrap_or_default();
        self.rows_revision = revision;
        self.rows = rows;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    fn current_record(&self) -> Option<&Manufacturer> {
        self.rows.get(self.selected)
    }

    fn moved(&mut self, offset: isize) -> Mode {
        self.move_selection(offset);
        Mode::Normal
    }

    fn move_selection(&mut self, offset: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.rows.len() as isize - 1;
        self.selected = (self.selected as isize + offset).clamp(0, last) as usize;
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);

        self.draw_tabs(frame, chunks[0]);
        self.draw_table(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);

        match &self.mode {
            Mode::Adding(form) => self.draw_form(frame, area, "Add manufacturer", form),
            Mode::Editing { id, form, .. } => {
                self.draw_form(frame, area, &format!("Edit manufacturer #{id}"), form)
            }
            Mode::ConfirmDelete(confirm) => self.draw_confirm(
                frame,
                area,
                "Delete manufacturer",
                vec![format!("Delete #{} {}?", confirm.id, confirm.name)],
            ),
            Mode::Searching(query) => self.draw_search_bar(frame, chunks[1], query),
            Mode::Prompt(prompt) => self.draw_prompt(frame, area, prompt),
            Mode::ChartPicker(picker) => self.draw_chart_picker(frame, area, picker),
            Mode::ProductTypes(types) => self.draw_product_types(frame, area, types),
            Mode::ConfirmClose(confirm) => self.draw_confirm(
                frame,
                area,
                "Close document",
                vec![
                    format!("{} has unsaved changes.", confirm.title),
                    "Close it anyway?".to_string(),
                ],
            ),
            Mode::ConfirmQuit => {
                let mut lines = Vec::new();
                let unsaved = self
                    .manager
                    .documents()
                    .iter()
                    .filter(|doc| doc.is_unsaved())
                    .count();
                if unsaved > 0 {
                    lines.push(format!("{unsaved} document(s) have unsaved changes."));
                }
                if !self.tasks.is_idle() {
                    lines.push(format!(
                        "{} background task(s) will finish first.",
                        self.tasks.pending()
                    ));
                }
                lines.push("Quit anyway?".to_string());
                self.draw_confirm(frame, area, "Quit", lines);
            }
            Mode::Normal => {}
        }
    }

    fn draw_tabs(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Documents");
        if self.manager.is_empty() {
            let message = Paragraph::new("No documents open.")
                .block(block)
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(message, area);
            return;
        }

        let titles: Vec<Line> = self
            .manager
            .documents()
            .iter()
            .map(|doc| {
                let marker = if doc.is_unsaved() { "*" } else { "" };
                Line::from(format!("{}{marker}", doc.title()))
            })
            .collect();
        let active = self.manager.active_id().and_then(|id| {
            self.manager
                .documents()
                .iter()
                .position(|doc| doc.id() == id)
        });

        let tabs = Tabs::new(titles)
            .block(block)
            .select(active.unwrap_or(0))
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn draw_table(&self, frame: &mut Frame, area: Rect) {
        let Some(doc) = self.manager.active_document() else {
            let message = Paragraph::new(
                "Press 'n' for a new document or 'o' to open a CSV file.",
            )
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: true });
            frame.render_widget(message, area);
            return;
        };

        let sort = doc.sort_state();
        let header = Row::new(
            Column::ALL
                .iter()
                .enumerate()
                .map(|(i, &column)| Cell::from(header_label(i, column, sort))),
        )
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

        let rows = self.rows.iter().map(|m| {
            Row::new(
                Column::ALL
                    .iter()
                    .map(|&column| Cell::from(m.field_text(column))),
            )
        });

        let total = doc.controller().len();
        let mut title = format!("{} | {} manufacturer(s)", doc.title(), total);
        if let Some(query) = doc.search_query() {
            title.push_str(&format!(" | {} match '{}'", self.rows.len(), query));
        }
        if doc.is_unsaved() {
            title.push_str(" | unsaved");
        }

        let table = Table::new(rows, column_widths())
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(title))
            .row_highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        let selected = (!self.rows.is_empty()).then_some(self.selected);
        let mut state = TableState::default().with_selected(selected);
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let paragraph = Paragraph::new(vec![status_line, self.footer_instructions()])
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let keys: &[(&str, &str)] = match &self.mode {
            Mode::Normal => &[
                ("[+]", " Add  "),
                ("[e]", " Edit  "),
                ("[-]", " Delete  "),
                ("[/]", " Search  "),
                ("[1-9]", " Sort  "),
                ("[s/S]", " Save/as  "),
                ("[o]", " Open  "),
                ("[n]", " New  "),
                ("[w]", " Close  "),
                ("[Tab]", " Next doc  "),
                ("[p/J/c]", " PDF/JSON/Chart  "),
                ("[t]", " Types  "),
                ("[q]", " Quit"),
            ],
            Mode::Searching(_) => &[
                ("[Enter]", " Keep filter  "),
                ("[Esc]", " Clear  "),
                ("[↑↓]", " Navigate"),
            ],
            Mode::ChartPicker(_) => &[
                ("[↑↓]", " Option  "),
                ("[←→]", " Change  "),
                ("[Enter]", " Export  "),
                ("[Esc]", " Cancel"),
            ],
            Mode::ProductTypes(_) => &[("[Esc]", " Close")],
            Mode::ConfirmDelete(_) | Mode::ConfirmClose(_) | Mode::ConfirmQuit => {
                &[("[y]", " Yes  "), ("[n]", " No")]
            }
            Mode::Adding(_) | Mode::Editing { .. } | Mode::Prompt(_) => {
                &[("[Enter]", " Confirm  "), ("[Esc]", " Cancel")]
            }
        };
        Line::from(
            keys.iter()
                .flat_map(|(key, label)| {
                    [
                        Span::styled(key.to_string(), key_style),
                        Span::raw(label.to_string()),
                    ]
                })
                .collect::<Vec<_>>(),
        )
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, query: &str) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title("Search");
        let paragraph = Paragraph::new(Span::raw(format!("Search: {query}")))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn draw_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &ManufacturerForm) {
        let popup_area = centered_rect(70, 60, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(title.to_string()).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines: Vec<Line> = FormField::ALL
            .iter()
            .map(|&field| form.build_line(field))
            .collect();
        lines.push(Line::from(""));

        if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Enter to save • Tab to accept/switch • Esc to cancel",
                Style::default().fg(Color::Gray),
            )));
        }

        frame.render_widget(Paragraph::new(lines), inner);

        let row = FormField::ALL
            .iter()
            .position(|&field| field == form.active)
            .unwrap_or(0) as u16;
        frame.set_cursor_position((inner.x + form.cursor_offset(), inner.y + row));
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect, title: &str, message: Vec<String>) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let mut lines: Vec<Line> = message.into_iter().map(Line::from).collect();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "y to confirm • n or Esc to cancel",
            Style::default().fg(Color::Gray),
        )));

        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::default().title(title.to_string()).borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }

    fn draw_prompt(&self, frame: &mut Frame, area: Rect, prompt: &PathPrompt) {
        let popup_area = centered_rect(70, 20, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(prompt.purpose.title())
            .borders(Borders::ALL);
        let paragraph = Paragraph::new(vec![
            Line::from(format!("Path: {}", prompt.input)),
            Line::from(Span::styled(
                "Enter to confirm • Esc to cancel",
                Style::default().fg(Color::Gray),
            )),
        ])
        .block(block.clone());
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Path: ".len() as u16 + prompt.input.chars().count() as u16;
        frame.set_cursor_position((cursor_x.min(inner.right().saturating_sub(1)), inner.y));
    }

    fn draw_chart_picker(&self, frame: &mut Frame, area: Rect, picker: &ChartPicker) {
        let popup_area = centered_rect(50, 40, area);
        frame.render_widget(Clear, popup_area);

        let lines: Vec<Line> = picker
            .lines()
            .into_iter()
            .map(|(label, value, selected)| {
                let style = if selected {
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::raw(format!("{label:>12}: ")),
                    Span::styled(value, style),
                ])
            })
            .collect();

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Generate chart").borders(Borders::ALL));
        frame.render_widget(paragraph, popup_area);
    }

    fn draw_product_types(&self, frame: &mut Frame, area: Rect, types: &[String]) {
        let popup_area = centered_rect(40, 50, area);
        frame.render_widget(Clear, popup_area);

        let items: Vec<ListItem> = if types.is_empty() {
            vec![ListItem::new(Span::styled(
                "No product types yet.",
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            types.iter().map(|kind| ListItem::new(kind.clone())).collect()
        };
        let list = List::new(items).block(
            Block::default()
                .title(format!("Product types ({})", types.len()))
                .borders(Borders::ALL),
        );
        frame.render_widget(list, popup_area);
    }
}

fn is_stale(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Stale { .. }))
}
