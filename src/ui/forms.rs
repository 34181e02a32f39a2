use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::chart::{ChartConfig, ChartType, ColorScheme};
use crate::models::Manufacturer;
use crate::session::DocumentId;

/// Editable fields of the manufacturer form, in tab order. The id is never
/// typed in; the controller assigns it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum FormField {
    #[default]
    Name,
    Country,
    Address,
    Phone,
    Email,
    ProductType,
    FoundedYear,
    Revenue,
}

impl FormField {
    pub(crate) const ALL: [FormField; 8] = [
        FormField::Name,
        FormField::Country,
        FormField::Address,
        FormField::Phone,
        FormField::Email,
        FormField::ProductType,
        FormField::FoundedYear,
        FormField::Revenue,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            FormField::Name => "Name",
            FormField::Country => "Country",
            FormField::Address => "Address",
            FormField::Phone => "Phone",
            FormField::Email => "Email",
            FormField::ProductType => "Product type",
            FormField::FoundedYear => "Founded",
            FormField::Revenue => "Revenue",
        }
    }

    fn placeholder(self) -> &'static str {
        match self {
            FormField::Name | FormField::FoundedYear => "<required>",
            FormField::Revenue => "0.00",
            _ => "<optional>",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn offset(self, step: isize) -> Self {
        let len = Self::ALL.len() as isize;
        Self::ALL[(self.index() as isize + step).rem_euclid(len) as usize]
    }
}

/// Add/edit form state, including product type autocomplete.
#[derive(Default, Clone)]
pub(crate) struct ManufacturerForm {
    values: [String; 8],
    pub(crate) active: FormField,
    pub(crate) error: Option<String>,
    suggestion: Option<String>,
    autocomplete_disabled: bool,
}

impl ManufacturerForm {
    /// Populate the form from an existing record when editing.
    pub(crate) fn from_manufacturer(m: &Manufacturer) -> Self {
        Self {
            values: [
                m.name.clone(),
                m.country.clone(),
                m.address.clone(),
                m.phone.clone(),
                m.email.clone(),
                m.product_type.clone(),
                m.founded_year.to_string(),
                m.revenue_text(),
            ],
            ..Self::default()
        }
    }

    pub(crate) fn value(&self, field: FormField) -> &str {
        &self.values[field.index()]
    }

    /// Move focus by `step` fields, wrapping around.
    pub(crate) fn move_focus(&mut self, step: isize) {
        self.active = self.active.offset(step);
        self.suggestion = None;
    }

    /// Insert a character into the active field. Numeric fields only take
    /// characters that can appear in their numbers.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        let accepted = match self.active {
            FormField::FoundedYear => ch.is_ascii_digit(),
            FormField::Revenue => ch.is_ascii_digit() || ch == '.',
            FormField::Phone => ch.is_ascii_digit() || "+-() ".contains(ch),
            _ => true,
        };
        if !accepted {
            return false;
        }
        if self.active == FormField::ProductType {
            self.autocomplete_disabled = false;
        }
        self.values[self.active.index()].push(ch);
        true
    }

    pub(crate) fn backspace(&mut self) {
        self.values[self.active.index()].pop();
        if self.active == FormField::ProductType {
            self.autocomplete_disabled = false;
        }
    }

    /// Typed record ready for the controller. Only the checks a form can do
    /// happen here; range and e-mail checks are the controller's.
    pub(crate) fn parse_inputs(&self) -> Result<Manufacturer> {
        let text = |field: FormField| self.value(field).trim().to_string();

        let name = text(FormField::Name);
        if name.is_empty() {
            return Err(anyhow!("Name is required."));
        }
        let year_raw = text(FormField::FoundedYear);
        if year_raw.is_empty() {
            return Err(anyhow!("Founded year is required."));
        }
        let founded_year = year_raw
            .parse::<i32>()
            .context("Founded year must be a whole number.")?;
        let revenue_raw = text(FormField::Revenue);
        let revenue = if revenue_raw.is_empty() {
            0.0
        } else {
            revenue_raw
                .parse::<f64>()
                .context("Revenue must be a number.")?
        };

        Ok(Manufacturer {
            id: 0,
            name,
            country: text(FormField::Country),
            address: text(FormField::Address),
            phone: text(FormField::Phone),
            email: text(FormField::Email),
            product_type: text(FormField::ProductType),
            founded_year,
            revenue,
        })
    }

    /// Refresh the product type suggestion from the document's known types.
    pub(crate) fn update_suggestion(&mut self, product_types: &[String]) {
        let current = self.value(FormField::ProductType);
        if self.active != FormField::ProductType
            || self.autocomplete_disabled
            || current.chars().count() < 2
        {
            self.suggestion = None;
            return;
        }

        let current_lower = current.to_lowercase();
        self.suggestion = product_types
            .iter()
            .find(|candidate| candidate.to_lowercase().starts_with(&current_lower))
            .filter(|candidate| candidate.to_lowercase() != current_lower)
            .cloned();
    }

    pub(crate) fn accept_suggestion(&mut self) -> bool {
        match self.suggestion.take() {
            Some(candidate) if self.active == FormField::ProductType => {
                self.values[FormField::ProductType.index()] = candidate;
                self.autocomplete_disabled = true;
                true
            }
            _ => false,
        }
    }

    /// Dismiss the suggestion. Returns false when there was none, so Esc can
    /// fall through to closing the form.
    pub(crate) fn cancel_autocomplete(&mut self) -> bool {
        if self.has_active_suggestion() {
            self.autocomplete_disabled = true;
            self.suggestion = None;
            return true;
        }
        false
    }

    pub(crate) fn has_active_suggestion(&self) -> bool {
        self.active == FormField::ProductType && self.suggestion.is_some()
    }

    /// Remaining characters of the suggestion, shown ghosted after the input.
    fn suggestion_suffix(&self) -> Option<String> {
        let candidate = self.suggestion.as_ref()?;
        let typed = self.value(FormField::ProductType).chars().count();
        let suffix: String = candidate.chars().skip(typed).collect();
        (!suffix.is_empty()).then_some(suffix)
    }

    pub(crate) fn build_line(&self, field: FormField) -> Line<'static> {
        let value = self.value(field);
        let is_active = self.active == field;

        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        let mut spans = vec![Span::raw(format!("{:>13}: ", field.label()))];
        if value.is_empty() && !is_active {
            spans.push(Span::styled(field.placeholder().to_string(), style));
        } else {
            spans.push(Span::styled(value.to_string(), style));
        }
        if field == FormField::ProductType && is_active {
            if let Some(suffix) = self.suggestion_suffix() {
                spans.push(Span::styled(suffix, Style::default().fg(Color::DarkGray)));
            }
        }
        Line::from(spans)
    }

    /// Cursor column offset for the active field, label included.
    pub(crate) fn cursor_offset(&self) -> u16 {
        (15 + self.value(self.active).chars().count()) as u16
    }
}

/// The record a delete confirmation is about.
pub(crate) struct ConfirmDelete {
    pub(crate) id: u32,
    pub(crate) name: String,
    /// Data revision the id was read at.
    pub(crate) revision: u64,
}

impl ConfirmDelete {
    pub(crate) fn new(m: Manufacturer, revision: u64) -> Self {
        Self {
            id: m.id,
            name: m.name,
            revision,
        }
    }
}

/// What a path prompt does once confirmed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PromptPurpose {
    Open,
    SaveAs,
    ExportJson,
    ExportPdf,
    ExportChart(ChartConfig),
}

impl PromptPurpose {
    pub(crate) fn title(&self) -> &'static str {
        match self {
            PromptPurpose::Open => "Open CSV file",
            PromptPurpose::SaveAs => "Save as",
            PromptPurpose::ExportJson => "Export JSON",
            PromptPurpose::ExportPdf => "Export PDF report",
            PromptPurpose::ExportChart(_) => "Export chart (PNG)",
        }
    }
}

/// Single-line path input.
pub(crate) struct PathPrompt {
    pub(crate) purpose: PromptPurpose,
    pub(crate) input: String,
}

impl PathPrompt {
    pub(crate) fn new(purpose: PromptPurpose, initial: Option<PathBuf>) -> Self {
        Self {
            purpose,
            input: initial
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn path(&self) -> Result<PathBuf> {
        let trimmed = self.input.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("A file path is required."));
        }
        Ok(PathBuf::from(trimmed))
    }
}

/// Rows of the chart dialog.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChartOption {
    Type,
    Colors,
    ShowValues,
    SortData,
}

impl ChartOption {
    pub(crate) const ALL: [ChartOption; 4] = [
        ChartOption::Type,
        ChartOption::Colors,
        ChartOption::ShowValues,
        ChartOption::SortData,
    ];
}

pub(crate) struct ChartPicker {
    pub(crate) config: ChartConfig,
    pub(crate) selected: usize,
}

impl ChartPicker {
    pub(crate) fn new(config: ChartConfig) -> Self {
        Self {
            config,
            selected: 0,
        }
    }

    pub(crate) fn move_selection(&mut self, step: isize) {
        let len = ChartOption::ALL.len() as isize;
        self.selected = (self.selected as isize + step).rem_euclid(len) as usize;
    }

    /// Step the highlighted option to its next (or previous) value.
    pub(crate) fn cycle(&mut self, step: isize) {
        let config = &mut self.config;
        match ChartOption::ALL[self.selected] {
            ChartOption::Type => {
                config.chart_type = cycle_in(&ChartType::ALL, config.chart_type, step);
            }
            ChartOption::Colors => {
                config.color_scheme = cycle_in(&ColorScheme::ALL, config.color_scheme, step);
            }
            ChartOption::ShowValues => config.show_values = !config.show_values,
            ChartOption::SortData => config.sort_data = !config.sort_data,
        }
    }

    pub(crate) fn lines(&self) -> Vec<(String, String, bool)> {
        let on_off = |flag: bool| if flag { "on" } else { "off" }.to_string();
        ChartOption::ALL
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let (label, value) = match option {
                    ChartOption::Type => ("Chart", self.config.chart_type.label().to_string()),
                    ChartOption::Colors => ("Colors", self.config.color_scheme.key().to_string()),
                    ChartOption::ShowValues => ("Show values", on_off(self.config.show_values)),
                    ChartOption::SortData => ("Sort data", on_off(self.config.sort_data)),
                };
                (label.to_string(), value, i == self.selected)
            })
            .collect()
    }
}

fn cycle_in<T: Copy + PartialEq>(all: &[T], current: T, step: isize) -> T {
    let len = all.len() as isize;
    let pos = all.iter().position(|item| *item == current).unwrap_or(0) as isize;
    all[(pos + step).rem_euclid(len) as usize]
}

/// Closing a document that has unsaved changes.
pub(crate) struct ConfirmClose {
    pub(crate) id: DocumentId,
    pub(crate) title: String,
}
