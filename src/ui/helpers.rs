use anyhow::Error;
use ratatui::layout::{Constraint, Direction, Layout, Rect};

use crate::models::Column;
use crate::session::SortState;

/// Table column widths, in `Column::ALL` order. Free-text columns flex, the
/// rest are sized for their typical content.
pub(crate) fn column_widths() -> [Constraint; 9] {
    Column::ALL.map(|column| match column {
        Column::Id => Constraint::Length(5),
        Column::Name => Constraint::Min(14),
        Column::Country => Constraint::Length(12),
        Column::Address => Constraint::Min(16),
        Column::Phone => Constraint::Length(15),
        Column::Email => Constraint::Min(18),
        Column::ProductType => Constraint::Length(14),
        Column::FoundedYear => Constraint::Length(8),
        Column::Revenue => Constraint::Length(13),
    })
}

/// Header text for `column` with an arrow when the table is sorted on it,
/// prefixed by the digit key that sorts it.
pub(crate) fn header_label(index: usize, column: Column, sort: Option<SortState>) -> String {
    let arrow = match sort {
        Some(sort) if sort.column == column && sort.ascending => " ▲",
        Some(sort) if sort.column == column => " ▼",
        _ => "",
    };
    format!("{} {}{}", index + 1, column.header(), arrow)
}

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most relevant error message from a chained error.
pub(crate) fn surface_error(err: &Error) -> String {
    err.chain()
        .last()
        .map(|cause| cause.to_string())
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn header_marks_the_sort_column() {
        let sort = Some(SortState {
            column: Column::Revenue,
            ascending: false,
        });
        assert_eq!(header_label(8, Column::Revenue, sort), "9 Revenue ▼");
        assert_eq!(header_label(1, Column::Name, sort), "2 Name");
    }

    #[test]
    fn surface_error_prefers_the_root_cause() {
        let err = Err::<(), _>(std::io::Error::other("disk full"))
            .context("Save failed")
            .unwrap_err();
        assert_eq!(surface_error(&err), "disk full");
    }

    #[test]
    fn centered_rect_stays_inside_the_area() {
        let area = Rect::new(0, 0, 100, 50);
        let popup = centered_rect(60, 40, area);
        assert_eq!(popup.width, 60);
        assert_eq!(popup.height, 20);
        assert_eq!(popup.x, 20);
    }
}
