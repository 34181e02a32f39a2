//! Tabular PDF report of a document's records.
//!
//! The report is plain monospaced text laid out in fixed-width columns, so it
//! only needs the built-in Courier font and a hand-assembled PDF 1.4 file:
//! no embedded fonts, no compression.

use std::fmt::Write as _;

use chrono::Local;

use crate::models::{Column, Manufacturer};

const PAGE_WIDTH: u32 = 842;
const PAGE_HEIGHT: u32 = 595;
const MARGIN: u32 = 36;
const FONT_SIZE: u32 = 8;
const LINE_HEIGHT: u32 = 11;
const TITLE_SIZE: u32 = 14;

/// Character widths per column, in table order.
const COLUMN_WIDTHS: [usize; 9] = [5, 22, 14, 26, 16, 26, 16, 6, 14];

/// Table rows that fit below the title and header on one page.
const ROWS_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN - 3 * LINE_HEIGHT - TITLE_SIZE) / LINE_HEIGHT) as usize;

/// Lay `records` out as a landscape A4 PDF titled `title`.
pub fn render_pdf(records: &[Manufacturer], title: &str) -> Vec<u8> {
    let generated = Local::now().format("%Y-%m-%d %H:%M").to_string();
    let header = table_line(Column::ALL.iter().map(|c| c.header().to_string()));
    let rule = "-".repeat(header.len());

    let rows: Vec<String> = records
        .iter()
        .map(|m| table_line(Column::ALL.iter().map(|&c| m.field_text(c))))
        .collect();
    let pages: Vec<&[String]> = if rows.is_empty() {
        vec![&rows[..]]
    } else {
        rows.chunks(ROWS_PER_PAGE).collect()
    };

    let page_count = pages.len();
    let mut pdf = PdfWriter::new();
    pdf.object("<< /Type /Catalog /Pages 2 0 R >>");
    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", page_object(i)))
        .collect();
    pdf.object(&format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        page_count
    ));
    pdf.object("<< /Type /Font /Subtype /Type1 /BaseFont /Courier /Encoding /WinAnsiEncoding >>");

    for (i, page_rows) in pages.iter().enumerate() {
        let mut content = String::new();
        let top = PAGE_HEIGHT - MARGIN - TITLE_SIZE;
        let _ = writeln!(
            content,
            "BT /F1 {TITLE_SIZE} Tf {MARGIN} {top} Td ({}) Tj ET",
            escape(title)
        );
        let _ = writeln!(
            content,
            "BT /F1 {FONT_SIZE} Tf {LINE_HEIGHT} TL {MARGIN} {} Td",
            top - 2 * LINE_HEIGHT
        );
        let _ = writeln!(content, "({}) Tj T* ({}) Tj", escape(&header), rule);
        if page_rows.is_empty() {
            let _ = writeln!(content, "T* (No manufacturers.) Tj");
        }
        for row in page_rows.iter() {
            let _ = writeln!(content, "T* ({}) Tj", escape(row));
        }
        let _ = writeln!(content, "ET");
        let _ = writeln!(
            content,
            "BT /F1 {FONT_SIZE} Tf {MARGIN} {} Td (Generated {generated}    Page {} of {page_count}) Tj ET",
            MARGIN / 2,
            i + 1
        );

        pdf.object(&format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_object(i) + 1
        ));
        pdf.object(&format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ));
    }

    tracing::debug!(records = records.len(), pages = page_count, "rendered report");
    pdf.finish()
}

/// Object number of page `index`; its content stream follows it.
fn page_object(index: usize) -> usize {
    4 + 2 * index
}

fn table_line(cells: impl Iterator<Item = String>) -> String {
    let mut line = String::new();
    for (cell, width) in cells.zip(COLUMN_WIDTHS) {
        let mut cell: String = cell.chars().filter(|c| !c.is_control()).collect();
        if cell.chars().count() >= width {
            cell = cell.chars().take(width - 2).collect();
            cell.push('~');
        }
        let _ = write!(line, "{cell:<width$}");
    }
    line.trim_end().to_string()
}

/// Escape a string for a PDF literal. Anything outside printable ASCII is
/// replaced, since Courier's standard encoding is all the report relies on.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            _ => out.push('?'),
        }
    }
    out
}

struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    /// Append the next numbered object.
    fn object(&mut self, body: &str) {
        self.offsets.push(self.buf.len());
        let number = self.offsets.len();
        self.buf
            .extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        let xref = self.buf.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            let _ = write!(tail, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            tail,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            self.offsets.len() + 1
        );
        self.buf.extend_from_slice(tail.as_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maker(id: u32, name: &str) -> Manufacturer {
        Manufacturer {
            id,
            name: name.into(),
            country: "DE".into(),
            founded_year: 1950,
            revenue: 12.5,
            ..Default::default()
        }
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn report_is_a_pdf_listing_every_record() {
        let pdf = text(&render_pdf(&[maker(1, "Acme"), maker(2, "Beton")], "Plants"));
        assert!(pdf.starts_with("%PDF-"));
        assert!(pdf.ends_with("%%EOF\n"));
        assert!(pdf.contains("(Plants) Tj"));
        assert!(pdf.contains("Acme"));
        assert!(pdf.contains("Beton"));
        assert!(pdf.contains("12.50"));
        assert!(pdf.contains("/Count 1"));
    }

    #[test]
    fn long_reports_span_pages() {
        let records: Vec<Manufacturer> = (1..=(ROWS_PER_PAGE as u32 * 2 + 1))
            .map(|id| maker(id, "Acme"))
            .collect();
        let pdf = text(&render_pdf(&records, "Plants"));
        assert!(pdf.contains("/Count 3"));
        assert!(pdf.contains("Page 3 of 3"));
    }

    #[test]
    fn empty_report_still_has_a_page() {
        let pdf = text(&render_pdf(&[], "Empty"));
        assert!(pdf.contains("/Count 1"));
        assert!(pdf.contains("No manufacturers."));
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(escape(r"a(b)\c"), r"a\(b\)\\c");
        assert_eq!(escape("Müller"), "M?ller");
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let bytes = render_pdf(&[maker(1, "Acme")], "Plants");
        let pdf = text(&bytes);
        let xref = pdf.find("\nxref\n").unwrap() + 1;
        let entries: Vec<usize> = pdf[xref..]
            .lines()
            .skip(3)
            .take_while(|line| line.ends_with(" n "))
            .map(|line| line[..10].parse().unwrap())
            .collect();
        assert_eq!(entries.len(), 5);
        for (i, offset) in entries.into_iter().enumerate() {
            assert!(pdf[offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }
}
