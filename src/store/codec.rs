use std::io::{Read, Write};

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

use crate::models::{Column, Manufacturer};

/// Number of fields every data row must carry.
pub const FIELD_COUNT: usize = 9;

/// Header row in canonical column order.
pub fn header() -> [&'static str; FIELD_COUNT] {
    Column::ALL.map(Column::header)
}

/// Turn raw rows into records.
///
/// A leading header is skipped only when its first field is the literal `ID`.
/// Rows with fewer than nine fields are dropped so one damaged line does not
/// cost the rest of the file; extra trailing fields are ignored.
pub fn decode<R, S>(rows: impl IntoIterator<Item = R>) -> Vec<Manufacturer>
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    for (index, row) in rows.into_iter().enumerate() {
        let fields: Vec<&str> = row.as_ref().iter().map(|field| field.as_ref()).collect();
        if index == 0 && is_header(&fields) {
            continue;
        }
        match decode_row(&fields) {
            Some(record) => records.push(record),
            None => tracing::warn!(row = index, fields = fields.len(), "dropping short row"),
        }
    }
    records
}

/// Read CSV text from `reader` and decode it. Only structural problems the
/// CSV reader itself cannot get past (I/O, invalid UTF-8) are errors.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Manufacturer>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let rows = reader
        .records()
        .collect::<Result<Vec<StringRecord>, _>>()?;
    let rows: Vec<Vec<&str>> = rows.iter().map(|row| row.iter().collect()).collect();
    Ok(decode(rows))
}

/// Turn records into rows, header first.
pub fn encode(records: &[Manufacturer]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(header().iter().map(|h| h.to_string()).collect());
    rows.extend(records.iter().map(encode_row));
    rows
}

/// Encode `records` as CSV into `writer`. Fields that contain the delimiter
/// or quotes are quoted by the writer.
pub fn write_records<W: Write>(writer: W, records: &[Manufacturer]) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    for row in encode(records) {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn is_header(fields: &[&str]) -> bool {
    fields
        .first()
        .map(|first| first.trim_start_matches('\u{feff}').trim() == Column::Id.header())
        .unwrap_or(false)
}

fn decode_row(fields: &[&str]) -> Option<Manufacturer> {
    if fields.len() < FIELD_COUNT {
        return None;
    }
    let text = |i: usize| fields[i].trim().to_string();
    Some(Manufacturer {
        id: parse_id(fields[0]),
        name: text(1),
        country: text(2),
        address: text(3),
        phone: text(4),
        email: text(5),
        product_type: text(6),
        founded_year: parse_year(fields[7]),
        revenue: parse_revenue(fields[8]),
    })
}

fn encode_row(record: &Manufacturer) -> Vec<String> {
    vec![
        record.id.to_string(),
        record.name.clone(),
        record.country.clone(),
        record.address.clone(),
        record.phone.clone(),
        record.email.clone(),
        record.product_type.clone(),
        record.founded_year.to_string(),
        record.revenue_text(),
    ]
}

/// Unparseable ids become 0.
pub fn parse_id(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

/// Unparseable years become 0.
pub fn parse_year(raw: &str) -> i32 {
    raw.trim().parse().unwrap_or(0)
}

/// Unparseable or non-finite revenue becomes 0.0.
pub fn parse_revenue(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn header_is_skipped_only_when_first_field_is_id() {
        let rows = vec![
            row(&header()),
            row(&["1", "Acme", "US", "Main St", "555", "a@b.co", "Bricks", "2000", "100.00"]),
        ];
        let records = decode(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Acme");

        let rows = vec![row(&[
            "3", "Beta", "DE", "Ring 1", "777", "", "Cement", "1990", "5",
        ])];
        assert_eq!(decode(&rows)[0].id, 3);
    }

    #[test]
    fn short_rows_are_dropped_without_failing() {
        let rows = vec![
            row(&["1", "Acme", "US", "Main St", "555", "a@b.co", "Bricks", "2000", "100.00"]),
            row(&["2", "Broken", "US", "x"]),
        ];
        let records = decode(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);
    }

    #[test]
    fn malformed_numbers_default_to_zero() {
        assert_eq!(parse_id("abc"), 0);
        assert_eq!(parse_year("19x0"), 0);
        assert_eq!(parse_revenue("lots"), 0.0);
        assert_eq!(parse_revenue("NaN"), 0.0);
        assert_eq!(parse_revenue(" 12.5 "), 12.5);

        let rows = vec![row(&["x", "Acme", "US", "", "", "", "", "y", "z"])];
        let record = &decode(&rows)[0];
        assert_eq!((record.id, record.founded_year, record.revenue), (0, 0, 0.0));
        assert_eq!(record.name, "Acme");
    }

    #[test]
    fn encoding_writes_header_and_two_decimal_revenue() {
        let record = Manufacturer {
            id: 4,
            name: "Gamma, Ltd".into(),
            revenue: 7.0,
            founded_year: 1901,
            ..Default::default()
        };
        let mut out = Vec::new();
        write_records(&mut out, &[record]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("ID,Name,Country,Address,Phone,Email,ProductType,FoundedYear,Revenue")
        );
        assert_eq!(lines.next(), Some("4,\"Gamma, Ltd\",,,,,,1901,7.00"));
    }

    #[test]
    fn read_records_trims_and_tolerates_ragged_rows() {
        let input = "ID,Name,Country,Address,Phone,Email,ProductType,FoundedYear,Revenue\n\
                     1, Acme ,US,Main St,555,a@b.co,Bricks,2000,100.00\n\
                     2,Short,US,x\n";
        let records = read_records(input.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Acme");
        assert_eq!(records[0].revenue, 100.0);
    }
}
