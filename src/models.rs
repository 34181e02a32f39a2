//! Domain models shared by the store, the controller and the TUI. The record
//! type stays a plain data holder; the column enum is the one place that knows
//! how the nine CSV columns are named, ordered, compared and searched.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Earliest founding year accepted by validation.
pub const MIN_FOUNDED_YEAR: i32 = 1800;

/// Loose shape check for e-mail addresses: something, an `@`, a dotted domain.
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// A construction-material manufacturer, i.e. one row of the CSV file.
pub struct Manufacturer {
    /// Position-style identifier. Unique within a document and assigned by the
    /// controller, so whatever a caller puts here on create is overwritten.
    pub id: u32,
    pub name: String,
    pub country: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub product_type: String,
    pub founded_year: i32,
    /// Annual revenue. Persisted with two decimal places.
    pub revenue: f64,
}

impl Manufacturer {
    /// Check the fields the controller guards when validation is on. An empty
    /// e-mail is accepted; a non-empty one has to look like an address.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_for_year(chrono::Local::now().year())
    }

    /// Same as [`Manufacturer::validate`] with an explicit upper bound for the
    /// founding year, which keeps tests independent of the calendar.
    pub fn validate_for_year(&self, current_year: i32) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.founded_year < MIN_FOUNDED_YEAR || self.founded_year > current_year {
            return Err(ValidationError::FoundedYearOutOfRange {
                year: self.founded_year,
                min: MIN_FOUNDED_YEAR,
                max: current_year,
            });
        }
        if !self.revenue.is_finite() || self.revenue < 0.0 {
            return Err(ValidationError::NegativeRevenue(self.revenue));
        }
        let email = self.email.trim();
        if !email.is_empty() && !email_regex().is_match(email) {
            return Err(ValidationError::InvalidEmail(email.to_string()));
        }
        Ok(())
    }

    /// Revenue rendered the way it is written to disk.
    pub fn revenue_text(&self) -> String {
        format!("{:.2}", self.revenue)
    }

    /// Text shown for a column in tables and reports.
    pub fn field_text(&self, column: Column) -> String {
        match column {
            Column::Id => self.id.to_string(),
            Column::Name => self.name.clone(),
            Column::Country => self.country.clone(),
            Column::Address => self.address.clone(),
            Column::Phone => self.phone.clone(),
            Column::Email => self.email.clone(),
            Column::ProductType => self.product_type.clone(),
            Column::FoundedYear => self.founded_year.to_string(),
            Column::Revenue => self.revenue_text(),
        }
    }

    /// Case-insensitive substring match used by the search box. Text columns
    /// are folded to lowercase; phone, year and revenue are matched on their
    /// literal decimal text.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let text_hit = [
            &self.name,
            &self.country,
            &self.address,
            &self.email,
            &self.product_type,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle));

        text_hit
            || self.phone.contains(&needle)
            || self.founded_year.to_string().contains(&needle)
            || self.revenue_text().contains(&needle)
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.name)
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("e-mail pattern compiles"))
}

/// Reasons a record is refused at the create/update boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("name is required")]
    EmptyName,

    #[error("founded year {year} is outside {min}..={max}")]
    FoundedYearOutOfRange { year: i32, min: i32, max: i32 },

    #[error("revenue must be a non-negative number, got {0}")]
    NegativeRevenue(f64),

    #[error("'{0}' is not a valid e-mail address")]
    InvalidEmail(String),
}

/// The nine columns of the tabular layout, in canonical file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Name,
    Country,
    Address,
    Phone,
    Email,
    ProductType,
    FoundedYear,
    Revenue,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Id,
        Column::Name,
        Column::Country,
        Column::Address,
        Column::Phone,
        Column::Email,
        Column::ProductType,
        Column::FoundedYear,
        Column::Revenue,
    ];

    /// Header text as written in the CSV file.
    pub fn header(self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::Name => "Name",
            Column::Country => "Country",
            Column::Address => "Address",
            Column::Phone => "Phone",
            Column::Email => "Email",
            Column::ProductType => "ProductType",
            Column::FoundedYear => "FoundedYear",
            Column::Revenue => "Revenue",
        }
    }

    /// Compare two records on this column. Strings ignore case, numbers
    /// compare numerically.
    pub fn compare(self, a: &Manufacturer, b: &Manufacturer) -> Ordering {
        match self {
            Column::Id => a.id.cmp(&b.id),
            Column::FoundedYear => a.founded_year.cmp(&b.founded_year),
            Column::Revenue => a.revenue.total_cmp(&b.revenue),
            Column::Name => cmp_folded(&a.name, &b.name),
            Column::Country => cmp_folded(&a.country, &b.country),
            Column::Address => cmp_folded(&a.address, &b.address),
            Column::Phone => cmp_folded(&a.phone, &b.phone),
            Column::Email => cmp_folded(&a.email, &b.email),
            Column::ProductType => cmp_folded(&a.product_type, &b.product_type),
        }
    }
}

fn cmp_folded(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Raised when a column name from a caller does not name any column.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown column: {0}")]
pub struct UnknownColumn(pub String);

impl FromStr for Column {
    type Err = UnknownColumn;

    /// Accepts the CSV header, snake_case and camelCase spellings, ignoring
    /// case, so `"revenue"`, `"Revenue"`, `"product_type"` and
    /// `"productType"` all resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        Column::ALL
            .into_iter()
            .find(|column| column.header().to_lowercase() == key)
            .ok_or_else(|| UnknownColumn(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Manufacturer {
        Manufacturer {
            id: 1,
            name: "ACME Corp".into(),
            country: "US".into(),
            address: "1 Road Runner Way".into(),
            phone: "+1-555-0100".into(),
            email: "sales@acme.example".into(),
            product_type: "Bricks".into(),
            founded_year: 1949,
            revenue: 1250.5,
        }
    }

    #[test]
    fn validation_accepts_well_formed_record() {
        assert_eq!(acme().validate_for_year(2024), Ok(()));
    }

    #[test]
    fn validation_rejects_each_bad_field() {
        let mut m = acme();
        m.name = "   ".into();
        assert_eq!(m.validate_for_year(2024), Err(ValidationError::EmptyName));

        let mut m = acme();
        m.founded_year = 1799;
        assert!(matches!(
            m.validate_for_year(2024),
            Err(ValidationError::FoundedYearOutOfRange { year: 1799, .. })
        ));

        let mut m = acme();
        m.founded_year = 2025;
        assert!(m.validate_for_year(2024).is_err());

        let mut m = acme();
        m.revenue = -0.01;
        assert!(matches!(
            m.validate_for_year(2024),
            Err(ValidationError::NegativeRevenue(_))
        ));

        let mut m = acme();
        m.email = "not-an-address".into();
        assert_eq!(
            m.validate_for_year(2024),
            Err(ValidationError::InvalidEmail("not-an-address".into()))
        );
    }

    #[test]
    fn empty_email_is_allowed() {
        let mut m = acme();
        m.email.clear();
        assert!(m.validate_for_year(2024).is_ok());
    }

    #[test]
    fn search_matches_text_case_insensitively() {
        let m = acme();
        assert!(m.matches("acme"));
        assert!(m.matches("BRICK"));
        assert!(m.matches("555"));
        assert!(m.matches("1949"));
        assert!(m.matches("1250.50"));
        assert!(!m.matches("cement"));
    }

    #[test]
    fn column_names_parse_in_several_spellings() {
        assert_eq!("revenue".parse::<Column>(), Ok(Column::Revenue));
        assert_eq!("productType".parse::<Column>(), Ok(Column::ProductType));
        assert_eq!("founded_year".parse::<Column>(), Ok(Column::FoundedYear));
        assert_eq!("ID".parse::<Column>(), Ok(Column::Id));
        assert_eq!(
            "employees".parse::<Column>(),
            Err(UnknownColumn("employees".into()))
        );
    }

    #[test]
    fn string_columns_compare_without_case() {
        let mut a = acme();
        let mut b = acme();
        a.name = "beta".into();
        b.name = "Alpha".into();
        assert_eq!(Column::Name.compare(&a, &b), Ordering::Greater);
        a.revenue = 10.0;
        b.revenue = 9.5;
        assert_eq!(Column::Revenue.compare(&a, &b), Ordering::Greater);
    }
}
