//! Typed legal-matter rows.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::schema::MATTER_COLUMNS;

/// Date format used by the matter export (`7/21/23`).
const SHORT_DATE_FORMAT: &str = "%m/%d/%y";
/// chrono reads `%y` 00-69 as 2000-2069; exports treat 69 as 1969.
const LAST_TWO_DIGIT_YEAR: i32 = 2068;

/// One legal matter. Absent values are empty strings, never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatterRecord {
    pub id: String,
    pub display_name: String,
    pub client_ref: String,
    pub client_full_name: String,
    pub record_type_ref: String,
    pub record_type_name: String,
    pub case_type: String,
    pub status: String,
    pub case_stage: String,
    pub case_sub_stage: String,
    pub open_date: String,
    pub closed_date: String,
    pub assistant_ref: String,
    pub attorney_name: String,
    pub assistant_name: String,
}

impl MatterRecord {
    /// Build a record from one CSV data row. `line` is the 1-based line
    /// number used in error messages.
    pub fn from_csv_row(line: u64, row: &csv::StringRecord) -> Result<Self, StoreError> {
        if row.len() != MATTER_COLUMNS.len() {
            return Err(StoreError::malformed(
                line,
                format!(
                    "expected {} fields, found {}",
                    MATTER_COLUMNS.len(),
                    row.len()
                ),
            ));
        }

        let fields: Vec<String> = row.iter().map(str::to_string).collect();
        let record = Self::from_values(fields)
            .ok_or_else(|| StoreError::malformed(line, "field count mismatch"))?;

        if record.id.trim().is_empty() {
            return Err(StoreError::malformed(
                line,
                format!("missing primary key '{}'", MATTER_COLUMNS[0]),
            ));
        }
        Ok(record)
    }

    /// Build a record from values in column order. Returns `None` unless
    /// exactly one value per column is supplied.
    pub fn from_values(values: Vec<String>) -> Option<Self> {
        let [
            id,
            display_name,
            client_ref,
            client_full_name,
            record_type_ref,
            record_type_name,
            case_type,
            status,
            case_stage,
            case_sub_stage,
            open_date,
            closed_date,
            assistant_ref,
            attorney_name,
            assistant_name,
        ]: [String; 15] = values.try_into().ok()?;

        Some(Self {
            id,
            display_name,
            client_ref,
            client_full_name,
            record_type_ref,
            record_type_name,
            case_type,
            status,
            case_stage,
            case_sub_stage,
            open_date,
            closed_date,
            assistant_ref,
            attorney_name,
            assistant_name,
        })
    }

    /// Values in column order, ready to bind to the upsert statement.
    pub fn values(&self) -> [&str; 15] {
        [
            &self.id,
            &self.display_name,
            &self.client_ref,
            &self.client_full_name,
            &self.record_type_ref,
            &self.record_type_name,
            &self.case_type,
            &self.status,
            &self.case_stage,
            &self.case_sub_stage,
            &self.open_date,
            &self.closed_date,
            &self.assistant_ref,
            &self.attorney_name,
            &self.assistant_name,
        ]
    }

    pub fn is_open(&self) -> bool {
        self.closed_date.trim().is_empty()
    }

    pub fn opened_on(&self) -> Option<NaiveDate> {
        parse_short_date(&self.open_date)
    }

    pub fn closed_on(&self) -> Option<NaiveDate> {
        parse_short_date(&self.closed_date)
    }

    /// Date columns holding a value that is not `M/D/YY`.
    pub fn unparseable_dates(&self) -> Vec<(&'static str, &str)> {
        [
            (MATTER_COLUMNS[10], self.open_date.as_str()),
            (MATTER_COLUMNS[11], self.closed_date.as_str()),
        ]
        .into_iter()
        .filter(|(_, raw)| !raw.trim().is_empty() && parse_short_date(raw).is_none())
        .collect()
    }
}

/// Parse an `M/D/YY` date. Two-digit years 69-99 land in the 1900s, the
/// rest in the 2000s.
pub fn parse_short_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(trimmed, SHORT_DATE_FORMAT).ok()?;
    if date.year() > LAST_TWO_DIGIT_YEAR {
        date.with_year(date.year() - 100)
    } else {
        Some(date)
    }
}
