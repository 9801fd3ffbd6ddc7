use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Canonical field identifiers. Source headers are mapped onto these through
/// [`crate::settings::Settings::column_mapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Date,
    BonusPlus,
    BonusMinus,
    Liters,
    Reason,
    AzsNumber,
    FuelMark,
}

impl Field {
    /// Fields the cleaner refuses to run without.
    pub const REQUIRED: [Field; 5] = [
        Field::Date,
        Field::BonusPlus,
        Field::BonusMinus,
        Field::Liters,
        Field::Reason,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::BonusPlus => "bonus_plus",
            Field::BonusMinus => "bonus_minus",
            Field::Liters => "liters",
            Field::Reason => "reason",
            Field::AzsNumber => "azs_number",
            Field::FuelMark => "fuel_mark",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell as it was read from a source sheet, before any coercion.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Numeric view of the cell. Text is parsed after trimming; anything that
    /// does not parse to a finite number yields `None`.
    pub fn to_number(&self) -> Option<f64> {
        let value = match self {
            CellValue::Number(value) => *value,
            CellValue::Text(text) => text.trim().parse::<f64>().ok()?,
            CellValue::Empty | CellValue::DateTime(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Textual view of the cell used for free-text fields.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => value.to_string(),
            CellValue::DateTime(value) => value.to_string(),
        }
    }
}

/// One normalized row: canonical field → raw cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    pub values: BTreeMap<Field, CellValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for constructing fixtures.
    pub fn with(mut self, field: Field, value: CellValue) -> Self {
        self.values.insert(field, value);
        self
    }

    pub fn get(&self, field: Field) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.values.get(&field).unwrap_or(&EMPTY)
    }

    pub fn set(&mut self, field: Field, value: CellValue) {
        self.values.insert(field, value);
    }
}

/// A table of normalized rows together with the canonical columns it carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub columns: BTreeSet<Field>,
    pub rows: Vec<RawRecord>,
}

impl RawTable {
    pub fn new(columns: impl IntoIterator<Item = Field>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, field: Field) -> bool {
        self.columns.contains(&field)
    }

    /// Concatenates tables; the resulting column set is the union of the inputs.
    pub fn concat(tables: impl IntoIterator<Item = RawTable>) -> RawTable {
        let mut combined = RawTable::default();
        for table in tables {
            combined.columns.extend(table.columns);
            combined.rows.extend(table.rows);
        }
        combined
    }
}

/// A validated transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub date: NaiveDateTime,
    pub bonus_plus: f64,
    pub bonus_minus: f64,
    pub liters: f64,
    pub reason: String,
    pub azs_number: Option<f64>,
    pub fuel_mark: Option<f64>,
    /// First day of the calendar month containing `date`.
    pub period: NaiveDate,
}

/// Distinguishes per-period rows from the appended grand total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    Period(NaiveDate),
    Total,
}

/// One line of the summary report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub kind: RowKind,
    pub period_label: String,
    pub bonus_accrued: f64,
    pub liters_with_bonus: f64,
    pub liters_total: f64,
    pub bonus_redeemed: f64,
    pub rate_per_liter: f64,
}

impl ReportRow {
    pub fn is_total(&self) -> bool {
        self.kind == RowKind::Total
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn rate(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_cells_are_trimmed_before_parsing() {
        assert_eq!(CellValue::Text(" 12.5 ".into()).to_number(), Some(12.5));
        assert_eq!(CellValue::Text("n/a".into()).to_number(), None);
        assert_eq!(CellValue::Number(f64::NAN).to_number(), None);
        assert_eq!(CellValue::Empty.to_number(), None);
    }

    #[test]
    fn concat_unions_columns() {
        let mut first = RawTable::new([Field::Date, Field::Liters]);
        first.rows.push(RawRecord::new().with(Field::Liters, CellValue::Number(1.0)));
        let mut second = RawTable::new([Field::Date, Field::FuelMark]);
        second.rows.push(RawRecord::new().with(Field::FuelMark, CellValue::Number(14.0)));

        let combined = RawTable::concat([first, second]);

        assert_eq!(combined.len(), 2);
        assert!(combined.has_column(Field::Liters));
        assert!(combined.has_column(Field::FuelMark));
        assert_eq!(combined.rows[0].get(Field::FuelMark), &CellValue::Empty);
    }

    #[test]
    fn rate_is_zero_for_zero_denominator() {
        assert_eq!(rate(10.0, 0.0), 0.0);
        assert_eq!(rate(10.0, 5.0), 2.0);
    }
}
