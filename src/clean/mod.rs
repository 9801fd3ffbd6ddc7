//! Validation and cleaning of the filtered table.
//!
//! Rows without a parseable date are dropped; malformed numbers become zero.

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{Result, ReportError};
use crate::model::{CellValue, CleanRecord, Field, RawTable};

/// Day-first formats tried in order for textual dates, then ISO forms.
/// `%.f` also accepts a missing fraction.
const DATE_TIME_FORMATS: [&str; 8] = [
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 4] = ["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Day-first formats for exports that write the year with two digits.
const SHORT_YEAR_DATE_TIME_FORMATS: [&str; 6] = [
    "%d.%m.%y %H:%M:%S%.f",
    "%d.%m.%y %H:%M",
    "%d/%m/%y %H:%M:%S%.f",
    "%d/%m/%y %H:%M",
    "%d-%m-%y %H:%M:%S%.f",
    "%d-%m-%y %H:%M",
];

const SHORT_YEAR_DATE_FORMATS: [&str; 3] = ["%d.%m.%y", "%d/%m/%y", "%d-%m-%y"];

/// `%Y` reads any number of digits; years before this are treated as typos.
const MIN_YEAR: i32 = 1900;

/// Largest serial Excel can represent (31 December 9999).
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

/// Observational statistics about the cleaned table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CleanSummary {
    pub rows: usize,
    pub first_date: Option<NaiveDateTime>,
    pub last_date: Option<NaiveDateTime>,
    pub total_credited: f64,
    /// Absolute sum of `bonus_minus`.
    pub total_debited: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanOutcome {
    pub records: Vec<CleanRecord>,
    /// Rows dropped because `date` was missing or unparseable.
    pub dropped_dates: usize,
    pub summary: CleanSummary,
}

/// Validates the schema and converts every surviving row into a [`CleanRecord`].
///
/// A missing required column fails the whole run; per-row defects never do.
#[instrument(level = "info", skip_all, fields(rows = table.len()))]
pub fn clean(table: RawTable) -> Result<CleanOutcome> {
    let missing: Vec<String> = Field::REQUIRED
        .iter()
        .filter(|field| !table.has_column(**field))
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "required columns are absent");
        return Err(ReportError::MissingColumns(missing));
    }

    let mut records = Vec::with_capacity(table.len());
    let mut dropped_dates = 0;

    for row in &table.rows {
        let Some(date) = parse_date(row.get(Field::Date)) else {
            dropped_dates += 1;
            continue;
        };
        records.push(CleanRecord {
            date,
            bonus_plus: coerce_number(row.get(Field::BonusPlus)),
            bonus_minus: coerce_number(row.get(Field::BonusMinus)),
            liters: coerce_number(row.get(Field::Liters)),
            reason: row.get(Field::Reason).to_text().trim().to_string(),
            azs_number: row.get(Field::AzsNumber).to_number(),
            fuel_mark: row.get(Field::FuelMark).to_number(),
            period: period_of(date),
        });
    }

    if dropped_dates > 0 {
        warn!(dropped_dates, "rows with invalid dates dropped");
    }

    let summary = summarize(&records);
    info!(valid_rows = summary.rows, "cleaned source rows");
    if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
        info!(
            "data range: {} - {}",
            first.format("%d.%m.%Y"),
            last.format("%d.%m.%Y")
        );
    }
    info!(
        total_credited = %format!("{:.2}", summary.total_credited),
        total_debited = %format!("{:.2}", summary.total_debited),
        "bonus totals"
    );

    Ok(CleanOutcome {
        records,
        dropped_dates,
        summary,
    })
}

fn summarize(records: &[CleanRecord]) -> CleanSummary {
    CleanSummary {
        rows: records.len(),
        first_date: records.iter().map(|record| record.date).min(),
        last_date: records.iter().map(|record| record.date).max(),
        total_credited: records.iter().map(|record| record.bonus_plus).sum(),
        total_debited: records.iter().map(|record| record.bonus_minus.abs()).sum(),
    }
}

/// Numeric value of a cell, or 0 when it is missing or not a number.
pub fn coerce_number(value: &CellValue) -> f64 {
    value.to_number().unwrap_or(0.0)
}

/// Parses a date cell. Text is read day-first; numbers are Excel serials.
pub fn parse_date(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(date) => Some(*date),
        CellValue::Number(serial) => from_excel_serial(*serial),
        CellValue::Text(text) => parse_date_text(text.trim()),
        CellValue::Empty => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    let (date_times, dates): (&[&str], &[&str]) = if has_short_year(text) {
        (&SHORT_YEAR_DATE_TIME_FORMATS, &SHORT_YEAR_DATE_FORMATS)
    } else {
        (&DATE_TIME_FORMATS, &DATE_FORMATS)
    };
    date_times
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            dates
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .filter(|parsed| parsed.year() >= MIN_YEAR)
}

/// True for day-first dates such as `15.01.24` whose year has exactly two digits.
fn has_short_year(text: &str) -> bool {
    let date = text.split([' ', 'T']).next().unwrap_or_default();
    let parts: Vec<&str> = date.split(['.', '/', '-']).collect();
    matches!(parts.as_slice(), [day, _, year] if day.len() <= 2 && year.len() == 2)
}

/// Converts an Excel serial day number (1900 date system) into a timestamp.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// First day of the month containing `date`.
pub fn period_of(date: NaiveDateTime) -> NaiveDate {
    let day = date.date();
    day - Days::new(u64::from(day.day0()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRecord;

    fn full_table() -> RawTable {
        RawTable::new(Field::REQUIRED)
    }

    fn row(date: CellValue, plus: CellValue, minus: CellValue, liters: CellValue) -> RawRecord {
        RawRecord::new()
            .with(Field::Date, date)
            .with(Field::BonusPlus, plus)
            .with(Field::BonusMinus, minus)
            .with(Field::Liters, liters)
            .with(Field::Reason, CellValue::Text("  Начисление  ".into()))
    }

    #[test]
    fn drops_rows_with_unparseable_dates() {
        let mut table = full_table();
        table.rows.push(row(
            CellValue::Text("15.01.2024 10:30".into()),
            CellValue::Number(10.0),
            CellValue::Empty,
            CellValue::Number(5.0),
        ));
        table.rows.push(row(
            CellValue::Text("not a date".into()),
            CellValue::Number(3.0),
            CellValue::Empty,
            CellValue::Number(1.0),
        ));

        let outcome = clean(table).expect("cleaned");

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.dropped_dates, 1);
        let record = &outcome.records[0];
        assert_eq!(record.reason, "Начисление");
        assert_eq!(record.bonus_minus, 0.0);
        assert_eq!(record.period, NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"));
    }

    #[test]
    fn non_numeric_amounts_become_zero() {
        let mut table = full_table();
        table.rows.push(row(
            CellValue::Text("01.02.2024".into()),
            CellValue::Text("abc".into()),
            CellValue::Text("-2.5".into()),
            CellValue::Empty,
        ));

        let outcome = clean(table).expect("cleaned");
        let record = &outcome.records[0];

        assert_eq!(record.bonus_plus, 0.0);
        assert_eq!(record.bonus_minus, -2.5);
        assert_eq!(record.liters, 0.0);
        assert_eq!(outcome.summary.total_debited, 2.5);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let table = RawTable::new([Field::Date, Field::BonusPlus, Field::Liters]);
        let error = clean(table).expect_err("schema failure");
        match error {
            ReportError::MissingColumns(columns) => {
                assert_eq!(columns, vec!["bonus_minus".to_string(), "reason".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dates_are_day_first() {
        let parsed = parse_date(&CellValue::Text("03.04.2024 08:15:00".into())).expect("parsed");
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 4, 3).expect("date"));

        let slashed = parse_date(&CellValue::Text("03/04/2024".into())).expect("parsed");
        assert_eq!(slashed.date(), NaiveDate::from_ymd_opt(2024, 4, 3).expect("date"));

        let iso = parse_date(&CellValue::Text("2024-04-03 08:15:00".into())).expect("parsed");
        assert_eq!(iso.date(), NaiveDate::from_ymd_opt(2024, 4, 3).expect("date"));
    }

    #[test]
    fn two_digit_years_are_read_as_this_century() {
        let short = parse_date(&CellValue::Text("15.01.24".into())).expect("parsed");
        assert_eq!(short.date(), NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"));

        let with_time = parse_date(&CellValue::Text("15/01/24 10:30".into())).expect("parsed");
        assert_eq!(
            with_time,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .and_then(|day| day.and_hms_opt(10, 30, 0))
                .expect("timestamp")
        );
        assert_eq!(period_of(short), NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"));
    }

    #[test]
    fn implausible_years_are_rejected() {
        assert_eq!(parse_date(&CellValue::Text("15.01.0024".into())), None);
        assert_eq!(parse_date(&CellValue::Text("15.01.124".into())), None);
    }

    #[test]
    fn fractional_seconds_are_accepted() {
        let parsed =
            parse_date(&CellValue::Text("15.01.2024 10:30:00.5".into())).expect("parsed");
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .and_then(|day| day.and_hms_milli_opt(10, 30, 0, 500))
                .expect("timestamp")
        );

        let whole = parse_date(&CellValue::Text("15.01.2024 10:30:15".into())).expect("parsed");
        assert_eq!(whole.time().to_string(), "10:30:15");
    }

    #[test]
    fn excel_serials_convert() {
        let date = from_excel_serial(45_306.5).expect("serial converted");
        assert_eq!(
            date,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .and_then(|day| day.and_hms_opt(12, 0, 0))
                .expect("timestamp")
        );
        assert_eq!(from_excel_serial(f64::NAN), None);
        assert_eq!(from_excel_serial(-1.0), None);
    }

    #[test]
    fn period_is_first_of_month() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31)
            .and_then(|day| day.and_hms_opt(23, 59, 59))
            .expect("timestamp");
        assert_eq!(period_of(date), NaiveDate::from_ymd_opt(2025, 12, 1).expect("date"));
    }
}
