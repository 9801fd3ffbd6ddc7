//! Monthly rollup of cleaned records and the report title derived from it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::locale::ReportLocale;
use crate::model::{CleanRecord, ReportRow, RowKind, rate};

/// Excel refuses sheet names longer than this.
pub const SHEET_NAME_LIMIT: usize = 31;

#[derive(Debug, Clone, Copy, Default)]
struct PeriodSums {
    bonus_accrued: f64,
    liters_with_bonus: f64,
    liters_total: f64,
    bonus_minus: f64,
}

/// Groups records by period and appends a grand-total row.
///
/// `bonus_accrued` and `liters_with_bonus` only count rows with a positive
/// `bonus_plus`; `bonus_redeemed` is the magnitude of the negative
/// `bonus_minus` values; `liters_total` counts every row. Every period present
/// in `records` gets a row, in chronological order, and the total row is
/// always last.
#[instrument(level = "info", skip_all, fields(records = records.len()))]
pub fn aggregate(records: &[CleanRecord], locale: &dyn ReportLocale) -> Vec<ReportRow> {
    let mut periods: BTreeMap<NaiveDate, PeriodSums> = BTreeMap::new();

    for record in records {
        let sums = periods.entry(record.period).or_default();
        sums.liters_total += record.liters;
        if record.bonus_plus > 0.0 {
            sums.bonus_accrued += record.bonus_plus;
            sums.liters_with_bonus += record.liters;
        }
        if record.bonus_minus < 0.0 {
            sums.bonus_minus += record.bonus_minus;
        }
    }

    let mut rows: Vec<ReportRow> = periods
        .into_iter()
        .map(|(period, sums)| ReportRow {
            kind: RowKind::Period(period),
            period_label: locale.period_label(period),
            bonus_accrued: sums.bonus_accrued,
            liters_with_bonus: sums.liters_with_bonus,
            liters_total: sums.liters_total,
            bonus_redeemed: sums.bonus_minus.abs(),
            rate_per_liter: rate(sums.bonus_accrued, sums.liters_with_bonus),
        })
        .collect();

    for row in &rows {
        debug!(
            period = %row.period_label,
            accrued = row.bonus_accrued,
            redeemed = row.bonus_redeemed,
            rate = row.rate_per_liter,
            "period aggregated"
        );
    }

    let total = total_row(&rows, locale);
    info!(periods = rows.len(), "aggregated report");
    rows.push(total);
    rows
}

fn total_row(rows: &[ReportRow], locale: &dyn ReportLocale) -> ReportRow {
    let bonus_accrued: f64 = rows.iter().map(|row| row.bonus_accrued).sum();
    let liters_with_bonus: f64 = rows.iter().map(|row| row.liters_with_bonus).sum();
    ReportRow {
        kind: RowKind::Total,
        period_label: locale.total_label().to_string(),
        bonus_accrued,
        liters_with_bonus,
        liters_total: rows.iter().map(|row| row.liters_total).sum(),
        bonus_redeemed: rows.iter().map(|row| row.bonus_redeemed).sum(),
        rate_per_liter: rate(bonus_accrued, liters_with_bonus),
    }
}

/// The grand-total row, if present.
pub fn total(rows: &[ReportRow]) -> Option<&ReportRow> {
    rows.iter().find(|row| row.is_total())
}

/// Builds the report title from the first and last period rows.
///
/// The total row is never used as an endpoint. Titles longer than
/// [`SHEET_NAME_LIMIT`] collapse to `<Mon>-<Mon> <Year>`; fewer than two
/// period rows give the locale's default title.
pub fn report_title(rows: &[ReportRow], locale: &dyn ReportLocale) -> String {
    let mut period_rows = rows.iter().filter(|row| !row.is_total());
    let (Some(first), Some(last)) = (period_rows.next(), period_rows.last()) else {
        return locale.default_title().to_string();
    };

    let title = format!(
        "{} {} - {}",
        locale.title_prefix(),
        first.period_label,
        last.period_label
    );
    if title.chars().count() <= SHEET_NAME_LIMIT {
        return title;
    }

    let first_month = first.period_label.split_whitespace().next().unwrap_or_default();
    let mut last_words = last.period_label.split_whitespace();
    let last_month = last_words.next().unwrap_or_default();
    let last_year = last_words.last().unwrap_or_default();
    let abbreviated = format!(
        "{}-{} {}",
        abbreviate(first_month),
        abbreviate(last_month),
        last_year
    );
    abbreviated.chars().take(SHEET_NAME_LIMIT).collect()
}

fn abbreviate(month: &str) -> String {
    month.chars().take(3).collect()
}
