//! Exclusion of rows by fuel-mark code and by station number.
//!
//! Rules run on the normalized table before any date or amount cleaning.
//! Fuel marks are filtered first, then stations, each rule seeing only the
//! rows that survived the previous one.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, instrument};

use crate::clean::coerce_number;
use crate::model::{CellValue, Field, RawTable};
use crate::settings::Settings;

/// Rows removed for one excluded code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExclusionDetail {
    pub code: i64,
    pub label: String,
    pub rows: usize,
    pub bonus_plus: f64,
    pub liters: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilterStats {
    pub filtered_rows: usize,
    pub filtered_fuel: usize,
    pub filtered_azs: usize,
    pub initial_count: usize,
    pub fuel_details: Vec<ExclusionDetail>,
    pub azs_details: Vec<ExclusionDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub table: RawTable,
    pub stats: FilterStats,
}

/// Applies the configured exclusion rules.
///
/// With filtering disabled the table is returned untouched and all counters
/// stay at zero. An empty exclusion set, or a column the table does not
/// carry, makes that rule a no-op.
#[instrument(level = "info", skip_all, fields(rows = table.len()))]
pub fn apply_filters(table: RawTable, settings: &Settings) -> FilterOutcome {
    let filters = &settings.filters;
    if !filters.enabled {
        info!("filtering disabled");
        return FilterOutcome {
            table,
            stats: FilterStats::default(),
        };
    }

    let initial_count = table.len();
    let mut stats = FilterStats {
        initial_count,
        ..FilterStats::default()
    };

    let (table, fuel_details) = exclude(table, Field::FuelMark, &filters.exclude_fuel_marks, |code| {
        settings.fuel_mark_name(code)
    });
    stats.filtered_fuel = fuel_details.iter().map(|detail| detail.rows).sum();
    stats.fuel_details = fuel_details;
    if !filters.exclude_fuel_marks.is_empty() {
        info!(rows = stats.filtered_fuel, "excluded by fuel mark");
    }

    let (table, azs_details) = exclude(table, Field::AzsNumber, &filters.exclude_azs, |code| {
        format!("station {code}")
    });
    stats.filtered_azs = azs_details.iter().map(|detail| detail.rows).sum();
    stats.azs_details = azs_details;
    if !filters.exclude_azs.is_empty() {
        info!(rows = stats.filtered_azs, "excluded by station");
    }

    stats.filtered_rows = initial_count - table.len();
    let share = if initial_count > 0 {
        stats.filtered_rows as f64 / initial_count as f64 * 100.0
    } else {
        0.0
    };
    info!(
        initial = initial_count,
        filtered = stats.filtered_rows,
        remaining = table.len(),
        share = %format!("{share:.2}%"),
        "filtering finished"
    );

    FilterOutcome { table, stats }
}

/// Removes rows whose `field` equals one of `codes`.
///
/// The column is first coerced to numbers; values that are not numeric never
/// match and so always survive.
fn exclude(
    mut table: RawTable,
    field: Field,
    codes: &BTreeSet<i64>,
    label: impl Fn(i64) -> String,
) -> (RawTable, Vec<ExclusionDetail>) {
    if codes.is_empty() {
        return (table, Vec::new());
    }
    if !table.has_column(field) {
        info!(column = %field, "exclusion column absent, rule skipped");
        return (table, Vec::new());
    }

    for row in &mut table.rows {
        let coerced = row
            .get(field)
            .to_number()
            .map(CellValue::Number)
            .unwrap_or(CellValue::Empty);
        row.set(field, coerced);
    }

    let mut details: Vec<ExclusionDetail> = codes
        .iter()
        .map(|code| ExclusionDetail {
            code: *code,
            label: label(*code),
            rows: 0,
            bonus_plus: 0.0,
            liters: 0.0,
        })
        .collect();

    table.rows.retain(|row| {
        let Some(code) = matching_code(row.get(field), codes) else {
            return true;
        };
        if let Some(detail) = details.iter_mut().find(|detail| detail.code == code) {
            detail.rows += 1;
            detail.bonus_plus += coerce_number(row.get(Field::BonusPlus));
            detail.liters += coerce_number(row.get(Field::Liters));
        }
        false
    });

    details.retain(|detail| detail.rows > 0);
    for detail in &details {
        info!(
            code = detail.code,
            label = %detail.label,
            rows = detail.rows,
            bonus_plus = %format!("{:.2}", detail.bonus_plus),
            liters = %format!("{:.2}", detail.liters),
            "excluded code"
        );
    }
    (table, details)
}

fn matching_code(value: &CellValue, codes: &BTreeSet<i64>) -> Option<i64> {
    let CellValue::Number(number) = value else {
        return None;
    };
    if number.fract() != 0.0 {
        return None;
    }
    let code = *number as i64;
    codes.contains(&code).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRecord;

    fn table(rows: &[(CellValue, CellValue)]) -> RawTable {
        let mut table = RawTable::new(Field::REQUIRED);
        table.columns.insert(Field::FuelMark);
        table.columns.insert(Field::AzsNumber);
        for (mark, azs) in rows {
            table.rows.push(
                RawRecord::new()
                    .with(Field::BonusPlus, CellValue::Number(5.0))
                    .with(Field::Liters, CellValue::Text("2".into()))
                    .with(Field::FuelMark, mark.clone())
                    .with(Field::AzsNumber, azs.clone()),
            );
        }
        table
    }

    fn settings(marks: &[i64], azs: &[i64]) -> Settings {
        let mut settings = Settings::default();
        settings.filters.exclude_fuel_marks = marks.iter().copied().collect();
        settings.filters.exclude_azs = azs.iter().copied().collect();
        settings
    }

    #[test]
    fn excludes_fuel_marks_and_reports_detail() {
        let input = table(&[
            (CellValue::Number(14.0), CellValue::Number(1.0)),
            (CellValue::Text("15".into()), CellValue::Number(2.0)),
        ]);

        let outcome = apply_filters(input, &settings(&[14], &[]));

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.stats.filtered_fuel, 1);
        assert_eq!(outcome.stats.filtered_rows, 1);
        assert_eq!(outcome.stats.initial_count, 2);
        let detail = &outcome.stats.fuel_details[0];
        assert_eq!(detail.label, "Аи-92-К5");
        assert_eq!(detail.bonus_plus, 5.0);
        assert_eq!(detail.liters, 2.0);
    }

    #[test]
    fn rules_narrow_sequentially() {
        let input = table(&[
            (CellValue::Number(14.0), CellValue::Number(1118.0)),
            (CellValue::Number(15.0), CellValue::Number(1118.0)),
            (CellValue::Number(15.0), CellValue::Number(7.0)),
        ]);

        let outcome = apply_filters(input, &settings(&[14], &[1118]));

        assert_eq!(outcome.stats.filtered_fuel, 1);
        assert_eq!(outcome.stats.filtered_azs, 1);
        assert_eq!(outcome.stats.filtered_rows, 2);
        assert_eq!(outcome.table.len(), 1);
    }

    #[test]
    fn non_numeric_codes_survive() {
        let input = table(&[
            (CellValue::Text("Аи-92".into()), CellValue::Empty),
            (CellValue::Number(14.5), CellValue::Empty),
        ]);

        let outcome = apply_filters(input, &settings(&[14], &[1]));

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.stats.filtered_rows, 0);
    }

    #[test]
    fn disabled_filtering_is_identity() {
        let input = table(&[(CellValue::Number(14.0), CellValue::Number(1.0))]);
        let mut config = settings(&[14], &[1]);
        config.filters.enabled = false;

        let outcome = apply_filters(input.clone(), &config);

        assert_eq!(outcome.table, input);
        assert_eq!(outcome.stats, FilterStats::default());
    }

    #[test]
    fn filtering_twice_is_a_no_op() {
        let input = table(&[
            (CellValue::Number(14.0), CellValue::Number(1.0)),
            (CellValue::Number(17.0), CellValue::Number(2.0)),
        ]);
        let config = settings(&[14], &[2]);

        let first = apply_filters(input, &config);
        let second = apply_filters(first.table.clone(), &config);

        assert_eq!(second.stats.filtered_rows, 0);
        assert_eq!(second.table, first.table);
    }

    #[test]
    fn missing_column_skips_rule() {
        let mut input = RawTable::new(Field::REQUIRED);
        input
            .rows
            .push(RawRecord::new().with(Field::BonusPlus, CellValue::Number(1.0)));

        let outcome = apply_filters(input, &settings(&[14], &[1]));

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.stats.initial_count, 1);
    }
}
