use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::clean::{self, CleanSummary};
use crate::error::{Result, ReportError};
use crate::filter::{self, FilterStats};
use crate::io::discover::find_source_files;
use crate::io::excel_read;
use crate::io::excel_write::{self, ReportDocument};
use crate::locale::{self, ReportLocale};
use crate::model::{CleanRecord, RawTable, ReportRow};
use crate::report;
use crate::settings::Settings;

/// Result of the in-memory part of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutput {
    /// Period rows in chronological order followed by the total row.
    pub rows: Vec<ReportRow>,
    pub title: String,
    #[serde(skip)]
    pub records: Vec<CleanRecord>,
    pub filter_stats: FilterStats,
    pub clean_summary: CleanSummary,
    pub dropped_dates: usize,
}

impl ReportOutput {
    pub fn period_count(&self) -> usize {
        self.rows.iter().filter(|row| !row.is_total()).count()
    }
}

/// Outcome of a full run, including where the artifact went.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    pub files_found: usize,
    pub files_loaded: usize,
    pub report: ReportOutput,
}

/// Concatenates already-loaded tables, filters, cleans, aggregates, and names
/// the report. Empty tables are ignored.
#[instrument(level = "info", skip_all, fields(tables = tables.len()))]
pub fn build_report(
    tables: Vec<RawTable>,
    settings: &Settings,
    locale: &dyn ReportLocale,
) -> Result<ReportOutput> {
    let tables: Vec<RawTable> = tables.into_iter().filter(|table| !table.is_empty()).collect();
    if tables.is_empty() {
        return Err(ReportError::NoDataLoaded);
    }

    let combined = RawTable::concat(tables);
    info!(rows = combined.len(), "combined source rows");

    let filtered = filter::apply_filters(combined, settings);
    let cleaned = clean::clean(filtered.table)?;
    let rows = report::aggregate(&cleaned.records, locale);
    if rows.iter().all(ReportRow::is_total) {
        return Err(ReportError::EmptyReport);
    }
    let title = report::report_title(&rows, locale);
    info!(%title, "report title");

    Ok(ReportOutput {
        rows,
        title,
        records: cleaned.records,
        filter_stats: filtered.stats,
        clean_summary: cleaned.summary,
        dropped_dates: cleaned.dropped_dates,
    })
}

/// Loads every file, skipping the ones that fail.
pub fn load_tables(files: &[PathBuf], settings: &Settings) -> Vec<RawTable> {
    files
        .iter()
        .enumerate()
        .filter_map(|(index, file)| {
            info!(file = index + 1, of = files.len(), "reading source file");
            excel_read::try_load_table(file, settings)
        })
        .filter(|table| !table.is_empty())
        .collect()
}

/// Runs the whole job: discovery, loading, aggregation, backup, and writing.
#[instrument(level = "info", skip_all, fields(pattern = %settings.source_pattern))]
pub fn run(settings: &Settings) -> Result<RunSummary> {
    let started = Instant::now();
    settings.validate()?;
    let locale = locale::resolve(&settings.locale);

    let files = find_source_files(&settings.source_pattern)?;
    let tables = load_tables(&files, settings);
    let files_loaded = tables.len();
    if files_loaded == 0 {
        return Err(ReportError::NoDataLoaded);
    }

    let report = build_report(tables, settings, locale.as_ref())?;
    info!(periods = report.period_count(), "report calculated");

    let output = settings.destination.clone();
    let backup = excel_write::backup_existing(&output);
    let document = ReportDocument {
        title: &report.title,
        rows: &report.rows,
        records: &report.records,
    };
    excel_write::write_report(&output, &document, settings, locale.as_ref())?;

    let summary = RunSummary {
        output,
        backup,
        files_found: files.len(),
        files_loaded,
        report,
    };
    log_summary(&summary);
    info!(elapsed = %format!("{:.2}s", started.elapsed().as_secs_f64()), "run finished");
    Ok(summary)
}

fn log_summary(summary: &RunSummary) {
    let report = &summary.report;
    info!(
        file = %summary.output.display(),
        sheet = %report.title,
        periods = report.period_count(),
        files = %format!("{}/{}", summary.files_loaded, summary.files_found),
        "final statistics"
    );

    let stats = &report.filter_stats;
    info!(
        excluded = stats.filtered_rows,
        by_fuel_mark = stats.filtered_fuel,
        by_station = stats.filtered_azs,
        "filtering"
    );
    if report.dropped_dates > 0 {
        warn!(rows = report.dropped_dates, "rows dropped for invalid dates");
    }

    if let Some(total) = report::total(&report.rows) {
        info!(
            accrued = %format!("{:.2}", total.bonus_accrued),
            redeemed = %format!("{:.2}", total.bonus_redeemed),
            liters_with_bonus = %format!("{:.2}", total.liters_with_bonus),
            liters_total = %format!("{:.2}", total.liters_total),
            "totals"
        );
        if total.liters_with_bonus > 0.0 {
            info!(rate = %format!("{:.8}", total.rate_per_liter), "average bonus per liter");
        }
    }
}

/// Writes the report rows and run statistics as pretty-printed JSON.
pub fn write_summary_json(path: &Path, report: &ReportOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    info!(path = %path.display(), "summary JSON written");
    Ok(())
}

/// Opens `path` with the platform's default application. Failures are logged.
pub fn open_in_default_app(path: &Path) {
    let path = match path.canonicalize() {
        Ok(path) => path,
        Err(error) => {
            warn!(path = %path.display(), %error, "cannot open report");
            return;
        }
    };

    let mut command = if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]).arg(&path);
        command
    } else if cfg!(target_os = "macos") {
        let mut command = std::process::Command::new("open");
        command.arg(&path);
        command
    } else {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(&path);
        command
    };

    match command.spawn() {
        Ok(_) => info!(path = %path.display(), "opened report"),
        Err(error) => warn!(%error, "failed to open report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::English;
    use crate::model::{CellValue, Field, RawRecord};

    fn source_table(rows: &[(&str, f64, f64, f64, f64)]) -> RawTable {
        let mut table = RawTable::new(Field::REQUIRED);
        table.columns.insert(Field::FuelMark);
        for (date, plus, minus, liters, mark) in rows {
            table.rows.push(
                RawRecord::new()
                    .with(Field::Date, CellValue::Text(date.to_string()))
                    .with(Field::BonusPlus, CellValue::Number(*plus))
                    .with(Field::BonusMinus, CellValue::Number(*minus))
                    .with(Field::Liters, CellValue::Number(*liters))
                    .with(Field::Reason, CellValue::Text("sale".into()))
                    .with(Field::FuelMark, CellValue::Number(*mark)),
            );
        }
        table
    }

    #[test]
    fn excluded_fuel_mark_never_reaches_aggregation() {
        let table = source_table(&[
            ("10.01.2024 09:00", 5.0, 0.0, 10.0, 14.0),
            ("11.01.2024 09:00", 2.0, 0.0, 4.0, 15.0),
        ]);
        let mut settings = Settings::default();
        settings.filters.exclude_fuel_marks.insert(14);

        let output = build_report(vec![table], &settings, &English).expect("report built");

        assert_eq!(output.filter_stats.filtered_fuel, 1);
        assert_eq!(output.records.len(), 1);
        let total = report::total(&output.rows).expect("total row");
        assert_eq!(total.bonus_accrued, 2.0);
        assert_eq!(total.liters_total, 4.0);
    }

    #[test]
    fn disabled_filtering_matches_empty_exclusions() {
        let rows = [
            ("10.01.2024 09:00", 5.0, 0.0, 10.0, 14.0),
            ("11.02.2024 09:00", 2.0, -1.0, 4.0, 15.0),
        ];
        let mut disabled = Settings::default();
        disabled.filters.enabled = false;
        disabled.filters.exclude_fuel_marks.insert(14);
        let empty = Settings::default();

        let first = build_report(vec![source_table(&rows)], &disabled, &English).expect("disabled");
        let second = build_report(vec![source_table(&rows)], &empty, &English).expect("empty");

        assert_eq!(first.rows, second.rows);
        assert_eq!(first.title, second.title);
    }

    #[test]
    fn liters_total_covers_every_surviving_row() {
        let table = source_table(&[
            ("01.01.2024", 0.0, 0.0, 3.0, 1.0),
            ("02.02.2024", 1.0, 0.0, 4.0, 1.0),
            ("03.03.2024", 0.0, -5.0, 5.0, 1.0),
            ("bogus", 9.0, 0.0, 100.0, 1.0),
        ]);

        let output = build_report(vec![table], &Settings::default(), &English).expect("report");

        let period_sum: f64 = output
            .rows
            .iter()
            .filter(|row| !row.is_total())
            .map(|row| row.liters_total)
            .sum();
        assert_eq!(period_sum, 12.0);
        assert_eq!(output.dropped_dates, 1);
        assert_eq!(output.period_count(), 3);
    }

    #[test]
    fn only_empty_tables_is_no_data() {
        let error = build_report(vec![RawTable::new(Field::REQUIRED)], &Settings::default(), &English)
            .expect_err("no data");
        assert!(matches!(error, ReportError::NoDataLoaded));
    }

    #[test]
    fn all_dates_invalid_is_an_empty_report() {
        let table = source_table(&[("never", 1.0, 0.0, 1.0, 1.0)]);
        let error = build_report(vec![table], &Settings::default(), &English).expect_err("empty");
        assert!(matches!(error, ReportError::EmptyReport));
    }
}
