use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};
use tracing::{info, warn};

use crate::error::{Result, ReportError};
use crate::locale::ReportLocale;
use crate::model::{CleanRecord, Field, ReportRow};
use crate::settings::Settings;

const MAX_COLUMN_WIDTH: usize = 50;
const TOTAL_FILL: u32 = 0xFFF2CC;

/// Everything the writer needs to produce the output workbook.
pub struct ReportDocument<'a> {
    pub title: &'a str,
    pub rows: &'a [ReportRow],
    pub records: &'a [CleanRecord],
}

/// Renames an existing file to `<stem>_backup_<YYYYmmdd_HHMMSS><ext>` next to it.
///
/// Returns the backup path, or `None` when there was nothing to back up or the
/// rename failed; failure is only logged.
pub fn backup_existing(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let backup = backup_path(path, &Local::now().format("%Y%m%d_%H%M%S").to_string());
    match fs::rename(path, &backup) {
        Ok(()) => {
            info!(backup = %backup.display(), "previous report backed up");
            Some(backup)
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "could not back up previous report");
            None
        }
    }
}

fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_backup_{stamp}{extension}"))
}

/// Writes the report sheet and, for small tables, a sample of cleaned records.
pub fn write_report(
    path: &Path,
    document: &ReportDocument<'_>,
    settings: &Settings,
    locale: &dyn ReportLocale,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut workbook = Workbook::new();

    let worksheet = workbook.add_worksheet();
    write_summary_sheet(worksheet, document, settings, locale)?;

    let raw = &settings.raw_sheet;
    if document.records.len() < raw.row_threshold {
        let worksheet = workbook.add_worksheet();
        write_raw_sheet(worksheet, document.records, settings, locale)?;
    }

    workbook
        .save(path)
        .map_err(|source| ReportError::OutputLocked {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), sheet = document.title, "report written");
    Ok(())
}

fn write_summary_sheet(
    worksheet: &mut Worksheet,
    document: &ReportDocument<'_>,
    settings: &Settings,
    locale: &dyn ReportLocale,
) -> Result<()> {
    worksheet.set_name(document.title)?;

    let formats = SummaryFormats::new(settings);
    let header = header_format();
    let headers = locale.column_headers();
    let mut widths = ColumnWidths::new(headers.len());
    for (col_idx, title) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, *title, &header)?;
        widths.observe(col_idx, title);
    }

    for (row_idx, row) in document.rows.iter().enumerate() {
        let excel_row = (row_idx + 1) as u32;
        let (label_format, number_format, rate_format) = formats.for_row(row);

        worksheet.write_string_with_format(excel_row, 0, &row.period_label, label_format)?;
        widths.observe(0, &row.period_label);

        let amounts = [
            row.bonus_accrued,
            row.liters_with_bonus,
            row.liters_total,
            row.bonus_redeemed,
        ];
        for (offset, value) in amounts.into_iter().enumerate() {
            let col_idx = offset + 1;
            worksheet.write_number_with_format(excel_row, col_idx as u16, value, number_format)?;
            widths.observe(col_idx, &format!("{value:.2}"));
        }
        worksheet.write_number_with_format(excel_row, 5, row.rate_per_liter, rate_format)?;
        widths.observe(5, &format!("{:.8}", row.rate_per_liter));
    }

    widths.apply(worksheet)?;
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_raw_sheet(
    worksheet: &mut Worksheet,
    records: &[CleanRecord],
    settings: &Settings,
    locale: &dyn ReportLocale,
) -> Result<()> {
    worksheet.set_name(locale.raw_sheet_name())?;

    let columns = [
        Field::Date.as_str(),
        Field::BonusPlus.as_str(),
        Field::BonusMinus.as_str(),
        Field::Liters.as_str(),
        Field::Reason.as_str(),
        Field::AzsNumber.as_str(),
        Field::FuelMark.as_str(),
        "period",
    ];
    let header = header_format();
    let mut widths = ColumnWidths::new(columns.len());
    for (col_idx, title) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, *title, &header)?;
        widths.observe(col_idx, title);
    }

    let date_format = &settings.raw_sheet.date_format;
    for (row_idx, record) in records.iter().take(settings.raw_sheet.sample_rows).enumerate() {
        let row = (row_idx + 1) as u32;
        let date = record.date.format(date_format).to_string();
        worksheet.write_string(row, 0, &date)?;
        widths.observe(0, &date);
        worksheet.write_number(row, 1, record.bonus_plus)?;
        worksheet.write_number(row, 2, record.bonus_minus)?;
        worksheet.write_number(row, 3, record.liters)?;
        worksheet.write_string(row, 4, &record.reason)?;
        widths.observe(4, &record.reason);
        if let Some(azs) = record.azs_number {
            worksheet.write_number(row, 5, azs)?;
        }
        if let Some(mark) = record.fuel_mark {
            worksheet.write_number(row, 6, mark)?;
        }
        let period = record.period.format("%Y-%m-%d").to_string();
        worksheet.write_string(row, 7, &period)?;
        widths.observe(7, &period);
    }

    widths.apply(worksheet)?;
    Ok(())
}

/// Cell formats of the summary sheet. Columns B to E use the financial
/// format, column F the rate format; the total row is bold and highlighted.
struct SummaryFormats {
    plain: Format,
    financial: Format,
    rate: Format,
    total_label: Format,
    total_financial: Format,
    total_rate: Format,
}

impl SummaryFormats {
    fn new(settings: &Settings) -> Self {
        let financial = Format::new().set_num_format(&settings.number_formats.financial);
        let rate = Format::new().set_num_format(&settings.number_formats.rate);
        Self {
            plain: Format::new(),
            total_label: highlight(Format::new()),
            total_financial: highlight(financial.clone()),
            total_rate: highlight(rate.clone()),
            financial,
            rate,
        }
    }

    /// Label, amount, and rate formats for one report row.
    fn for_row(&self, row: &ReportRow) -> (&Format, &Format, &Format) {
        if row.is_total() {
            (&self.total_label, &self.total_financial, &self.total_rate)
        } else {
            (&self.plain, &self.financial, &self.rate)
        }
    }
}

fn highlight(format: Format) -> Format {
    format.set_bold().set_background_color(Color::RGB(TOTAL_FILL))
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_text_wrap()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
}

/// Tracks the longest rendered value per column.
struct ColumnWidths {
    max_chars: Vec<usize>,
}

impl ColumnWidths {
    fn new(columns: usize) -> Self {
        Self {
            max_chars: vec![0; columns],
        }
    }

    fn observe(&mut self, column: usize, text: &str) {
        if let Some(width) = self.max_chars.get_mut(column) {
            *width = (*width).max(text.chars().count());
        }
    }

    fn apply(&self, worksheet: &mut Worksheet) -> Result<()> {
        for (column, chars) in self.max_chars.iter().enumerate() {
            let width = (chars + 2).min(MAX_COLUMN_WIDTH);
            worksheet.set_column_width(column as u16, width as f64)?;
        }
        Ok(())
    }
}
