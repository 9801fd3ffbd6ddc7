use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use tracing::{info, warn};

use crate::clean::from_excel_serial;
use crate::error::{Result, ReportError};
use crate::model::{CellValue, Field, RawRecord, RawTable};
use crate::settings::Settings;

/// Loads the configured sheet of one source workbook and renames its columns
/// to canonical fields.
///
/// Only the headers listed in [`Settings::column_mapping`] are kept. A file
/// missing any of them is rejected as a whole.
pub fn load_table(path: &Path, settings: &Settings) -> Result<RawTable> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = read_required_sheet(&mut workbook, &settings.source_sheet)?;
    normalize_range(&range, settings, &file_label(path))
}

/// Like [`load_table`] but absorbs the failure: it is logged with a truncated
/// message and `None` is returned so the caller can continue with other files.
pub fn try_load_table(path: &Path, settings: &Settings) -> Option<RawTable> {
    let name = file_label(path);
    match load_table(path, settings) {
        Ok(table) => {
            info!(file = %name, rows = table.len(), "loaded source file");
            Some(table)
        }
        Err(error) => {
            warn!(file = %name, error = %truncate(&error.to_string(), 100), "failed to load source file");
            None
        }
    }
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ReportError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ReportError::from)?;
    Ok(range)
}

/// Maps a sheet range onto canonical fields. The first row is the header.
pub fn normalize_range(
    range: &calamine::Range<DataType>,
    settings: &Settings,
    file: &str,
) -> Result<RawTable> {
    let headers: Vec<String> = match range.rows().next() {
        Some(first_row) => first_row
            .iter()
            .map(|cell| cell_to_string(Some(cell)).trim().to_string())
            .collect(),
        None => {
            return Err(ReportError::InvalidWorkbook(format!(
                "{file}: sheet has no header row"
            )));
        }
    };

    let mut columns: Vec<(usize, Field)> = Vec::with_capacity(settings.column_mapping.len());
    let mut missing: Vec<String> = Vec::new();
    for (source, field) in &settings.column_mapping {
        match headers.iter().position(|header| header == source) {
            Some(index) => columns.push((index, *field)),
            None => missing.push(source.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(ReportError::MissingSourceColumns {
            file: file.to_string(),
            columns: missing,
        });
    }

    let mut table = RawTable::new(columns.iter().map(|(_, field)| *field));
    for row in range.rows().skip(1) {
        let mut record = RawRecord::new();
        for (index, field) in &columns {
            record.set(*field, cell_value(row.get(*index)));
        }
        // Blank lines are not rows: they count neither as filtered nor as bad dates.
        if record.values.values().all(|value| *value == CellValue::Empty) {
            continue;
        }
        table.rows.push(record);
    }

    Ok(table)
}

fn cell_value(cell: Option<&DataType>) -> CellValue {
    match cell {
        Some(DataType::String(value)) if value.trim().is_empty() => CellValue::Empty,
        Some(DataType::String(value)) => CellValue::Text(value.clone()),
        Some(DataType::Float(value)) => CellValue::Number(*value),
        Some(DataType::Int(value)) => CellValue::Number(*value as f64),
        Some(DataType::DateTime(serial)) => from_excel_serial(*serial)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(serial.to_string())),
        Some(DataType::Empty) | None => CellValue::Empty,
        Some(other) => CellValue::Text(other.to_string()),
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        message.to_string()
    } else {
        let mut short: String = message.chars().take(limit).collect();
        short.push_str("...");
        short
    }
}
