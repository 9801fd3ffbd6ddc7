//! Immutable run configuration.
//!
//! Settings are read from an optional JSON file, patched by command-line
//! overrides, validated once, and then handed by reference to each stage of
//! the pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReportError};
use crate::model::Field;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wildcard pattern (`*`, `?`) for source workbooks.
    pub source_pattern: String,
    /// Destination workbook.
    pub destination: PathBuf,
    /// Sheet read from every source workbook.
    pub source_sheet: String,
    /// Source header → canonical field.
    pub column_mapping: BTreeMap<String, Field>,
    pub filters: FilterSettings,
    /// Fuel-mark code → display name, used in exclusion logs.
    pub fuel_marks: BTreeMap<i64, String>,
    pub number_formats: NumberFormats,
    /// Preferred locale for month names, e.g. `ru_RU.UTF-8`.
    pub locale: String,
    pub raw_sheet: RawSheetSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub exclude_fuel_marks: BTreeSet<i64>,
    pub exclude_azs: BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberFormats {
    pub financial: String,
    pub rate: String,
}

/// Controls the optional sheet with a sample of cleaned records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSheetSettings {
    /// The sample sheet is only written when the cleaned table is smaller than this.
    pub row_threshold: usize,
    pub sample_rows: usize,
    /// `chrono` format string for the `date` column.
    pub date_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        let column_mapping = [
            ("Время", Field::Date),
            ("Бонусов+", Field::BonusPlus),
            ("Бонусов-", Field::BonusMinus),
            ("Объем", Field::Liters),
            ("Основание", Field::Reason),
            ("Станция", Field::AzsNumber),
            ("Марка", Field::FuelMark),
        ]
        .into_iter()
        .map(|(source, field)| (source.to_string(), field))
        .collect();

        let fuel_marks = [
            (14, "Аи-92-К5"),
            (15, "Аи-95-К5"),
            (17, "ДТ-Л-К5"),
            (18, "ГАЗ"),
            (19, "Аи-95-К5PR"),
            (21, "Аи100-К5PR"),
        ]
        .into_iter()
        .map(|(code, name)| (code, name.to_string()))
        .collect();

        Self {
            source_pattern: "Report*.xlsx".to_string(),
            destination: PathBuf::from("Отчёт_по_оборотам_бонусов.xlsx"),
            source_sheet: "ВсеЗаправки".to_string(),
            column_mapping,
            filters: FilterSettings::default(),
            fuel_marks,
            number_formats: NumberFormats::default(),
            locale: "ru_RU.UTF-8".to_string(),
            raw_sheet: RawSheetSettings::default(),
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_fuel_marks: BTreeSet::new(),
            exclude_azs: BTreeSet::new(),
        }
    }
}

impl Default for NumberFormats {
    fn default() -> Self {
        Self {
            financial: "#,##0.00".to_string(),
            rate: "0.00000000".to_string(),
        }
    }
}

impl Default for RawSheetSettings {
    fn default() -> Self {
        Self {
            row_threshold: 10_000,
            sample_rows: 1_000,
            date_format: "%d.%m.%Y %H:%M".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file. Keys absent from the file keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&data)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes the settings as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Rejects mappings that cannot produce a well-formed table.
    pub fn validate(&self) -> Result<()> {
        if self.source_sheet.trim().is_empty() {
            return Err(ReportError::InvalidSettings("source_sheet is empty".into()));
        }
        if self.source_pattern.trim().is_empty() {
            return Err(ReportError::InvalidSettings("source_pattern is empty".into()));
        }

        let mut seen: BTreeMap<Field, &str> = BTreeMap::new();
        for (source, field) in &self.column_mapping {
            if source.trim().is_empty() {
                return Err(ReportError::InvalidSettings(format!(
                    "empty source column mapped to '{field}'"
                )));
            }
            if let Some(previous) = seen.insert(*field, source) {
                return Err(ReportError::InvalidSettings(format!(
                    "columns '{previous}' and '{source}' both map to '{field}'"
                )));
            }
        }

        if self.raw_sheet.date_format.trim().is_empty() {
            return Err(ReportError::InvalidSettings("raw_sheet.date_format is empty".into()));
        }
        Ok(())
    }

    /// Display name for a fuel-mark code.
    pub fn fuel_mark_name(&self, code: i64) -> String {
        self.fuel_marks
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("unknown ({code})"))
    }
}
