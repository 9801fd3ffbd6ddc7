//! Locale-dependent wording for the report: month names, the total-row
//! sentinel, sheet titles, and column headers.

use chrono::{Datelike, NaiveDate};
use tracing::{info, warn};

/// Vocabulary used to render a report. Implementations must be infallible.
pub trait ReportLocale: Send + Sync {
    /// Locale tag, for logging.
    fn tag(&self) -> &'static str;

    /// Full month name for `month` in `1..=12`.
    fn month_name(&self, month: u32) -> &'static str;

    /// Sentinel label of the grand-total row.
    fn total_label(&self) -> &'static str;

    /// Prefix of the long report title, followed by `<first> - <last>`.
    fn title_prefix(&self) -> &'static str;

    /// Title used when there are too few periods to describe a range.
    fn default_title(&self) -> &'static str;

    /// Name of the sheet holding sampled cleaned records.
    fn raw_sheet_name(&self) -> &'static str;

    /// Headers for the six report columns.
    fn column_headers(&self) -> [&'static str; 6];

    /// "Month Year" label for a period.
    fn period_label(&self, period: NaiveDate) -> String {
        format!("{} {}", self.month_name(period.month()), period.year())
    }
}

const RUSSIAN_MONTHS: [&str; 12] = [
    "Январь", "Февраль", "Март", "Апрель", "Май", "Июнь", "Июль", "Август", "Сентябрь",
    "Октябрь", "Ноябрь", "Декабрь",
];

const ENGLISH_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

fn month_from(names: &'static [&'static str; 12], month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|index| names.get(index as usize))
        .copied()
        .unwrap_or("?")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Russian;

impl ReportLocale for Russian {
    fn tag(&self) -> &'static str {
        "ru"
    }

    fn month_name(&self, month: u32) -> &'static str {
        month_from(&RUSSIAN_MONTHS, month)
    }

    fn total_label(&self) -> &'static str {
        "ИТОГО"
    }

    fn title_prefix(&self) -> &'static str {
        "Отчет за"
    }

    fn default_title(&self) -> &'static str {
        "Отчет"
    }

    fn raw_sheet_name(&self) -> &'static str {
        "Сырые данные"
    }

    fn column_headers(&self) -> [&'static str; 6] {
        [
            "Период",
            "Бонусов начислено",
            "Продано литров с начислением бонусов",
            "Продано литров всего",
            "Бонусов списано",
            "На 1 литр начислено бонусов",
        ]
    }
}

/// Default vocabulary, used whenever the preferred locale is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct English;

impl ReportLocale for English {
    fn tag(&self) -> &'static str {
        "en"
    }

    fn month_name(&self, month: u32) -> &'static str {
        month_from(&ENGLISH_MONTHS, month)
    }

    fn total_label(&self) -> &'static str {
        "TOTAL"
    }

    fn title_prefix(&self) -> &'static str {
        "Report for"
    }

    fn default_title(&self) -> &'static str {
        "Report"
    }

    fn raw_sheet_name(&self) -> &'static str {
        "Raw data"
    }

    fn column_headers(&self) -> [&'static str; 6] {
        [
            "Period",
            "Bonus Accrued",
            "Liters with Bonus",
            "Liters Total",
            "Bonus Redeemed",
            "Rate per Liter",
        ]
    }
}

/// Resolves a locale name such as `ru_RU.UTF-8`, `russian`, or
/// `Russian_Russia.1251`. Unknown names fall back to [`English`] with a warning.
pub fn resolve(name: &str) -> Box<dyn ReportLocale> {
    let language = name
        .split(['_', '-', '.'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match language.as_str() {
        "ru" | "russian" => {
            info!(locale = name, "using Russian month names");
            Box::new(Russian)
        }
        "en" | "english" | "c" | "posix" => Box::new(English),
        _ => {
            warn!(locale = name, "locale unavailable, month names fall back to English");
            Box::new(English)
        }
    }
}
