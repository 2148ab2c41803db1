use crate::data::table::{Table, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Bounded indicator scores
pub const SCORE_COLUMNS: [&str; 5] = ["IAA", "IEG", "IPS", "IDA", "IPV"];

/// Columns parsed as locale-formatted numbers ("1.234,5")
pub const LOCALE_NUMERIC_COLUMNS: [&str; 8] =
    ["IAA", "IEG", "IPS", "IDA", "IPV", "IAN", "INDE", "Idade"];

pub const DEFAULT_MIN_AGE: f64 = 5.0;
pub const DEFAULT_MAX_AGE: f64 = 30.0;
pub const DEFAULT_MIN_SCORE: f64 = 0.0;
pub const DEFAULT_MAX_SCORE: f64 = 10.0;

/// Domain bounds applied while cleaning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Youngest plausible age; smaller values become null
    #[serde(default = "default_min_age")]
    pub min_age: f64,

    /// Oldest plausible age; larger values become null
    #[serde(default = "default_max_age")]
    pub max_age: f64,

    /// Lower clip for the indicator scores
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Upper clip for the indicator scores
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_age: DEFAULT_MIN_AGE,
            max_age: DEFAULT_MAX_AGE,
            min_score: DEFAULT_MIN_SCORE,
            max_score: DEFAULT_MAX_SCORE,
        }
    }
}

fn default_min_age() -> f64 {
    DEFAULT_MIN_AGE
}

fn default_max_age() -> f64 {
    DEFAULT_MAX_AGE
}

fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}

fn default_max_score() -> f64 {
    DEFAULT_MAX_SCORE
}

/// Parse a number written with "." as thousands and "," as decimal separator.
///
/// Returns `None` for anything that does not parse to a finite value.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Strip accents, upper-case and trim. Empty and "NAN" tokens become `None`.
pub fn normalize_text(raw: &str) -> Option<String> {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase();
    let trimmed = folded.trim();

    if trimmed.is_empty() || trimmed == "NAN" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Clean with the default bounds
pub fn clean_data(table: &Table) -> Table {
    clean_data_with(table, &CleaningConfig::default())
}

/// Clean a copy of the table. Columns absent from the input are skipped.
pub fn clean_data_with(table: &Table, config: &CleaningConfig) -> Table {
    let mut cleaned = table.clone();

    if let Some(column) = cleaned.column_mut("Defasagem") {
        for value in column.values.iter_mut() {
            *value = match value {
                Value::Number(v) if v.is_finite() => Value::Number(*v),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }

        let mask: Vec<bool> = column.values.iter().map(|v| !v.is_null()).collect();
        let dropped = mask.iter().filter(|keep| !**keep).count();
        if dropped > 0 {
            debug!(dropped, "Dropped rows with non-numeric Defasagem");
            cleaned = cleaned.filter_rows(&mask);
        }
    }

    if let Some(column) = cleaned.column_mut("Idade") {
        for value in column.values.iter_mut() {
            if let Value::Text(s) = value {
                if s.contains('/') {
                    *s = s.split('/').nth(1).unwrap_or_default().to_string();
                }
            }
        }
    }

    for name in LOCALE_NUMERIC_COLUMNS {
        if let Some(column) = cleaned.column_mut(name) {
            for value in column.values.iter_mut() {
                if let Value::Text(s) = value {
                    *value = parse_locale_number(s)
                        .map(Value::Number)
                        .unwrap_or(Value::Null);
                } else if let Value::Number(v) = value {
                    if !v.is_finite() {
                        *value = Value::Null;
                    }
                }
            }
        }
    }

    if let Some(column) = cleaned.column_mut("Idade") {
        for value in column.values.iter_mut() {
            if let Value::Number(age) = value {
                if *age < config.min_age || *age > config.max_age {
                    *value = Value::Null;
                }
            }
        }
    }

    for name in SCORE_COLUMNS {
        if let Some(column) = cleaned.column_mut(name) {
            for value in column.values.iter_mut() {
                if let Value::Number(score) = value {
                    *score = score.clamp(config.min_score, config.max_score);
                }
            }
        }
    }

    let text_columns: Vec<String> = cleaned
        .columns()
        .iter()
        .filter(|c| c.is_text())
        .map(|c| c.name.clone())
        .collect();
    for name in text_columns {
        if let Some(column) = cleaned.column_mut(&name) {
            for value in column.values.iter_mut() {
                if let Value::Text(s) = value {
                    *value = normalize_text(s).map(Value::Text).unwrap_or(Value::Null);
                }
            }
        }
    }

    cleaned
}
