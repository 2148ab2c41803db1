//! Tabular data layer for the yearly PEDE spreadsheets
//!
//! - `table`: column-oriented table of nullable cells
//! - `loader`: per-year delimited files unified into one canonical table
//! - `cleaning`: locale-number coercion, bounds and text normalization

pub mod cleaning;
pub mod loader;
pub mod table;

pub use cleaning::{
    clean_data, clean_data_with, normalize_text, parse_locale_number, CleaningConfig,
    LOCALE_NUMERIC_COLUMNS, SCORE_COLUMNS,
};
pub use loader::{load_data, read_delimited, CANONICAL_COLUMNS};
pub use table::{Column, Table, Value};
