use crate::data::table::{Column, Table, Value};
use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Columns kept after unification, in output order
pub const CANONICAL_COLUMNS: [&str; 17] = [
    "IAA",
    "IEG",
    "IPS",
    "IDA",
    "IPV",
    "IAN",
    "INDE",
    "Defasagem",
    "RA",
    "Nome",
    "Data de Nasc",
    "Fase",
    "Pedra",
    "Instituicao_de_ensino",
    "Genero",
    "Idade",
    "Ano_Base",
];

/// Header variants shared by every year
const COMMON_RENAMES: [(&str, &str); 5] = [
    ("Instituição de ensino", "Instituicao_de_ensino"),
    ("Gênero", "Genero"),
    ("Idade 22", "Idade"),
    ("FASE", "Fase"),
    ("Fase 2022", "Fase"),
];

/// Year-specific header variants
fn year_renames(year: &str) -> &'static [(&'static str, &'static str)] {
    match year {
        "2022" => &[
            ("INDE 22", "INDE"),
            ("Pedra 22", "Pedra"),
            ("Matem", "Mat"),
            ("Portug", "Por"),
            ("Inglês", "Ing"),
            ("Defas", "Defasagem"),
            ("IAA 2022", "IAA"),
            ("IEG 2022", "IEG"),
            ("IPS 2022", "IPS"),
            ("IDA 2022", "IDA"),
            ("IPV 2022", "IPV"),
            ("IAN 2022", "IAN"),
        ],
        "2023" => &[
            ("INDE 2023", "INDE"),
            ("Pedra 2023", "Pedra"),
            ("IAA 2023", "IAA"),
            ("IEG 2023", "IEG"),
            ("IPS 2023", "IPS"),
            ("IDA 2023", "IDA"),
            ("IPV 2023", "IPV"),
            ("IAN 2023", "IAN"),
            ("Defasagem 2023", "Defasagem"),
        ],
        "2024" => &[
            ("INDE 2024", "INDE"),
            ("Pedra 2024", "Pedra"),
            ("IAA 2024", "IAA"),
            ("IEG 2024", "IEG"),
            ("IPS 2024", "IPS"),
            ("IDA 2024", "IDA"),
            ("IPV 2024", "IPV"),
            ("IAN 2024", "IAN"),
            ("Defasagem 2024", "Defasagem"),
        ],
        _ => &[],
    }
}

/// Load every configured year and unify them into the canonical schema.
///
/// Each file is read with `;` first and `,` as fallback. Headers are renamed
/// per year, an integer `Ano_Base` column is appended, and the years are
/// concatenated with column union before the canonical allowlist is applied.
pub fn load_data(sources: &BTreeMap<String, PathBuf>) -> Result<Table> {
    if sources.is_empty() {
        return Err(AppError::Configuration(
            "no data sources configured".to_string(),
        ));
    }

    let mut yearly = Vec::with_capacity(sources.len());
    for (year, path) in sources {
        let year_value: i64 = year.trim().parse().map_err(|_| {
            AppError::Validation(format!("year label '{}' is not an integer", year))
        })?;

        let mut table = read_delimited(path)?;

        for (from, to) in year_renames(year.trim()).iter().chain(COMMON_RENAMES.iter()) {
            if table.rename_column(from, to) {
                debug!(year = %year, from = %from, to = %to, "Renamed column");
            }
        }

        if !table.has_column("Defasagem") {
            return Err(AppError::MissingColumn(format!(
                "Defasagem (year {}, file {})",
                year,
                path.display()
            )));
        }

        let n_rows = table.n_rows();
        table.set_column(Column::new(
            "Ano_Base",
            vec![Value::from(year_value); n_rows],
        ))?;

        info!(
            year = %year,
            path = %path.display(),
            rows = n_rows,
            columns = table.n_cols(),
            "Loaded yearly records"
        );
        yearly.push(table);
    }

    let unified = Table::concat(yearly);
    let kept = unified.select_columns(&CANONICAL_COLUMNS);

    let dropped = unified.n_cols() - kept.n_cols();
    if dropped > 0 {
        debug!(dropped, "Discarded non-canonical columns");
    }
    info!(
        rows = kept.n_rows(),
        columns = ?kept.column_names(),
        "Unified record table"
    );

    Ok(kept)
}

/// Read a delimited file, trying `;` and then `,`.
///
/// The fallback fires when the first attempt errors or yields a single
/// column. Empty cells load as null and everything else as text.
pub fn read_delimited(path: &Path) -> Result<Table> {
    let semicolon = read_with_delimiter(path, b';');
    match semicolon {
        Ok(table) if table.n_cols() > 1 => Ok(table),
        first => {
            debug!(path = %path.display(), "Retrying with ',' delimiter");
            match read_with_delimiter(path, b',') {
                Ok(table) => Ok(table),
                Err(err) => match first {
                    Ok(single) => Ok(single),
                    Err(first_err) => {
                        warn!(
                            path = %path.display(),
                            semicolon_error = %first_err,
                            comma_error = %err,
                            "Unable to read source file"
                        );
                        Err(AppError::FileAccess(format!(
                            "{}: {}",
                            path.display(),
                            err
                        )))
                    }
                },
            }
        }
    }
}

fn read_with_delimiter(path: &Path, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::FileAccess(format!("{}: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, column) in values.iter_mut().enumerate() {
            let cell = record.get(i).unwrap_or("");
            column.push(if cell.trim().is_empty() {
                Value::Null
            } else {
                Value::Text(cell.to_string())
            });
        }
    }

    let mut table = Table::new();
    for (name, values) in headers.into_iter().zip(values) {
        if table.has_column(&name) {
            warn!(path = %path.display(), column = %name, "Ignoring duplicate header");
            continue;
        }
        table.set_column(Column::new(name, values))?;
    }
    Ok(table)
}
