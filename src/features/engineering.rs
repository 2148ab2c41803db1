use crate::data::cleaning::normalize_text;
use crate::data::table::{Column, Table, Value};
use crate::error::{AppError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the derived binary target
pub const TARGET_COLUMN: &str = "alvo_risco";

/// Identifier, provenance and response columns never used as features
pub const DROPPED_COLUMNS: [&str; 6] = [
    "Defasagem",
    "Ano_Base",
    "RA",
    "Nome",
    "Nome Anonimizado",
    "Data de Nasc",
];

/// Pairwise products added when every source indicator is present
pub const INTERACTIONS: [(&str, &str, &str); 3] = [
    ("IEG_x_IDA", "IEG", "IDA"),
    ("IEG_x_IAA", "IEG", "IAA"),
    ("IPS_x_IDA", "IPS", "IDA"),
];

const INTERACTION_SOURCES: [&str; 4] = ["IEG", "IDA", "IAA", "IPS"];

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"\d+").expect("valid digit pattern");
}

/// Feature engineering constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Ordinal rank of each Pedra tier
    #[serde(default = "default_pedra_ordinal")]
    pub pedra_ordinal: BTreeMap<String, f64>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            pedra_ordinal: default_pedra_ordinal(),
        }
    }
}

impl FeatureConfig {
    /// Ordinal map keyed by normalized tier name
    fn normalized_pedra_map(&self) -> BTreeMap<String, f64> {
        self.pedra_ordinal
            .iter()
            .filter_map(|(tier, rank)| normalize_text(tier).map(|key| (key, *rank)))
            .collect()
    }
}

fn default_pedra_ordinal() -> BTreeMap<String, f64> {
    [
        ("Quartzo", 1.0),
        ("Ágata", 2.0),
        ("Ametista", 3.0),
        ("Topázio", 4.0),
    ]
    .into_iter()
    .map(|(tier, rank)| (tier.to_string(), rank))
    .collect()
}

/// Numeric phase from a free-text label.
///
/// "ALFA"/"ALPHA" (any case) is phase 0, otherwise the first run of digits.
pub fn extract_phase(label: &str) -> Option<i64> {
    let upper = label.to_uppercase();
    if upper.contains("ALFA") || upper.contains("ALPHA") {
        return Some(0);
    }
    DIGITS
        .find(&upper)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Columns that leak the target.
///
/// Deliberately broad: any name containing INDE or IAN in any case, which
/// also catches year-suffixed headers such as "INDE 2022" or "IAN_2023".
pub fn is_leakage_column(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.contains("INDE") || upper.contains("IAN")
}

/// Build features with the default constants
pub fn create_features(table: &Table) -> Result<(Table, Option<Vec<u8>>)> {
    create_features_with(table, &FeatureConfig::default())
}

/// Build the feature table and, when `Defasagem` is present, the target.
///
/// Serving calls this with a single record and no target.
pub fn create_features_with(
    table: &Table,
    config: &FeatureConfig,
) -> Result<(Table, Option<Vec<u8>>)> {
    let mut features = table.clone();

    let mut target: Option<Vec<u8>> = table.column("Defasagem").map(|column| {
        column
            .values
            .iter()
            .map(|v| match v.as_f64() {
                Some(lag) if lag < 0.0 => 1,
                _ => 0,
            })
            .collect()
    });

    if INTERACTION_SOURCES.iter().all(|c| features.has_column(c)) {
        for (name, left, right) in INTERACTIONS {
            let product = multiply(&features, left, right);
            features.set_column(Column::new(name, product))?;
        }
    }

    add_pedra_ordinals(&mut features, config)?;

    if let Some(fase) = features.column("Fase") {
        let phases: Vec<Value> = fase
            .values
            .iter()
            .map(|v| match v {
                Value::Text(label) => extract_phase(label).map(|p| Value::Number(p as f64)),
                Value::Number(n) if n.is_finite() => Some(Value::Number(n.trunc())),
                _ => None,
            })
            .map(|v| v.unwrap_or(Value::Null))
            .collect();
        features.set_column(Column::new("Fase_Num", phases))?;
    }

    features.retain_columns(|name| !DROPPED_COLUMNS.contains(&name) && !is_leakage_column(name));

    if let Some(column) = features.drop_column(TARGET_COLUMN) {
        debug!("Split target column out of the feature table");
        if target.is_none() {
            target = Some(
                column
                    .values
                    .iter()
                    .map(|v| match v.as_f64() {
                        Some(flag) if flag > 0.5 => 1,
                        _ => 0,
                    })
                    .collect(),
            );
        }
    }

    debug!(
        rows = features.n_rows(),
        columns = ?features.column_names(),
        has_target = target.is_some(),
        "Engineered features"
    );

    Ok((features, target))
}

/// Training-time variant: the target is mandatory
pub fn create_training_features(
    table: &Table,
    config: &FeatureConfig,
) -> Result<(Table, Vec<u8>)> {
    let (features, target) = create_features_with(table, config)?;
    let target = target.ok_or_else(|| AppError::MissingColumn("Defasagem".to_string()))?;
    Ok((features, target))
}

fn multiply(table: &Table, left: &str, right: &str) -> Vec<Value> {
    match (table.column(left), table.column(right)) {
        (Some(a), Some(b)) => a
            .values
            .iter()
            .zip(&b.values)
            .map(|(x, y)| match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Value::Number(x * y),
                _ => Value::Null,
            })
            .collect(),
        _ => vec![Value::Null; table.n_rows()],
    }
}

fn add_pedra_ordinals(features: &mut Table, config: &FeatureConfig) -> Result<()> {
    let ranks = config.normalized_pedra_map();
    let pedra_columns: Vec<String> = features
        .column_names()
        .into_iter()
        .filter(|name| name.contains("Pedra") && !name.ends_with("_Num"))
        .map(str::to_string)
        .collect();

    for name in pedra_columns {
        let encoded: Vec<Value> = match features.column(&name) {
            Some(column) => column
                .values
                .iter()
                .map(|v| {
                    v.as_str()
                        .and_then(normalize_text)
                        .and_then(|key| ranks.get(&key).copied())
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                })
                .collect(),
            None => continue,
        };
        features.set_column(Column::new(format!("{}_Num", name), encoded))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<Column>) -> Table {
        Table::from_columns(columns).unwrap()
    }

    #[test]
    fn test_extract_phase() {
        assert_eq!(extract_phase("FASE 2"), Some(2));
        assert_eq!(extract_phase("ALFA"), Some(0));
        assert_eq!(extract_phase("alpha"), Some(0));
        assert_eq!(extract_phase("Fase 7B"), Some(7));
        assert_eq!(extract_phase("no digits"), None);
        assert_eq!(extract_phase("FASE 2"), extract_phase("FASE 2"));
    }

    #[test]
    fn test_leakage_predicate_is_broad() {
        assert!(is_leakage_column("INDE"));
        assert!(is_leakage_column("INDE 2022"));
        assert!(is_leakage_column("ian_2023"));
        assert!(is_leakage_column("Mediana"));
        assert!(!is_leakage_column("IAA"));
        assert!(!is_leakage_column("Pedra"));
    }

    #[test]
    fn test_target_derivation() {
        let input = table(vec![
            Column::from_values("Defasagem", vec![Some(-1.0), Some(0.0), Some(2.0), None]),
            Column::from_values("IAA", vec![1.0, 2.0, 3.0, 4.0]),
        ]);

        let (x, y) = create_features(&input).unwrap();
        assert_eq!(y, Some(vec![1, 0, 0, 0]));
        assert!(!x.has_column("Defasagem"));
        assert!(!x.has_column(TARGET_COLUMN));
    }

    #[test]
    fn test_no_target_without_defasagem() {
        let input = table(vec![Column::from_values("IAA", vec![5.0])]);
        let (_, y) = create_features(&input).unwrap();
        assert!(y.is_none());
    }

    #[test]
    fn test_training_features_require_target() {
        let input = table(vec![Column::from_values("IAA", vec![5.0])]);
        let result = create_training_features(&input, &FeatureConfig::default());
        assert!(matches!(result, Err(AppError::MissingColumn(ref c)) if c == "Defasagem"));
    }

    #[test]
    fn test_interactions_need_all_sources() {
        let full = table(vec![
            Column::from_values("IAA", vec![Some(2.0), Some(1.0)]),
            Column::from_values("IEG", vec![Some(3.0), None]),
            Column::from_values("IPS", vec![Some(4.0), Some(1.0)]),
            Column::from_values("IDA", vec![Some(5.0), Some(1.0)]),
        ]);
        let (x, _) = create_features(&full).unwrap();
        assert_eq!(
            x.column("IEG_x_IDA").unwrap().as_f64_vec(),
            vec![Some(15.0), None]
        );
        assert_eq!(x.column("IEG_x_IAA").unwrap().as_f64_vec()[0], Some(6.0));
        assert_eq!(x.column("IPS_x_IDA").unwrap().as_f64_vec()[0], Some(20.0));

        let partial = table(vec![
            Column::from_values("IAA", vec![2.0]),
            Column::from_values("IEG", vec![3.0]),
            Column::from_values("IDA", vec![5.0]),
        ]);
        let (x, _) = create_features(&partial).unwrap();
        assert!(!x.has_column("IEG_x_IDA"));
    }

    #[test]
    fn test_pedra_ordinal_encoding() {
        let input = table(vec![
            Column::from_values("Pedra", vec![Some("AGATA"), Some("Topázio"), Some("Rubi"), None]),
            Column::from_values("Pedra 2021", vec![Some("QUARTZO"), None, None, None]),
        ]);

        let (x, _) = create_features(&input).unwrap();
        assert_eq!(
            x.column("Pedra_Num").unwrap().as_f64_vec(),
            vec![Some(2.0), Some(4.0), None, None]
        );
        assert_eq!(
            x.column("Pedra 2021_Num").unwrap().as_f64_vec()[0],
            Some(1.0)
        );
        assert!(!x.has_column("Pedra_Num_Num"));
    }

    #[test]
    fn test_fase_num() {
        let input = table(vec![Column::from_values(
            "Fase",
            vec![Value::from("ALFA"), Value::from("FASE 3"), Value::from(5.0), Value::Null],
        )]);
        let (x, _) = create_features(&input).unwrap();
        assert_eq!(
            x.column("Fase_Num").unwrap().as_f64_vec(),
            vec![Some(0.0), Some(3.0), Some(5.0), None]
        );
    }

    #[test]
    fn test_identifier_and_leakage_columns_dropped() {
        let input = table(vec![
            Column::from_values("Defasagem", vec![-1.0]),
            Column::from_values("Ano_Base", vec![2022.0]),
            Column::from_values("RA", vec!["RA-1"]),
            Column::from_values("Nome", vec!["ALUNO"]),
            Column::from_values("Data de Nasc", vec!["2010"]),
            Column::from_values("INDE", vec![7.0]),
            Column::from_values("IAN 2022", vec![5.0]),
            Column::from_values("IPV", vec![6.0]),
        ]);

        let (x, y) = create_features(&input).unwrap();
        assert_eq!(x.column_names(), vec!["IPV"]);
        assert_eq!(y, Some(vec![1]));
    }

    #[test]
    fn test_explicit_target_column_is_split_out() {
        let input = table(vec![
            Column::from_values(TARGET_COLUMN, vec![1.0, 0.0]),
            Column::from_values("IAA", vec![1.0, 2.0]),
        ]);
        let (x, y) = create_features(&input).unwrap();
        assert!(!x.has_column(TARGET_COLUMN));
        assert_eq!(y, Some(vec![1, 0]));
    }
}
