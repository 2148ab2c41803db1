use crate::data::table::{Column, Table, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const RISK_MESSAGE: &str = "ALERT: risk detected!";
pub const NO_RISK_MESSAGE: &str = "Student shows low risk";

/// One student record submitted for scoring.
///
/// The five indicators are required; the rest are optional and feed the
/// same derived features the training run produced when present.
/// Scores outside 0..=10 are accepted and clipped by the cleaner, the same
/// as training rows. Only the free-text fields are bounded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RiskRequest {
    #[serde(rename = "IAA")]
    pub iaa: f64,

    #[serde(rename = "IEG")]
    pub ieg: f64,

    #[serde(rename = "IPS")]
    pub ips: f64,

    #[serde(rename = "IDA")]
    pub ida: f64,

    #[serde(rename = "IPV")]
    pub ipv: f64,

    #[serde(rename = "Idade", default, skip_serializing_if = "Option::is_none")]
    pub idade: Option<f64>,

    #[serde(rename = "Fase", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub fase: Option<String>,

    #[serde(rename = "Pedra", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub pedra: Option<String>,

    #[serde(
        rename = "Instituicao_de_ensino",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 100))]
    pub instituicao_de_ensino: Option<String>,

    #[serde(rename = "Genero", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub genero: Option<String>,
}

impl RiskRequest {
    pub fn new(iaa: f64, ieg: f64, ips: f64, ida: f64, ipv: f64) -> Self {
        Self {
            iaa,
            ieg,
            ips,
            ida,
            ipv,
            idade: None,
            fase: None,
            pedra: None,
            instituicao_de_ensino: None,
            genero: None,
        }
    }

    /// The required indicators by column name
    pub fn indicators(&self) -> [(&'static str, f64); 5] {
        [
            ("IAA", self.iaa),
            ("IEG", self.ieg),
            ("IPS", self.ips),
            ("IDA", self.ida),
            ("IPV", self.ipv),
        ]
    }

    /// Single-row table in the unified column naming; absent optional
    /// fields are left out rather than stored as nulls
    pub fn to_table(&self) -> Result<Table> {
        let mut columns: Vec<Column> = self
            .indicators()
            .iter()
            .map(|(name, value)| Column::new(*name, vec![Value::Number(*value)]))
            .collect();

        if let Some(idade) = self.idade {
            columns.push(Column::new("Idade", vec![Value::Number(idade)]));
        }
        let text_fields = [
            ("Fase", &self.fase),
            ("Pedra", &self.pedra),
            ("Instituicao_de_ensino", &self.instituicao_de_ensino),
            ("Genero", &self.genero),
        ];
        for (name, value) in text_fields {
            if let Some(text) = value {
                columns.push(Column::new(name, vec![Value::Text(text.clone())]));
            }
        }

        Table::from_columns(columns)
    }
}

/// Verdict returned by `/predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResponse {
    pub risk_detected: u8,
    pub probability: f64,
    pub message: String,
}

impl RiskResponse {
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        let risk = probability >= threshold;
        Self {
            risk_detected: u8::from(risk),
            probability: (probability * 10_000.0).round() / 10_000.0,
            message: if risk { RISK_MESSAGE } else { NO_RISK_MESSAGE }.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_column_names() {
        let json = r#"{"IAA":5.5,"IEG":2.0,"IPS":6.0,"IDA":4.5,"IPV":7.0,"Pedra":"Ágata"}"#;
        let request: RiskRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.ieg, 2.0);
        assert_eq!(request.pedra.as_deref(), Some("Ágata"));
        assert!(request.fase.is_none());
    }

    #[test]
    fn test_validation_bounds_text_not_scores() {
        assert!(RiskRequest::new(5.0, 5.0, 5.0, 5.0, 5.0).validate().is_ok());
        assert!(RiskRequest::new(10.5, 5.0, 5.0, 5.0, 5.0).validate().is_ok());
        assert!(RiskRequest::new(5.0, -1.0, 5.0, 5.0, 5.0).validate().is_ok());

        let mut request = RiskRequest::new(5.0, 5.0, 5.0, 5.0, 5.0);
        request.instituicao_de_ensino = Some("x".repeat(101));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_to_table_skips_absent_fields() {
        let mut request = RiskRequest::new(1.0, 2.0, 3.0, 4.0, 5.0);
        request.fase = Some("Fase 3".to_string());

        let table = request.to_table().unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(
            table.column_names(),
            vec!["IAA", "IEG", "IPS", "IDA", "IPV", "Fase"]
        );
    }

    #[test]
    fn test_response_rounding_and_threshold() {
        let response = RiskResponse::from_probability(0.123456, 0.40);
        assert_eq!(response.risk_detected, 0);
        assert_eq!(response.probability, 0.1235);
        assert!(response.message.to_lowercase().contains("low risk"));

        let boundary = RiskResponse::from_probability(0.40, 0.40);
        assert_eq!(boundary.risk_detected, 1);
        assert!(boundary.message.to_lowercase().contains("risk detected"));
    }
}
