use crate::data::table::Table;
use crate::error::{AppError, Result};
use crate::ml::models::{ClassMetrics, EvaluationReport};
use crate::ml::pipeline::RiskModel;
use crate::ml::tracking::RunTracker;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// `[[TN, FP], [FN, TP]]`
pub fn confusion_matrix(y_true: &[u8], y_pred: &[u8]) -> [[usize; 2]; 2] {
    let mut matrix = [[0usize; 2]; 2];
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        matrix[usize::from(truth > 0)][usize::from(pred > 0)] += 1;
    }
    matrix
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Positive-class recall; 0 when there are no positives
pub fn recall_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let cm = confusion_matrix(y_true, y_pred);
    ratio(cm[1][1], cm[1][1] + cm[1][0])
}

/// Binarize: a probability at or above the threshold is a positive
pub fn apply_threshold(probabilities: &[f64], threshold: f64) -> Vec<u8> {
    probabilities
        .iter()
        .map(|&p| u8::from(p >= threshold))
        .collect()
}

/// Score a fitted model on held-out data at a custom decision threshold.
///
/// Tracker writes are best effort: failures are logged and never abort the
/// evaluation.
pub fn evaluate_model(
    model: &dyn RiskModel,
    x: &Table,
    y: &[u8],
    threshold: f64,
    tracker: Option<&dyn RunTracker>,
) -> Result<EvaluationReport> {
    if x.n_rows() != y.len() {
        return Err(AppError::Validation(format!(
            "{} rows but {} labels",
            x.n_rows(),
            y.len()
        )));
    }

    let probabilities = model.predict_proba(x)?;
    if probabilities.len() != y.len() {
        return Err(AppError::Prediction(format!(
            "model returned {} probabilities for {} rows",
            probabilities.len(),
            y.len()
        )));
    }
    let predicted = apply_threshold(&probabilities, threshold);
    let cm = confusion_matrix(y, &predicted);
    let [[tn, fp], [fn_, tp]] = cm;

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let mut per_class = BTreeMap::new();
    per_class.insert(
        "0".to_string(),
        class_metrics(ratio(tn, tn + fn_), ratio(tn, tn + fp), tn + fp),
    );
    per_class.insert("1".to_string(), class_metrics(precision, recall, tp + fn_));

    let report = EvaluationReport {
        threshold,
        accuracy: ratio(tn + tp, y.len()),
        precision,
        recall,
        f1_score: f1(precision, recall),
        confusion_matrix: cm,
        per_class,
        feature_importances: ranked_importances(model, x),
    };

    info!(
        threshold,
        accuracy = report.accuracy,
        precision = report.precision,
        recall = report.recall,
        f1_score = report.f1_score,
        "Model evaluation"
    );
    info!(
        true_negatives = tn,
        false_positives = fp,
        false_negatives = fn_,
        true_positives = tp,
        "Confusion matrix"
    );
    for (label, metrics) in &report.per_class {
        info!(
            class = %label,
            precision = metrics.precision,
            recall = metrics.recall,
            f1_score = metrics.f1_score,
            support = metrics.support,
            "Classification report"
        );
    }
    match &report.feature_importances {
        Some(ranked) => {
            for (name, importance) in ranked {
                info!(feature = %name, importance, "Feature importance");
            }
        }
        None => info!("Feature importance unavailable for this model"),
    }

    if let Some(tracker) = tracker {
        record(tracker, &report);
    }

    Ok(report)
}

fn class_metrics(precision: f64, recall: f64, support: usize) -> ClassMetrics {
    ClassMetrics {
        precision,
        recall,
        f1_score: f1(precision, recall),
        support,
    }
}

/// Importances paired with output names when the model exposes them,
/// raw column names otherwise
fn ranked_importances(model: &dyn RiskModel, x: &Table) -> Option<Vec<(String, f64)>> {
    let importances = model.feature_importances()?;
    let names: Vec<String> = model
        .feature_names_out()
        .unwrap_or_else(|| x.column_names().into_iter().map(str::to_string).collect());

    if names.len() != importances.len() {
        warn!(
            names = names.len(),
            importances = importances.len(),
            "Feature names do not match importances"
        );
        return None;
    }

    let mut ranked: Vec<(String, f64)> = names.into_iter().zip(importances).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    Some(ranked)
}

/// Render the confusion matrix as a small text table
pub fn render_confusion_matrix(cm: &[[usize; 2]; 2], threshold: f64) -> String {
    let width = cm
        .iter()
        .flatten()
        .map(|v| v.to_string().len())
        .max()
        .unwrap_or(1)
        .max(6);
    format!(
        "confusion matrix (threshold {threshold})\n\
         {blank:>8} {p0:>width$} {p1:>width$}\n\
         {t0:>8} {tn:>width$} {fp:>width$}\n\
         {t1:>8} {fn_:>width$} {tp:>width$}\n",
        threshold = threshold,
        blank = "",
        p0 = "pred 0",
        p1 = "pred 1",
        t0 = "true 0",
        t1 = "true 1",
        tn = cm[0][0],
        fp = cm[0][1],
        fn_ = cm[1][0],
        tp = cm[1][1],
        width = width,
    )
}

fn record(tracker: &dyn RunTracker, report: &EvaluationReport) {
    let mut metrics = report.metrics();
    metrics.insert("threshold".to_string(), report.threshold);
    if let Err(err) = tracker.log_metrics(&metrics) {
        warn!(error = %err, "Failed to record evaluation metrics");
    }

    let rendered = render_confusion_matrix(&report.confusion_matrix, report.threshold);
    if let Err(err) = tracker.log_artifact("confusion_matrix.txt", rendered.as_bytes()) {
        warn!(error = %err, "Failed to record confusion matrix");
    }

    match serde_json::to_vec_pretty(report) {
        Ok(bytes) => {
            if let Err(err) = tracker.log_artifact("evaluation.json", &bytes) {
                warn!(error = %err, "Failed to record evaluation report");
            }
        }
        Err(err) => warn!(error = %err, "Failed to serialize evaluation report"),
    }
}
