//! Classification report for a fitted model on the held-out split

use crate::dataset::TrainingSet;
use crate::inference::{InferenceError, RiskModel};
use aprender::metrics::classification::{
    accuracy, confusion_matrix, f1_score, precision, recall, Average,
};
use aprender::primitives::Matrix;
use serde::{Deserialize, Serialize};

const CLEAN: usize = 0;
const BUGGY: usize = 1;

/// Precision, recall and F1 for one class (or an average over classes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

impl ClassMetrics {
    /// Metrics of `class` read off a confusion matrix (rows are true labels)
    fn for_class(confusion: &Matrix<usize>, class: usize) -> Self {
        let n = confusion.n_rows();
        if class >= n {
            return Self::default();
        }
        let true_pos = confusion.get(class, class);
        let predicted: usize = (0..n).map(|i| confusion.get(i, class)).sum();
        let support: usize = (0..n).map(|j| confusion.get(class, j)).sum();

        let precision = ratio(true_pos, predicted);
        let recall = ratio(true_pos, support);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1_score,
            support,
        }
    }

    fn averaged(predicted: &[usize], truth: &[usize], average: Average) -> Self {
        Self {
            precision: f64::from(precision(predicted, truth, average)),
            recall: f64::from(recall(predicted, truth, average)),
            f1_score: f64::from(f1_score(predicted, truth, average)),
            support: truth.len(),
        }
    }
}

/// Zero when the denominator is zero
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub buggy: ClassMetrics,
    pub clean: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Report from true and predicted labels; all zeros for an empty split
    pub fn from_labels(truth: &[bool], predicted: &[bool]) -> Self {
        if truth.is_empty() || truth.len() != predicted.len() {
            return Self::default();
        }
        let encode = |labels: &[bool]| -> Vec<usize> {
            labels
                .iter()
                .map(|&buggy| if buggy { BUGGY } else { CLEAN })
                .collect()
        };
        let truth = encode(truth);
        let predicted = encode(predicted);

        let confusion = confusion_matrix(&predicted, &truth);
        Self {
            accuracy: f64::from(accuracy(&predicted, &truth)),
            buggy: ClassMetrics::for_class(&confusion, BUGGY),
            clean: ClassMetrics::for_class(&confusion, CLEAN),
            macro_avg: ClassMetrics::averaged(&predicted, &truth, Average::Macro),
            weighted_avg: ClassMetrics::averaged(&predicted, &truth, Average::Weighted),
        }
    }
}

/// Predict the test split and classify at `threshold`
pub fn evaluate<M: RiskModel + ?Sized>(
    model: &M,
    test: &TrainingSet,
    threshold: f64,
) -> Result<ClassificationReport, InferenceError> {
    let predicted: Vec<bool> = model
        .predict(&test.samples)?
        .into_iter()
        .map(|p| p >= threshold)
        .collect();

    let report = ClassificationReport::from_labels(&test.labels, &predicted);
    tracing::info!(
        "Evaluated on {} rows: accuracy {:.3}, weighted F1 {:.3}",
        test.len(),
        report.accuracy,
        report.weighted_avg.f1_score
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_report_counts() {
        // tp=2 fn=1 fp=1 tn=4
        let truth = [true, true, true, false, false, false, false, false];
        let predicted = [true, true, false, true, false, false, false, false];
        let report = ClassificationReport::from_labels(&truth, &predicted);

        assert!(close(report.accuracy, 6.0 / 8.0));
        assert!(close(report.buggy.precision, 2.0 / 3.0));
        assert!(close(report.buggy.recall, 2.0 / 3.0));
        assert_eq!(report.buggy.support, 3);
        assert!(close(report.clean.precision, 0.8));
        assert!(close(report.clean.recall, 0.8));
        assert_eq!(report.clean.support, 5);

        assert!(close(report.macro_avg.f1_score, (2.0 / 3.0 + 0.8) / 2.0));
        assert!(close(
            report.weighted_avg.f1_score,
            (2.0 / 3.0) * 3.0 / 8.0 + 0.8 * 5.0 / 8.0
        ));
        assert_eq!(report.weighted_avg.support, 8);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let report = ClassificationReport::from_labels(&[false, false], &[false, false]);
        assert_eq!(report.buggy.precision, 0.0);
        assert_eq!(report.buggy.recall, 0.0);
        assert_eq!(report.buggy.f1_score, 0.0);
        assert_eq!(report.buggy.support, 0);
        assert_eq!(report.clean.f1_score, 1.0);
        assert_eq!(report.accuracy, 1.0);

        let empty = ClassificationReport::from_labels(&[], &[]);
        assert_eq!(empty, ClassificationReport::default());
    }

    #[test]
    fn test_class_metrics_json_keys() {
        let json = serde_json::to_value(ClassMetrics::default()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(keys.contains(&"f1-score"));
        assert!(keys.contains(&"support"));
    }

    struct Threshold;

    impl RiskModel for Threshold {
        fn n_features(&self) -> usize {
            1
        }

        fn predict(&self, rows: &[Vec<f64>]) -> inference::Result<Vec<f64>> {
            Ok(rows.iter().map(|r| r[0]).collect())
        }
    }

    #[test]
    fn test_evaluate_applies_threshold() {
        let test = TrainingSet {
            samples: vec![vec![0.2], vec![0.5], vec![0.9], vec![0.4]],
            labels: vec![false, true, true, true],
        };
        let report = evaluate(&Threshold, &test, 0.5).unwrap();
        assert!(close(report.accuracy, 0.75));
        assert!(close(report.buggy.recall, 2.0 / 3.0));
        assert_eq!(report.buggy.precision, 1.0);
        assert_eq!(report.clean.support, 1);
    }
}
