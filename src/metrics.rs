use tangram_metrics::{RegressionMetrics, RegressionMetricsInput};

/// Regression accuracy on a held-out split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl Evaluation {
    pub fn compute(y_true: &[f32], y_pred: &[f32]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                r2: 0.0,
            };
        }
        let (labels, predictions) = (&y_true[..n], &y_pred[..n]);

        let mut metrics = RegressionMetrics::new();
        metrics.update(RegressionMetricsInput {
            predictions,
            labels,
        });
        let output = metrics.finalize();

        // A constant target has zero variance; score 1.0 when predicted exactly, 0.0 otherwise.
        let r2 = if output.r2.is_finite() {
            output.r2 as f64
        } else if output.mse == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mae: mean_absolute_error(labels, predictions),
            rmse: output.rmse as f64,
            r2,
        }
    }
}

// tangram's `mae` averages signed errors, so the absolute mean is taken here.
fn mean_absolute_error(labels: &[f32], predictions: &[f32]) -> f64 {
    let total: f64 = labels
        .iter()
        .zip(predictions)
        .map(|(&t, &p)| (t as f64 - p as f64).abs())
        .sum();
    total / labels.len() as f64
}
