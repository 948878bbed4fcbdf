//! Pixel-wise segmentation quality statistics.
//!
//! Every metric derives from per-batch-item, one-vs-rest confusion counts.
//! Rates are `numerator / denominator` with a fixed fill-in for the `0/0`
//! case; ratio metrics (likelihood ratios, odds ratio) apply the same rule to
//! already-computed rates, so `x/0` legitimately produces infinity and
//! aggregation means skip non-finite entries.

use std::str::FromStr;

use burn::prelude::*;
use thiserror::Error;

use super::confusion::{ConfusionMatrix, Predictions};

/// Pixel statistics derivable from the confusion matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    TruePositiveRate,
    FalsePositiveRate,
    FalseNegativeRate,
    TrueNegativeRate,
    Prevalence,
    /// Fraction of correctly classified pixels per batch item. Computed over
    /// all classes at once, so multiclass aggregation does not apply.
    Accuracy,
    PositivePredictiveValue,
    FalseDiscoveryRate,
    FalseOmissionRate,
    NegativePredictiveValue,
    PositiveLikelihoodRatio,
    NegativeLikelihoodRatio,
    DiagnosticsOddsRatio,
    F1Score,
    Jaccard,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown metric name: {0}")]
pub struct UnknownMetricError(String);

impl FromStr for MetricKind {
    type Err = UnknownMetricError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let kind = match name {
            "true_positive_rate" | "sensitivity" | "recall" | "tpr" => Self::TruePositiveRate,
            "false_positive_rate" | "fallout" | "fpr" => Self::FalsePositiveRate,
            "false_negative_rate" | "miss_rate" | "fnr" => Self::FalseNegativeRate,
            "true_negative_rate" | "specificity" | "tnr" => Self::TrueNegativeRate,
            "prevalence" => Self::Prevalence,
            "accuracy" => Self::Accuracy,
            "positive_predictive_value" | "precision" | "ppv" => Self::PositivePredictiveValue,
            "false_discovery_rate" | "fdr" => Self::FalseDiscoveryRate,
            "false_omission_rate" => Self::FalseOmissionRate,
            "negative_predictive_value" | "npv" => Self::NegativePredictiveValue,
            "positive_likelihood_ratio" | "plr" => Self::PositiveLikelihoodRatio,
            "negative_likelihood_ratio" | "nlr" => Self::NegativeLikelihoodRatio,
            "diagnostics_odds_ratio" | "dor" => Self::DiagnosticsOddsRatio,
            "f1_score" | "dice" => Self::F1Score,
            "jaccard" | "iou" => Self::Jaccard,
            _ => return Err(UnknownMetricError(name.to_owned())),
        };
        Ok(kind)
    }
}

/// Aggregation over the batch axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// One value per batch item.
    #[default]
    None,
    /// Mean over batch items, skipping non-finite entries.
    Mean,
}

/// Aggregation over the class axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multiclass {
    /// One value per class.
    #[default]
    None,
    /// Sum numerators and denominators over classes before dividing.
    Micro,
    /// Compute per class, then mean skipping non-finite entries.
    Macro,
}

/// Result of [`SegmentationMetrics::evaluate`]; the variant follows from the
/// requested aggregations.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Scalar(f64),
    PerBatch(Vec<f64>),
    PerClass(Vec<f64>),
    /// Row-major `[batch, class]` values.
    PerBatchClass {
        values: Vec<f64>,
        num_classes: usize,
    },
}

impl Evaluation {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Evaluation::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    /// Flatten into a plain vector, row-major for the matrix variant.
    pub fn into_vec(self) -> Vec<f64> {
        match self {
            Evaluation::Scalar(value) => vec![value],
            Evaluation::PerBatch(values)
            | Evaluation::PerClass(values)
            | Evaluation::PerBatchClass { values, .. } => values,
        }
    }
}

/// `[batch, class]` (or `[batch, 1]`) working array.
#[derive(Debug, Clone)]
struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { rows, cols, data }
    }

    fn zip(&self, other: &Grid, f: impl Fn(f64, f64) -> f64) -> Grid {
        debug_assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        Grid {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Grid {
        Grid {
            rows: self.rows,
            cols: self.cols,
            data: self.data.into_iter().map(f).collect(),
        }
    }

    fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    fn row_sum(&self, row: usize) -> f64 {
        self.row(row).iter().sum()
    }

    fn column_finite_means(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|col| finite_mean((0..self.rows).map(|row| self.data[row * self.cols + col])))
            .collect()
    }
}

/// Division with a fill-in for the indeterminate `0/0` case; a non-zero
/// numerator over zero is infinity.
fn divide(numerator: f64, denominator: f64, fill: f64) -> f64 {
    if denominator == 0.0 {
        if numerator == 0.0 { fill } else { f64::INFINITY }
    } else {
        numerator / denominator
    }
}

/// Mean over finite entries; all-infinite input collapses to infinity.
fn finite_mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut finite = 0usize;
    let mut infinite = 0usize;
    for value in values {
        if value.is_finite() {
            sum += value;
            finite += 1;
        } else if value.is_infinite() {
            infinite += 1;
        }
    }
    if finite > 0 {
        sum / finite as f64
    } else if infinite > 0 {
        f64::INFINITY
    } else {
        f64::NAN
    }
}

/// Confusion-matrix statistics over label, probability or logit predictions,
/// evaluated per pixel.
///
/// ```no_run
/// # use burn::backend::NdArray;
/// # use burn::prelude::*;
/// use burn_encdec::metrics::{
///     Aggregation, MetricKind, Multiclass, Predictions, SegmentationMetrics,
/// };
///
/// # fn example(targets: Tensor<NdArray, 3, Int>, predicted: Tensor<NdArray, 3, Int>) {
/// let metrics = SegmentationMetrics::new(targets, Predictions::Labels(predicted), 3);
/// let iou = metrics.evaluate(MetricKind::Jaccard, Aggregation::Mean, Multiclass::Macro);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SegmentationMetrics {
    confusion: ConfusionMatrix,
}

impl SegmentationMetrics {
    pub fn new<B: Backend>(
        targets: Tensor<B, 3, Int>,
        predictions: Predictions<B>,
        num_classes: usize,
    ) -> Self {
        Self {
            confusion: ConfusionMatrix::new(targets, predictions, num_classes),
        }
    }

    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        Self { confusion }
    }

    /// Accumulate another batch of predictions along the batch axis.
    pub fn append<B: Backend>(&mut self, targets: Tensor<B, 3, Int>, predictions: Predictions<B>) {
        self.confusion.append(ConfusionMatrix::new(
            targets,
            predictions,
            self.confusion.num_classes(),
        ));
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    pub fn evaluate(
        &self,
        metric: MetricKind,
        agg: Aggregation,
        multiclass: Multiclass,
    ) -> Evaluation {
        let grid = self.compute(metric, multiclass);
        match agg {
            Aggregation::None => {
                if grid.cols == 1 {
                    Evaluation::PerBatch(grid.data)
                } else {
                    Evaluation::PerBatchClass {
                        values: grid.data,
                        num_classes: grid.cols,
                    }
                }
            }
            Aggregation::Mean => {
                let means = grid.column_finite_means();
                if grid.cols == 1 {
                    Evaluation::Scalar(means[0])
                } else {
                    Evaluation::PerClass(means)
                }
            }
        }
    }

    /// [`evaluate`](Self::evaluate) by metric name or alias.
    pub fn evaluate_named(
        &self,
        metric: &str,
        agg: Aggregation,
        multiclass: Multiclass,
    ) -> Result<Evaluation, UnknownMetricError> {
        Ok(self.evaluate(metric.parse()?, agg, multiclass))
    }

    /// Per-batch values before batch aggregation: `[batch, classes]` for
    /// `Multiclass::None`, `[batch, 1]` otherwise.
    fn compute(&self, metric: MetricKind, multiclass: Multiclass) -> Grid {
        match metric {
            MetricKind::Accuracy => self.accuracy_grid(),
            MetricKind::F1Score => {
                let precision = self.compute(MetricKind::PositivePredictiveValue, multiclass);
                let recall = self.compute(MetricKind::TruePositiveRate, multiclass);
                precision.zip(&recall, |p, r| 2.0 / (1.0 / p + 1.0 / r))
            }
            MetricKind::Jaccard => self
                .compute(MetricKind::F1Score, multiclass)
                .map(|dice| dice / (2.0 - dice)),
            _ => {
                let (numerator, denominator, fill) = self.operands(metric);
                match multiclass {
                    Multiclass::None => {
                        numerator.zip(&denominator, |n, d| divide(n, d, fill))
                    }
                    Multiclass::Micro => Grid::from_fn(numerator.rows, 1, |row, _| {
                        divide(numerator.row_sum(row), denominator.row_sum(row), fill)
                    }),
                    Multiclass::Macro => {
                        let rates = numerator.zip(&denominator, |n, d| divide(n, d, fill));
                        Grid::from_fn(rates.rows, 1, |row, _| {
                            finite_mean(rates.row(row).iter().copied())
                        })
                    }
                }
            }
        }
    }

    /// Numerator/denominator arrays and the `0/0` fill-in of a rate metric.
    fn operands(&self, metric: MetricKind) -> (Grid, Grid, f64) {
        use MetricKind::*;

        match metric {
            TruePositiveRate => (self.true_positives(), self.condition_positives(), 1.0),
            FalseNegativeRate => (self.false_negatives(), self.condition_positives(), 0.0),
            FalsePositiveRate => (self.false_positives(), self.condition_negatives(), 0.0),
            TrueNegativeRate => (self.true_negatives(), self.condition_negatives(), 1.0),
            Prevalence => (self.condition_positives(), self.totals(), 0.0),
            PositivePredictiveValue => (self.true_positives(), self.prediction_positives(), 1.0),
            FalseDiscoveryRate => (self.false_positives(), self.prediction_positives(), 0.0),
            FalseOmissionRate => (self.false_negatives(), self.prediction_negatives(), 0.0),
            NegativePredictiveValue => (self.true_negatives(), self.prediction_negatives(), 1.0),
            PositiveLikelihoodRatio => (
                self.compute(TruePositiveRate, Multiclass::None),
                self.compute(FalsePositiveRate, Multiclass::None),
                0.0,
            ),
            NegativeLikelihoodRatio => (
                self.compute(FalseNegativeRate, Multiclass::None),
                self.compute(TrueNegativeRate, Multiclass::None),
                0.0,
            ),
            DiagnosticsOddsRatio => (
                self.compute(PositiveLikelihoodRatio, Multiclass::None),
                self.compute(NegativeLikelihoodRatio, Multiclass::None),
                0.0,
            ),
            Accuracy | F1Score | Jaccard => {
                unreachable!("derived metrics are handled in compute")
            }
        }
    }

    fn accuracy_grid(&self) -> Grid {
        let classes = self.confusion.num_classes();
        Grid::from_fn(self.confusion.batch_size(), 1, |item, _| {
            let correct: u64 = (0..classes)
                .map(|class| self.confusion.true_positive(item, class))
                .sum();
            divide(correct as f64, self.confusion.total(item) as f64, 0.0)
        })
    }

    fn count_grid(&self, f: impl Fn(usize, usize) -> f64) -> Grid {
        Grid::from_fn(self.confusion.batch_size(), self.confusion.num_classes(), f)
    }

    fn true_positives(&self) -> Grid {
        self.count_grid(|item, class| self.confusion.true_positive(item, class) as f64)
    }

    fn condition_positives(&self) -> Grid {
        self.count_grid(|item, class| self.confusion.condition_positive(item, class) as f64)
    }

    fn prediction_positives(&self) -> Grid {
        self.count_grid(|item, class| self.confusion.prediction_positive(item, class) as f64)
    }

    fn totals(&self) -> Grid {
        self.count_grid(|item, _| self.confusion.total(item) as f64)
    }

    fn false_positives(&self) -> Grid {
        self.prediction_positives()
            .zip(&self.true_positives(), |predicted, tp| predicted - tp)
    }

    fn false_negatives(&self) -> Grid {
        self.condition_positives()
            .zip(&self.true_positives(), |actual, tp| actual - tp)
    }

    fn condition_negatives(&self) -> Grid {
        self.totals()
            .zip(&self.condition_positives(), |total, actual| total - actual)
    }

    fn prediction_negatives(&self) -> Grid {
        self.totals()
            .zip(&self.prediction_positives(), |total, predicted| {
                total - predicted
            })
    }

    fn true_negatives(&self) -> Grid {
        self.condition_negatives()
            .zip(&self.false_positives(), |negatives, fp| negatives - fp)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::{Shape, TensorData};
    use rstest::rstest;

    use super::*;

    type TestBackend = NdArray;

    const INF: f64 = f64::INFINITY;

    const BATCH_SIZE: usize = 2;
    const IMAGE_SIZE: usize = 2;
    const NUM_CLASSES: usize = 3;

    const TARGETS: [i64; 8] = [0, 1, 2, 2, 0, 0, 1, 1];
    const LABELS: [i64; 8] = [0, 1, 1, 0, 2, 0, 1, 1];

    fn label_tensor(values: &[i64]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(
            TensorData::new(
                values.to_vec(),
                Shape::new([BATCH_SIZE, IMAGE_SIZE, IMAGE_SIZE]),
            )
            .convert::<i64>(),
            &Default::default(),
        )
    }

    fn one_hot(values: &[i64], on: f32, off: f32) -> Tensor<TestBackend, 4> {
        let mut data = vec![off; values.len() * NUM_CLASSES];
        for (pixel, &label) in values.iter().enumerate() {
            data[pixel * NUM_CLASSES + label as usize] = on;
        }
        Tensor::from_data(
            TensorData::new(
                data,
                Shape::new([BATCH_SIZE, IMAGE_SIZE, IMAGE_SIZE, NUM_CLASSES]),
            )
            .convert::<f32>(),
            &Default::default(),
        )
    }

    fn label_metrics() -> SegmentationMetrics {
        SegmentationMetrics::new(
            label_tensor(&TARGETS),
            Predictions::Labels(label_tensor(&LABELS)),
            NUM_CLASSES,
        )
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "length mismatch");
        for (index, (&a, &e)) in actual.iter().zip(expected).enumerate() {
            if e.is_infinite() {
                assert!(a.is_infinite(), "expected inf at {index}, got {a}");
            } else {
                assert!((a - e).abs() <= 1e-2, "index {index}: {a} vs {e}");
            }
        }
    }

    fn check_table(agg: Aggregation, multiclass: Multiclass, table: &[(&str, &[f64])]) {
        let metrics = label_metrics();
        for (name, expected) in table {
            let result = metrics
                .evaluate_named(name, agg, multiclass)
                .unwrap()
                .into_vec();
            assert_close(&result, expected);
        }
    }

    #[test]
    fn contents_without_aggregation() {
        check_table(
            Aggregation::None,
            Multiclass::None,
            &[
                ("true_positive_rate", &[1.0, 1.0, 0.0, 0.5, 1.0, 1.0]),
                ("false_positive_rate", &[0.33, 0.33, 0.0, 0.0, 0.0, 0.25]),
                ("true_negative_rate", &[0.66, 0.66, 1.0, 1.0, 1.0, 0.75]),
                ("false_negative_rate", &[0.0, 0.0, 1.0, 0.5, 0.0, 0.0]),
                ("prevalence", &[0.25, 0.25, 0.5, 0.5, 0.5, 0.0]),
                ("positive_predictive_value", &[0.5, 0.5, 1.0, 1.0, 1.0, 0.0]),
                ("false_discovery_rate", &[0.5, 0.5, 0.0, 0.0, 0.0, 1.0]),
                ("false_omission_rate", &[0.0, 0.0, 0.5, 0.33, 0.0, 0.0]),
                ("negative_predictive_value", &[1.0, 1.0, 0.5, 0.66, 1.0, 1.0]),
                ("positive_likelihood_ratio", &[3.0, 3.0, 0.0, INF, INF, 4.0]),
                ("negative_likelihood_ratio", &[0.0, 0.0, 1.0, 0.5, 0.0, 0.0]),
                ("diagnostics_odds_ratio", &[INF, INF, 0.0, INF, INF, INF]),
                ("f1_score", &[0.66, 0.66, 0.0, 0.66, 1.0, 0.0]),
                ("jaccard", &[0.49, 0.49, 0.0, 0.49, 1.0, 0.0]),
            ],
        );
    }

    #[test]
    fn contents_with_micro_aggregation() {
        check_table(
            Aggregation::None,
            Multiclass::Micro,
            &[
                ("true_positive_rate", &[0.5, 0.75]),
                ("false_positive_rate", &[0.25, 0.12]),
                ("true_negative_rate", &[0.75, 0.87]),
                ("false_negative_rate", &[0.5, 0.25]),
                ("prevalence", &[0.33, 0.33]),
                ("positive_predictive_value", &[0.5, 0.75]),
                ("false_discovery_rate", &[0.5, 0.25]),
                ("false_omission_rate", &[0.25, 0.12]),
                ("negative_predictive_value", &[0.75, 0.87]),
                ("positive_likelihood_ratio", &[3.0, 10.0]),
                ("negative_likelihood_ratio", &[0.42, 0.18]),
                ("diagnostics_odds_ratio", &[6.0, INF]),
                ("f1_score", &[0.5, 0.75]),
                ("jaccard", &[0.33, 0.6]),
            ],
        );
    }

    #[test]
    fn contents_with_macro_aggregation() {
        check_table(
            Aggregation::None,
            Multiclass::Macro,
            &[
                ("true_positive_rate", &[0.66, 0.83]),
                ("false_positive_rate", &[0.22, 0.08]),
                ("true_negative_rate", &[0.77, 0.91]),
                ("false_negative_rate", &[0.33, 0.16]),
                ("prevalence", &[0.33, 0.33]),
                ("positive_predictive_value", &[0.66, 0.66]),
                ("false_discovery_rate", &[0.33, 0.33]),
                ("false_omission_rate", &[0.16, 0.11]),
                ("negative_predictive_value", &[0.83, 0.88]),
                ("positive_likelihood_ratio", &[2.0, 4.0]),
                ("negative_likelihood_ratio", &[0.33, 0.16]),
                ("diagnostics_odds_ratio", &[0.0, INF]),
                ("f1_score", &[0.66, 0.74]),
                ("jaccard", &[0.5, 0.58]),
            ],
        );
    }

    #[test]
    fn contents_with_batch_mean() {
        check_table(
            Aggregation::Mean,
            Multiclass::None,
            &[
                ("true_positive_rate", &[0.75, 1.0, 0.5]),
                ("false_positive_rate", &[0.16, 0.16, 0.12]),
                ("true_negative_rate", &[0.83, 0.83, 0.87]),
                ("false_negative_rate", &[0.25, 0.0, 0.5]),
                ("prevalence", &[0.37, 0.37, 0.25]),
                ("positive_predictive_value", &[0.75, 0.75, 0.5]),
                ("false_discovery_rate", &[0.25, 0.25, 0.5]),
                ("false_omission_rate", &[0.16, 0.0, 0.25]),
                ("negative_predictive_value", &[0.83, 1.0, 0.75]),
                ("positive_likelihood_ratio", &[3.0, 3.0, 2.0]),
                ("negative_likelihood_ratio", &[0.25, 0.0, 0.5]),
                ("diagnostics_odds_ratio", &[INF, INF, 0.0]),
                ("f1_score", &[0.66, 0.83, 0.0]),
                ("jaccard", &[0.5, 0.75, 0.0]),
            ],
        );
    }

    #[test]
    fn contents_with_batch_mean_and_micro() {
        check_table(
            Aggregation::Mean,
            Multiclass::Micro,
            &[
                ("true_positive_rate", &[0.62]),
                ("false_positive_rate", &[0.18]),
                ("true_negative_rate", &[0.81]),
                ("false_negative_rate", &[0.37]),
                ("prevalence", &[0.33]),
                ("positive_predictive_value", &[0.62]),
                ("false_discovery_rate", &[0.37]),
                ("false_omission_rate", &[0.18]),
                ("negative_predictive_value", &[0.81]),
                ("positive_likelihood_ratio", &[6.5]),
                ("negative_likelihood_ratio", &[0.30]),
                ("diagnostics_odds_ratio", &[6.0]),
                ("f1_score", &[0.62]),
                ("jaccard", &[0.46]),
            ],
        );
    }

    #[test]
    fn contents_with_batch_mean_and_macro() {
        check_table(
            Aggregation::Mean,
            Multiclass::Macro,
            &[
                ("true_positive_rate", &[0.75]),
                ("false_positive_rate", &[0.15]),
                ("true_negative_rate", &[0.84]),
                ("false_negative_rate", &[0.25]),
                ("prevalence", &[0.33]),
                ("positive_predictive_value", &[0.66]),
                ("false_discovery_rate", &[0.33]),
                ("false_omission_rate", &[0.13]),
                ("negative_predictive_value", &[0.86]),
                ("positive_likelihood_ratio", &[3.0]),
                ("negative_likelihood_ratio", &[0.25]),
                ("diagnostics_odds_ratio", &[0.0]),
                ("f1_score", &[0.70]),
                ("jaccard", &[0.54]),
            ],
        );
    }

    #[test]
    fn accuracy_contents() {
        let metrics = label_metrics();

        let per_batch = metrics
            .evaluate(MetricKind::Accuracy, Aggregation::None, Multiclass::None)
            .into_vec();
        assert_close(&per_batch, &[0.5, 0.75]);

        let mean = metrics
            .evaluate(MetricKind::Accuracy, Aggregation::Mean, Multiclass::None)
            .into_vec();
        assert_close(&mean, &[0.62]);
    }

    fn prediction_variants() -> Vec<Predictions<TestBackend>> {
        vec![
            Predictions::Labels(label_tensor(&LABELS)),
            Predictions::Probabilities {
                values: one_hot(&LABELS, 1.0, 0.0),
                class_axis: 3,
            },
            Predictions::Logits {
                values: one_hot(&LABELS, 8.0, -8.0),
                class_axis: 3,
            },
        ]
    }

    #[rstest]
    #[case(Aggregation::None, Multiclass::None)]
    #[case(Aggregation::None, Multiclass::Micro)]
    #[case(Aggregation::None, Multiclass::Macro)]
    #[case(Aggregation::Mean, Multiclass::None)]
    #[case(Aggregation::Mean, Multiclass::Micro)]
    #[case(Aggregation::Mean, Multiclass::Macro)]
    fn shapes_for_every_prediction_format(
        #[case] agg: Aggregation,
        #[case] multiclass: Multiclass,
    ) {
        for predictions in prediction_variants() {
            let metrics =
                SegmentationMetrics::new(label_tensor(&TARGETS), predictions, NUM_CLASSES);
            let result = metrics.evaluate(MetricKind::Jaccard, agg, multiclass);

            match (agg, multiclass) {
                (Aggregation::None, Multiclass::None) => match result {
                    Evaluation::PerBatchClass {
                        values,
                        num_classes,
                    } => {
                        assert_eq!(values.len(), BATCH_SIZE * NUM_CLASSES);
                        assert_eq!(num_classes, NUM_CLASSES);
                    }
                    other => panic!("expected a matrix, got {other:?}"),
                },
                (Aggregation::None, _) => match result {
                    Evaluation::PerBatch(values) => assert_eq!(values.len(), BATCH_SIZE),
                    other => panic!("expected per-batch values, got {other:?}"),
                },
                (Aggregation::Mean, Multiclass::None) => match result {
                    Evaluation::PerClass(values) => assert_eq!(values.len(), NUM_CLASSES),
                    other => panic!("expected per-class values, got {other:?}"),
                },
                (Aggregation::Mean, _) => {
                    assert!(result.as_scalar().is_some(), "expected a scalar");
                }
            }
        }
    }

    #[test]
    fn probability_predictions_match_labels() {
        let from_labels = label_metrics();
        let from_proba = SegmentationMetrics::new(
            label_tensor(&TARGETS),
            Predictions::Probabilities {
                values: one_hot(&LABELS, 1.0, 0.0),
                class_axis: 3,
            },
            NUM_CLASSES,
        );

        assert_eq!(from_labels.confusion(), from_proba.confusion());
    }

    #[test]
    fn append_extends_the_batch_axis() {
        let mut accumulated = SegmentationMetrics::new(
            label_tensor_single(&TARGETS[..4]),
            Predictions::Labels(label_tensor_single(&LABELS[..4])),
            NUM_CLASSES,
        );
        accumulated.append(
            label_tensor_single(&TARGETS[4..]),
            Predictions::Labels(label_tensor_single(&LABELS[4..])),
        );

        assert_eq!(accumulated.confusion(), label_metrics().confusion());
    }

    fn label_tensor_single(values: &[i64]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), Shape::new([1, IMAGE_SIZE, IMAGE_SIZE]))
                .convert::<i64>(),
            &Default::default(),
        )
    }

    #[test]
    fn metric_names_and_aliases_parse() {
        for (alias, kind) in [
            ("sensitivity", MetricKind::TruePositiveRate),
            ("recall", MetricKind::TruePositiveRate),
            ("fallout", MetricKind::FalsePositiveRate),
            ("miss_rate", MetricKind::FalseNegativeRate),
            ("specificity", MetricKind::TrueNegativeRate),
            ("precision", MetricKind::PositivePredictiveValue),
            ("dice", MetricKind::F1Score),
            ("iou", MetricKind::Jaccard),
        ] {
            assert_eq!(alias.parse::<MetricKind>().unwrap(), kind);
        }

        assert!("not_a_metric".parse::<MetricKind>().is_err());
    }
}
