use std::marker::PhantomData;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

use super::{Aggregation, MetricKind, Multiclass, Predictions, SegmentationMetrics};

/// Per-step input for the pixel metrics: class scores
/// `[batch, classes, height, width]` and integer masks
/// `[batch, 1, height, width]`.
#[derive(new)]
pub struct SegmentationMetricInput<B: Backend> {
    outputs: Tensor<B, 4>,
    targets: Tensor<B, 4, Int>,
}

impl<B: Backend> SegmentationMetricInput<B> {
    fn metrics(&self) -> (SegmentationMetrics, usize) {
        let [batch_size, num_classes, _, _] = self.outputs.dims();
        let [_, _, height, width] = self.targets.dims();

        // A single score channel is a binary foreground map; everything else
        // carries one channel per class.
        let (predictions, num_classes) = if num_classes == 1 {
            let labels = self
                .outputs
                .clone()
                .greater_elem(0.5)
                .int()
                .reshape([batch_size, height, width]);
            (Predictions::Labels(labels), 2)
        } else {
            (
                Predictions::Probabilities {
                    values: self.outputs.clone(),
                    class_axis: 1,
                },
                num_classes,
            )
        };

        let metrics = SegmentationMetrics::new(
            self.targets.clone().reshape([batch_size, height, width]),
            predictions,
            num_classes,
        );
        (metrics, batch_size)
    }
}

/// Fraction of correctly classified pixels, averaged over the batch.
#[derive(Default)]
pub struct PixelAccuracyMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> PixelAccuracyMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for PixelAccuracyMetric<B> {
    type Input = SegmentationMetricInput<B>;
    const NAME: &'static str = "Pixel Accuracy";

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let (metrics, batch_size) = input.metrics();
        let accuracy = metrics
            .evaluate(MetricKind::Accuracy, Aggregation::Mean, Multiclass::None)
            .as_scalar()
            .expect("batch-mean accuracy is a scalar");

        self.state.update(
            100.0 * accuracy,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for PixelAccuracyMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Jaccard index averaged over classes and the batch.
#[derive(Default)]
pub struct MeanIoUMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> MeanIoUMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for MeanIoUMetric<B> {
    type Input = SegmentationMetricInput<B>;
    const NAME: &'static str = "Mean IoU";

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let (metrics, batch_size) = input.metrics();
        let iou = metrics
            .evaluate(MetricKind::Jaccard, Aggregation::Mean, Multiclass::Macro)
            .as_scalar()
            .expect("batch-mean macro jaccard is a scalar");

        self.state.update(
            100.0 * iou,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for MeanIoUMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
