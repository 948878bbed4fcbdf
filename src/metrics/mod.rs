mod confusion;
mod segmentation;

#[cfg(feature = "training")]
mod train;

pub use confusion::{ConfusionMatrix, Predictions};
pub use segmentation::{
    Aggregation, Evaluation, MetricKind, Multiclass, SegmentationMetrics, UnknownMetricError,
};

#[cfg(feature = "training")]
pub use train::{MeanIoUMetric, PixelAccuracyMetric, SegmentationMetricInput};
