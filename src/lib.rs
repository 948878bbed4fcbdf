//! Configuration-driven encoder-decoder networks and pixel-wise segmentation
//! metrics on top of [Burn](https://burn.dev).
//!
//! The [`model`] module turns a nested configuration into a module tree:
//! encoder stages, an optional (possibly variational) bottleneck, decoder
//! stages with skip connections and a classification head, with
//! [`model::UNetConfig`] as the classic preset. The [`metrics`] module
//! computes confusion-matrix statistics (precision, recall, likelihood
//! ratios, Dice, Jaccard, ...) over label, probability or logit predictions
//! with batch and class aggregation.

pub mod model;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "training")]
pub mod training;

pub use model::{EncoderDecoder, EncoderDecoderConfig, UNet, UNetConfig};

#[cfg(feature = "dataset")]
pub use dataset::{InputMode, SegmentationConfig, SegmentationMode};

#[cfg(feature = "metrics")]
pub use metrics::{Aggregation, MetricKind, Multiclass, Predictions, SegmentationMetrics};

#[cfg(feature = "training")]
pub use training::{IoULoss, IoULossConfig, SegmentationOutput};

#[cfg(feature = "training")]
pub use metrics::{MeanIoUMetric, PixelAccuracyMetric};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
