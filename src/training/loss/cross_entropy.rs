//! Cross-entropy loss for image segmentation.
//!
//! Extends the plain cross-entropy of the Burn crate with spatial targets, a
//! per-pixel validity mask, ignored class indices, label smoothing and class
//! weights.

use burn::{
    module::{Content, DisplaySettings, ModuleDisplay},
    prelude::*,
    tensor::activation::log_softmax,
};

/// Floor for probabilities before taking their logarithm.
const PROB_EPSILON: f64 = 1e-7;

/// Configuration to create a [SegmentationCrossEntropyLoss] instance.
#[derive(Config, Debug)]
pub struct SegmentationCrossEntropyLossConfig {
    /// Label smoothing factor in `[0, 1]`.
    ///
    /// Hard labels {0, 1} become `y(1 - alpha) + alpha / num_classes`.
    pub smoothing: Option<f32>,

    /// Per-class weights for handling class imbalance.
    ///
    /// The order of the weight vector must correspond to the label integer
    /// assignment; all weights must be positive.
    pub weights: Option<Vec<f32>>,

    /// Whether predictions are logits (softmax is applied internally) or
    /// probabilities.
    #[config(default = true)]
    pub logits: bool,

    /// Class indices excluded from the loss, e.g. background or boundary
    /// classes.
    pub ignore_indices: Option<Vec<usize>>,
}

impl SegmentationCrossEntropyLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegmentationCrossEntropyLoss<B> {
        self.assertions();
        SegmentationCrossEntropyLoss {
            weights: self
                .weights
                .as_ref()
                .map(|e| Tensor::<B, 1>::from_floats(e.as_slice(), device)),
            smoothing: self.smoothing,
            logits: self.logits,
            ignore_indices: self.ignore_indices.clone().unwrap_or_default(),
        }
    }

    fn assertions(&self) {
        if let Some(alpha) = self.smoothing {
            assert!(
                (0.0..=1.).contains(&alpha),
                "Alpha of Cross-entropy loss with smoothed labels should be in interval [0, 1]. Got {}",
                alpha
            );
        };
        if let Some(weights) = self.weights.as_ref() {
            assert!(
                weights.iter().all(|e| e > &0.),
                "Weights of cross-entropy have to be positive."
            );
        }
    }
}

/// Cross-entropy averaged over the valid pixels of a segmentation batch.
///
/// # Input shapes
///
/// - predictions: `[batch_size, num_classes, height, width]`
/// - targets: `[batch_size, 1, height, width]` integer class indices
/// - masks: `[batch_size, 1, height, width]`, true where the pixel counts
///
/// Should be created using [SegmentationCrossEntropyLossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct SegmentationCrossEntropyLoss<B: Backend> {
    /// Weights for cross-entropy.
    pub weights: Option<Tensor<B, 1>>,
    /// Label smoothing factor.
    pub smoothing: Option<f32>,
    /// Use logits as input.
    pub logits: bool,
    /// Ignore specific class indices during loss calculation.
    pub ignore_indices: Vec<usize>,
}

impl<B: Backend> ModuleDisplay for SegmentationCrossEntropyLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("weights", &self.weights)
            .add("smoothing", &self.smoothing)
            .add("logits", &self.logits)
            .add("ignore_indices", &self.ignore_indices)
            .optional()
    }
}

impl<B: Backend> SegmentationCrossEntropyLoss<B> {
    /// Average loss over all valid pixels; zero when nothing is valid.
    pub fn forward(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4, Int>,
        masks: Tensor<B, 4, Bool>,
    ) -> Tensor<B, 1> {
        Self::assertions(&predictions, &targets, &masks);

        let device = predictions.device().clone();
        let [batch_size, num_classes, height, width] = predictions.dims();
        let num_pixels = batch_size * height * width;

        let predictions: Tensor<B, 2> = predictions
            .reshape([batch_size, num_classes, height * width])
            .permute([0, 2, 1])
            .reshape([num_pixels, num_classes]);
        let targets: Tensor<B, 1, Int> = targets.reshape([num_pixels]);

        let mut masks: Tensor<B, 1, Bool> = masks.reshape([num_pixels]);
        for ignore_index in &self.ignore_indices {
            let ignored = targets.clone().equal_elem(*ignore_index as i32);
            masks = masks.int().mask_fill(ignored, 0).bool();
        }

        let mut log_probs = if self.logits {
            log_softmax(predictions, 1)
        } else {
            predictions
                .clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
                .log()
        };

        if let Some(weights) = &self.weights {
            log_probs = log_probs
                * weights
                    .clone()
                    .reshape([1, num_classes])
                    .repeat_dim(0, num_pixels);
        }

        let smoothed_targets = Self::smoothed_targets(
            num_classes,
            targets,
            self.smoothing.unwrap_or(0.0),
        );

        let neg_log_likelihood = (smoothed_targets * log_probs).sum_dim(1).neg();
        let neg_log_likelihood = neg_log_likelihood
            .mask_fill(masks.clone().bool_not().reshape([num_pixels, 1]), 0.0);

        let valid_pixels: i64 = masks.int().sum().into_scalar().elem();
        tracing::debug!(valid_pixels, "segmentation cross-entropy");

        if valid_pixels > 0 {
            neg_log_likelihood.sum().div_scalar(valid_pixels as f32)
        } else {
            Tensor::zeros([1], &device)
        }
    }

    fn smoothed_targets(
        num_classes: usize,
        targets: Tensor<B, 1, Int>,
        alpha: f32,
    ) -> Tensor<B, 2> {
        let device = &targets.device();
        let [num_pixels] = targets.dims();

        let one_hot = Tensor::<B, 2>::zeros([num_pixels, num_classes], device).scatter(
            1,
            targets.reshape([num_pixels, 1]),
            Tensor::ones([num_pixels, 1], device),
        );

        one_hot * (1. - alpha) + alpha / num_classes as f32
    }

    fn assertions(
        predictions: &Tensor<B, 4>,
        targets: &Tensor<B, 4, Int>,
        masks: &Tensor<B, 4, Bool>,
    ) {
        let [pred_batch, _, pred_height, pred_width] = predictions.dims();
        let [target_batch, target_channels, target_height, target_width] = targets.dims();
        let [mask_batch, mask_channels, mask_height, mask_width] = masks.dims();

        assert_eq!(
            [pred_batch, pred_height, pred_width],
            [target_batch, target_height, target_width],
            "Predictions and targets must agree on batch and spatial dimensions"
        );
        assert_eq!(
            [pred_batch, pred_height, pred_width],
            [mask_batch, mask_height, mask_width],
            "Predictions and masks must agree on batch and spatial dimensions"
        );
        assert_eq!(
            target_channels, 1,
            "Targets should have exactly 1 channel, got {}",
            target_channels
        );
        assert_eq!(
            mask_channels, 1,
            "Masks should have exactly 1 channel, got {}",
            mask_channels
        );
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::{Shape, TensorData};

    use super::*;

    type TestBackend = NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    fn targets(values: Vec<i64>) -> Tensor<TestBackend, 4, Int> {
        Tensor::from_data(
            TensorData::new(values, Shape::new([1, 1, 2, 2])).convert::<i64>(),
            &device(),
        )
    }

    fn logits(values: Vec<f32>) -> Tensor<TestBackend, 4> {
        Tensor::from_data(
            TensorData::new(values, Shape::new([1, 2, 2, 2])).convert::<f32>(),
            &device(),
        )
    }

    fn all_valid() -> Tensor<TestBackend, 4, Bool> {
        Tensor::<TestBackend, 4, Int>::ones([1, 1, 2, 2], &device()).bool()
    }

    #[test]
    fn confident_correct_logits_give_near_zero_loss() {
        let targets = targets(vec![0, 1, 1, 0]);
        // Class planes strongly favouring the target class of each pixel.
        let predictions = logits(vec![
            10.0, -10.0, -10.0, 10.0, // class 0 plane
            -10.0, 10.0, 10.0, -10.0, // class 1 plane
        ]);

        let loss = SegmentationCrossEntropyLossConfig::new()
            .init::<TestBackend>(&device())
            .forward(predictions, targets, all_valid());

        let loss: f64 = loss.into_scalar().elem();
        assert!(loss < 1e-3, "loss was {loss}");
    }

    #[test]
    fn wrong_predictions_cost_more_than_right_ones() {
        let targets_tensor = targets(vec![0, 1, 1, 0]);
        let right = logits(vec![
            10.0, -10.0, -10.0, 10.0, //
            -10.0, 10.0, 10.0, -10.0,
        ]);
        let wrong = logits(vec![
            -10.0, 10.0, 10.0, -10.0, //
            10.0, -10.0, -10.0, 10.0,
        ]);

        let loss_fn = SegmentationCrossEntropyLossConfig::new().init::<TestBackend>(&device());
        let right_loss: f64 = loss_fn
            .forward(right, targets_tensor.clone(), all_valid())
            .into_scalar()
            .elem();
        let wrong_loss: f64 = loss_fn
            .forward(wrong, targets_tensor, all_valid())
            .into_scalar()
            .elem();

        assert!(wrong_loss > right_loss + 1.0);
    }

    #[test]
    fn fully_masked_batch_yields_zero_loss() {
        let targets = targets(vec![0, 1, 1, 0]);
        let predictions = logits(vec![0.0; 8]);
        let masks = Tensor::<TestBackend, 4, Int>::zeros([1, 1, 2, 2], &device()).bool();

        let loss = SegmentationCrossEntropyLossConfig::new()
            .init::<TestBackend>(&device())
            .forward(predictions, targets, masks);

        let loss: f64 = loss.into_scalar().elem();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn ignored_classes_do_not_contribute() {
        // All pixels belong to the ignored class, so nothing remains valid.
        let targets = targets(vec![1, 1, 1, 1]);
        let predictions = logits(vec![
            10.0, 10.0, 10.0, 10.0, //
            -10.0, -10.0, -10.0, -10.0,
        ]);

        let loss = SegmentationCrossEntropyLossConfig::new()
            .with_ignore_indices(Some(vec![1]))
            .init::<TestBackend>(&device())
            .forward(predictions, targets, all_valid());

        let loss: f64 = loss.into_scalar().elem();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn probability_inputs_are_supported() {
        let targets = targets(vec![0, 1, 1, 0]);
        let predictions = logits(vec![
            1.0, 0.0, 0.0, 1.0, //
            0.0, 1.0, 1.0, 0.0,
        ]);

        let loss = SegmentationCrossEntropyLossConfig::new()
            .with_logits(false)
            .init::<TestBackend>(&device())
            .forward(predictions, targets, all_valid());

        let loss: f64 = loss.into_scalar().elem();
        assert!(loss < 1e-5, "loss was {loss}");
    }

    #[test]
    #[should_panic(expected = "interval [0, 1]")]
    fn out_of_range_smoothing_is_rejected() {
        SegmentationCrossEntropyLossConfig::new()
            .with_smoothing(Some(1.5))
            .init::<TestBackend>(&device());
    }
}
