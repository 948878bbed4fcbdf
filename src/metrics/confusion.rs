use burn::prelude::*;

/// Model predictions in one of the three accepted formats.
///
/// Probabilities and logits carry a class axis; both reduce to label maps by
/// argmax, which is unaffected by the softmax/sigmoid between them.
#[derive(Debug, Clone)]
pub enum Predictions<B: Backend> {
    /// Class indices with the same shape as the targets.
    Labels(Tensor<B, 3, Int>),
    /// Per-class probabilities, e.g. `[batch, h, w, classes]` for
    /// `class_axis = 3` or `[batch, classes, h, w]` for `class_axis = 1`.
    Probabilities {
        values: Tensor<B, 4>,
        class_axis: usize,
    },
    /// Raw scores with the same layout as `Probabilities`.
    Logits {
        values: Tensor<B, 4>,
        class_axis: usize,
    },
}

impl<B: Backend> Predictions<B> {
    pub fn into_labels(self) -> Tensor<B, 3, Int> {
        match self {
            Predictions::Labels(labels) => labels,
            Predictions::Probabilities { values, class_axis }
            | Predictions::Logits { values, class_axis } => {
                let dims = values.dims();
                assert!(
                    class_axis < 4,
                    "class axis {} out of range for a rank-4 prediction tensor",
                    class_axis
                );

                let mut shape = [0; 3];
                let mut next = 0;
                for (axis, &size) in dims.iter().enumerate() {
                    if axis != class_axis {
                        shape[next] = size;
                        next += 1;
                    }
                }

                values.argmax(class_axis).reshape(shape)
            }
        }
    }
}

/// Per-batch-item confusion counts: `counts[item][target][predicted]` is the
/// number of pixels of class `target` predicted as `predicted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Vec<u64>,
    num_classes: usize,
}

impl ConfusionMatrix {
    pub fn new<B: Backend>(
        targets: Tensor<B, 3, Int>,
        predictions: Predictions<B>,
        num_classes: usize,
    ) -> Self {
        let predicted = predictions.into_labels();
        let target_dims = targets.dims();
        let predicted_dims = predicted.dims();
        assert_eq!(
            target_dims, predicted_dims,
            "targets and predictions must have the same shape: {:?} vs {:?}",
            target_dims, predicted_dims
        );

        let targets: Vec<i64> = targets
            .into_data()
            .convert::<i64>()
            .to_vec()
            .expect("target labels are contiguous integers");
        let predicted: Vec<i64> = predicted
            .into_data()
            .convert::<i64>()
            .to_vec()
            .expect("predicted labels are contiguous integers");

        let [batch_size, height, width] = target_dims;
        let pixels = height * width;
        let mut counts = vec![0u64; batch_size * num_classes * num_classes];

        for item in 0..batch_size {
            for pixel in 0..pixels {
                let target = targets[item * pixels + pixel];
                let prediction = predicted[item * pixels + pixel];
                assert!(
                    (0..num_classes as i64).contains(&target)
                        && (0..num_classes as i64).contains(&prediction),
                    "labels ({}, {}) out of range for {} classes",
                    target,
                    prediction,
                    num_classes
                );
                counts
                    [(item * num_classes + target as usize) * num_classes + prediction as usize] +=
                    1;
            }
        }

        Self {
            counts,
            num_classes,
        }
    }

    /// Extend the batch axis with the items of another matrix.
    pub fn append(&mut self, other: ConfusionMatrix) {
        assert_eq!(
            self.num_classes, other.num_classes,
            "cannot append a confusion matrix over {} classes to one over {}",
            other.num_classes, self.num_classes
        );
        self.counts.extend(other.counts);
    }

    pub fn batch_size(&self) -> usize {
        self.counts.len() / (self.num_classes * self.num_classes)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn count(&self, item: usize, target: usize, predicted: usize) -> u64 {
        self.counts[(item * self.num_classes + target) * self.num_classes + predicted]
    }

    pub fn true_positive(&self, item: usize, class: usize) -> u64 {
        self.count(item, class, class)
    }

    /// Pixels whose target is `class`.
    pub fn condition_positive(&self, item: usize, class: usize) -> u64 {
        (0..self.num_classes)
            .map(|predicted| self.count(item, class, predicted))
            .sum()
    }

    /// Pixels predicted as `class`.
    pub fn prediction_positive(&self, item: usize, class: usize) -> u64 {
        (0..self.num_classes)
            .map(|target| self.count(item, target, class))
            .sum()
    }

    /// Pixels in one batch item.
    pub fn total(&self, item: usize) -> u64 {
        (0..self.num_classes)
            .map(|target| self.condition_positive(item, target))
            .sum()
    }
}
