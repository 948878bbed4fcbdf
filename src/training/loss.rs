pub mod cross_entropy;

pub use cross_entropy::{SegmentationCrossEntropyLoss, SegmentationCrossEntropyLossConfig};

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

#[derive(Config, Debug)]
pub struct IoULossConfig {
    #[config(default = 1e-5)]
    pub smooth: f32,

    #[config(default = true)]
    pub reduction: bool,

    #[config(default = 2)]
    pub num_classes: usize,

    #[config(default = false)]
    pub apply_activation: bool,
}

impl IoULossConfig {
    pub fn init<B: Backend>(&self, _device: &B::Device) -> IoULoss<B> {
        self.assertions();
        IoULoss {
            smooth: self.smooth,
            reduction: self.reduction,
            num_classes: self.num_classes,
            apply_activation: self.apply_activation,
            _b: PhantomData,
        }
    }

    fn assertions(&self) {
        assert!(
            self.smooth >= 0.,
            "Smoothing factor must be non-negative. Got {}",
            self.smooth
        );

        assert!(
            self.num_classes >= 2,
            "Number of classes must be at least 2 (for binary segmentation). Got {}",
            self.num_classes
        );
    }
}

/// Soft intersection-over-union loss.
///
/// Binary segmentation (two classes, a single prediction channel) compares
/// foreground probabilities against the mask directly; the multiclass form
/// averages per-class IoU over all class channels.
#[derive(Module, Debug)]
pub struct IoULoss<B: Backend> {
    pub smooth: f32,
    pub reduction: bool,
    pub num_classes: usize,
    pub apply_activation: bool,
    _b: PhantomData<B>,
}

impl<B: Backend> IoULoss<B> {
    pub fn forward(&self, inputs: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        self.assertions(&inputs, &targets);

        let input_channels = inputs.dims()[1];
        let binary = self.num_classes == 2 && input_channels == 1;

        let probs = if self.apply_activation {
            if binary {
                sigmoid(inputs)
            } else {
                softmax(inputs, 1)
            }
        } else {
            inputs
        };

        if binary {
            self.binary_iou_loss(probs, targets)
        } else {
            self.multiclass_iou_loss(probs, targets)
        }
    }

    fn binary_iou_loss(&self, probs: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        let device = &targets.device();
        let targets = targets.float();

        let intersection = (probs.clone() * targets.clone()).sum();
        let union = probs.sum() + targets.sum() - intersection.clone();

        let iou = (intersection + self.smooth) / (union + self.smooth);

        Tensor::<B, 1>::ones([1], device) - iou
    }

    fn multiclass_iou_loss(&self, probs: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        let device = &targets.device();
        let num_classes = probs.dims()[1];

        let mut class_ious = Vec::with_capacity(num_classes);
        for class_idx in 0..num_classes {
            let class_probs = probs.clone().narrow(1, class_idx, 1);
            let class_targets = targets.clone().equal_elem(class_idx as i64).float();

            let intersection = (class_probs.clone() * class_targets.clone()).sum();
            let union = class_probs.sum() + class_targets.sum() - intersection.clone();

            class_ious.push((intersection + self.smooth) / (union + self.smooth));
        }

        let stacked = Tensor::stack::<2>(class_ious, 0);
        let iou = if self.reduction {
            stacked.mean()
        } else {
            stacked.sum()
        };

        Tensor::<B, 1>::ones([1], device) - iou
    }

    fn assertions(&self, inputs: &Tensor<B, 4>, targets: &Tensor<B, 4, Int>) {
        let input_dims = inputs.dims();
        let target_dims = targets.dims();

        assert!(
            input_dims[0] == target_dims[0],
            "Batch size mismatch: inputs ({}) vs targets ({})",
            input_dims[0],
            target_dims[0]
        );

        assert!(
            input_dims[2] == target_dims[2] && input_dims[3] == target_dims[3],
            "Spatial dimensions mismatch: inputs ({},{}) vs targets ({},{})",
            input_dims[2],
            input_dims[3],
            target_dims[2],
            target_dims[3]
        );

        assert!(
            target_dims[1] == 1,
            "Targets should have a single channel of class indices, got {}",
            target_dims[1]
        );

        if !(self.num_classes == 2 && input_dims[1] == 1) {
            assert!(
                input_dims[1] == self.num_classes,
                "For multi-class segmentation, inputs should have num_classes ({}) channels, got {}",
                self.num_classes,
                input_dims[1]
            );
        }
    }
}
