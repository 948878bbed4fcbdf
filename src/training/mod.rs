pub mod learner;
pub mod loss;

pub use learner::SegmentationOutput;
pub use loss::{
    IoULoss, IoULossConfig, SegmentationCrossEntropyLoss, SegmentationCrossEntropyLossConfig,
};
