use burn::data::dataset::vision::{Annotation, ImageDatasetItem, PixelDepth};
use burn::{data::dataloader::batcher::Batcher, prelude::*};

#[derive(Config, Debug)]
pub enum SegmentationMode {
    Binary,
    Multiclass { num_classes: usize },
}

#[derive(Config, Debug)]
pub enum InputMode {
    Grayscale,
    Rgb,
}

impl InputMode {
    pub fn channels(&self) -> usize {
        match self {
            InputMode::Grayscale => 1,
            InputMode::Rgb => 3,
        }
    }
}

#[derive(Config, Debug)]
pub struct SegmentationConfig {
    pub mode: SegmentationMode,
    pub input_mode: InputMode,
    pub image_size: [usize; 2],
    pub class_names: Option<Vec<String>>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::Binary,
            input_mode: InputMode::Rgb,
            image_size: [512, 512],
            class_names: None,
        }
    }
}

#[derive(Clone)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
    config: SegmentationConfig,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device, config: SegmentationConfig) -> Self {
        Self { device, config }
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch, channels, height, width]` images scaled to `[0, 1]`.
    pub images: Tensor<B, 4, Float>,
    /// `[batch, 1, height, width]` class indices.
    pub masks: Tensor<B, 4, Int>,
    /// Optional `[batch, 1, height, width]` validity masks; pixels outside
    /// are excluded from the loss.
    pub fov_masks: Option<Tensor<B, 4, Bool>>,
}

/// Channel value scaled to `[0, 1]`; out-of-range reads are zero.
fn pixel_value(image: &[PixelDepth], index: usize) -> f32 {
    match image.get(index) {
        Some(PixelDepth::U8(value)) => *value as f32 / 255.0,
        Some(PixelDepth::U16(value)) => *value as f32 / 65535.0,
        Some(PixelDepth::F32(value)) => *value,
        None => 0.0,
    }
}

impl<B: Backend> SegmentationBatcher<B> {
    fn image_tensor(&self, item: &ImageDatasetItem) -> Tensor<B, 3> {
        let [height, width] = self.config.image_size;
        let channels = self.config.input_mode.channels();

        // Source images are decoded as interleaved RGB; grayscale keeps the
        // first channel.
        let mut data = Vec::with_capacity(channels * height * width);
        for channel in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    data.push(pixel_value(&item.image, (y * width + x) * 3 + channel));
                }
            }
        }

        Tensor::from_data(
            TensorData::new(data, Shape::new([channels, height, width])).convert::<B::FloatElem>(),
            &self.device,
        )
    }

    fn mask_tensor(&self, item: &ImageDatasetItem) -> Tensor<B, 3, Int> {
        let [height, width] = self.config.image_size;

        let data: Vec<i64> = match &item.annotation {
            Annotation::SegmentationMask(mask) => match self.config.mode {
                SegmentationMode::Binary => {
                    mask.mask.iter().map(|&x| (x > 0) as i64).collect()
                }
                SegmentationMode::Multiclass { .. } => {
                    mask.mask.iter().map(|&x| x as i64).collect()
                }
            },
            _ => {
                tracing::warn!("item without a segmentation mask annotation, using all background");
                vec![0; height * width]
            }
        };

        Tensor::from_data(
            TensorData::new(data, Shape::new([1, height, width])).convert::<B::IntElem>(),
            &self.device,
        )
    }
}

impl<B: Backend> Batcher<ImageDatasetItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<ImageDatasetItem>) -> SegmentationBatch<B> {
        let mut images = Vec::with_capacity(items.len());
        let mut masks = Vec::with_capacity(items.len());

        for item in items {
            images.push(self.image_tensor(&item));
            masks.push(self.mask_tensor(&item));
        }

        SegmentationBatch {
            images: Tensor::stack::<4>(images, 0),
            masks: Tensor::stack::<4>(masks, 0),
            fov_masks: None,
        }
    }
}
