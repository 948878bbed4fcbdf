use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// How an encoder stage reduces spatial resolution.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum DownsampleMode {
    /// Max-pooling with window and stride equal to the factor.
    MaxPool,
    /// Strided 3x3 convolution.
    Conv,
}

/// How a decoder stage restores spatial resolution.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum UpsampleMode {
    /// Transposed convolution with kernel and stride equal to the factor.
    ConvTranspose,
    /// Nearest-neighbour interpolation, followed by a 1x1 convolution when
    /// the channel count changes.
    Nearest,
}

/// How a decoder stage merges its output with a stored encoder feature.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum CombineOp {
    /// Concatenate along the channel dimension.
    Concat,
    /// Elementwise sum; both tensors must have the same channel count.
    Sum,
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: Option<BatchNorm<B, 2>>,
    conv2: Conv2d<B>,
    norm2: Option<BatchNorm<B, 2>>,
    activation: Relu,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = match &self.norm1 {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        let x = self.conv2.forward(x);
        let x = match &self.norm2 {
            Some(norm) => norm.forward(x),
            None => x,
        };
        self.activation.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    pub input_channels: usize,
    pub num_filters: usize,
    #[config(default = true)]
    pub norm: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let norm = |features: usize| {
            self.norm
                .then(|| BatchNormConfig::new(features).init(device))
        };

        ConvBlock {
            conv1: Conv2dConfig::new([self.input_channels, self.num_filters], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            norm1: norm(self.num_filters),
            conv2: Conv2dConfig::new([self.num_filters, self.num_filters], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            norm2: norm(self.num_filters),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Spatial reduction by an integer factor; pooling mode keeps channels.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pool: Option<MaxPool2d>,
    conv: Option<Conv2d<B>>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match (&self.pool, &self.conv) {
            (Some(pool), _) => pool.forward(x),
            (None, Some(conv)) => conv.forward(x),
            (None, None) => x,
        }
    }
}

#[derive(Config, Debug)]
pub struct DownsampleConfig {
    #[config(default = "DownsampleMode::MaxPool")]
    pub mode: DownsampleMode,
    #[config(default = 2)]
    pub factor: usize,
}

impl DownsampleConfig {
    pub fn init<B: Backend>(&self, channels: usize, device: &B::Device) -> Downsample<B> {
        match self.mode {
            DownsampleMode::MaxPool => Downsample {
                pool: Some(
                    MaxPool2dConfig::new([self.factor, self.factor])
                        .with_strides([self.factor, self.factor])
                        .init(),
                ),
                conv: None,
            },
            DownsampleMode::Conv => Downsample {
                pool: None,
                conv: Some(
                    Conv2dConfig::new([channels, channels], [3, 3])
                        .with_stride([self.factor, self.factor])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                ),
            },
        }
    }
}

/// Spatial expansion by an integer factor, mapping `input_channels` to
/// `num_filters`.
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    conv_transpose: Option<ConvTranspose2d<B>>,
    conv: Option<Conv2d<B>>,
    factor: usize,
}

impl<B: Backend> Upsample<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if let Some(conv_transpose) = &self.conv_transpose {
            return conv_transpose.forward(x);
        }

        let [_, _, height, width] = x.dims();
        let x = interpolate(
            x,
            [height * self.factor, width * self.factor],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        match &self.conv {
            Some(conv) => conv.forward(x),
            None => x,
        }
    }
}

#[derive(Config, Debug)]
pub struct UpsampleConfig {
    pub input_channels: usize,
    pub num_filters: usize,
    #[config(default = "UpsampleMode::ConvTranspose")]
    pub mode: UpsampleMode,
    #[config(default = 2)]
    pub factor: usize,
}

impl UpsampleConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Upsample<B> {
        match self.mode {
            UpsampleMode::ConvTranspose => Upsample {
                conv_transpose: Some(
                    ConvTranspose2dConfig::new(
                        [self.input_channels, self.num_filters],
                        [self.factor, self.factor],
                    )
                    .with_stride([self.factor, self.factor])
                    .init(device),
                ),
                conv: None,
                factor: self.factor,
            },
            UpsampleMode::Nearest => Upsample {
                conv_transpose: None,
                conv: (self.input_channels != self.num_filters).then(|| {
                    Conv2dConfig::new([self.input_channels, self.num_filters], [1, 1]).init(device)
                }),
                factor: self.factor,
            },
        }
    }
}

/// Resize `x` to the spatial shape of `reference` when they disagree.
///
/// Stands in for cropping when upsampling overshoots an odd-sized feature map.
pub(crate) fn align_to<B: Backend>(x: Tensor<B, 4>, reference: &Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    let [_, _, ref_height, ref_width] = reference.dims();
    if height == ref_height && width == ref_width {
        return x;
    }
    interpolate(
        x,
        [ref_height, ref_width],
        InterpolateOptions::new(InterpolateMode::Nearest),
    )
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn conv_block_keeps_spatial_shape() {
        let device = Default::default();
        let block = ConvBlockConfig::new(3, 8).init::<TestBackend>(&device);
        let x = Tensor::random([2, 3, 16, 16], Distribution::Default, &device);

        assert_eq!(block.forward(x).dims(), [2, 8, 16, 16]);
    }

    #[test]
    fn downsample_halves_spatial_shape() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([1, 4, 16, 16], Distribution::Default, &device);

        let pool = DownsampleConfig::new().init(4, &device);
        assert_eq!(pool.forward(x.clone()).dims(), [1, 4, 8, 8]);

        let conv = DownsampleConfig::new()
            .with_mode(DownsampleMode::Conv)
            .init(4, &device);
        assert_eq!(conv.forward(x).dims(), [1, 4, 8, 8]);
    }

    #[test]
    fn upsample_scales_by_factor() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([1, 8, 4, 4], Distribution::Default, &device);

        let transpose = UpsampleConfig::new(8, 4).init(&device);
        assert_eq!(transpose.forward(x.clone()).dims(), [1, 4, 8, 8]);

        let nearest = UpsampleConfig::new(8, 4)
            .with_mode(UpsampleMode::Nearest)
            .with_factor(4)
            .init(&device);
        assert_eq!(nearest.forward(x).dims(), [1, 4, 16, 16]);
    }
}
