use burn::{
    module::Ignored,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::{
        Distribution,
        activation::{sigmoid, softmax},
    },
};

#[cfg(feature = "training")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

#[cfg(feature = "training")]
use crate::{
    dataset::SegmentationBatch,
    training::{
        SegmentationOutput,
        loss::{IoULossConfig, SegmentationCrossEntropyLossConfig},
    },
};

use super::blocks::{
    CombineOp, ConvBlock, ConvBlockConfig, Downsample, DownsampleConfig, Upsample, UpsampleConfig,
    UpsampleMode, align_to,
};
use super::error::ModelConfigError;

/// Activation applied to the head output.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Activation {
    Softmax,
    Sigmoid,
    Identity,
}

/// Loss used by the training step.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    Iou,
}

/// Anything that can turn an image batch into an ordered feature pyramid:
/// the stem output first, the most compressed representation last.
///
/// [`Encoder`] is the built-in implementation; a custom backbone only has to
/// report the channel count of each feature it emits so that
/// [`DecoderConfig::init`] can wire matching convolutions.
pub trait FeatureEncoder<B: Backend> {
    fn forward_features(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>>;
    fn feature_channels(&self) -> &[usize];
}

#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    block: ConvBlock<B>,
    downsample: Option<Downsample<B>>,
}

/// Stage-based encoder: an optional stem block, then per stage a processing
/// block followed by downsampling. Emits the stem output plus every
/// post-downsample tensor.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    initial: Option<ConvBlock<B>>,
    stages: Vec<EncoderStage<B>>,
    channels: Vec<usize>,
}

impl<B: Backend> Encoder<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut x = match &self.initial {
            Some(block) => block.forward(x),
            None => x,
        };

        let mut features = Vec::with_capacity(self.stages.len() + 1);
        features.push(x.clone());

        for stage in &self.stages {
            x = stage.block.forward(x);
            if let Some(downsample) = &stage.downsample {
                x = downsample.forward(x);
            }
            features.push(x.clone());
        }

        features
    }
}

impl<B: Backend> FeatureEncoder<B> for Encoder<B> {
    fn forward_features(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        self.forward(x)
    }

    fn feature_channels(&self) -> &[usize] {
        &self.channels
    }
}

#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub in_channels: usize,
    /// Output channels of each stage; the stage count is the list length.
    pub filters: Vec<usize>,
    /// Filters of the stem block applied before the first stage.
    #[config(default = "None")]
    pub initial_filters: Option<usize>,
    #[config(default = "Some(DownsampleConfig::new())")]
    pub downsample: Option<DownsampleConfig>,
    #[config(default = true)]
    pub norm: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Encoder<B>, ModelConfigError> {
        if self.filters.is_empty() {
            return Err(ModelConfigError::EmptyEncoder);
        }

        let stem_channels = self.initial_filters.unwrap_or(self.in_channels);
        let initial = self.initial_filters.map(|filters| {
            ConvBlockConfig::new(self.in_channels, filters)
                .with_norm(self.norm)
                .with_dropout(self.dropout)
                .init(device)
        });

        let mut channels = Vec::with_capacity(self.filters.len() + 1);
        channels.push(stem_channels);

        let mut stages = Vec::with_capacity(self.filters.len());
        let mut current = stem_channels;
        for &filters in &self.filters {
            tracing::debug!(in_channels = current, out_channels = filters, "encoder stage");
            stages.push(EncoderStage {
                block: ConvBlockConfig::new(current, filters)
                    .with_norm(self.norm)
                    .with_dropout(self.dropout)
                    .init(device),
                downsample: self
                    .downsample
                    .as_ref()
                    .map(|downsample| downsample.init(filters, device)),
            });
            channels.push(filters);
            current = filters;
        }

        Ok(Encoder {
            initial,
            stages,
            channels,
        })
    }
}

/// One bottleneck processing step applied to the most compressed feature.
#[derive(Config, Debug)]
pub struct EmbeddingConfig {
    pub filters: usize,
    #[config(default = true)]
    pub norm: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
}

/// Variational bottleneck: maps the compressed feature to a learned normal
/// distribution and samples from it with the reparameterization trick.
#[derive(Module, Debug)]
pub struct GaussianEmbedding<B: Backend> {
    mean: ConvBlock<B>,
    std: ConvBlock<B>,
}

impl<B: Backend> GaussianEmbedding<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mean = self.mean.forward(x.clone());
        let std = self.std.forward(x);
        let eps = mean.random_like(Distribution::Normal(0.0, 1.0));

        mean + std * eps
    }
}

#[derive(Config, Debug)]
pub struct GaussianEmbeddingConfig {
    pub filters: usize,
    #[config(default = true)]
    pub norm: bool,
}

impl GaussianEmbeddingConfig {
    pub fn init<B: Backend>(&self, in_channels: usize, device: &B::Device) -> GaussianEmbedding<B> {
        let block = ConvBlockConfig::new(in_channels, self.filters).with_norm(self.norm);
        GaussianEmbedding {
            mean: block.init(device),
            std: block.init(device),
        }
    }
}

/// Total-or-per-stage upsampling factor of the decoder.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Factor {
    /// Combined upsampling across all stages, split into equal per-stage
    /// factors by integer root.
    Total { factor: usize },
    /// One factor per stage; a factor of 1 skips the stage entirely.
    PerStage { factors: Vec<usize> },
}

impl Factor {
    pub fn expand(&self, num_stages: usize) -> Result<Vec<usize>, ModelConfigError> {
        match self {
            Factor::Total { factor } => {
                if *factor == 0 {
                    return Err(ModelConfigError::ZeroFactor { stage: 0 });
                }
                let root = (*factor as f64).powf(1.0 / num_stages as f64);
                // tolerate pow landing just below an exact integer root
                let per_stage = (root + 1e-9).floor() as usize;
                Ok(vec![per_stage; num_stages])
            }
            Factor::PerStage { factors } => {
                if factors.len() != num_stages {
                    return Err(ModelConfigError::StageCountMismatch {
                        what: "factor",
                        stages: num_stages,
                        got: factors.len(),
                    });
                }
                if let Some(stage) = factors.iter().position(|&factor| factor == 0) {
                    return Err(ModelConfigError::ZeroFactor { stage });
                }
                Ok(factors.clone())
            }
        }
    }
}

#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    upsample: Upsample<B>,
    block: ConvBlock<B>,
    skip_source: Option<usize>,
    combine: Ignored<CombineOp>,
}

impl<B: Backend> DecoderStage<B> {
    fn forward(&self, x: Tensor<B, 4>, features: &[Tensor<B, 4>]) -> Tensor<B, 4> {
        let x = self.upsample.forward(x);
        let x = self.block.forward(x);

        match self.skip_source {
            Some(index) => {
                let skip = features[index].clone();
                let x = align_to(x, &skip);
                match &self.combine.0 {
                    CombineOp::Concat => Tensor::cat(vec![x, skip], 1),
                    CombineOp::Sum => x + skip,
                }
            }
            None => x,
        }
    }
}

/// Stage-based decoder consuming a feature pyramid. The last feature is the
/// starting tensor; earlier features become skip connections of matching
/// resolution, down to the stem output.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    stages: Vec<DecoderStage<B>>,
}

impl<B: Backend> Decoder<B> {
    pub fn forward(&self, features: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
        let mut x = features[features.len() - 1].clone();
        for stage in &self.stages {
            x = stage.forward(x, &features);
        }
        x
    }
}

#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Output channels of each stage's processing block; the stage count is
    /// the list length.
    pub filters: Vec<usize>,
    /// Channels produced by each stage's upsampling; defaults to `filters`.
    #[config(default = "None")]
    pub upsample_filters: Option<Vec<usize>>,
    /// Defaults to a factor of 2 per stage.
    #[config(default = "None")]
    pub factor: Option<Factor>,
    /// Combine each stage output with the stored encoder feature of the same
    /// resolution.
    #[config(default = true)]
    pub skip: bool,
    #[config(default = "UpsampleMode::ConvTranspose")]
    pub upsample: UpsampleMode,
    #[config(default = "CombineOp::Concat")]
    pub combine: CombineOp,
    #[config(default = true)]
    pub norm: bool,
    #[config(default = 0.0)]
    pub dropout: f64,
}

struct StagePlan {
    index: usize,
    factor: usize,
    upsample_in: usize,
    upsample_out: usize,
    block_out: usize,
    skip: Option<(usize, usize)>,
    out: usize,
}

impl DecoderConfig {
    /// Build a decoder for a feature pyramid with the given per-feature
    /// channel counts (stem output first, decoder input last).
    pub fn init<B: Backend>(
        &self,
        feature_channels: &[usize],
        device: &B::Device,
    ) -> Result<Decoder<B>, ModelConfigError> {
        let (plans, _) = self.plan(feature_channels)?;

        let stages = plans
            .into_iter()
            .map(|plan| {
                tracing::debug!(
                    stage = plan.index,
                    factor = plan.factor,
                    out_channels = plan.out,
                    "decoder stage"
                );
                DecoderStage {
                    upsample: UpsampleConfig::new(plan.upsample_in, plan.upsample_out)
                        .with_mode(self.upsample.clone())
                        .with_factor(plan.factor)
                        .init(device),
                    block: ConvBlockConfig::new(plan.upsample_out, plan.block_out)
                        .with_norm(self.norm)
                        .with_dropout(self.dropout)
                        .init(device),
                    skip_source: plan.skip.map(|(index, _)| index),
                    combine: Ignored(self.combine.clone()),
                }
            })
            .collect();

        Ok(Decoder { stages })
    }

    /// Channel count of the decoder output for the given feature pyramid.
    pub fn out_channels(&self, feature_channels: &[usize]) -> Result<usize, ModelConfigError> {
        self.plan(feature_channels).map(|(_, out)| out)
    }

    fn plan(&self, feature_channels: &[usize]) -> Result<(Vec<StagePlan>, usize), ModelConfigError> {
        let num_stages = self.filters.len();
        if num_stages == 0 {
            return Err(ModelConfigError::EmptyDecoder);
        }
        if feature_channels.is_empty() {
            return Err(ModelConfigError::EmptyEncoder);
        }

        let factors = match &self.factor {
            Some(factor) => factor.expand(num_stages)?,
            None => vec![2; num_stages],
        };
        let upsample_filters = match &self.upsample_filters {
            Some(filters) if filters.len() != num_stages => {
                return Err(ModelConfigError::StageCountMismatch {
                    what: "upsample_filters",
                    stages: num_stages,
                    got: filters.len(),
                });
            }
            Some(filters) => filters.clone(),
            None => self.filters.clone(),
        };

        let num_features = feature_channels.len();
        let mut current = feature_channels[num_features - 1];
        let mut plans = Vec::with_capacity(num_stages);

        for (index, &factor) in factors.iter().enumerate() {
            if factor == 1 {
                continue;
            }

            let upsample_in = current;
            let upsample_out = upsample_filters[index];
            let block_out = self.filters[index];
            current = block_out;

            let skip = if self.skip && index + 2 < num_features {
                let source = num_features - 3 - index;
                let skip_channels = feature_channels[source];
                match self.combine {
                    CombineOp::Concat => current += skip_channels,
                    CombineOp::Sum => {
                        if skip_channels != current {
                            return Err(ModelConfigError::CombineChannelMismatch {
                                stage: index,
                                decoder: current,
                                skip: skip_channels,
                            });
                        }
                    }
                }
                Some((source, skip_channels))
            } else {
                None
            };

            plans.push(StagePlan {
                index,
                factor,
                upsample_in,
                upsample_out,
                block_out,
                skip,
                out: current,
            });
        }

        Ok((plans, current))
    }
}

/// Final projection: an optional conv block, a 1x1 convolution whenever the
/// channel count still differs from `num_classes`, then the output
/// activation.
#[derive(Module, Debug)]
pub struct Head<B: Backend> {
    block: Option<ConvBlock<B>>,
    conv_1x1: Option<Conv2d<B>>,
    activation: Ignored<Activation>,
}

impl<B: Backend> Head<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.block {
            Some(block) => block.forward(x),
            None => x,
        };
        let x = match &self.conv_1x1 {
            Some(conv) => conv.forward(x),
            None => x,
        };
        match self.activation.0 {
            Activation::Softmax => softmax(x, 1),
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }
}

#[derive(Config, Debug)]
pub struct HeadConfig {
    pub num_classes: usize,
    #[config(default = "None")]
    pub filters: Option<usize>,
    #[config(default = "Activation::Softmax")]
    pub activation: Activation,
    #[config(default = true)]
    pub norm: bool,
}

impl HeadConfig {
    pub fn init<B: Backend>(&self, in_channels: usize, device: &B::Device) -> Head<B> {
        let mut current = in_channels;
        let block = self.filters.map(|filters| {
            let block = ConvBlockConfig::new(current, filters)
                .with_norm(self.norm)
                .init(device);
            current = filters;
            block
        });
        let conv_1x1 = (current != self.num_classes)
            .then(|| Conv2dConfig::new([current, self.num_classes], [1, 1]).init(device));

        Head {
            block,
            conv_1x1,
            activation: Ignored(self.activation.clone()),
        }
    }
}

/// Encoder-decoder network assembled from configuration: encoder stages,
/// optional bottleneck processing, decoder stages with skip connections, and
/// a classification head.
#[derive(Module, Debug)]
pub struct EncoderDecoder<B: Backend> {
    encoder: Encoder<B>,
    embedding: Vec<ConvBlock<B>>,
    latent: Option<GaussianEmbedding<B>>,
    decoder: Decoder<B>,
    head: Head<B>,
    num_classes: usize,
    probability_output: bool,
    loss: Ignored<LossKind>,
}

#[derive(Config, Debug)]
pub struct EncoderDecoderConfig {
    pub encoder: EncoderConfig,
    /// Bottleneck processing applied to the most compressed feature; empty
    /// means identity.
    #[config(default = "Vec::new()")]
    pub embedding: Vec<EmbeddingConfig>,
    /// Variational bottleneck applied after `embedding`.
    #[config(default = "None")]
    pub latent: Option<GaussianEmbeddingConfig>,
    pub decoder: DecoderConfig,
    pub head: HeadConfig,
    #[config(default = "LossKind::CrossEntropy")]
    pub loss: LossKind,
}

impl EncoderDecoderConfig {
    /// Encoder-decoder without skip connections.
    pub fn autoencoder(encoder: EncoderConfig, decoder: DecoderConfig, head: HeadConfig) -> Self {
        Self::new(encoder, decoder.with_skip(false), head)
    }

    /// Autoencoder whose bottleneck samples from a learned normal
    /// distribution.
    pub fn variational_autoencoder(
        encoder: EncoderConfig,
        latent: GaussianEmbeddingConfig,
        decoder: DecoderConfig,
        head: HeadConfig,
    ) -> Self {
        Self::autoencoder(encoder, decoder, head).with_latent(Some(latent))
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<EncoderDecoder<B>, ModelConfigError> {
        let encoder = self.encoder.init(device)?;

        let mut channels = encoder.feature_channels().to_vec();
        let mut current = channels[channels.len() - 1];

        let mut embedding = Vec::with_capacity(self.embedding.len());
        for config in &self.embedding {
            embedding.push(
                ConvBlockConfig::new(current, config.filters)
                    .with_norm(config.norm)
                    .with_dropout(config.dropout)
                    .init(device),
            );
            current = config.filters;
        }

        let latent = self.latent.as_ref().map(|config| {
            let latent = config.init(current, device);
            current = config.filters;
            latent
        });

        // The bottleneck output joins the pyramid as the decoder input.
        channels.push(current);

        let decoder = self.decoder.init(&channels, device)?;
        let decoder_out = self.decoder.out_channels(&channels)?;
        let head = self.head.init(decoder_out, device);

        Ok(EncoderDecoder {
            encoder,
            embedding,
            latent,
            decoder,
            head,
            num_classes: self.head.num_classes,
            probability_output: self.head.activation != Activation::Identity,
            loss: Ignored(self.loss.clone()),
        })
    }
}

impl<B: Backend> EncoderDecoder<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut features = self.encoder.forward(images);

        let mut x = features[features.len() - 1].clone();
        for block in &self.embedding {
            x = block.forward(x);
        }
        if let Some(latent) = &self.latent {
            x = latent.forward(x);
        }
        features.push(x);

        let x = self.decoder.forward(features);
        self.head.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[cfg(feature = "training")]
    pub fn forward_segmentation(&self, item: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let targets = item.masks;
        let output = self.forward(item.images);
        let masks = item
            .fov_masks
            .unwrap_or_else(|| targets.ones_like().bool());

        let loss = match self.loss.0 {
            LossKind::CrossEntropy => SegmentationCrossEntropyLossConfig::new()
                .with_logits(!self.probability_output)
                .init(&output.device())
                .forward(output.clone(), targets.clone(), masks),
            LossKind::Iou => IoULossConfig::new()
                .with_num_classes(self.num_classes)
                .with_apply_activation(!self.probability_output)
                .init(&output.device())
                .forward(output.clone(), targets.clone()),
        };

        SegmentationOutput {
            loss,
            output,
            targets,
        }
    }
}

#[cfg(feature = "training")]
impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>>
    for EncoderDecoder<B>
{
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "training")]
impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for EncoderDecoder<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}
