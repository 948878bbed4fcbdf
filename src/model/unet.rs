//! Ronneberger O. et al "U-Net: Convolutional Networks for Biomedical Image
//! Segmentation" <https://arxiv.org/abs/1505.04597>, as a preset over the
//! generic encoder-decoder builder.

use burn::prelude::*;

use super::encoder_decoder::{
    Activation, DecoderConfig, EncoderConfig, EncoderDecoder, EncoderDecoderConfig, HeadConfig,
};
use super::error::ModelConfigError;

pub type UNet<B> = EncoderDecoder<B>;

/// UNet-shaped encoder-decoder: a stem block of `base_filters`, filters
/// doubling on every encoding stage and halving on every decoding stage,
/// skip connections throughout.
#[derive(Config, Debug)]
pub struct UNetConfig {
    #[config(default = 1)]
    pub in_channels: usize,
    #[config(default = 64)]
    pub base_filters: usize,
    #[config(default = 4)]
    pub num_stages: usize,
    #[config(default = 1)]
    pub num_classes: usize,
    #[config(default = "Activation::Softmax")]
    pub activation: Activation,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl UNetConfig {
    /// Expand into the generic builder configuration with the derived filter
    /// progression.
    pub fn build(&self) -> EncoderDecoderConfig {
        let base = self.base_filters;
        let stages = self.num_stages;

        let encoder_filters: Vec<usize> = (0..stages).map(|i| base << (i + 1)).collect();
        let decoder_filters: Vec<usize> = (0..stages).rev().map(|i| base << i).collect();
        let upsample_filters: Vec<usize> = (0..stages).rev().map(|i| base << (i + 1)).collect();

        EncoderDecoderConfig::new(
            EncoderConfig::new(self.in_channels, encoder_filters)
                .with_initial_filters(Some(base))
                .with_dropout(self.dropout),
            DecoderConfig::new(decoder_filters)
                .with_upsample_filters(Some(upsample_filters))
                .with_dropout(self.dropout),
            HeadConfig::new(self.num_classes)
                .with_filters(Some(base))
                .with_activation(self.activation.clone()),
        )
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<UNet<B>, ModelConfigError> {
        self.build().init(device)
    }
}
