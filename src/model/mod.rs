mod blocks;
mod encoder_decoder;
mod error;
mod unet;

pub use blocks::{
    CombineOp, ConvBlock, ConvBlockConfig, Downsample, DownsampleConfig, DownsampleMode, Upsample,
    UpsampleConfig, UpsampleMode,
};

pub use encoder_decoder::{
    Activation, Decoder, DecoderConfig, EmbeddingConfig, Encoder, EncoderConfig, EncoderDecoder,
    EncoderDecoderConfig, Factor, FeatureEncoder, GaussianEmbedding, GaussianEmbeddingConfig, Head,
    HeadConfig, LossKind,
};

pub use error::ModelConfigError;

pub use unet::{UNet, UNetConfig};
