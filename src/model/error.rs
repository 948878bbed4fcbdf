use thiserror::Error;

/// Errors raised while turning an architecture configuration into a module tree.
///
/// All of these are detected at `init` time, before any tensor is allocated.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("encoder needs at least one stage")]
    EmptyEncoder,

    #[error("decoder needs at least one stage")]
    EmptyDecoder,

    #[error("decoder has {stages} stages but {what} lists {got} entries")]
    StageCountMismatch {
        what: &'static str,
        stages: usize,
        got: usize,
    },

    #[error("upsampling factor must be at least 1, got 0 at stage {stage}")]
    ZeroFactor { stage: usize },

    #[error(
        "sum combine needs matching channels at decoder stage {stage}: \
         got {decoder} from the block and {skip} from the skip connection"
    )]
    CombineChannelMismatch {
        stage: usize,
        decoder: usize,
        skip: usize,
    },
}
