//! # st-model
//!
//! Structure of a pre-trained Mask R-CNN style network and the adapter that
//! swaps its box and mask prediction heads for a new class count while
//! keeping every other weight.

mod adapter;
mod layers;
mod network;
mod predictors;
mod tensor;

pub use adapter::{replace_heads, HeadReplacement, MASK_HIDDEN_LAYER};
pub use layers::{Conv2d, ConvTranspose2d, Linear};
pub use network::{
    DetectionNetwork, RoiHeads, SegmentationHeads, BOX_PREDICTOR_PATH, MASK_PREDICTOR_PATH,
};
pub use predictors::{FastRcnnPredictor, MaskRcnnPredictor};
pub use tensor::Tensor;
