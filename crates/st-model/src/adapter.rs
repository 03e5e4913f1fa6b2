//! Prediction-head replacement for fine-tuning on a new label set.

use rand::Rng;
use serde::{Deserialize, Serialize};
use st_types::ModelError;
use tracing::info;

use crate::network::SegmentationHeads;
use crate::predictors::{FastRcnnPredictor, MaskRcnnPredictor};

/// Hidden width of the replacement mask predictor.
pub const MASK_HIDDEN_LAYER: usize = 256;

/// What [`replace_heads`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadReplacement {
    pub box_in_features: usize,
    pub mask_in_channels: usize,
    pub previous_classes: usize,
    pub num_classes: usize,
}

/// Swap the box and mask predictors of `network` for freshly initialised
/// ones sized for `num_classes` (background included).
///
/// Both heads are looked up before either is replaced, so an incompatible
/// network is left untouched.
pub fn replace_heads<N, R>(
    network: &mut N,
    num_classes: usize,
    rng: &mut R,
) -> Result<HeadReplacement, ModelError>
where
    N: SegmentationHeads + ?Sized,
    R: Rng,
{
    if num_classes < 2 {
        return Err(ModelError::InvalidClassCount { num_classes });
    }

    let box_predictor = network.box_predictor()?;
    let box_in_features = box_predictor.in_features();
    let previous_classes = box_predictor.num_classes();
    let mask_in_channels = network.mask_predictor()?.in_channels();

    network.set_box_predictor(FastRcnnPredictor::new(box_in_features, num_classes, rng))?;
    network.set_mask_predictor(MaskRcnnPredictor::new(
        mask_in_channels,
        MASK_HIDDEN_LAYER,
        num_classes,
        rng,
    ))?;

    info!(
        box_in_features,
        mask_in_channels, previous_classes, num_classes, "replaced prediction heads"
    );

    Ok(HeadReplacement {
        box_in_features,
        mask_in_channels,
        previous_classes,
        num_classes,
    })
}
