//! Detection network checkpoint and validated access to its prediction heads.

use serde::{Deserialize, Serialize};
use st_types::{ModelError, StResult};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::predictors::{FastRcnnPredictor, MaskRcnnPredictor};
use crate::tensor::Tensor;

pub const BOX_PREDICTOR_PATH: &str = "roi_heads.box_predictor";
pub const MASK_PREDICTOR_PATH: &str = "roi_heads.mask_predictor";

/// Access to the two heads the adapter replaces.
///
/// Implementations must fail with [`ModelError::MissingHead`] naming the
/// missing path instead of panicking, so incompatible networks are rejected
/// before any training starts.
pub trait SegmentationHeads {
    fn box_predictor(&self) -> Result<&FastRcnnPredictor, ModelError>;

    fn mask_predictor(&self) -> Result<&MaskRcnnPredictor, ModelError>;

    fn set_box_predictor(&mut self, predictor: FastRcnnPredictor) -> Result<(), ModelError>;

    fn set_mask_predictor(&mut self, predictor: MaskRcnnPredictor) -> Result<(), ModelError>;
}

/// Second stage of the network: pooled-feature heads and their predictors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoiHeads {
    /// Box head weights feeding the box predictor (two-layer MLP).
    #[serde(default)]
    pub box_head: BTreeMap<String, Tensor>,
    pub box_predictor: Option<FastRcnnPredictor>,
    /// Mask head weights feeding the mask predictor (conv stack).
    #[serde(default)]
    pub mask_head: BTreeMap<String, Tensor>,
    pub mask_predictor: Option<MaskRcnnPredictor>,
}

/// A pre-trained instance-segmentation network as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionNetwork {
    /// Architecture tag, e.g. `maskrcnn_resnet50_fpn`.
    pub architecture: String,
    /// Backbone, FPN and RPN weights keyed by parameter path.
    pub backbone: BTreeMap<String, Tensor>,
    pub roi_heads: Option<RoiHeads>,
}

impl DetectionNetwork {
    pub fn new(architecture: impl Into<String>, backbone: BTreeMap<String, Tensor>) -> Self {
        Self {
            architecture: architecture.into(),
            backbone,
            roi_heads: None,
        }
    }

    pub fn with_roi_heads(mut self, roi_heads: RoiHeads) -> Self {
        self.roi_heads = Some(roi_heads);
        self
    }

    /// Load and validate a JSON checkpoint.
    pub fn load(path: impl AsRef<Path>) -> StResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let network: Self = serde_json::from_slice(&bytes)?;
        network.validate()?;
        debug!(
            path = %path.display(),
            architecture = %network.architecture,
            tensors = network.backbone.len(),
            "loaded checkpoint"
        );
        Ok(network)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> StResult<()> {
        let json = serde_json::to_vec(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check every stored tensor against its declared shape.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.architecture.trim().is_empty() {
            return Err(ModelError::Checkpoint {
                message: "no architecture tag".to_string(),
            });
        }
        for (name, tensor) in &self.backbone {
            tensor.check(name)?;
        }
        if let Some(heads) = &self.roi_heads {
            for (name, tensor) in heads.box_head.iter().chain(&heads.mask_head) {
                tensor.check(name)?;
            }
            if let Some(p) = &heads.box_predictor {
                p.validate()?;
            }
            if let Some(p) = &heads.mask_predictor {
                p.validate()?;
            }
        }
        Ok(())
    }

    fn roi_heads_mut(&mut self, path: &str) -> Result<&mut RoiHeads, ModelError> {
        self.roi_heads.as_mut().ok_or_else(|| ModelError::MissingHead {
            path: path.to_string(),
        })
    }
}

impl SegmentationHeads for DetectionNetwork {
    fn box_predictor(&self) -> Result<&FastRcnnPredictor, ModelError> {
        self.roi_heads
            .as_ref()
            .and_then(|h| h.box_predictor.as_ref())
            .ok_or_else(|| ModelError::MissingHead {
                path: BOX_PREDICTOR_PATH.to_string(),
            })
    }

    fn mask_predictor(&self) -> Result<&MaskRcnnPredictor, ModelError> {
        self.roi_heads
            .as_ref()
            .and_then(|h| h.mask_predictor.as_ref())
            .ok_or_else(|| ModelError::MissingHead {
                path: MASK_PREDICTOR_PATH.to_string(),
            })
    }

    fn set_box_predictor(&mut self, predictor: FastRcnnPredictor) -> Result<(), ModelError> {
        self.roi_heads_mut(BOX_PREDICTOR_PATH)?.box_predictor = Some(predictor);
        Ok(())
    }

    fn set_mask_predictor(&mut self, predictor: MaskRcnnPredictor) -> Result<(), ModelError> {
        self.roi_heads_mut(MASK_PREDICTOR_PATH)?.mask_predictor = Some(predictor);
        Ok(())
    }
}
