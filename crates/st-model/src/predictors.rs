//! Box and mask prediction heads of the ROI stage.

use rand::Rng;
use serde::{Deserialize, Serialize};
use st_types::ModelError;

use crate::layers::{Conv2d, ConvTranspose2d, Linear};
use crate::tensor::Tensor;

/// Per-ROI class scores and per-class box regression deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastRcnnPredictor {
    pub cls_score: Linear,
    pub bbox_pred: Linear,
}

impl FastRcnnPredictor {
    pub fn new<R: Rng>(in_channels: usize, num_classes: usize, rng: &mut R) -> Self {
        Self {
            cls_score: Linear::new(in_channels, num_classes, rng),
            bbox_pred: Linear::new(in_channels, num_classes * 4, rng),
        }
    }

    pub fn in_features(&self) -> usize {
        self.cls_score.in_features
    }

    pub fn num_classes(&self) -> usize {
        self.cls_score.out_features
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.cls_score.validate("box_predictor.cls_score")?;
        self.bbox_pred.validate("box_predictor.bbox_pred")?;
        if self.bbox_pred.in_features != self.cls_score.in_features
            || self.bbox_pred.out_features != self.num_classes() * 4
        {
            return Err(ModelError::ShapeMismatch {
                layer: "box_predictor.bbox_pred".into(),
                expected: vec![self.num_classes() * 4, self.in_features()],
                actual: vec![self.bbox_pred.out_features, self.bbox_pred.in_features],
            });
        }
        Ok(())
    }

    /// Returns `(class_logits, box_deltas)` for one pooled ROI feature vector.
    pub fn forward(&self, features: &[f32]) -> Result<(Vec<f32>, Vec<f32>), ModelError> {
        Ok((
            self.cls_score.forward(features)?,
            self.bbox_pred.forward(features)?,
        ))
    }
}

/// Upsamples ROI mask features and emits one mask logit plane per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskRcnnPredictor {
    pub conv5_mask: ConvTranspose2d,
    pub mask_fcn_logits: Conv2d,
}

impl MaskRcnnPredictor {
    pub fn new<R: Rng>(
        in_channels: usize,
        dim_reduced: usize,
        num_classes: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            conv5_mask: ConvTranspose2d::kaiming(in_channels, dim_reduced, 2, 2, rng),
            mask_fcn_logits: Conv2d::kaiming(dim_reduced, num_classes, 1, rng),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.conv5_mask.in_channels
    }

    pub fn num_classes(&self) -> usize {
        self.mask_fcn_logits.out_channels
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.conv5_mask.validate("mask_predictor.conv5_mask")?;
        self.mask_fcn_logits
            .validate("mask_predictor.mask_fcn_logits")?;
        if self.mask_fcn_logits.in_channels != self.conv5_mask.out_channels {
            return Err(ModelError::ShapeMismatch {
                layer: "mask_predictor.mask_fcn_logits".into(),
                expected: vec![self.conv5_mask.out_channels],
                actual: vec![self.mask_fcn_logits.in_channels],
            });
        }
        Ok(())
    }

    /// `[in_channels, h, w]` -> `[num_classes, 2h, 2w]` mask logits.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor, ModelError> {
        let mut hidden = self.conv5_mask.forward(features)?;
        hidden.data.iter_mut().for_each(|v| *v = v.max(0.0));
        self.mask_fcn_logits.forward(&hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn box_predictor_output_widths() {
        let mut rng = StdRng::seed_from_u64(1);
        let predictor = FastRcnnPredictor::new(32, 5, &mut rng);
        assert!(predictor.validate().is_ok());

        let (scores, deltas) = predictor.forward(&[0.1; 32]).unwrap();
        assert_eq!(scores.len(), 5);
        assert_eq!(deltas.len(), 20);
    }

    #[test]
    fn mask_predictor_output_channels() {
        let mut rng = StdRng::seed_from_u64(2);
        let predictor = MaskRcnnPredictor::new(8, 16, 3, &mut rng);
        assert!(predictor.validate().is_ok());

        let out = predictor.forward(&Tensor::zeros(&[8, 4, 4])).unwrap();
        assert_eq!(out.shape, vec![3, 8, 8]);
    }

    #[test]
    fn mask_predictor_detects_broken_wiring() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut predictor = MaskRcnnPredictor::new(8, 16, 3, &mut rng);
        predictor.mask_fcn_logits = Conv2d::kaiming(12, 3, 1, &mut rng);
        assert!(matches!(
            predictor.validate(),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }
}
