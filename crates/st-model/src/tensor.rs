//! Dense row-major weight storage.

use rand::Rng;
use serde::{Deserialize, Serialize};
use st_types::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self, ModelError> {
        let tensor = Self {
            shape: shape.to_vec(),
            data,
        };
        tensor.check("tensor")?;
        Ok(tensor)
    }

    /// Samples every element from U(-bound, bound).
    pub fn uniform<R: Rng>(shape: &[usize], bound: f32, rng: &mut R) -> Self {
        let numel: usize = shape.iter().product();
        let data = (0..numel)
            .map(|_| rng.random_range(-bound..=bound))
            .collect();
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Samples every element from N(0, std^2) using Box-Muller.
    pub fn normal<R: Rng>(shape: &[usize], std: f32, rng: &mut R) -> Self {
        let numel: usize = shape.iter().product();
        let data = (0..numel)
            .map(|_| {
                let u1: f32 = rng.random::<f32>().max(1e-10);
                let u2: f32 = rng.random::<f32>();
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos() * std
            })
            .collect();
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Errors if `data` does not hold exactly `shape.product()` elements.
    pub fn check(&self, layer: &str) -> Result<(), ModelError> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(ModelError::ShapeMismatch {
                layer: layer.to_string(),
                expected: vec![expected],
                actual: vec![self.data.len()],
            });
        }
        Ok(())
    }

    /// Errors unless the tensor has exactly `expected` as its shape.
    pub fn expect_shape(&self, layer: &str, expected: &[usize]) -> Result<(), ModelError> {
        if self.shape != expected {
            return Err(ModelError::ShapeMismatch {
                layer: layer.to_string(),
                expected: expected.to_vec(),
                actual: self.shape.clone(),
            });
        }
        self.check(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn from_vec_checks_length() {
        assert!(Tensor::from_vec(&[2, 3], vec![0.0; 6]).is_ok());
        assert!(matches!(
            Tensor::from_vec(&[2, 3], vec![0.0; 5]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn uniform_respects_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::uniform(&[16, 8], 0.25, &mut rng);
        assert_eq!(t.numel(), 128);
        assert!(t.data.iter().all(|v| v.abs() <= 0.25));
    }

    #[test]
    fn normal_has_roughly_requested_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let t = Tensor::normal(&[4000], 0.5, &mut rng);
        let mean = t.data.iter().sum::<f32>() / t.numel() as f32;
        let var = t.data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / t.numel() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.05, "std {}", var.sqrt());
    }
}
