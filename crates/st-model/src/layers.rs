//! The three layer kinds that make up the prediction heads.
//!
//! Feature maps are `[channels, height, width]` tensors.

use rand::Rng;
use serde::{Deserialize, Serialize};
use st_types::ModelError;

use crate::tensor::Tensor;

/// Fully connected layer, weight `[out, in]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Tensor,
    pub bias: Tensor,
}

impl Linear {
    /// Fresh layer with weight and bias drawn from U(-1/sqrt(in), 1/sqrt(in)).
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        Self {
            in_features,
            out_features,
            weight: Tensor::uniform(&[out_features, in_features], bound, rng),
            bias: Tensor::uniform(&[out_features], bound, rng),
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), ModelError> {
        self.weight
            .expect_shape(name, &[self.out_features, self.in_features])?;
        self.bias.expect_shape(name, &[self.out_features])
    }

    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        if input.len() != self.in_features {
            return Err(ModelError::ShapeMismatch {
                layer: "linear input".into(),
                expected: vec![self.in_features],
                actual: vec![input.len()],
            });
        }
        let out = (0..self.out_features)
            .map(|o| {
                let row = &self.weight.data[o * self.in_features..(o + 1) * self.in_features];
                row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + self.bias.data[o]
            })
            .collect();
        Ok(out)
    }
}

/// Stride-1, unpadded convolution, weight `[out, in, k, k]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub weight: Tensor,
    pub bias: Tensor,
}

impl Conv2d {
    /// Kaiming-normal weights (fan-out, ReLU gain) and zero bias.
    pub fn kaiming<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        rng: &mut R,
    ) -> Self {
        let fan_out = (out_channels * kernel_size * kernel_size).max(1) as f32;
        let std = (2.0 / fan_out).sqrt();
        Self {
            in_channels,
            out_channels,
            kernel_size,
            weight: Tensor::normal(
                &[out_channels, in_channels, kernel_size, kernel_size],
                std,
                rng,
            ),
            bias: Tensor::zeros(&[out_channels]),
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), ModelError> {
        let k = self.kernel_size;
        self.weight
            .expect_shape(name, &[self.out_channels, self.in_channels, k, k])?;
        self.bias.expect_shape(name, &[self.out_channels])
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let (h, w) = spatial(input, self.in_channels, "conv2d input")?;
        let k = self.kernel_size;
        if h < k || w < k {
            return Err(ModelError::ShapeMismatch {
                layer: "conv2d input".into(),
                expected: vec![self.in_channels, k, k],
                actual: input.shape.clone(),
            });
        }
        let (oh, ow) = (h - k + 1, w - k + 1);
        let mut out = Tensor::zeros(&[self.out_channels, oh, ow]);

        for o in 0..self.out_channels {
            for y in 0..oh {
                for x in 0..ow {
                    let mut acc = self.bias.data[o];
                    for c in 0..self.in_channels {
                        for ky in 0..k {
                            for kx in 0..k {
                                let wi = ((o * self.in_channels + c) * k + ky) * k + kx;
                                let ii = (c * h + y + ky) * w + x + kx;
                                acc += self.weight.data[wi] * input.data[ii];
                            }
                        }
                    }
                    out.data[(o * oh + y) * ow + x] = acc;
                }
            }
        }
        Ok(out)
    }
}

/// Unpadded transposed convolution, weight `[in, out, k, k]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvTranspose2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub weight: Tensor,
    pub bias: Tensor,
}

impl ConvTranspose2d {
    /// Kaiming-normal weights and zero bias. Fan-out is taken from the
    /// leading weight dimension, as the reference framework does.
    pub fn kaiming<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        rng: &mut R,
    ) -> Self {
        let fan_out = (in_channels * kernel_size * kernel_size).max(1) as f32;
        let std = (2.0 / fan_out).sqrt();
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            weight: Tensor::normal(
                &[in_channels, out_channels, kernel_size, kernel_size],
                std,
                rng,
            ),
            bias: Tensor::zeros(&[out_channels]),
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), ModelError> {
        let k = self.kernel_size;
        self.weight
            .expect_shape(name, &[self.in_channels, self.out_channels, k, k])?;
        self.bias.expect_shape(name, &[self.out_channels])
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let (h, w) = spatial(input, self.in_channels, "conv_transpose2d input")?;
        let (k, s) = (self.kernel_size, self.stride);
        let (oh, ow) = ((h.max(1) - 1) * s + k, (w.max(1) - 1) * s + k);
        let mut out = Tensor::zeros(&[self.out_channels, oh, ow]);

        for o in 0..self.out_channels {
            let plane = &mut out.data[o * oh * ow..(o + 1) * oh * ow];
            plane.iter_mut().for_each(|v| *v = self.bias.data[o]);
            for c in 0..self.in_channels {
                for y in 0..h {
                    for x in 0..w {
                        let v = input.data[(c * h + y) * w + x];
                        for ky in 0..k {
                            for kx in 0..k {
                                let wi = ((c * self.out_channels + o) * k + ky) * k + kx;
                                plane[(y * s + ky) * ow + x * s + kx] += v * self.weight.data[wi];
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

fn spatial(input: &Tensor, channels: usize, layer: &str) -> Result<(usize, usize), ModelError> {
    match input.shape.as_slice() {
        [c, h, w] if *c == channels && input.numel() == c * h * w => Ok((*h, *w)),
        _ => Err(ModelError::ShapeMismatch {
            layer: layer.to_string(),
            expected: vec![channels],
            actual: input.shape.clone(),
        }),
    }
}
