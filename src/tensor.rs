use std::ops::Range;

use rand::Rng;

use crate::error::{QuantError, Result};
use crate::quantization::Quantizer8Bit;

#[derive(PartialEq, Debug, Clone)]
pub struct Tensor<T> {
    pub data: Vec<T>,
    pub shape: Vec<usize>,
}

impl<T> Tensor<T>
where
    T: Copy + Default,
{
    pub fn new(shape: &[usize]) -> Self {
        Self {
            data: vec![T::default(); shape.iter().product()],
            shape: shape.to_vec(),
        }
    }

    /// Wrap `data` in `shape`, checking the element count. `name` is used in the error.
    pub fn from_vec(name: &str, data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let expected = shape.iter().product();
        if data.len() != expected {
            return Err(QuantError::ShapeMismatch {
                tensor: name.to_string(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Tensor<f32> {
    pub fn quantize(&self, quantizer: &impl Quantizer8Bit) -> Tensor<i8> {
        Tensor {
            data: self.data.iter().map(|&v| quantizer.quantize(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn random(shape: &[usize], range: Range<f32>) -> Self {
        let size = shape.iter().product();
        let mut data = Vec::<f32>::with_capacity(size);

        let mut rng = rand::rng();

        for _ in 0..size {
            data.push(rng.random_range(range.clone()));
        }

        Tensor {
            data,
            shape: shape.to_vec(),
        }
    }

    /// `None` for an empty tensor. NaNs are skipped.
    pub fn min_and_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

impl Tensor<i8> {
    pub fn dequantize(&self, quantizer: &impl Quantizer8Bit) -> Tensor<f32> {
        Tensor {
            data: self.data.iter().map(|&q| quantizer.dequantize(q)).collect(),
            shape: self.shape.clone(),
        }
    }
}
