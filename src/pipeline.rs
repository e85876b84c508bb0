//! Conversion between real-valued data and the model's int8 tensors.
//!
//! The model runtime itself lives elsewhere: callers hand [`ModelInputs::slots`]
//! to it and pass its raw outputs, in model order, to [`dequantize_outputs`].

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{QuantError, Result};
use crate::model_config::{
    ModelQuantConfig, TensorQuantParams, RUL_LEN, SENSOR_LEN, SENSOR_SHAPE, STATUS_LEN,
    VIBRATION_LEN, VIBRATION_SHAPE,
};
use crate::quantization::{dequantize_slice, quantize_slice, AffineQuantizer};
use crate::tensor::Tensor;

/// Quantized model inputs together with their target slots.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub vibration: Tensor<i8>,
    pub sensor: Tensor<i8>,
    pub vibration_index: usize,
    pub sensor_index: usize,
    /// Number of input values clipped to the int8 range.
    pub saturated: usize,
}

impl ModelInputs {
    /// Input tensors ordered by their model slot.
    pub fn slots(&self) -> [&Tensor<i8>; 2] {
        if self.vibration_index <= self.sensor_index {
            [&self.vibration, &self.sensor]
        } else {
            [&self.sensor, &self.vibration]
        }
    }
}

pub fn quantize_inputs(
    config: &ModelQuantConfig,
    vibration: &[f32],
    sensor: &[f32],
) -> Result<ModelInputs> {
    config.validate()?;
    check_len("input.vibration", VIBRATION_LEN, vibration.len())?;
    check_len("input.sensor", SENSOR_LEN, sensor.len())?;
    check_finite("input.vibration", vibration)?;
    check_finite("input.sensor", sensor)?;

    let vib_params = config.inputs.vibration;
    let sen_params = config.inputs.sensor;

    let (vib_q, vib_saturated) = quantize_slice(&AffineQuantizer::from(vib_params), vibration);
    let (sen_q, sen_saturated) = quantize_slice(&AffineQuantizer::from(sen_params), sensor);

    debug!(
        vibration_index = vib_params.tensor_index,
        sensor_index = sen_params.tensor_index,
        "quantized model inputs"
    );

    Ok(ModelInputs {
        vibration: Tensor::from_vec("input.vibration", vib_q, &VIBRATION_SHAPE)?,
        sensor: Tensor::from_vec("input.sensor", sen_q, &SENSOR_SHAPE)?,
        vibration_index: vib_params.tensor_index,
        sensor_index: sen_params.tensor_index,
        saturated: vib_saturated + sen_saturated,
    })
}

/// Dequantized model outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub status_probabilities: Vec<f32>,
    /// Remaining useful life, in the units the model was trained on.
    pub rul: f32,
}

impl Prediction {
    /// Index of the most probable status class.
    pub fn predicted_class(&self) -> Option<usize> {
        self.status_probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

/// `outputs` are the raw int8 output tensors in the order the model reports them.
pub fn dequantize_outputs(config: &ModelQuantConfig, outputs: &[&[i8]]) -> Result<Prediction> {
    config.validate()?;
    let status = output_slot("output.status", &config.outputs.status, outputs)?;
    check_len("output.status", STATUS_LEN, status.len())?;

    let rul = output_slot("output.rul", &config.outputs.rul, outputs)?;
    check_len("output.rul", RUL_LEN, rul.len())?;

    let status_q = AffineQuantizer::from_params(&config.outputs.status);
    let rul_q = AffineQuantizer::from_params(&config.outputs.rul);

    Ok(Prediction {
        status_probabilities: dequantize_slice(&status_q, status),
        rul: dequantize_slice(&rul_q, rul)[0],
    })
}

/// Input slots identified from the deployed model's input lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlots {
    pub vibration: usize,
    pub sensor: usize,
}

/// Output slots identified from the deployed model's output lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSlots {
    pub status: usize,
    pub rul: usize,
}

/// Find the vibration input (the only one with 1024 elements) and the sensor
/// input (the only one with 3 elements).
pub fn resolve_input_indices(input_lengths: &[usize]) -> Result<InputSlots> {
    Ok(InputSlots {
        vibration: unique_with_len("input.vibration", VIBRATION_LEN, input_lengths)?,
        sensor: unique_with_len("input.sensor", SENSOR_LEN, input_lengths)?,
    })
}

/// Find the status output (the only one with 3 elements) and the RUL output
/// (the only one with 1 element).
pub fn resolve_output_indices(output_lengths: &[usize]) -> Result<OutputSlots> {
    Ok(OutputSlots {
        status: unique_with_len("output.status", STATUS_LEN, output_lengths)?,
        rul: unique_with_len("output.rul", RUL_LEN, output_lengths)?,
    })
}

/// Compare the configured input indices with the model on the device.
pub fn verify_input_indices(
    config: &ModelQuantConfig,
    input_lengths: &[usize],
) -> Result<InputSlots> {
    let slots = resolve_input_indices(input_lengths)?;
    check_indices([
        ("input.vibration", config.inputs.vibration.tensor_index, slots.vibration),
        ("input.sensor", config.inputs.sensor.tensor_index, slots.sensor),
    ])?;
    Ok(slots)
}

/// Compare the configured output indices with the model on the device.
pub fn verify_output_indices(
    config: &ModelQuantConfig,
    output_lengths: &[usize],
) -> Result<OutputSlots> {
    let slots = resolve_output_indices(output_lengths)?;
    check_indices([
        ("output.status", config.outputs.status.tensor_index, slots.status),
        ("output.rul", config.outputs.rul.tensor_index, slots.rul),
    ])?;
    Ok(slots)
}

fn check_indices(pairs: [(&str, usize, usize); 2]) -> Result<()> {
    for (tensor, configured, actual) in pairs {
        if configured != actual {
            warn!(tensor, configured, actual, "tensor index mismatch");
            return Err(QuantError::IndexMismatch {
                tensor: tensor.to_string(),
                configured,
                actual,
            });
        }
    }
    Ok(())
}

fn unique_with_len(tensor: &str, length: usize, lengths: &[usize]) -> Result<usize> {
    let matches: Vec<usize> = lengths
        .iter()
        .enumerate()
        .filter(|&(_, &len)| len == length)
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [index] => Ok(*index),
        _ => Err(QuantError::AmbiguousTensor {
            tensor: tensor.to_string(),
            length,
            matches: matches.len(),
        }),
    }
}

fn output_slot<'a>(
    tensor: &str,
    params: &TensorQuantParams,
    outputs: &[&'a [i8]],
) -> Result<&'a [i8]> {
    outputs
        .get(params.tensor_index)
        .copied()
        .ok_or_else(|| QuantError::MissingTensorSlot {
            tensor: tensor.to_string(),
            index: params.tensor_index,
            available: outputs.len(),
        })
}

fn check_finite(tensor: &str, values: &[f32]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(position) => Err(QuantError::NonFiniteInput {
            tensor: tensor.to_string(),
            position,
            value: values[position],
        }),
        None => Ok(()),
    }
}

fn check_len(tensor: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(QuantError::ShapeMismatch {
            tensor: tensor.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
