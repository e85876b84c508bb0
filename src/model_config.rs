//! Quantization parameter table for the deployed condition-monitoring model.
//!
//! The model takes two int8 inputs (a vibration window and a sensor vector) and
//! produces two int8 outputs (status class probabilities and remaining useful
//! life). Inputs are quantized with `q = round(x / scale) + zero_point`, outputs
//! are recovered with `x = (q - zero_point) * scale`.
//!
//! The tensor indices below have NOT been confirmed against the model loaded on
//! the device. A wrong index makes every conversion silently use the wrong
//! tensor; confirm them on site with [`crate::pipeline::verify_input_indices`]
//! and [`crate::pipeline::verify_output_indices`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{QuantError, Result};

/// Affine quantization parameters of one model tensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorQuantParams {
    /// Real value of one quantized step.
    pub scale: f32,
    pub zero_point: i8,
    /// Position in the model's input or output list.
    pub tensor_index: usize,
}

impl TensorQuantParams {
    pub const fn new(scale: f32, zero_point: i8, tensor_index: usize) -> Self {
        Self {
            scale,
            zero_point,
            tensor_index,
        }
    }
}

// Vibration input, shape [1, 1024, 1]
pub const INPUT_VIB_SCALE: f32 = 0.032791;
pub const INPUT_VIB_ZERO: i8 = -5;
/// Usually 0; check on site.
pub const INPUT_VIB_INDEX: usize = 0;

// Sensor input, shape [1, 3]
pub const INPUT_SEN_SCALE: f32 = 0.003663;
pub const INPUT_SEN_ZERO: i8 = -124;
pub const INPUT_SEN_INDEX: usize = 1;

// Status output (class probabilities)
pub const OUTPUT_STAT_SCALE: f32 = 0.003480;
pub const OUTPUT_STAT_ZERO: i8 = -128;
/// Check on site: the output with 3 elements.
pub const OUTPUT_STAT_INDEX: usize = 0;

// Remaining useful life output
pub const OUTPUT_RUL_SCALE: f32 = 0.003906;
pub const OUTPUT_RUL_ZERO: i8 = -128;
/// Check on site: the output with 1 element.
pub const OUTPUT_RUL_INDEX: usize = 1;

pub const INPUT_VIBRATION: TensorQuantParams =
    TensorQuantParams::new(INPUT_VIB_SCALE, INPUT_VIB_ZERO, INPUT_VIB_INDEX);
pub const INPUT_SENSOR: TensorQuantParams =
    TensorQuantParams::new(INPUT_SEN_SCALE, INPUT_SEN_ZERO, INPUT_SEN_INDEX);
pub const OUTPUT_STATUS: TensorQuantParams =
    TensorQuantParams::new(OUTPUT_STAT_SCALE, OUTPUT_STAT_ZERO, OUTPUT_STAT_INDEX);
pub const OUTPUT_RUL: TensorQuantParams =
    TensorQuantParams::new(OUTPUT_RUL_SCALE, OUTPUT_RUL_ZERO, OUTPUT_RUL_INDEX);

pub const VIBRATION_SHAPE: [usize; 3] = [1, 1024, 1];
pub const SENSOR_SHAPE: [usize; 2] = [1, 3];
pub const VIBRATION_LEN: usize = 1024;
pub const SENSOR_LEN: usize = 3;
pub const STATUS_LEN: usize = 3;
pub const RUL_LEN: usize = 1;

pub const NUM_INPUTS: usize = 2;
pub const NUM_OUTPUTS: usize = 2;

pub const fn input_vibration_params() -> TensorQuantParams {
    INPUT_VIBRATION
}

pub const fn input_sensor_params() -> TensorQuantParams {
    INPUT_SENSOR
}

pub const fn output_status_params() -> TensorQuantParams {
    OUTPUT_STATUS
}

pub const fn output_rul_params() -> TensorQuantParams {
    OUTPUT_RUL
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputParams {
    pub vibration: TensorQuantParams,
    pub sensor: TensorQuantParams,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputParams {
    pub status: TensorQuantParams,
    pub rul: TensorQuantParams,
}

/// Full parameter set. Defaults to the compile-time table; a JSON file can
/// replace it after the model is retrained.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelQuantConfig {
    pub inputs: InputParams,
    pub outputs: OutputParams,
}

impl Default for ModelQuantConfig {
    fn default() -> Self {
        Self::BUILTIN
    }
}

impl ModelQuantConfig {
    pub const BUILTIN: ModelQuantConfig = ModelQuantConfig {
        inputs: InputParams {
            vibration: INPUT_VIBRATION,
            sensor: INPUT_SENSOR,
        },
        outputs: OutputParams {
            status: OUTPUT_STATUS,
            rul: OUTPUT_RUL,
        },
    };

    /// Descriptors with their names, inputs first.
    pub fn descriptors(&self) -> [(&'static str, TensorQuantParams); 4] {
        [
            ("input.vibration", self.inputs.vibration),
            ("input.sensor", self.inputs.sensor),
            ("output.status", self.outputs.status),
            ("output.rul", self.outputs.rul),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (name, params) in self.descriptors() {
            if !params.scale.is_finite() || params.scale <= 0.0 {
                return Err(QuantError::InvalidScale {
                    tensor: name.to_string(),
                    scale: params.scale,
                });
            }
        }

        check_group(
            "input",
            NUM_INPUTS,
            ("input.vibration", self.inputs.vibration.tensor_index),
            ("input.sensor", self.inputs.sensor.tensor_index),
        )?;
        check_group(
            "output",
            NUM_OUTPUTS,
            ("output.status", self.outputs.status.tensor_index),
            ("output.rul", self.outputs.rul.tensor_index),
        )
    }

    /// Names of the descriptors that differ from the compile-time table.
    pub fn differs_from_builtin(&self) -> Vec<&'static str> {
        self.descriptors()
            .into_iter()
            .zip(Self::BUILTIN.descriptors())
            .filter(|((_, ours), (_, builtin))| ours != builtin)
            .map(|((name, _), _)| name)
            .collect()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ModelQuantConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| QuantError::io(path, e))?;
        let config = Self::from_json_str(&json)?;

        let changed = config.differs_from_builtin();
        if changed.is_empty() {
            info!(path = %path.display(), "loaded parameter table (matches built-in)");
        } else {
            warn!(
                path = %path.display(),
                changed = ?changed,
                "parameter table overrides built-in values"
            );
        }
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_group(
    group: &'static str,
    count: usize,
    a: (&'static str, usize),
    b: (&'static str, usize),
) -> Result<()> {
    for (name, index) in [a, b] {
        if index >= count {
            return Err(QuantError::TensorIndexOutOfRange {
                tensor: name.to_string(),
                group,
                index,
                count,
            });
        }
    }
    if a.1 == b.1 {
        return Err(QuantError::DuplicateTensorIndex {
            group,
            index: a.1,
            first: a.0.to_string(),
            second: b.0.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_header_values() {
        assert_eq!(
            input_vibration_params(),
            TensorQuantParams::new(0.032791, -5, 0)
        );
        assert_eq!(input_sensor_params(), TensorQuantParams::new(0.003663, -124, 1));
        assert_eq!(
            output_status_params(),
            TensorQuantParams::new(0.003480, -128, 0)
        );
        assert_eq!(output_rul_params(), TensorQuantParams::new(0.003906, -128, 1));
    }

    #[test]
    fn builtin_table_is_valid() {
        ModelQuantConfig::default().validate().unwrap();
        assert!(ModelQuantConfig::default().differs_from_builtin().is_empty());
    }

    #[test]
    fn shapes_match_lengths() {
        assert_eq!(VIBRATION_SHAPE.iter().product::<usize>(), VIBRATION_LEN);
        assert_eq!(SENSOR_SHAPE.iter().product::<usize>(), SENSOR_LEN);
    }

    #[test]
    fn rejects_duplicate_output_index() {
        let mut config = ModelQuantConfig::default();
        config.outputs.rul.tensor_index = 0;
        match config.validate() {
            Err(QuantError::DuplicateTensorIndex { group, index, .. }) => {
                assert_eq!(group, "output");
                assert_eq!(index, 0);
            }
            other => panic!("expected duplicate index error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut config = ModelQuantConfig::default();
        config.inputs.sensor.tensor_index = 2;
        assert!(matches!(
            config.validate(),
            Err(QuantError::TensorIndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn rejects_non_positive_scale() {
        let mut config = ModelQuantConfig::default();
        config.outputs.status.scale = 0.0;
        assert!(matches!(
            config.validate(),
            Err(QuantError::InvalidScale { .. })
        ));
    }

    #[test]
    fn json_roundtrip_and_override_detection() {
        let mut config = ModelQuantConfig::default();
        config.inputs.sensor.scale = 0.004;
        let json = config.to_json_string().unwrap();

        let loaded = ModelQuantConfig::from_json_str(&json).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.differs_from_builtin(), vec!["input.sensor"]);
    }

    #[test]
    fn zero_point_outside_int8_fails_to_load() {
        let json = ModelQuantConfig::default()
            .to_json_string()
            .unwrap()
            .replacen("-124", "-300", 1);
        assert!(matches!(
            ModelQuantConfig::from_json_str(&json),
            Err(QuantError::Serialization(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ModelQuantConfig::from_json_file("/nonexistent/params.json").unwrap_err();
        assert!(matches!(err, QuantError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/params.json"));
    }
}
