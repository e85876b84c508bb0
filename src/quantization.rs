use tracing::debug;

use crate::error::{QuantError, Result};
use crate::model_config::TensorQuantParams;

pub const QMIN: i8 = i8::MIN;
pub const QMAX: i8 = i8::MAX;

pub trait Quantizer8Bit {
    fn quantize(&self, real_val: f32) -> i8;
    fn dequantize(&self, q_val: i8) -> f32;
}

/// Quantize a slice, returning the int8 values and how many of them were clipped
/// to the int8 range or were NaN.
pub fn quantize_slice(quantizer: &AffineQuantizer, values: &[f32]) -> (Vec<i8>, usize) {
    let mut saturated = 0;
    let quantized = values
        .iter()
        .map(|&v| {
            let unclamped = quantizer.quantize_unclamped(v);
            if unclamped.is_nan() || unclamped < QMIN as f32 || unclamped > QMAX as f32 {
                saturated += 1;
            }
            quantizer.quantize(v)
        })
        .collect();

    if saturated > 0 {
        debug!(
            saturated,
            total = values.len(),
            scale = quantizer.scale,
            zero = quantizer.zero,
            "values clipped to int8 range"
        );
    }
    (quantized, saturated)
}

pub fn dequantize_slice(quantizer: &impl Quantizer8Bit, values: &[i8]) -> Vec<f32> {
    values.iter().map(|&q| quantizer.dequantize(q)).collect()
}

/// Signed 8 bit affine quantization: `q = clamp(round(x / scale) + zero, -128, 127)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineQuantizer {
    pub scale: f32,
    pub zero: i8,
}

impl AffineQuantizer {
    pub fn try_new(scale: f32, zero: i8) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(QuantError::InvalidScale {
                tensor: "quantizer".into(),
                scale,
            });
        }
        Ok(AffineQuantizer { scale, zero })
    }

    /// Build from a table descriptor. The table constants are validated by tests,
    /// overrides by `ModelQuantConfig::validate`.
    pub const fn from_params(params: &TensorQuantParams) -> Self {
        AffineQuantizer {
            scale: params.scale,
            zero: params.zero_point,
        }
    }

    /// Derive parameters covering `[min_val, max_val]` with the full int8 range.
    pub fn calibrate(min_val: f32, max_val: f32) -> Result<Self> {
        if !min_val.is_finite() || !max_val.is_finite() {
            return Err(QuantError::InvalidScale {
                tensor: format!("calibration range [{min_val}, {max_val}]"),
                scale: f32::NAN,
            });
        }
        // pad so that min_val == max_val still yields a usable scale
        let min_val = min_val.min(0.0) - 1e-6;
        let max_val = max_val.max(0.0) + 1e-6;
        let scale = (max_val - min_val) / 255.0;
        let zero = (QMIN as f32 - min_val / scale)
            .round()
            .clamp(QMIN as f32, QMAX as f32) as i8;
        AffineQuantizer::try_new(scale, zero)
    }

    pub fn step(&self) -> f32 {
        self.scale
    }

    /// Real interval reachable by dequantizing every int8 value.
    pub fn representable_range(&self) -> (f32, f32) {
        (self.dequantize(QMIN), self.dequantize(QMAX))
    }

    fn quantize_unclamped(&self, real_val: f32) -> f32 {
        (real_val / self.scale).round() + self.zero as f32
    }
}

impl From<TensorQuantParams> for AffineQuantizer {
    fn from(params: TensorQuantParams) -> Self {
        AffineQuantizer::from_params(&params)
    }
}

impl Quantizer8Bit for AffineQuantizer {
    /// NaN maps to the zero point.
    fn quantize(&self, real_val: f32) -> i8 {
        if real_val.is_nan() {
            return self.zero;
        }
        self.quantize_unclamped(real_val)
            .clamp(QMIN as f32, QMAX as f32) as i8
    }

    fn dequantize(&self, q_val: i8) -> f32 {
        self.scale * (q_val as i32 - self.zero as i32) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_config::{INPUT_SENSOR, INPUT_VIBRATION, OUTPUT_RUL, OUTPUT_STATUS};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn vibration_zero_maps_to_zero_point() {
        let q = AffineQuantizer::from_params(&INPUT_VIBRATION);
        assert_eq!(q.quantize(0.0), -5);
    }

    #[test]
    fn output_zero_points_map_to_real_zero() {
        assert_eq!(AffineQuantizer::from_params(&OUTPUT_STATUS).dequantize(-128), 0.0);
        assert_eq!(AffineQuantizer::from_params(&OUTPUT_RUL).dequantize(-128), 0.0);
    }

    #[test]
    fn out_of_range_values_saturate() {
        let q = AffineQuantizer::try_new(0.5, 0).unwrap();
        assert_eq!(q.quantize(1000.0), 127);
        assert_eq!(q.quantize(-1000.0), -128);

        let (values, saturated) = quantize_slice(&q, &[1000.0, 0.0, -1000.0, 1.0]);
        assert_eq!(values, vec![127, 0, -128, 2]);
        assert_eq!(saturated, 2);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let q = AffineQuantizer::try_new(1.0, 0).unwrap();
        assert_eq!(q.quantize(2.5), 3);
        assert_eq!(q.quantize(-2.5), -3);
        assert_eq!(q.quantize(2.49), 2);
    }

    #[test]
    fn rejects_bad_scales() {
        assert!(AffineQuantizer::try_new(0.0, 0).is_err());
        assert!(AffineQuantizer::try_new(-0.1, 0).is_err());
        assert!(AffineQuantizer::try_new(f32::NAN, 0).is_err());
        assert!(AffineQuantizer::try_new(f32::INFINITY, 0).is_err());
    }

    #[test]
    fn representable_range_of_status_output() {
        let (lo, hi) = AffineQuantizer::from_params(&OUTPUT_STATUS).representable_range();
        assert_abs_diff_eq!(lo, 0.0);
        assert_abs_diff_eq!(hi, 255.0 * 0.003480, epsilon = 1e-5);
    }

    #[test]
    fn calibrate_covers_observed_range() {
        let q = AffineQuantizer::calibrate(-1.0, 3.0).unwrap();
        let (lo, hi) = q.representable_range();
        assert!(lo <= -1.0 + q.step());
        assert!(hi >= 3.0 - q.step());
        assert_abs_diff_eq!(q.dequantize(q.quantize(0.0)), 0.0, epsilon = q.step());
    }

    #[test]
    fn calibrate_degenerate_range() {
        let q = AffineQuantizer::calibrate(2.0, 2.0).unwrap();
        assert!(q.scale > 0.0);
        assert!(q.scale.is_finite());
    }

    #[test]
    fn calibrate_rejects_non_finite_range() {
        assert!(matches!(
            AffineQuantizer::calibrate(f32::NEG_INFINITY, 1.0),
            Err(QuantError::InvalidScale { .. })
        ));
        assert!(AffineQuantizer::calibrate(0.0, f32::NAN).is_err());
        assert!(AffineQuantizer::calibrate(-f32::MAX, f32::MAX).is_err());
    }

    #[test]
    fn nan_maps_to_zero_point_and_is_counted() {
        let q = AffineQuantizer::from_params(&INPUT_SENSOR);
        assert_eq!(q.quantize(f32::NAN), -124);

        let (values, saturated) = quantize_slice(&q, &[f32::NAN, 0.0]);
        assert_eq!(values, vec![-124, -124]);
        assert_eq!(saturated, 1);
        assert_eq!(q.dequantize(values[0]), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(200))]

        /// Values inside the representable range survive a round trip within one step
        #[test]
        fn prop_roundtrip_within_one_step(
            scale in 0.001f32..0.1,
            zero in -128i32..=127,
            t in 0.0f32..1.0,
        ) {
            let q = AffineQuantizer::try_new(scale, zero as i8).unwrap();
            let (lo, hi) = q.representable_range();
            let v = lo + (hi - lo) * t;
            let back = q.dequantize(q.quantize(v));
            prop_assert!((back - v).abs() <= q.step(), "v={} back={} step={}", v, back, q.step());
        }

        #[test]
        fn prop_dequantize_quantize_is_identity_on_int8(
            scale in 0.001f32..0.1,
            zero in -128i32..=127,
            x in -128i32..=127,
        ) {
            let q = AffineQuantizer::try_new(scale, zero as i8).unwrap();
            prop_assert_eq!(q.quantize(q.dequantize(x as i8)), x as i8);
        }
    }
}
