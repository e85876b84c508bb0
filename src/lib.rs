//! Int8 quantization parameters and tensor conversion for the vibration /
//! sensor condition-monitoring model (status classification and remaining
//! useful life).

pub mod error;
pub mod model_config;
pub mod pipeline;
pub mod quantization;
pub mod tensor;

pub use error::{QuantError, Result};
pub use model_config::{ModelQuantConfig, TensorQuantParams};
pub use pipeline::{dequantize_outputs, quantize_inputs, ModelInputs, Prediction};
pub use quantization::{AffineQuantizer, Quantizer8Bit};
