// Round-trip report for the model's quantization parameter table.
use std::path::PathBuf;

use clap::Parser;
use condition_monitor_quant::model_config::{
    ModelQuantConfig, SENSOR_LEN, VIBRATION_LEN, VIBRATION_SHAPE,
};
use condition_monitor_quant::pipeline::{
    quantize_inputs, verify_input_indices, verify_output_indices,
};
use condition_monitor_quant::quantization::AffineQuantizer;
use condition_monitor_quant::tensor::Tensor;

use plotters::prelude::*;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

static SERIES_COLORS: [RGBColor; 4] = [RED, BLUE, GREEN, MAGENTA];

#[derive(Parser, Debug)]
#[command(name = "quant-report")]
#[command(about = "Check the int8 parameter table and plot its round-trip error")]
struct Args {
    /// JSON parameter table replacing the built-in one.
    config: Option<PathBuf>,

    /// Element counts of the deployed model's inputs, in model order (e.g. 1024,3).
    #[arg(long, value_delimiter = ',')]
    input_lengths: Option<Vec<usize>>,

    /// Element counts of the deployed model's outputs, in model order (e.g. 3,1).
    #[arg(long, value_delimiter = ',')]
    output_lengths: Option<Vec<usize>>,

    /// Where to write the error plot.
    #[arg(long, default_value = "roundtrip-error.png")]
    plot: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ModelQuantConfig::from_json_file(path)?,
        None => ModelQuantConfig::default(),
    };
    config.validate()?;

    for (name, params) in config.descriptors() {
        let (lo, hi) = AffineQuantizer::from_params(&params).representable_range();
        info!(
            tensor = name,
            scale = params.scale,
            zero_point = params.zero_point,
            tensor_index = params.tensor_index,
            "range [{lo:.4}, {hi:.4}]"
        );
    }

    match &args.input_lengths {
        Some(lengths) => {
            let slots = verify_input_indices(&config, lengths)?;
            info!(vibration = slots.vibration, sensor = slots.sensor, "input indices verified");
        }
        None => warn!("input indices not verified against the deployed model (pass --input-lengths)"),
    }

    match &args.output_lengths {
        Some(lengths) => {
            let slots = verify_output_indices(&config, lengths)?;
            info!(status = slots.status, rul = slots.rul, "output indices verified");
        }
        None => warn!("output indices not verified against the deployed model (pass --output-lengths)"),
    }

    // Random samples through the input path, as the device would feed them
    let vibration = Tensor::random(&VIBRATION_SHAPE, -4.0..4.0);
    let sensor = Tensor::random(&[SENSOR_LEN], 0.0..1.0);
    let inputs = quantize_inputs(&config, &vibration.data, &sensor.data)?;
    info!(
        saturated = inputs.saturated,
        total = VIBRATION_LEN + SENSOR_LEN,
        "quantized random input sample"
    );

    let series: Vec<(&str, Vec<(f32, f32)>)> = config
        .descriptors()
        .into_iter()
        .map(|(name, params)| {
            let errors = error_as_range_increases(&AffineQuantizer::from_params(&params), 15);
            (name, errors)
        })
        .collect();

    for (name, errors) in &series {
        if let Some((_, in_range)) = errors.iter().find(|(x, _)| (*x - 1.0).abs() < 1e-3) {
            info!(tensor = *name, "rms error at full range: {in_range:.3} steps");
        }
    }

    let root = BitMapBackend::new(&args.plot, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = series
        .iter()
        .flat_map(|(_, e)| e.last().map(|(x, _)| *x))
        .fold(1.0, f32::max);
    let y_max = series
        .iter()
        .flat_map(|(_, e)| e.iter().map(|(_, y)| *y))
        .fold(0.0, f32::max)
        * 1.1; // Add 10% padding

    let mut chart = ChartBuilder::on(&root)
        .caption("Round-trip Error vs. Input Range", ("sans-serif", 40).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(75)
        .build_cartesian_2d(0f32..x_max, 0f32..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Input Range (fraction of representable range)")
        .y_desc("RMS Error (quantization steps)")
        .light_line_style(&WHITE.mix(0.8))
        .draw()?;

    for (i, (name, errors)) in series.iter().enumerate() {
        let color = &SERIES_COLORS[i % SERIES_COLORS.len()];
        chart
            .draw_series(LineSeries::new(errors.iter().cloned(), color))?
            .label(*name)
            .legend(move |(x, y)| PathElement::new(vec![(x - 5, y), (x + 5, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!(path = %args.plot.display(), "wrote error plot");

    Ok(())
}

fn rms_error(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Number of values must be equal");
    let n = a.len() as f32;
    (a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).powi(2))
        .sum::<f32>()
        / n)
        .sqrt()
}

/// RMS round-trip error, in quantization steps, for samples drawn from a window
/// around the center of the representable range. The window grows in tenths of
/// that range up to `max_tenths`; past 1.0 the error comes from saturation.
fn error_as_range_increases(quantizer: &AffineQuantizer, max_tenths: usize) -> Vec<(f32, f32)> {
    assert!(max_tenths >= 1);

    let (lo, hi) = quantizer.representable_range();
    let center = (lo + hi) / 2.0;
    let half = (hi - lo) / 2.0;
    let samples = 2048;

    let mut errors = Vec::new();
    for tenths in 1..=max_tenths {
        let fraction = tenths as f32 / 10.0;
        let real = Tensor::random(
            &[samples],
            center - half * fraction..center + half * fraction,
        );
        let back = real.quantize(quantizer).dequantize(quantizer);
        errors.push((fraction, rms_error(&real.data, &back.data) / quantizer.step()));
    }
    errors
}
