use std::time::Duration;

use condition_monitor_quant::{
    dequantize_outputs,
    model_config::{ModelQuantConfig, SENSOR_LEN, VIBRATION_SHAPE},
    quantize_inputs,
    tensor::Tensor,
    AffineQuantizer,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn io_conversion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("IoConversion");
    group.sample_size(10);
    group.warm_up_time(Duration::new(0, 1000));

    let config = ModelQuantConfig::default();
    let vibration = Tensor::random(&VIBRATION_SHAPE, -4.0..4.0);
    let sensor = Tensor::random(&[SENSOR_LEN], 0.0..1.0);

    group.bench_function("QuantizeInputs", |b| {
        b.iter(|| quantize_inputs(&config, &vibration.data, &sensor.data));
    });

    let status: [i8; 3] = [-128, 100, -90];
    let rul: [i8; 1] = [12];
    group.bench_function("DequantizeOutputs", |b| {
        b.iter(|| dequantize_outputs(&config, &[&status[..], &rul[..]]));
    });

    let quantizer = AffineQuantizer::from_params(&config.inputs.vibration);
    for windows in [1usize, 4, 16, 64] {
        let batch = Tensor::random(&[windows, 1024, 1], -4.0..4.0);
        group.bench_with_input(
            BenchmarkId::new("VibrationRoundTrip", windows),
            &batch,
            |b, batch| {
                b.iter(|| batch.quantize(&quantizer).dequantize(&quantizer));
            },
        );
    }
}

criterion_group!(benches, io_conversion_benchmark);
criterion_main!(benches);
