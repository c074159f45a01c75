//! Callback-path benchmarks
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ultrajam::audio::{duplex_pipeline, ClipMode, MixConfig};
use ultrajam::signal::{Oscillator, SignalSpec};

fn bench_tone_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("oscillator_tones");

    for tone_count in [1usize, 3, 5, 7] {
        group.bench_with_input(
            BenchmarkId::new("tones", tone_count),
            &tone_count,
            |b, &tone_count| {
                let spec = SignalSpec::multi_tone(23_000.0, 48_000, tone_count, 300.0);
                let mut osc = Oscillator::new(&spec);
                let mut buffer = [0.0f32; 1024];

                b.iter(|| osc.fill(black_box(&mut buffer)));
            },
        );
    }

    group.finish();
}

fn bench_sample_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("oscillator_rates");

    for sample_rate in [44_100u32, 48_000, 96_000] {
        group.bench_with_input(
            BenchmarkId::new("rate", sample_rate),
            &sample_rate,
            |b, &sample_rate| {
                let spec = SignalSpec::multi_tone(23_000.0, sample_rate, 3, 300.0);
                let mut osc = Oscillator::new(&spec);
                let mut buffer = [0.0f32; 1024];

                b.iter(|| osc.fill(black_box(&mut buffer)));
            },
        );
    }

    group.finish();
}

/// One capture plus one render callback per iteration, stereo in and out
fn bench_duplex_callbacks(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplex_callbacks");

    for frames in [128usize, 256, 512, 1024] {
        for clip in [ClipMode::Hard, ClipMode::Soft] {
            group.bench_with_input(
                BenchmarkId::new(clip.to_string(), frames),
                &frames,
                |b, &frames| {
                    let spec = SignalSpec::multi_tone(23_000.0, 48_000, 3, 300.0);
                    let (capture, mut render, _stats) =
                        duplex_pipeline(&spec, MixConfig::new(0.5, clip), 2, 2, frames);
                    let input: Vec<f32> = (0..frames * 2).map(|i| (i as f32 * 0.01).sin()).collect();
                    let mut output = vec![0.0f32; frames * 2];

                    b.iter(|| {
                        capture.process(black_box(&input));
                        render.process(black_box(&mut output));
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_tone_counts, bench_sample_rates, bench_duplex_callbacks);
criterion_main!(benches);
