//! Finite buffer synthesis and frequency validation

use std::f64::consts::TAU;

use crate::constants::{DEFAULT_MULTI_TONE_SPREAD_HZ, MAX_FREQ, MIN_FREQ, SAMPLE_RATE};
use crate::error::ValidationError;
use crate::signal::oscillator::{Oscillator, SignalSpec};

/// Number of samples covering `duration_seconds` at `sample_rate`.
///
/// Non-positive or non-finite durations yield zero. Products within
/// rounding error of a whole number snap to it, so 0.7 s at 44.1 kHz is
/// 30870 samples rather than 30869.
pub fn sample_count(sample_rate: u32, duration_seconds: f64) -> usize {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return 0;
    }
    let exact = sample_rate as f64 * duration_seconds;
    let nearest = exact.round();
    if (exact - nearest).abs() < SAMPLE_COUNT_EPSILON {
        nearest as usize
    } else {
        exact.floor() as usize
    }
}

const SAMPLE_COUNT_EPSILON: f64 = 1e-6;

/// Render `duration_seconds` of `spec` into a new buffer.
///
/// Never fails: out-of-band or negative frequencies still produce a
/// full-length buffer, only a non-positive duration or an empty tone set
/// produces an empty one.
pub fn synthesize(spec: &SignalSpec, duration_seconds: f64) -> Vec<f32> {
    let len = sample_count(spec.sample_rate, duration_seconds);
    let mut osc = Oscillator::new(spec);
    if len == 0 || osc.tone_count() == 0 {
        return Vec::new();
    }

    let mut buffer = vec![0.0f32; len];
    osc.fill(&mut buffer);
    buffer
}

/// Pure sine at [`SAMPLE_RATE`]
pub fn generate_tone(freq: f64, duration_seconds: f64) -> Vec<f32> {
    synthesize(&SignalSpec::tone(freq, SAMPLE_RATE), duration_seconds)
}

/// `tone_count` sines stacked [`DEFAULT_MULTI_TONE_SPREAD_HZ`] apart above
/// `base_freq`, each scaled by `1 / tone_count`.
pub fn generate_multi_tone(base_freq: f64, duration_seconds: f64, tone_count: usize) -> Vec<f32> {
    let spec = SignalSpec::multi_tone(
        base_freq,
        SAMPLE_RATE,
        tone_count,
        DEFAULT_MULTI_TONE_SPREAD_HZ,
    );
    synthesize(&spec, duration_seconds)
}

/// Linear sweep at [`SAMPLE_RATE`]
pub fn generate_sweep(start_freq: f64, end_freq: f64, duration_seconds: f64) -> Vec<f32> {
    sweep(start_freq, end_freq, SAMPLE_RATE, duration_seconds)
}

/// Linear frequency sweep from `start_freq` to `end_freq`.
///
/// The instantaneous frequency multiplies the sample index directly rather
/// than being integrated over time, so this is not a true chirp: the phase
/// jumps when the frequency changes quickly, which is audible on very short
/// buffers. With equal endpoints it reduces to a plain tone.
pub fn sweep(start_freq: f64, end_freq: f64, sample_rate: u32, duration_seconds: f64) -> Vec<f32> {
    let len = sample_count(sample_rate, duration_seconds);
    if len == 0 {
        return Vec::new();
    }

    let range = end_freq - start_freq;
    let last = (len - 1).max(1) as f64;
    let rate = sample_rate as f64;

    (0..len)
        .map(|i| {
            let progress = i as f64 / last;
            let freq = start_freq + range * progress;
            (TAU * freq * i as f64 / rate).sin() as f32
        })
        .collect()
}

/// Check that `freq` sits inside the ultrasonic band.
pub fn validate_frequency(freq: f64) -> Result<(), ValidationError> {
    if freq < 0.0 {
        return Err(ValidationError::Invalid(freq));
    }
    if !(MIN_FREQ..=MAX_FREQ).contains(&freq) {
        return Err(ValidationError::OutOfRange {
            freq,
            min: MIN_FREQ,
            max: MAX_FREQ,
        });
    }
    Ok(())
}

/// Whether looping a buffer of `duration_seconds` wraps without a click.
///
/// True only when every tone completes a whole number of cycles over the
/// buffer length.
pub fn loop_is_seamless(spec: &SignalSpec, duration_seconds: f64) -> bool {
    let len = sample_count(spec.sample_rate, duration_seconds);
    if len == 0 || spec.sample_rate == 0 {
        return false;
    }
    spec.resolved_frequencies().into_iter().all(|f| {
        let cycles = f * len as f64 / spec.sample_rate as f64;
        (cycles - cycles.round()).abs() < 1e-6
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_crossings(data: &[f32]) -> usize {
        data.windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    #[test]
    fn test_tone_length_and_range() {
        for (freq, duration) in [(25000.0, 1.0), (24000.0, 2.0), (1000.0, 1.0), (440.0, 1.0)] {
            let data = generate_tone(freq, duration);
            assert_eq!(data.len(), (SAMPLE_RATE as f64 * duration) as usize);
            assert!(data.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn test_fractional_durations_keep_exact_length() {
        assert_eq!(sample_count(44100, 0.7), 30870);
        assert_eq!(sample_count(44100, 0.35), 15435);
        assert_eq!(sample_count(44100, 1.13), 49833);
        // Not near a whole sample: still floors
        assert_eq!(sample_count(44100, 0.5 / 44100.0 + 0.001), 44);

        assert_eq!(generate_tone(25000.0, 0.7).len(), 30870);
        assert_eq!(generate_multi_tone(25000.0, 0.35, 3).len(), 15435);
        assert_eq!(generate_sweep(20000.0, 30000.0, 1.13).len(), 49833);
    }

    #[test]
    fn test_tone_starts_at_zero_phase() {
        for freq in [440.0, 1000.0, 23000.0, 29999.0] {
            assert!(generate_tone(freq, 0.5)[0].abs() < 1e-6);
        }
    }

    #[test]
    fn test_tone_frequency_from_zero_crossings() {
        let data = generate_tone(1000.0, 1.0);
        let estimated = zero_crossings(&data) as f64 / 2.0;
        assert!((estimated - 1000.0).abs() <= 1.0, "estimated {estimated} Hz");
    }

    #[test]
    fn test_tone_peaks() {
        let data = generate_tone(1000.0, 1.0);
        let max = data.iter().cloned().fold(f32::MIN, f32::max);
        let min = data.iter().cloned().fold(f32::MAX, f32::min);
        assert!((max - 1.0).abs() < 0.01);
        assert!((min + 1.0).abs() < 0.01);
    }

    #[test]
    fn test_non_positive_duration_is_empty() {
        for duration in [0.0, -1.0, f64::NAN] {
            assert!(generate_tone(25000.0, duration).is_empty());
            assert!(generate_multi_tone(25000.0, duration, 3).is_empty());
            assert!(generate_sweep(20000.0, 30000.0, duration).is_empty());
        }
    }

    #[test]
    fn test_degenerate_frequencies_still_synthesize() {
        for freq in [0.0, -100.0, 50000.0, 1e9] {
            let data = generate_tone(freq, 1.0);
            assert_eq!(data.len(), SAMPLE_RATE as usize);
            assert!(data.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn test_validate_frequency() {
        for freq in [-1000.0, 0.0, 15000.0, 35000.0] {
            assert!(validate_frequency(freq).is_err(), "{freq} should fail");
        }
        for freq in [20000.0, 20001.0, 25000.0, 29999.0, 30000.0] {
            assert!(validate_frequency(freq).is_ok(), "{freq} should pass");
        }
    }

    #[test]
    fn test_validate_frequency_error_kinds() {
        assert_eq!(
            validate_frequency(-1000.0),
            Err(ValidationError::Invalid(-1000.0))
        );
        assert!(matches!(
            validate_frequency(0.0),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate_frequency(35000.0),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_multi_tone() {
        assert!(generate_multi_tone(25000.0, 1.0, 0).is_empty());
        assert!(generate_multi_tone(25000.0, 0.0, 3).is_empty());

        let data = generate_multi_tone(25000.0, 1.0, 3);
        assert_eq!(data.len(), SAMPLE_RATE as usize);
        assert!(data.iter().all(|s| (-1.1..=1.1).contains(s)));
    }

    #[test]
    fn test_single_multi_tone_matches_tone() {
        let multi = generate_multi_tone(23000.0, 0.1, 1);
        let tone = generate_tone(23000.0, 0.1);
        assert_eq!(multi, tone);
    }

    #[test]
    fn test_flat_sweep_matches_tone() {
        for freq in [1000.0, 25000.0] {
            let sweep = generate_sweep(freq, freq, 1.0);
            let tone = generate_tone(freq, 1.0);
            assert_eq!(sweep.len(), tone.len());
            for (a, b) in sweep.iter().zip(&tone) {
                assert!((a - b).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_sweep_range_and_single_sample() {
        let data = generate_sweep(20000.0, 30000.0, 1.0);
        assert_eq!(data.len(), SAMPLE_RATE as usize);
        assert!(data.iter().all(|s| (-1.0..=1.0).contains(s)));

        // One sample: progress would be 0/0
        let data = sweep(20000.0, 30000.0, 10, 0.1);
        assert_eq!(data, vec![0.0]);
    }

    #[test]
    fn test_loop_is_seamless() {
        // 25 kHz over one second at 48 kHz is exactly 25000 cycles
        assert!(loop_is_seamless(&SignalSpec::tone(25000.0, 48000), 1.0));
        // 440 Hz over 10 ms is 4.4 cycles
        assert!(!loop_is_seamless(&SignalSpec::tone(440.0, 48000), 0.01));
        assert!(!loop_is_seamless(&SignalSpec::tone(25000.0, 48000), 0.0));
        // 30870 samples hold exactly 17500 cycles; one sample fewer would not
        assert!(loop_is_seamless(&SignalSpec::tone(25000.0, 44100), 0.7));
    }
}
