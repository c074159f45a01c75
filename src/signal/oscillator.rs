//! Phase-continuous multi-tone sine oscillator
//!
//! Every tone keeps its own phase accumulator, so consecutive calls to
//! [`Oscillator::fill`] produce one seamless waveform. The render callback
//! owns the oscillator outright; nothing else advances it.

use std::f64::consts::TAU;

use crate::error::ValidationError;
use crate::signal::generator::validate_frequency;

/// Description of the tone set to synthesize
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    /// Base frequencies in Hz, in order
    pub frequencies: Vec<f64>,
    /// Samples per second
    pub sample_rate: u32,
    /// Tones stacked above each base frequency (including the base)
    pub tone_count: usize,
    /// Spacing between stacked tones in Hz
    pub spread_hz: f64,
}

impl SignalSpec {
    /// A single pure tone
    pub fn tone(frequency: f64, sample_rate: u32) -> Self {
        Self {
            frequencies: vec![frequency],
            sample_rate,
            tone_count: 1,
            spread_hz: 0.0,
        }
    }

    /// `tone_count` tones starting at `base`, `spread_hz` apart
    pub fn multi_tone(base: f64, sample_rate: u32, tone_count: usize, spread_hz: f64) -> Self {
        Self {
            frequencies: vec![base],
            sample_rate,
            tone_count,
            spread_hz,
        }
    }

    /// Every tone frequency this spec expands to.
    ///
    /// Tone `h` (1-indexed) above base `f` sits at `f + (h - 1) * spread_hz`.
    pub fn resolved_frequencies(&self) -> Vec<f64> {
        self.frequencies
            .iter()
            .flat_map(|&base| (0..self.tone_count).map(move |h| base + h as f64 * self.spread_hz))
            .collect()
    }

    /// Check every resolved tone against the ultrasonic band.
    ///
    /// Returns the first failure. Synthesis never calls this.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.resolved_frequencies()
            .into_iter()
            .try_for_each(validate_frequency)
    }

    /// Tones at or above the Nyquist limit, which will alias.
    pub fn aliasing_tones(&self) -> Vec<f64> {
        let nyquist = self.sample_rate as f64 / 2.0;
        self.resolved_frequencies()
            .into_iter()
            .filter(|f| f.abs() >= nyquist)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Tone {
    frequency: f64,
    phase: f64,
    increment: f64,
}

impl Tone {
    fn new(frequency: f64, sample_rate: u32) -> Self {
        let increment = if sample_rate == 0 {
            0.0
        } else {
            TAU * frequency / sample_rate as f64
        };
        Self {
            frequency,
            phase: 0.0,
            increment,
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.phase += self.increment;
        if !(0.0..TAU).contains(&self.phase) {
            self.phase = self.phase.rem_euclid(TAU);
        }
    }
}

/// Sine oscillator over one or more superposed tones
#[derive(Debug, Clone)]
pub struct Oscillator {
    tones: Vec<Tone>,
    /// Per-tone scale, `1 / tones.len()`
    scale: f64,
}

impl Oscillator {
    /// Allocates the phase accumulators; nothing allocates after this.
    pub fn new(spec: &SignalSpec) -> Self {
        let tones: Vec<Tone> = spec
            .resolved_frequencies()
            .into_iter()
            .map(|f| Tone::new(f, spec.sample_rate))
            .collect();
        let scale = if tones.is_empty() {
            0.0
        } else {
            1.0 / tones.len() as f64
        };
        Self { tones, scale }
    }

    /// Number of superposed tones
    pub fn tone_count(&self) -> usize {
        self.tones.len()
    }

    /// Tone frequencies in Hz, in resolution order
    pub fn frequencies(&self) -> Vec<f64> {
        self.tones.iter().map(|t| t.frequency).collect()
    }

    /// Produce the current sample and advance every phase by one step.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let mut acc = 0.0;
        for tone in &mut self.tones {
            acc += tone.phase.sin();
            tone.advance();
        }
        (acc * self.scale) as f32
    }

    /// Fill a mono buffer.
    pub fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }

    /// Fill an interleaved buffer, one oscillator step per frame so every
    /// channel carries the same phase.
    pub fn fill_interleaved(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let sample = self.next_sample();
            frame.fill(sample);
        }
    }

    /// Rewind every tone to phase zero.
    pub fn reset(&mut self) {
        for tone in &mut self.tones {
            tone.phase = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_frequencies() {
        let spec = SignalSpec::multi_tone(23000.0, 48000, 3, 300.0);
        assert_eq!(spec.resolved_frequencies(), vec![23000.0, 23300.0, 23600.0]);

        let spec = SignalSpec {
            frequencies: vec![21000.0, 25000.0],
            sample_rate: 48000,
            tone_count: 2,
            spread_hz: 100.0,
        };
        assert_eq!(
            spec.resolved_frequencies(),
            vec![21000.0, 21100.0, 25000.0, 25100.0]
        );
        assert_eq!(Oscillator::new(&spec).frequencies(), spec.resolved_frequencies());
    }

    #[test]
    fn test_validate_rejects_any_tone_out_of_band() {
        assert!(SignalSpec::multi_tone(25000.0, 96000, 3, 300.0).validate().is_ok());

        // Tones at 30000, 30300, 30600; the second one leaves the band
        let spec = SignalSpec::multi_tone(30000.0, 96000, 3, 300.0);
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::OutOfRange { freq, .. }) if freq == 30300.0
        ));
    }

    #[test]
    fn test_aliasing_tones() {
        let spec = SignalSpec::multi_tone(23500.0, 48000, 3, 300.0);
        assert_eq!(spec.aliasing_tones(), vec![24100.0]);
        assert!(SignalSpec::tone(23000.0, 96000).aliasing_tones().is_empty());
    }

    #[test]
    fn test_phase_continuity_across_calls() {
        let spec = SignalSpec::multi_tone(23000.0, 48000, 3, 300.0);

        let mut whole = vec![0.0f32; 1000];
        Oscillator::new(&spec).fill(&mut whole);

        let mut osc = Oscillator::new(&spec);
        let mut first = vec![0.0f32; 377];
        let mut second = vec![0.0f32; 623];
        osc.fill(&mut first);
        osc.fill(&mut second);

        let joined: Vec<f32> = first.into_iter().chain(second).collect();
        for (a, b) in whole.iter().zip(&joined) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_interleaved_channels_are_phase_locked() {
        let spec = SignalSpec::tone(1000.0, 44100);
        let mut osc = Oscillator::new(&spec);
        let mut out = vec![0.0f32; 64 * 2];
        osc.fill_interleaved(&mut out, 2);

        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }

        // 64 frames consumed 64 steps, not 128
        let mut mono = vec![0.0f32; 65];
        Oscillator::new(&spec).fill(&mut mono);
        assert!((osc.next_sample() - mono[64]).abs() < 1e-6);
    }

    #[test]
    fn test_reset_restarts_at_zero_phase() {
        let mut osc = Oscillator::new(&SignalSpec::tone(25000.0, 48000));
        for _ in 0..100 {
            osc.next_sample();
        }
        osc.reset();
        assert!(osc.next_sample().abs() < 1e-6);
    }

    #[test]
    fn test_empty_tone_set_is_silent() {
        let mut osc = Oscillator::new(&SignalSpec::multi_tone(25000.0, 48000, 0, 100.0));
        assert_eq!(osc.tone_count(), 0);
        assert_eq!(osc.next_sample(), 0.0);
    }

    #[test]
    fn test_negative_frequency_stays_in_range() {
        let mut osc = Oscillator::new(&SignalSpec::tone(-100.0, 44100));
        let mut out = vec![0.0f32; 44100];
        osc.fill(&mut out);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }
}
