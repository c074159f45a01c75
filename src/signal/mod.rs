//! Ultrasonic signal synthesis

pub mod generator;
pub mod oscillator;

pub use generator::{
    generate_multi_tone, generate_sweep, generate_tone, loop_is_seamless, synthesize,
    validate_frequency,
};
pub use oscillator::{Oscillator, SignalSpec};
