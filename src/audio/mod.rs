//! Audio subsystem module

pub mod buffer;
pub mod device;
pub mod mixer;
pub mod session;

pub use buffer::{create_shared_buffer, SharedBuffer, SharedFrameBuffer};
pub use device::{DeviceDescriptor, DeviceRegistry};
pub use mixer::{duplex_pipeline, ClipMode, MixConfig, PipelineStats, StatsSnapshot, ToneLoop};
pub use session::{JamSession, SessionMode};
