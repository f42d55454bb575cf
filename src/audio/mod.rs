pub mod block;
pub mod clip;
pub mod cpal_input;
pub mod input;
pub mod output;
pub mod pcm;
pub mod rodio_output;

pub use block::BlockAssembler;
pub use clip::DecodedClip;
pub use cpal_input::CpalInput;
pub use input::{AudioBlock, AudioInput, AudioInputConfig};
pub use output::{AudioOutput, PlaybackCallback, PlaybackHandle, PlaybackOutcome};
pub use pcm::{encode_pcm16, meter_fraction, rms, to_pcm16};
pub use rodio_output::RodioOutput;
