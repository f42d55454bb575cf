// Block assembly for the capture pipeline
//
// Devices deliver callbacks of arbitrary length, channel count and rate. The
// assembler downmixes to mono, resamples to the service rate and cuts the
// stream into fixed-size blocks, so every block the session sees has exactly
// `block_size` samples.

use super::input::AudioBlock;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
#[cfg(feature = "high-quality-audio")]
use tracing::warn;

pub struct BlockAssembler {
    channels: usize,
    output_rate: u32,
    block_size: usize,
    resampler: StreamResampler,
    pending: Vec<f32>,
    emitted_samples: u64,
}

impl BlockAssembler {
    pub fn new(input_rate: u32, channels: u16, output_rate: u32, block_size: usize) -> Self {
        Self {
            channels: usize::from(channels.max(1)),
            output_rate,
            block_size: block_size.max(1),
            resampler: StreamResampler::new(input_rate, output_rate),
            pending: Vec::with_capacity(block_size * 2),
            emitted_samples: 0,
        }
    }

    /// Feed interleaved samples; returns every block completed by this call
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<AudioBlock> {
        let mono = downmix(interleaved, self.channels);
        self.resampler.process(&mono, &mut self.pending);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            let timestamp_ms = self.emitted_samples * 1000 / u64::from(self.output_rate.max(1));
            self.emitted_samples += samples.len() as u64;
            blocks.push(AudioBlock {
                samples,
                timestamp_ms,
            });
        }
        blocks
    }
}

/// Average interleaved channels into mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Rate converter used by the assembler.
///
/// With the `high-quality-audio` feature a band-limited sinc resampler is
/// used whenever the rates differ; otherwise (or if it cannot be built)
/// linear interpolation.
enum StreamResampler {
    Linear(LinearResampler),
    #[cfg(feature = "high-quality-audio")]
    Sinc(SincResampler),
}

impl StreamResampler {
    fn new(input_rate: u32, output_rate: u32) -> Self {
        #[cfg(feature = "high-quality-audio")]
        {
            if input_rate != output_rate {
                match SincResampler::new(input_rate, output_rate) {
                    Ok(sinc) => return StreamResampler::Sinc(sinc),
                    Err(e) => warn!("{:#}; falling back to linear resampling", e),
                }
            }
        }
        StreamResampler::Linear(LinearResampler::new(input_rate, output_rate))
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        match self {
            StreamResampler::Linear(linear) => linear.process(input, out),
            #[cfg(feature = "high-quality-audio")]
            StreamResampler::Sinc(sinc) => sinc.process(input, out),
        }
    }
}

/// Streaming sinc resampler fed in the fixed chunks rubato expects
#[cfg(feature = "high-quality-audio")]
struct SincResampler {
    inner: SincFixedIn<f32>,
    pending: Vec<f32>,
}

#[cfg(feature = "high-quality-audio")]
impl SincResampler {
    const CHUNK: usize = 256;

    fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(anyhow!("cannot resample {}Hz to {}Hz", input_rate, output_rate));
        }
        let ratio = f64::from(output_rate) / f64::from(input_rate);
        let params = InterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.90,
            interpolation: InterpolationType::Cubic,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedIn::<f32>::new(ratio, 1.1, params, Self::CHUNK, 1)
            .map_err(|e| anyhow!("failed to build sinc resampler: {:?}", e))?;
        Ok(Self {
            inner,
            pending: Vec::with_capacity(Self::CHUNK * 2),
        })
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        self.pending.extend_from_slice(input);
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match self.inner.process(std::slice::from_ref(&chunk), None) {
                Ok(produced) => {
                    if let Some(channel) = produced.first() {
                        out.extend_from_slice(channel);
                    }
                }
                Err(e) => warn!("Resampler dropped {} samples: {:?}", needed, e),
            }
        }
    }
}

/// Streaming linear-interpolation resampler
struct LinearResampler {
    step: f64,
    /// Read position relative to the start of the next input chunk; -1 is `prev`
    position: f64,
    prev: f32,
}

impl LinearResampler {
    fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            step: f64::from(input_rate.max(1)) / f64::from(output_rate.max(1)),
            position: 0.0,
            prev: 0.0,
        }
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        if (self.step - 1.0).abs() < f64::EPSILON {
            out.extend_from_slice(input);
            return;
        }

        let last_index = (input.len() - 1) as f64;
        while self.position < last_index {
            let base = self.position.floor();
            let frac = (self.position - base) as f32;
            let i = base as isize;
            let a = if i < 0 { self.prev } else { input[i as usize] };
            let b = input[(i + 1) as usize];
            out.push(a + (b - a) * frac);
            self.position += self.step;
        }

        self.position -= input.len() as f64;
        self.prev = input[input.len() - 1];
    }
}
