// Sample-level helpers for the capture pipeline

/// Root-mean-square of a block; 0 for an empty block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// round(clamp(s, -1, 1) * 32767)
pub fn to_pcm16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    (clamped * i16::MAX as f32).round() as i16
}

/// Encode a block as little-endian signed 16-bit PCM bytes
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| to_pcm16(s).to_le_bytes())
        .collect()
}

/// Visualizer fill fraction for a level, in [0, 1]
pub fn meter_fraction(level: f32, gain: f32) -> f32 {
    (level * gain).clamp(0.0, 1.0)
}
