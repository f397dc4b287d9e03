//! Audio format utilities.
//!
//! Everything in the mix path is 32-bit float, packed, native-endian,
//! interleaved stereo - the format the virtual endpoints advertise. This
//! module provides the byte-buffer conversions used at the plugin boundary
//! (the OS hands raw byte buffers) and shared frame math.

mod resample;

pub use resample::StereoResampler;

/// Bytes per sample (32-bit float).
pub const BYTES_PER_SAMPLE: usize = 4;

/// Channel count for all endpoints and buses (fixed stereo).
pub const CHANNELS: usize = 2;

/// Bytes per interleaved stereo frame.
pub const BYTES_PER_FRAME: usize = BYTES_PER_SAMPLE * CHANNELS;

/// Converts interleaved f32 samples to a packed native-endian byte buffer.
///
/// This is the layout applications write to a virtual endpoint's output
/// stream.
pub fn samples_to_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &s in samples {
        bytes.extend_from_slice(&s.to_ne_bytes());
    }
    bytes
}

/// Converts a packed native-endian byte buffer back to f32 samples.
///
/// A trailing partial sample (fewer than 4 bytes) is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / BYTES_PER_SAMPLE);
    bytes_to_samples_into(bytes, &mut samples);
    samples
}

/// Decodes bytes into an existing sample buffer, replacing its contents.
///
/// Used on the loopback pump path so the scratch buffer is reused instead
/// of reallocated every cycle.
pub fn bytes_to_samples_into(bytes: &[u8], out: &mut Vec<f32>) {
    out.clear();
    for chunk in bytes.chunks_exact(BYTES_PER_SAMPLE) {
        // chunks_exact guarantees 4 bytes
        out.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}

/// Converts a linear amplitude to dBFS.
///
/// Silence maps to the floor value of -120 dB.
pub fn lin_to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        -120.0
    }
}

/// Converts a dBFS value to linear amplitude.
pub fn db_to_lin(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
