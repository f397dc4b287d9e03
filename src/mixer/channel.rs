//! Mixer input channel.
//!
//! One instance per (bus, virtual endpoint) pair, split across the two
//! real-time threads that touch it: the [`ChannelTap`] runs on the source
//! endpoint's input callback and deposits audio into the channel ring, the
//! [`ChannelSlot`] runs on the bus sink's render callback and drains it.
//! Everything the two sides share lives in [`ChannelControls`] as atomics.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

use crate::format::StereoResampler;
use crate::meter::monotonic_ns;

/// Activity threshold, roughly -60 dBFS.
pub(crate) const ACTIVITY_THRESHOLD: f32 = 0.001;

/// Channel ring capacity in seconds of audio at the source rate.
const CHANNEL_BUFFER_SECS: usize = 10;

/// Largest render block the slot scratch buffers are sized for. Blocks
/// beyond this are clamped rather than allocated for mid-callback.
pub(crate) const MAX_RENDER_FRAMES: usize = 8192;

/// Atomic state shared between a channel's two real-time sides and the
/// control plane.
///
/// Gains are f32 bit patterns in `AtomicU32`; all accesses are relaxed -
/// a gain change simply takes effect at the next render cycle.
pub struct ChannelControls {
    gain_bits: AtomicU32,
    muted: AtomicBool,
    enabled: AtomicBool,
    peak_bits: AtomicU32,
    rms_bits: AtomicU32,
    last_activity_ns: AtomicU64,
    underruns: AtomicU64,
}

impl ChannelControls {
    /// Creates controls with the given initial fader state.
    pub fn new(gain: f32, muted: bool, enabled: bool) -> Self {
        Self {
            gain_bits: AtomicU32::new(gain.clamp(0.0, 1.0).to_bits()),
            muted: AtomicBool::new(muted),
            enabled: AtomicBool::new(enabled),
            peak_bits: AtomicU32::new(0),
            rms_bits: AtomicU32::new(0),
            last_activity_ns: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    /// The configured gain in `[0, 1]`.
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Sets the gain, clamped to `[0, 1]`.
    pub fn set_gain(&self, gain: f32) {
        self.gain_bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Whether the channel is muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Sets the mute flag.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Whether the channel participates in its bus.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Sets the membership flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// The gain the render path applies: zero when muted.
    pub fn effective_gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.gain()
        }
    }

    /// Peak of the most recent ingest buffer.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    /// RMS of the most recent ingest buffer.
    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms_bits.load(Ordering::Relaxed))
    }

    /// Monotonic timestamp of the last above-threshold sample.
    pub fn last_activity_ns(&self) -> u64 {
        self.last_activity_ns.load(Ordering::Relaxed)
    }

    /// Render-side underruns since the channel started.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn store_levels(&self, peak: f32, rms: f32) {
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        self.rms_bits.store(rms.to_bits(), Ordering::Relaxed);
    }

    fn stamp_activity(&self) {
        self.last_activity_ns
            .store(monotonic_ns(), Ordering::Relaxed);
    }

    fn count_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer side of an input channel.
///
/// Driven by the source endpoint's input callback: copies the incoming
/// samples into the channel ring and meters them in the same pass.
pub struct ChannelTap {
    producer: ringbuf::HeapProd<f32>,
    controls: Arc<ChannelControls>,
}

impl ChannelTap {
    /// Deposits one callback buffer and updates peak/RMS/activity.
    ///
    /// If the ring is full the excess is dropped; keeping up is the render
    /// side's job and in steady state it does.
    pub fn ingest(&mut self, samples: &[f32]) {
        let _ = self.producer.push_slice(samples);

        if samples.is_empty() {
            return;
        }
        let mut peak: f32 = 0.0;
        let mut sum_squares: f64 = 0.0;
        for &s in samples {
            let abs = s.abs();
            if abs > peak {
                peak = abs;
            }
            sum_squares += f64::from(s) * f64::from(s);
        }
        let rms = (sum_squares / samples.len() as f64).sqrt() as f32;

        self.controls.store_levels(peak, rms);
        if peak > ACTIVITY_THRESHOLD {
            self.controls.stamp_activity();
        }
    }
}

/// Consumer side of an input channel.
///
/// Driven by the bus sink's render callback: fetches exactly the requested
/// frames, resampling when source and sink rates differ, zero-filling any
/// shortfall.
pub struct ChannelSlot {
    consumer: ringbuf::HeapCons<f32>,
    resampler: Option<StereoResampler>,
    controls: Arc<ChannelControls>,
    gain_override: Option<f32>,
    /// Reused input scratch for the resampling path.
    in_buf: Vec<f32>,
}

impl ChannelSlot {
    /// Shared controls for this channel instance.
    pub fn controls(&self) -> &Arc<ChannelControls> {
        &self.controls
    }

    /// The per-bus gain override, if configured.
    pub fn gain_override(&self) -> Option<f32> {
        self.gain_override
    }

    /// Fills `out` (interleaved stereo) with the next block of channel
    /// audio at the sink rate. Returns the number of source frames that
    /// carried real data.
    pub fn fetch(&mut self, out: &mut [f32]) -> usize {
        let out_frames = out.len() / 2;
        if out_frames == 0 {
            return 0;
        }

        match &mut self.resampler {
            Some(rs) => {
                let need = rs
                    .required_input_frames(out_frames)
                    .min(self.in_buf.len() / 2);
                let available = self.consumer.occupied_len() / 2;
                let take = need.min(available);
                let taken = self.consumer.pop_slice(&mut self.in_buf[..take * 2]) / 2;
                if taken == 0 {
                    self.controls.count_underrun();
                }
                rs.process(&self.in_buf[..taken * 2], out);
                taken
            }
            None => {
                let n = self.consumer.pop_slice(out);
                out[n..].fill(0.0);
                if n == 0 {
                    self.controls.count_underrun();
                }
                n / 2
            }
        }
    }
}

/// Creates the two halves of an input channel.
///
/// The ring is sized for ten seconds of audio at the source rate; a
/// resampler is installed only when source and sink rates differ.
pub fn channel_pair(
    controls: Arc<ChannelControls>,
    source_rate: u32,
    sink_rate: u32,
    gain_override: Option<f32>,
) -> (ChannelTap, ChannelSlot) {
    let capacity = source_rate as usize * CHANNEL_BUFFER_SECS * 2;
    let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

    let resampler = if source_rate == sink_rate {
        None
    } else {
        Some(StereoResampler::new(source_rate, sink_rate))
    };
    let in_capacity_frames = match &resampler {
        Some(rs) => rs.required_input_frames(MAX_RENDER_FRAMES),
        None => 0,
    };

    (
        ChannelTap {
            producer,
            controls: Arc::clone(&controls),
        },
        ChannelSlot {
            consumer,
            resampler,
            controls,
            gain_override,
            in_buf: vec![0.0; in_capacity_frames * 2],
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(source_rate: u32, sink_rate: u32) -> (ChannelTap, ChannelSlot, Arc<ChannelControls>) {
        let controls = Arc::new(ChannelControls::new(1.0, false, true));
        let (tap, slot) = channel_pair(Arc::clone(&controls), source_rate, sink_rate, None);
        (tap, slot, controls)
    }

    #[test]
    fn test_controls_gain_clamps() {
        let c = ChannelControls::new(2.0, false, true);
        assert_eq!(c.gain(), 1.0);
        c.set_gain(-0.5);
        assert_eq!(c.gain(), 0.0);
        c.set_gain(0.42);
        assert!((c.gain() - 0.42).abs() < 1e-6);
    }

    #[test]
    fn test_effective_gain_zero_when_muted() {
        let c = ChannelControls::new(0.8, false, true);
        assert!((c.effective_gain() - 0.8).abs() < 1e-6);
        c.set_muted(true);
        assert_eq!(c.effective_gain(), 0.0);
        c.set_muted(false);
        assert!((c.effective_gain() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_ingest_then_fetch_round_trip() {
        let (mut tap, mut slot, _) = pair(48_000, 48_000);
        let samples: Vec<f32> = (0..128).map(|i| i as f32 * 0.001).collect();
        tap.ingest(&samples);

        let mut out = vec![9.0f32; 128];
        assert_eq!(slot.fetch(&mut out), 64);
        assert_eq!(out, samples);
    }

    #[test]
    fn test_fetch_zero_fills_on_underrun() {
        let (_tap, mut slot, controls) = pair(48_000, 48_000);
        let mut out = vec![9.0f32; 64];
        assert_eq!(slot.fetch(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(controls.underruns(), 1);
    }

    #[test]
    fn test_short_fetch_is_not_an_underrun() {
        let (mut tap, mut slot, controls) = pair(48_000, 48_000);
        tap.ingest(&[0.5f32; 16]);
        let mut out = vec![9.0f32; 64];
        assert_eq!(slot.fetch(&mut out), 8);
        assert!(out[..16].iter().all(|&s| s == 0.5));
        assert!(out[16..].iter().all(|&s| s == 0.0));
        assert_eq!(controls.underruns(), 0);
    }

    #[test]
    fn test_ingest_updates_peak_and_rms() {
        let (mut tap, _slot, controls) = pair(48_000, 48_000);
        tap.ingest(&[0.5f32, -0.25, 0.1, -0.1]);
        assert!((controls.peak() - 0.5).abs() < 1e-6);
        let expected_rms =
            ((0.5f64 * 0.5 + 0.25 * 0.25 + 0.01 + 0.01) / 4.0).sqrt() as f32;
        assert!((controls.rms() - expected_rms).abs() < 1e-6);
    }

    #[test]
    fn test_ingest_stamps_activity_above_threshold() {
        let (mut tap, _slot, controls) = pair(48_000, 48_000);
        assert_eq!(controls.last_activity_ns(), 0);

        // Below -60 dBFS: no stamp.
        tap.ingest(&[0.0005f32; 32]);
        assert_eq!(controls.last_activity_ns(), 0);

        // Above threshold: stamped.
        tap.ingest(&[0.01f32; 32]);
        assert!(controls.last_activity_ns() > 0);
    }

    #[test]
    fn test_resampling_fetch_produces_requested_frames() {
        let (mut tap, mut slot, _) = pair(44_100, 48_000);
        // Feed half a second of a constant signal.
        tap.ingest(&vec![0.25f32; 44_100]);

        let mut out = vec![0.0f32; 512 * 2];
        let consumed = slot.fetch(&mut out);
        assert!(consumed > 0);
        // After the initial carried-silence frame, output holds the level.
        assert!(out[20..].iter().all(|&s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn test_resampling_fetch_underrun_is_silence() {
        let (mut tap, mut slot, controls) = pair(44_100, 48_000);
        // Real audio first, so a holdover of the last frame would show.
        tap.ingest(&[0.5f32; 443 * 2]);
        let mut out = vec![0.0f32; 480 * 2];
        slot.fetch(&mut out);
        assert!(out[20..].iter().all(|&s| (s - 0.5).abs() < 1e-3));
        assert_eq!(controls.underruns(), 0);

        // Total ring underrun: the block is zeroed silence and counted.
        let mut starved = vec![9.0f32; 480 * 2];
        assert_eq!(slot.fetch(&mut starved), 0);
        assert!(starved.iter().all(|&s| s == 0.0));
        assert_eq!(controls.underruns(), 1);
    }

    #[test]
    fn test_resampling_leaves_surplus_queued() {
        let (mut tap, mut slot, _) = pair(44_100, 48_000);
        tap.ingest(&vec![0.1f32; 4410 * 2]); // 4410 frames

        let mut out = vec![0.0f32; 480 * 2];
        let consumed = slot.fetch(&mut out);
        // Only the required block is drained, not the whole ring.
        assert!(consumed <= 480);
    }
}
