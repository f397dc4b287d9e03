//! Lock-free loopback ring buffer.
//!
//! A single-producer/single-consumer byte ring shared between a virtual
//! endpoint's output-write handler (producer, one real-time thread) and its
//! input-read handler (consumer, another real-time thread). Both operations
//! are wait-free: a full ring drops the tail of the write, an empty ring
//! delivers zeroed silence and counts an underrun.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default ring capacity: five seconds at 48 kHz stereo f32.
pub const DEFAULT_RING_CAPACITY: usize = 48_000 * 5 * 8;

/// A fixed-capacity SPSC byte ring with monotonic positions.
///
/// Positions are unsigned counters that only ever increase; the byte index
/// is `pos % capacity`. `used = write_pos - read_pos` holds under unsigned
/// wraparound, and a computed `used` exceeding the capacity (a bug or
/// out-of-order publication) is treated as zero so the next full write
/// cycle recovers the invariant instead of panicking.
///
/// # Safety
///
/// `write` must be called from at most one thread at a time, and `read`
/// from at most one thread at a time; the two may run concurrently. The
/// release store on `write_pos` publishes written bytes to the acquire load
/// in `read`, and symmetrically for `read_pos`, so the regions touched by
/// the two sides never overlap. `clear` is only called on IO start/stop
/// transitions, when the host guarantees no IO callbacks are in flight.
pub struct LoopbackRing {
    buf: UnsafeCell<Box<[u8]>>,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
    underruns: AtomicU64,
    capacity: usize,
}

// The raw buffer is only touched through the SPSC protocol described above.
unsafe impl Send for LoopbackRing {}
unsafe impl Sync for LoopbackRing {}

impl LoopbackRing {
    /// Creates a zeroed ring with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            capacity,
        }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently readable.
    pub fn used(&self) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let rp = self.read_pos.load(Ordering::Acquire);
        let used = wp.wrapping_sub(rp);
        if used > self.capacity as u64 {
            0
        } else {
            used as usize
        }
    }

    /// Number of reads that returned no real data while asking for some.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Writes up to the available space; the tail that doesn't fit is
    /// dropped. Returns the number of bytes written.
    pub fn write(&self, src: &[u8]) -> usize {
        let wp = self.write_pos.load(Ordering::Relaxed);
        let rp = self.read_pos.load(Ordering::Acquire);

        let mut used = wp.wrapping_sub(rp);
        if used > self.capacity as u64 {
            used = 0;
        }
        let space = self.capacity - used as usize;
        let to_write = src.len().min(space);
        if to_write == 0 {
            return 0;
        }

        let idx = (wp % self.capacity as u64) as usize;
        let first = to_write.min(self.capacity - idx);
        unsafe {
            let base = (*self.buf.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(idx), first);
            if to_write > first {
                std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, to_write - first);
            }
        }

        self.write_pos
            .store(wp.wrapping_add(to_write as u64), Ordering::Release);
        to_write
    }

    /// Reads up to `dst.len()` bytes and zero-fills the remainder.
    ///
    /// Returns the number of real bytes delivered. A read that delivers
    /// nothing while asking for more than zero bytes increments the
    /// underrun counter.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let rp = self.read_pos.load(Ordering::Relaxed);

        let mut available = wp.wrapping_sub(rp);
        if available > self.capacity as u64 {
            available = 0;
        }
        let to_read = dst.len().min(available as usize);

        if to_read > 0 {
            let idx = (rp % self.capacity as u64) as usize;
            let first = to_read.min(self.capacity - idx);
            unsafe {
                let base = (*self.buf.get()).as_ptr();
                std::ptr::copy_nonoverlapping(base.add(idx), dst.as_mut_ptr(), first);
                if to_read > first {
                    std::ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(first), to_read - first);
                }
            }
            self.read_pos
                .store(rp.wrapping_add(to_read as u64), Ordering::Release);
        }

        if to_read < dst.len() {
            dst[to_read..].fill(0);
            if to_read == 0 && !dst.is_empty() {
                self.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }

        to_read
    }

    /// Resets positions and the underrun counter and zeroes the storage so
    /// a new IO session never replays stale audio.
    pub fn clear(&self) {
        self.write_pos.store(0, Ordering::Relaxed);
        self.read_pos.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        unsafe {
            let base = (*self.buf.get()).as_mut_ptr();
            std::ptr::write_bytes(base, 0, self.capacity);
        }
    }

    /// Forces raw positions, bypassing the SPSC protocol (test only).
    #[cfg(test)]
    fn force_positions(&self, write_pos: u64, read_pos: u64) {
        self.write_pos.store(write_pos, Ordering::SeqCst);
        self.read_pos.store(read_pos, Ordering::SeqCst);
    }
}
