//! SPSC ring-buffer protocol shared by the Fill, Completion, RX and TX rings.
//!
//! Each ring is a fixed-size circular buffer of `T` (either a UMEM frame address or an
//! [`XdpDesc`]) whose producer and consumer indices are each advanced by exactly one side: the
//! kernel, or us. [`Producer`] and [`Consumer`] are uninhabited marker types so that the two
//! disjoint method sets (`reserve`/`submit` vs. `peek`/`release`) can never both exist on the same
//! concrete ring type.

use core::marker::PhantomData;
use core::num::Wrapping;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Errno, LastErrno};
use crate::iface::SocketFd;
use crate::xdp::{XdpDesc, XdpRingOffsets};

/// An index into a ring's slot array, before masking.
///
/// Two `BufIdx` values from the same ring compare correctly under wraparound via
/// `wrapping_sub`; they are otherwise opaque handles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufIdx(pub u32);

impl BufIdx {
    fn advance(self, by: u32) -> Self {
        BufIdx(self.0.wrapping_add(by))
    }
}

/// Marker for the producer-role ring (Fill, TX on our side).
#[derive(Debug)]
pub enum Producer {}

/// Marker for the consumer-role ring (Completion, RX on our side).
#[derive(Debug)]
pub enum Consumer {}

// Keeps our own hot, frequently-mutated cache line away from whatever the caller embeds
// the ring inside of; the kernel-side atomics live in separately mmap'd kernel memory and need
// no help from us.
#[repr(align(64))]
#[derive(Debug, Default)]
struct CacheLine(Wrapping<u32>);

/// An SPSC ring mapped from kernel-owned memory.
///
/// `Role` is [`Producer`] or [`Consumer`] and selects which half of the protocol is available.
pub struct Ring<T, Role> {
    mask: u32,
    size: u32,
    producer: NonNull<AtomicU32>,
    consumer: NonNull<AtomicU32>,
    flags: NonNull<AtomicU32>,
    ring: NonNull<T>,
    /// Our own index on this ring: the producer index if `Role = Producer`, else the consumer
    /// index. Never touched by the kernel.
    cached_own: CacheLine,
    /// Our cached copy of the peer's index, refreshed with `Acquire` only when we believe we've
    /// run out of room.
    cached_peer: CacheLine,
    /// The mapping backing this ring, for `munmap` on drop. `None` for rings constructed over
    /// borrowed memory, e.g. in tests.
    mmap: Option<NonNull<[u8]>>,
    _role: PhantomData<Role>,
}

// Safety: the ring only exposes its producer-side or consumer-side methods depending on `Role`,
// and the underlying memory is intended to be shared with the kernel; sending the handle to
// another thread (while keeping single-writer discipline at the application level) is exactly how
// a dataplane agent is expected to hand a ring to the thread that owns it.
unsafe impl<T, Role> Send for Ring<T, Role> {}

impl<T, Role> Ring<T, Role> {
    /// Construct a ring view over already-mapped kernel memory.
    ///
    /// # Safety
    ///
    /// `base` must be valid for the lifetime of the returned `Ring`, large enough for `count`
    /// elements of `T` starting at `off.desc`, and `off` must be the offsets the kernel actually
    /// reported for this ring. `count` must be a power of two.
    unsafe fn new(base: NonNull<u8>, off: &XdpRingOffsets, count: u32, mmap: Option<NonNull<[u8]>>) -> Self {
        debug_assert!(count.is_power_of_two());
        let raw = base.as_ptr();
        let at = |delta: u64| unsafe { NonNull::new_unchecked(raw.add(delta as usize)) };

        let producer: NonNull<AtomicU32> = at(off.producer).cast();
        let consumer: NonNull<AtomicU32> = at(off.consumer).cast();
        let flags: NonNull<AtomicU32> = at(off.flags).cast();
        let ring: NonNull<T> = at(off.desc).cast();

        Ring {
            mask: count - 1,
            size: count,
            producer,
            consumer,
            flags,
            ring,
            cached_own: CacheLine(Wrapping(0)),
            cached_peer: CacheLine(Wrapping(0)),
            mmap,
            _role: PhantomData,
        }
    }

    unsafe fn mmap_ring(
        fd: &SocketFd,
        off: &XdpRingOffsets,
        count: u32,
        elem_size: u64,
        pgoff: libc::off_t,
    ) -> Result<Self, Errno> {
        let len = (off.desc + u64::from(count) * elem_size) as usize;

        let addr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd.as_raw_fd(),
                pgoff,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(LastErrno.into());
        }

        let slice = core::ptr::slice_from_raw_parts_mut(addr as *mut u8, len);
        // Safety: mmap succeeded, so this pointer is non-null and valid for `len` bytes.
        let slice = unsafe { NonNull::new_unchecked(slice) };
        let base: NonNull<u8> = slice.cast();

        Ok(unsafe { Self::new(base, off, count, Some(slice)) })
    }

    pub fn capacity(&self) -> u32 {
        self.size
    }

    fn slot_ptr(&self, idx: BufIdx) -> NonNull<T> {
        let offset = (idx.0 & self.mask) as usize;
        // Safety: `offset < size` by construction, and `ring` is valid for `size` elements.
        unsafe { NonNull::new_unchecked(self.ring.as_ptr().add(offset)) }
    }

    pub fn check_flags(&self) -> u32 {
        // Safety: `flags` points into the live kernel mapping for the lifetime of `self`.
        unsafe { self.flags.as_ref() }.load(Ordering::Relaxed)
    }
}

impl<T> Ring<T, Producer> {
    /// Map a producer-role ring (Fill or TX) from the kernel's reported offsets.
    ///
    /// # Safety
    /// See [`Ring::mmap_ring`]; `fd` and `off` must correspond to the same socket.
    pub(crate) unsafe fn map_producer(
        fd: &SocketFd,
        off: &XdpRingOffsets,
        count: u32,
        elem_size: u64,
        pgoff: libc::off_t,
    ) -> Result<Self, Errno> {
        let mut ring = unsafe { Self::mmap_ring(fd, off, count, elem_size, pgoff)? };
        ring.cached_own.0 = Wrapping(unsafe { ring.producer.as_ref() }.load(Ordering::Relaxed));
        ring.cached_peer.0 = Wrapping(unsafe { ring.consumer.as_ref() }.load(Ordering::Relaxed));
        Ok(ring)
    }

    /// Construct directly over caller-provided memory, for tests. `off` offsets are relative to
    /// `base`; `mask`ing and slot addressing behave identically to a real mmap'd ring.
    #[cfg(test)]
    pub(crate) unsafe fn from_parts_for_test(base: NonNull<u8>, off: &XdpRingOffsets, count: u32) -> Self {
        let mut ring = unsafe { Self::new(base, off, count, None) };
        ring.cached_own.0 = Wrapping(unsafe { ring.producer.as_ref() }.load(Ordering::Relaxed));
        ring.cached_peer.0 = Wrapping(unsafe { ring.consumer.as_ref() }.load(Ordering::Relaxed));
        ring
    }

    fn count_free(&mut self, want: u32) -> u32 {
        let free = (self.cached_peer.0 + Wrapping(self.size) - self.cached_own.0).0;
        if free >= want {
            return free;
        }

        self.cached_peer.0 = Wrapping(unsafe { self.consumer.as_ref() }.load(Ordering::Acquire));
        (self.cached_peer.0 + Wrapping(self.size) - self.cached_own.0).0
    }

    /// Reserve up to `want` slots. Returns the starting index and the number actually granted,
    /// `min(want, free)`, matching the kernel's own libxdp reservation convention.
    pub fn reserve(&mut self, want: u32) -> (BufIdx, u32) {
        let granted = self.count_free(want).min(want);
        let start = BufIdx(self.cached_own.0.0);
        self.cached_own.0 += Wrapping(granted);
        (start, granted)
    }

    /// Undo a previous `reserve` (or the unused tail of one); safe to call with 0.
    pub fn cancel(&mut self, n: u32) {
        self.cached_own.0 -= Wrapping(n);
    }

    /// Publish the first `n` reserved slots to the kernel.
    pub fn submit(&mut self, n: u32) {
        let cur = unsafe { self.producer.as_ref() }.load(Ordering::Relaxed);
        unsafe { self.producer.as_ref() }.store(cur.wrapping_add(n), Ordering::Release);
    }

    /// Pointer to a slot previously returned by `reserve`.
    ///
    /// # Safety
    /// `idx` must lie within the range most recently returned by `reserve` and not yet
    /// `submit`ted twice over.
    pub unsafe fn slot(&self, idx: BufIdx) -> NonNull<T> {
        self.slot_ptr(idx)
    }
}

impl<T> Ring<T, Consumer> {
    /// Map a consumer-role ring (Completion or RX) from the kernel's reported offsets.
    ///
    /// # Safety
    /// See [`Ring::mmap_ring`]; `fd` and `off` must correspond to the same socket.
    pub(crate) unsafe fn map_consumer(
        fd: &SocketFd,
        off: &XdpRingOffsets,
        count: u32,
        elem_size: u64,
        pgoff: libc::off_t,
    ) -> Result<Self, Errno> {
        let mut ring = unsafe { Self::mmap_ring(fd, off, count, elem_size, pgoff)? };
        ring.cached_own.0 = Wrapping(unsafe { ring.consumer.as_ref() }.load(Ordering::Relaxed));
        ring.cached_peer.0 = Wrapping(unsafe { ring.producer.as_ref() }.load(Ordering::Relaxed));
        Ok(ring)
    }

    #[cfg(test)]
    pub(crate) unsafe fn from_parts_for_test(base: NonNull<u8>, off: &XdpRingOffsets, count: u32) -> Self {
        let mut ring = unsafe { Self::new(base, off, count, None) };
        ring.cached_own.0 = Wrapping(unsafe { ring.consumer.as_ref() }.load(Ordering::Relaxed));
        ring.cached_peer.0 = Wrapping(unsafe { ring.producer.as_ref() }.load(Ordering::Relaxed));
        ring
    }

    fn count_available(&mut self, want: u32) -> u32 {
        let mut avail = (self.cached_peer.0 - self.cached_own.0).0;
        if avail == 0 {
            self.cached_peer.0 = Wrapping(unsafe { self.producer.as_ref() }.load(Ordering::Acquire));
            avail = (self.cached_peer.0 - self.cached_own.0).0;
        }
        avail.min(want)
    }

    /// Peek up to `want` available slots. Returns the starting index and the number actually
    /// available, which may be fewer than `want`.
    pub fn peek(&mut self, want: u32) -> (BufIdx, u32) {
        let count = self.count_available(want);
        if count == 0 {
            return (BufIdx(self.cached_own.0.0), 0);
        }

        let start = BufIdx(self.cached_own.0.0);
        self.cached_own.0 += Wrapping(count);
        (start, count)
    }

    /// Undo a previous `peek` (or the unused tail of one); safe to call with 0.
    pub fn cancel(&mut self, n: u32) {
        self.cached_own.0 -= Wrapping(n);
    }

    /// Return the first `n` peeked slots to the kernel.
    pub fn release(&mut self, n: u32) {
        let cur = unsafe { self.consumer.as_ref() }.load(Ordering::Relaxed);
        unsafe { self.consumer.as_ref() }.store(cur.wrapping_add(n), Ordering::Release);
    }

    /// Pointer to a slot previously returned by `peek`.
    ///
    /// # Safety
    /// `idx` must lie within the range most recently returned by `peek` and not yet released.
    pub unsafe fn slot(&self, idx: BufIdx) -> NonNull<T> {
        self.slot_ptr(idx)
    }
}

impl<T, Role> Drop for Ring<T, Role> {
    fn drop(&mut self) {
        if let Some(mmap) = self.mmap {
            let len = mmap.len();
            unsafe { libc::munmap(mmap.as_ptr() as *mut libc::c_void, len) };
        }
    }
}

pub(crate) type FillRing = Ring<u64, Producer>;
pub(crate) type CompletionRing = Ring<u64, Consumer>;
pub(crate) type TxRing = Ring<XdpDesc, Producer>;
pub(crate) type RxRing = Ring<XdpDesc, Consumer>;

/// Kernel page offsets used to select which ring an `mmap` call maps.
pub(crate) mod pgoff {
    pub const RX: libc::off_t = 0;
    pub const TX: libc::off_t = 0x8000_0000;
    pub const UMEM_FILL: libc::off_t = 0x1_0000_0000;
    pub const UMEM_COMPLETION: libc::off_t = 0x1_8000_0000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    // Lay out a ring by hand the way the kernel would: producer index, then consumer index (each
    // on its own cache line), then a flags word, then the slot array.
    fn offsets(count: u32, elem_size: u64) -> (XdpRingOffsets, usize) {
        let off = XdpRingOffsets {
            producer: 0,
            consumer: 64,
            flags: 128,
            desc: 256,
        };
        let len = 256 + (count as u64 * elem_size) as usize;
        (off, len)
    }

    #[test]
    fn producer_consumer_offsets_are_cache_line_apart() {
        let (off, _) = offsets(16, 8);
        assert!(off.consumer - off.producer >= 64);
    }

    #[test]
    fn ring_wraparound() {
        let (off, len) = offsets(16, 8);
        let mut mem = vec![0u8; len].into_boxed_slice();
        let base = NonNull::new(mem.as_mut_ptr()).unwrap();

        let mut prod: Ring<u64, Producer> = unsafe { Ring::from_parts_for_test(base, &off, 16) };
        let mut cons: Ring<u64, Consumer> = unsafe { Ring::from_parts_for_test(base, &off, 16) };

        let (start, got) = prod.reserve(10);
        assert_eq!(got, 10);
        for i in 0..10 {
            unsafe { *prod.slot(start.advance(i)).as_ptr() = i as u64 };
        }
        prod.submit(10);

        let (rstart, ravail) = cons.peek(10);
        assert_eq!(ravail, 10);
        for i in 0..10 {
            assert_eq!(unsafe { *cons.slot(rstart.advance(i)).as_ptr() }, i as u64);
        }
        cons.release(10);

        let (start2, got2) = prod.reserve(10);
        assert_eq!(got2, 10);
        prod.submit(10);
        let (_, ravail2) = cons.peek(10);
        assert_eq!(ravail2, 10);
        cons.release(10);

        // Final producer/consumer are both 20; masked that's index 4.
        assert_eq!(start2.0.wrapping_add(10), 20);

        core::mem::forget(mem);
    }

    #[test]
    fn reserve_caps_at_capacity() {
        let (off, len) = offsets(16, 8);
        let mut mem = vec![0u8; len].into_boxed_slice();
        let base = NonNull::new(mem.as_mut_ptr()).unwrap();
        let mut prod: Ring<u64, Producer> = unsafe { Ring::from_parts_for_test(base, &off, 16) };

        let (_, got) = prod.reserve(32);
        assert_eq!(got, 16, "ring of size 16 can grant at most its own capacity, not the full ask");

        core::mem::forget(mem);
    }

    #[test]
    fn cancel_rolls_back_reservation() {
        let (off, len) = offsets(16, 8);
        let mut mem = vec![0u8; len].into_boxed_slice();
        let base = NonNull::new(mem.as_mut_ptr()).unwrap();
        let mut prod: Ring<u64, Producer> = unsafe { Ring::from_parts_for_test(base, &off, 16) };

        let (_, got) = prod.reserve(8);
        assert_eq!(got, 8);
        prod.cancel(8);
        let (_, got2) = prod.reserve(16);
        assert_eq!(got2, 16, "cancelling a reservation must free its slots back up");

        core::mem::forget(mem);
    }
}
