//! The bound XDP socket: staged bring-up and the batched RX/TX dataplane.

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::batch::{Packet, PacketBatch};
use crate::control::IfCtx;
use crate::error::{Errno, LastErrno, XdpError};
use crate::iface::{fetch_statistics, IfInfo, SocketMmapOffsets};
use crate::ring::{pgoff, BufIdx, CompletionRing, FillRing, RxRing, TxRing};
use crate::sockopt;
use crate::umem::Umem;
use crate::xdp::{SockAddrXdp, XdpDesc, XdpStatisticsV2};

/// Per-ring sizes and bind-time flags. Ring sizes must be a power of two, as required by the
/// kernel.
#[derive(Debug, Clone, Copy)]
pub struct SocketConfig {
    pub rx_size: NonZeroU32,
    pub tx_size: NonZeroU32,
    /// Raw bind flags: any combination of `XDP_COPY`, `XDP_ZEROCOPY`, `XDP_USE_NEED_WAKEUP`
    /// (`XDP_SHARED_UMEM` is accepted but unexercised by this crate).
    pub bind_flags: u16,
}

impl Default for SocketConfig {
    fn default() -> Self {
        const DEFAULT_RING_SIZE: u32 = 2048;
        SocketConfig {
            rx_size: NonZeroU32::new(DEFAULT_RING_SIZE).unwrap(),
            tx_size: NonZeroU32::new(DEFAULT_RING_SIZE).unwrap(),
            bind_flags: sockopt::XDP_COPY,
        }
    }
}

/// The logical bring-up stage of an [`XdpSocket`]. `open` walks a socket through every stage
/// before it is ever handed back to the caller; a constructed `XdpSocket` is always `Serving`
/// until `close`/`Drop`, so the earlier stages only exist as local state inside `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketState {
    Serving,
    Closed,
}

/// Atomic dataplane counters. Updated only by the socket's single dataplane agent; safe to read
/// from any thread.
#[derive(Default)]
pub struct Stats {
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_dropped: AtomicU64,
    tx_errors: AtomicU64,
}

impl Stats {
    pub fn rx_packets(&self) -> u64 {
        self.rx_packets.load(Ordering::Relaxed)
    }
    pub fn tx_packets(&self) -> u64 {
        self.tx_packets.load(Ordering::Relaxed)
    }
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }
    pub fn rx_dropped(&self) -> u64 {
        self.rx_dropped.load(Ordering::Relaxed)
    }
    pub fn tx_errors(&self) -> u64 {
        self.tx_errors.load(Ordering::Relaxed)
    }

    fn add_rx(&self, packets: u64, bytes: u64) {
        self.rx_packets.fetch_add(packets, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
    fn add_rx_dropped(&self, count: u64) {
        self.rx_dropped.fetch_add(count, Ordering::Relaxed);
    }
    fn add_tx(&self, packets: u64, bytes: u64) {
        self.tx_packets.fetch_add(packets, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
    fn inc_tx_errors(&self) {
        self.tx_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// A bound AF_XDP socket: one UMEM, four rings, one `(interface, queue)` endpoint.
///
/// Only one logical dataplane agent may drive `recv`/`send`/`complete_tx`/`populate_fill` on a
/// given instance at a time; nothing here is internally synchronized beyond what the ring
/// protocol itself provides against the kernel.
pub struct XdpSocket {
    umem: Umem,
    info: IfInfo,
    fill: FillRing,
    completion: CompletionRing,
    rx: RxRing,
    tx: TxRing,
    need_wakeup: bool,
    state: SocketState,
    stats: Stats,
}

/// Half of the Fill ring's capacity is replenished on each `populate_fill` call. Chosen to match
/// the common libxdp convention; not promoted to a configuration field since nothing in this
/// engine depends on a more precise value.
const FILL_REFILL_FRACTION: u32 = 2;

impl XdpSocket {
    /// Run the full bring-up protocol: create the kernel socket, set ring sizes, query mmap
    /// offsets, map all four rings, bind to `(interface, queue)`, and populate the Fill ring.
    ///
    /// On any failure, everything acquired so far (the kernel socket, the device/queue
    /// registration) is released before returning.
    pub fn open(mut umem: Umem, interface: IfInfo, config: SocketConfig) -> Result<Self, XdpError> {
        let ctx = IfCtx { ifindex: interface.ifindex(), queue_id: interface.queue_id(), netnscookie: 0 };
        if !umem.devices.insert(ctx) {
            warn!("xdp: refusing duplicate bind to ifindex={} queue={}", ctx.ifindex, ctx.queue_id);
            return Err(XdpError::BindFailed(Errno(libc::EBUSY)));
        }
        let rollback = umem.devices.guard(ctx);

        umem.fd
            .set_opt(sockopt::SOL_XDP, sockopt::XDP_UMEM_FILL_RING, &umem.config.fill_size)
            .map_err(XdpError::RingSizeSetFailed)?;
        umem.fd
            .set_opt(sockopt::SOL_XDP, sockopt::XDP_UMEM_COMPLETION_RING, &umem.config.comp_size)
            .map_err(XdpError::RingSizeSetFailed)?;

        umem.fd
            .set_opt(sockopt::SOL_XDP, sockopt::XDP_RX_RING, &config.rx_size.get())
            .map_err(XdpError::RingSizeSetFailed)?;
        umem.fd
            .set_opt(sockopt::SOL_XDP, sockopt::XDP_TX_RING, &config.tx_size.get())
            .map_err(XdpError::RingSizeSetFailed)?;

        let offsets = SocketMmapOffsets::query(&umem.fd)?;
        debug!("xdp: mmap offsets queried for ifindex={}", ctx.ifindex);

        let addr_size = core::mem::size_of::<u64>() as u64;
        let fill = unsafe {
            FillRing::map_producer(&umem.fd, &offsets.inner.fr, umem.config.fill_size, addr_size, pgoff::UMEM_FILL)
        }
        .map_err(XdpError::RingMapFailed)?;
        let completion = unsafe {
            CompletionRing::map_consumer(&umem.fd, &offsets.inner.cr, umem.config.comp_size, addr_size, pgoff::UMEM_COMPLETION)
        }
        .map_err(XdpError::RingMapFailed)?;

        let desc_size = core::mem::size_of::<XdpDesc>() as u64;
        let rx = unsafe { RxRing::map_consumer(&umem.fd, &offsets.inner.rx, config.rx_size.get(), desc_size, pgoff::RX) }
            .map_err(XdpError::RingMapFailed)?;
        let tx = unsafe { TxRing::map_producer(&umem.fd, &offsets.inner.tx, config.tx_size.get(), desc_size, pgoff::TX) }
            .map_err(XdpError::RingMapFailed)?;
        debug!("xdp: all four rings mapped for ifindex={}", ctx.ifindex);

        let sxdp = SockAddrXdp {
            ifindex: ctx.ifindex,
            queue_id: ctx.queue_id,
            flags: config.bind_flags,
            ..SockAddrXdp::default()
        };
        let bound = unsafe {
            libc::bind(
                umem.fd.as_raw_fd(),
                (&sxdp) as *const _ as *const libc::sockaddr,
                core::mem::size_of_val(&sxdp) as libc::socklen_t,
            )
        };
        if bound != 0 {
            warn!("xdp: bind failed for ifindex={} queue={}", ctx.ifindex, ctx.queue_id);
            return Err(XdpError::BindFailed(LastErrno.into()));
        }

        let need_wakeup = config.bind_flags & sockopt::XDP_USE_NEED_WAKEUP != 0;

        let mut socket = XdpSocket {
            umem,
            info: interface,
            fill,
            completion,
            rx,
            tx,
            need_wakeup,
            state: SocketState::Serving,
            stats: Stats::default(),
        };
        socket.populate_fill();
        debug!("xdp: socket serving on ifindex={} queue={}", ctx.ifindex, ctx.queue_id);

        core::mem::forget(rollback);
        Ok(socket)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Refresh and return the kernel-side drop/invalid-descriptor counters for this socket.
    pub fn kernel_statistics(&self) -> Result<XdpStatisticsV2, XdpError> {
        fetch_statistics(&self.umem.fd)
    }

    fn payload_addr(&self, frame_base: u64) -> u64 {
        frame_base + u64::from(self.umem.config.headroom)
    }

    fn frame_base_of(&self, addr: u64) -> u64 {
        addr - u64::from(self.umem.config.headroom)
    }

    /// Drain up to `batch.capacity() - batch.len()` descriptors from the RX ring into `batch`,
    /// returning frames to the free stack as they're copied out. Returns the number of packets
    /// appended.
    pub fn recv(&mut self, batch: &mut PacketBatch) -> usize {
        debug_assert_eq!(self.state, SocketState::Serving);
        let want = batch.remaining() as u32;
        if want == 0 {
            return 0;
        }

        let (start, count) = self.rx.peek(want);
        let mut total_bytes = 0u64;

        for i in 0..count {
            let idx = BufIdx(start.0.wrapping_add(i));
            let desc = unsafe { *self.rx.slot(idx).as_ptr() };
            let payload = self.umem.frame_payload(desc.addr, desc.len);
            let mut packet = Packet::new(alloc::vec::Vec::with_capacity(payload.len()));
            packet.payload.extend_from_slice(payload);
            packet.timestamp_ns = now_ns();
            total_bytes += packet.payload.len() as u64;
            batch.push(packet);

            self.umem.free_frame(self.frame_base_of(desc.addr));
        }

        if count > 0 {
            self.rx.release(count);
            self.stats.add_rx(u64::from(count), total_bytes);
            self.populate_fill();
        }

        count as usize
    }

    /// Submit as many packets from `batch` as there are free TX slots and free frames for, then
    /// kick the kernel. Returns the number actually submitted; a short count means the TX ring or
    /// the free-frame stack was the bottleneck.
    pub fn send(&mut self, batch: &mut PacketBatch) -> usize {
        debug_assert_eq!(self.state, SocketState::Serving);
        let want = batch.len() as u32;
        if want == 0 {
            return 0;
        }

        let (start, granted) = self.tx.reserve(want);
        let mut submitted = 0u32;
        let mut total_bytes = 0u64;

        for i in 0..granted {
            let packet = &batch[i as usize];
            let Some(frame) = self.umem.alloc_frame() else {
                break;
            };

            let addr = self.payload_addr(frame);
            let len = packet.payload.len().min(
                (self.umem.config.frame_size - self.umem.config.headroom) as usize,
            );
            self.umem.frame_payload_mut(frame)[..len].copy_from_slice(&packet.payload[..len]);

            let idx = BufIdx(start.0.wrapping_add(i));
            unsafe {
                *self.tx.slot(idx).as_ptr() = XdpDesc { addr, len: len as u32, options: 0 };
            }

            submitted += 1;
            total_bytes += len as u64;
        }

        if submitted < granted {
            self.tx.cancel(granted - submitted);
        }
        if submitted > 0 {
            self.tx.submit(submitted);
            self.stats.add_tx(u64::from(submitted), total_bytes);
            self.kick();
            batch.drain_prefix(submitted as usize);
        }

        submitted as usize
    }

    /// Issue the non-blocking wakeup send, unless `USE_NEED_WAKEUP` is set and the kernel hasn't
    /// asked for one.
    fn kick(&mut self) {
        if self.need_wakeup && self.tx.check_flags() & sockopt::XDP_RING_NEED_WAKEUP == 0 {
            return;
        }

        let sent = unsafe {
            libc::sendto(
                self.umem.fd.as_raw_fd(),
                core::ptr::null(),
                0,
                libc::MSG_DONTWAIT,
                core::ptr::null(),
                0,
            )
        };

        if sent < 0 {
            let err = Errno::new();
            match err.raw() {
                libc::EAGAIN | libc::EBUSY => {}
                _ => {
                    warn!("xdp: TX kick failed: {err}");
                    self.stats.inc_tx_errors();
                }
            }
        }
    }

    /// Reclaim frames the kernel has finished transmitting.
    pub fn complete_tx(&mut self) -> usize {
        debug_assert_eq!(self.state, SocketState::Serving);
        let (start, count) = self.completion.peek(self.completion.capacity());
        for i in 0..count {
            let idx = BufIdx(start.0.wrapping_add(i));
            let addr = unsafe { *self.completion.slot(idx).as_ptr() };
            self.umem.free_frame(self.frame_base_of(addr));
        }
        if count > 0 {
            self.completion.release(count);
        }
        count as usize
    }

    /// Replenish the Fill ring with up to half its capacity, stopping early if the free-frame
    /// stack empties first.
    pub fn populate_fill(&mut self) {
        debug_assert_eq!(self.state, SocketState::Serving);
        let want = self.fill.capacity() / FILL_REFILL_FRACTION;
        if want == 0 {
            return;
        }

        let (start, granted) = self.fill.reserve(want);
        let mut filled = 0u32;
        for i in 0..granted {
            let Some(frame) = self.umem.alloc_frame() else { break };
            let idx = BufIdx(start.0.wrapping_add(i));
            unsafe { *self.fill.slot(idx).as_ptr() = self.payload_addr(frame) };
            filled += 1;
        }

        if filled < granted {
            self.fill.cancel(granted - filled);
            // Every unfilled slot is a buffer the kernel won't have for an incoming frame; it'll
            // show up as a real drop once the queue actually receives traffic.
            self.stats.add_rx_dropped(u64::from(granted - filled));
        }
        if filled > 0 {
            self.fill.submit(filled);
        }
    }
}

impl Drop for XdpSocket {
    fn drop(&mut self) {
        self.state = SocketState::Closed;
        self.umem.devices.remove(&IfCtx {
            ifindex: self.info.ifindex(),
            queue_id: self.info.queue_id(),
            netnscookie: 0,
        });
    }
}

fn now_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Consumer, Producer, Ring};
    use crate::umem::UmemConfig;
    use crate::xdp::XdpRingOffsets;
    use alloc::boxed::Box;
    use alloc::vec;
    use core::ptr::NonNull;

    fn ring_offsets() -> XdpRingOffsets {
        XdpRingOffsets { producer: 0, consumer: 64, flags: 128, desc: 256 }
    }

    fn boxed_ring_mem(count: u32, elem_size: u64) -> Box<[u8]> {
        let len = 256 + (count as u64 * elem_size) as usize;
        vec![0u8; len].into_boxed_slice()
    }

    fn boxed_area(frames: u32, frame_size: u32) -> Box<[u8]> {
        vec![0u8; (frames * frame_size) as usize].into_boxed_slice()
    }

    /// A loopback harness: every ring is backed by memory shared between the socket's own view
    /// and a "kernel" view used to shuttle descriptors back and forth, without any real AF_XDP
    /// socket, mmap, or root.
    struct Harness {
        socket: XdpSocket,
        fill_kernel: Ring<u64, Consumer>,
        comp_kernel: Ring<u64, Producer>,
        rx_kernel: Ring<XdpDesc, Producer>,
        tx_kernel: Ring<XdpDesc, Consumer>,
    }

    // Backing memory is intentionally leaked (`mem::forget`) rather than freed: every ring above
    // holds a raw pointer into it with no lifetime tying the two together, the same tradeoff the
    // `from_parts_for_test` fixtures in `ring.rs`/`umem.rs` make.
    fn build_harness(frames: u32, frame_size: u32, ring_size: u32, headroom: u32) -> Harness {
        let off = ring_offsets();

        let mut area = boxed_area(frames, frame_size);
        let area_ptr = NonNull::new(core::ptr::slice_from_raw_parts_mut(area.as_mut_ptr(), area.len())).unwrap();
        let config = UmemConfig { size: area_ptr.len() as u32, frame_size, headroom, fill_size: ring_size, comp_size: ring_size, flags: 0 };
        let free = (0..frames).map(|i| u64::from(i) * u64::from(frame_size)).collect();
        let umem = Umem::from_area_for_test(config, area_ptr, free);
        core::mem::forget(area);

        let addr_size = core::mem::size_of::<u64>() as u64;
        let desc_size = core::mem::size_of::<XdpDesc>() as u64;

        let mut fill_mem = boxed_ring_mem(ring_size, addr_size);
        let fill_base = NonNull::new(fill_mem.as_mut_ptr()).unwrap();
        let fill: FillRing = unsafe { Ring::from_parts_for_test(fill_base, &off, ring_size) };
        let fill_kernel: Ring<u64, Consumer> = unsafe { Ring::from_parts_for_test(fill_base, &off, ring_size) };
        core::mem::forget(fill_mem);

        let mut comp_mem = boxed_ring_mem(ring_size, addr_size);
        let comp_base = NonNull::new(comp_mem.as_mut_ptr()).unwrap();
        let completion: CompletionRing = unsafe { Ring::from_parts_for_test(comp_base, &off, ring_size) };
        let comp_kernel: Ring<u64, Producer> = unsafe { Ring::from_parts_for_test(comp_base, &off, ring_size) };
        core::mem::forget(comp_mem);

        let mut rx_mem = boxed_ring_mem(ring_size, desc_size);
        let rx_base = NonNull::new(rx_mem.as_mut_ptr()).unwrap();
        let rx: RxRing = unsafe { Ring::from_parts_for_test(rx_base, &off, ring_size) };
        let rx_kernel: Ring<XdpDesc, Producer> = unsafe { Ring::from_parts_for_test(rx_base, &off, ring_size) };
        core::mem::forget(rx_mem);

        let mut tx_mem = boxed_ring_mem(ring_size, desc_size);
        let tx_base = NonNull::new(tx_mem.as_mut_ptr()).unwrap();
        let tx: TxRing = unsafe { Ring::from_parts_for_test(tx_base, &off, ring_size) };
        let tx_kernel: Ring<XdpDesc, Consumer> = unsafe { Ring::from_parts_for_test(tx_base, &off, ring_size) };
        core::mem::forget(tx_mem);

        let socket = XdpSocket {
            umem,
            info: IfInfo::invalid(),
            fill,
            completion,
            rx,
            tx,
            need_wakeup: false,
            state: SocketState::Serving,
            stats: Stats::default(),
        };

        Harness { socket, fill_kernel, comp_kernel, rx_kernel, tx_kernel }
    }

    // Fill ring, then deliver everything the socket posted as RX descriptors, as a NIC would.
    #[test]
    fn recv_drains_what_the_kernel_delivered() {
        let mut h = build_harness(8, 2048, 8, 128);

        h.socket.populate_fill();
        let (fstart, favail) = h.fill_kernel.peek(h.fill_kernel.capacity());
        assert_eq!(favail, 4, "populate_fill posts half the fill ring's capacity");

        let headroom = u64::from(h.socket.umem.config.headroom);
        let payloads: alloc::vec::Vec<alloc::vec::Vec<u8>> =
            (0..favail).map(|i| vec![i as u8; 32 + i as usize * 16]).collect();

        for i in 0..favail {
            let idx = BufIdx(fstart.0.wrapping_add(i));
            let addr = unsafe { *h.fill_kernel.slot(idx).as_ptr() };
            let frame_base = addr - headroom;
            let payload = &payloads[i as usize];
            h.socket.umem.frame_payload_mut(frame_base)[..payload.len()].copy_from_slice(payload);

            let (rstart, rgranted) = h.rx_kernel.reserve(1);
            assert_eq!(rgranted, 1);
            unsafe {
                *h.rx_kernel.slot(rstart).as_ptr() = XdpDesc { addr, len: payload.len() as u32, options: 0 };
            }
            h.rx_kernel.submit(1);
        }
        h.fill_kernel.release(favail);

        let mut batch = PacketBatch::with_capacity(favail as usize);
        let got = h.socket.recv(&mut batch);

        assert_eq!(got, favail as usize);
        assert_eq!(batch.len(), favail as usize);
        for i in 0..favail as usize {
            assert_eq!(batch[i].payload, payloads[i]);
        }
        assert_eq!(h.socket.stats().rx_packets(), u64::from(favail));
    }

    // Submit a batch for TX, then simulate the kernel transmitting and completing every
    // descriptor, and check the frames come back onto the free stack.
    #[test]
    fn send_then_kernel_completion_frees_frames() {
        let mut h = build_harness(8, 2048, 8, 128);
        let free_before = h.socket.umem.free_count();

        let mut batch = PacketBatch::with_capacity(3);
        for i in 0..3u8 {
            batch.push(Packet::new(vec![i; 40]));
        }

        let submitted = h.socket.send(&mut batch);
        assert_eq!(submitted, 3);
        assert!(batch.is_empty(), "send drains the batch it submits from");

        let (tstart, tavail) = h.tx_kernel.peek(h.tx_kernel.capacity());
        assert_eq!(tavail, 3);

        for i in 0..tavail {
            let idx = BufIdx(tstart.0.wrapping_add(i));
            let desc = unsafe { *h.tx_kernel.slot(idx).as_ptr() };
            let (cstart, cgranted) = h.comp_kernel.reserve(1);
            assert_eq!(cgranted, 1);
            unsafe { *h.comp_kernel.slot(cstart).as_ptr() = desc.addr };
            h.comp_kernel.submit(1);
        }
        h.tx_kernel.release(tavail);

        let completed = h.socket.complete_tx();
        assert_eq!(completed, 3);
        assert_eq!(h.socket.umem.free_count(), free_before, "every allocated frame came back");
        assert_eq!(h.socket.stats().tx_packets(), 3);
    }

    // Drain every frame off the free stack first; `send` must not submit anything it can't back
    // with a frame, and must leave the TX ring's reservation cleanly rolled back.
    #[test]
    fn send_with_no_free_frames_submits_nothing() {
        let mut h = build_harness(2, 2048, 8, 128);
        while h.socket.umem.alloc_frame().is_some() {}
        assert_eq!(h.socket.umem.free_count(), 0);

        let mut batch = PacketBatch::with_capacity(1);
        batch.push(Packet::new(vec![0xAA; 16]));

        let submitted = h.socket.send(&mut batch);
        assert_eq!(submitted, 0);
        assert_eq!(h.socket.stats().tx_packets(), 0);
        assert_eq!(batch.len(), 1, "an unsubmitted packet must stay in the batch for the caller to retry");
        assert_eq!(batch[0].payload, vec![0xAA; 16]);

        let (_, tavail) = h.tx_kernel.peek(h.tx_kernel.capacity());
        assert_eq!(tavail, 0, "nothing should have reached the TX ring");

        // The TX reservation must have rolled back cleanly: a fresh batch of the ring's full
        // capacity should still be reservable once frames are available again.
        h.socket.umem.free_frame(0);
        let mut batch2 = PacketBatch::with_capacity(8);
        for i in 0..8u8 {
            batch2.push(Packet::new(vec![i; 8]));
        }
        let submitted2 = h.socket.send(&mut batch2);
        assert_eq!(submitted2, 1, "only one frame was made available");
    }

    // A TX ring smaller than the batch can only grant a prefix of the reservation; the packets
    // past that prefix must remain in the batch, untouched and in their original order, so the
    // caller can retry them on a later call instead of losing them.
    #[test]
    fn send_short_count_preserves_unsent_packets_in_order() {
        let mut h = build_harness(8, 2048, 4, 128);

        let mut batch = PacketBatch::with_capacity(8);
        for i in 0..8u8 {
            batch.push(Packet::new(vec![i; 8]));
        }

        let submitted = h.socket.send(&mut batch);
        assert_eq!(submitted, 4, "the ring's capacity of 4 caps how many can go out");
        assert_eq!(h.socket.stats().tx_packets(), 4);

        assert_eq!(batch.len(), 4, "the unsent suffix must survive in the batch");
        for i in 0..4usize {
            assert_eq!(batch[i].payload, vec![(i + 4) as u8; 8], "unsent packets must keep their original order");
        }

        let (_, tavail) = h.tx_kernel.peek(h.tx_kernel.capacity());
        assert_eq!(tavail, 4, "exactly the submitted prefix should have reached the TX ring");
    }

    // `USE_NEED_WAKEUP` must suppress the kick syscall unless the kernel's TX flags word has the
    // wakeup bit set.
    #[test]
    fn kick_is_skipped_when_wakeup_not_requested() {
        let mut h = build_harness(4, 2048, 8, 128);
        h.socket.need_wakeup = true;

        let mut batch = PacketBatch::with_capacity(1);
        batch.push(Packet::new(vec![0u8; 8]));

        // check_flags() reads zeros from our test ring's flags word, so XDP_RING_NEED_WAKEUP is
        // unset and `kick` must return before ever touching the (dummy, -1) fd.
        let submitted = h.socket.send(&mut batch);
        assert_eq!(submitted, 1);
        assert_eq!(h.socket.stats().tx_errors(), 0, "kick must have been skipped, not attempted and failed");
    }
}
