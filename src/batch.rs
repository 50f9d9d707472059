//! The caller-facing packet currency: everything outside this crate that produces or consumes
//! packets (routing, gossip, wire codecs, ...) only ever sees [`PacketBatch`]/[`Packet`], never a
//! UMEM frame address or a ring descriptor.

use alloc::vec::Vec;

/// One packet, owned and heap-allocated.
///
/// `timestamp_ns` is meaningless for a packet about to be handed to
/// [`crate::socket::XdpSocket::send`]; [`crate::socket::XdpSocket::recv`] stamps it with a
/// monotonic nanosecond clock reading taken when the packet was drained from the RX ring.
#[derive(Debug, Clone)]
pub struct Packet {
    pub payload: Vec<u8>,
    pub timestamp_ns: u64,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Self {
        Packet { payload, timestamp_ns: 0 }
    }
}

/// A bounded collection of packets, reused across `recv`/`send` calls to avoid per-batch
/// allocation.
#[derive(Debug, Default)]
pub struct PacketBatch {
    packets: Vec<Packet>,
    capacity: usize,
}

impl PacketBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        PacketBatch { packets: Vec::with_capacity(capacity), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Packet> {
        self.packets.iter()
    }

    pub fn drain(&mut self) -> alloc::vec::Drain<'_, Packet> {
        self.packets.drain(..)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.packets.len())
    }

    /// Remove the first `n` packets (the ones a caller just submitted), leaving the untouched
    /// remainder in place and in order for a retry.
    pub(crate) fn drain_prefix(&mut self, n: usize) {
        self.packets.drain(..n);
    }
}

impl core::ops::Index<usize> for PacketBatch {
    type Output = Packet;
    fn index(&self, idx: usize) -> &Packet {
        &self.packets[idx]
    }
}
