#![cfg_attr(not(test), no_std)]

//! A user-space, kernel-bypass packet I/O engine built on Linux `AF_XDP`.
//!
//! [`umem::Umem`] owns the registered frame pool; [`socket::XdpSocket`] walks the bring-up
//! protocol to a bound, serving socket and exposes the batched [`socket::XdpSocket::recv`]/
//! [`socket::XdpSocket::send`] dataplane. [`ring`] implements the lock-free SPSC protocol shared
//! by all four rings; [`iface`] resolves interfaces and answers `XDP_STATISTICS`/mmap-offset
//! queries.
//!
//! Callers exchange packets as a [`batch::PacketBatch`] of [`batch::Packet`]; nothing in this
//! crate knows about routing, wire codecs, or any higher-level protocol riding on top of it.

extern crate alloc;

pub mod batch;
mod control;
pub mod error;
mod iface;
pub mod ring;
pub mod socket;
pub mod umem;
/// Bindings for XDP (kernel interface).
pub mod xdp;
mod sockopt;

pub use batch::{Packet, PacketBatch};
pub use error::{Errno, XdpError};
pub use iface::{is_available, list_xdp_capable_interfaces, IfInfo};
pub use ring::BufIdx;
pub use socket::{SocketConfig, Stats, XdpSocket};
pub use umem::{Umem, UmemConfig};
