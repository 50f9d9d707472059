//! UMEM: the registered frame pool shared with the kernel, plus the free-frame stack.

use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::control::DeviceControl;
use crate::error::XdpError;
use crate::iface::SocketFd;
use crate::sockopt;
use crate::xdp::XdpUmemReg;

/// UMEM sizing and layout. Defaults match a single-queue, moderate-throughput socket; callers
/// pushing millions of packets per second per queue will typically raise `size` and the ring
/// sizes.
#[derive(Debug, Clone, Copy)]
pub struct UmemConfig {
    /// Total size of the UMEM region in bytes. Must be a multiple of `frame_size`.
    pub size: u32,
    /// Size of one frame; must be a power of two.
    pub frame_size: u32,
    /// Bytes reserved at the start of each frame before the packet payload.
    pub headroom: u32,
    /// Fill ring capacity.
    pub fill_size: u32,
    /// Completion ring capacity.
    pub comp_size: u32,
    /// Raw `XDP_UMEM_REG` flags; `0` for the default (no unaligned chunks).
    pub flags: u32,
}

impl Default for UmemConfig {
    fn default() -> Self {
        UmemConfig {
            size: 64 * 1024 * 1024,
            frame_size: 4096,
            headroom: 256,
            fill_size: 4096,
            comp_size: 4096,
            flags: 0,
        }
    }
}

/// The registered frame pool. Owns the free-frame stack; only the dataplane agent holding the
/// bound [`crate::socket::XdpSocket`] built from this `Umem` may call `alloc_frame`/`free_frame`.
pub struct Umem {
    pub(crate) fd: SocketFd,
    area: NonNull<[u8]>,
    pub(crate) config: UmemConfig,
    pub(crate) devices: DeviceControl,
    free: Vec<u64>,
}

// Safety: `area` is a raw view of memory the caller promised (in `Umem::new`) to keep alive and
// not alias outside of this engine; moving the `Umem` to another thread along with exclusive
// dataplane ownership is sound.
unsafe impl Send for Umem {}

impl Umem {
    /// Register a new UMEM over `area`.
    ///
    /// # Safety
    ///
    /// `area` must be page-aligned, valid for reads and writes for as long as the returned `Umem`
    /// (and every socket built from it) lives, and must not be aliased by any other accessor
    /// while this `Umem` is alive.
    pub unsafe fn new(config: UmemConfig, area: NonNull<[u8]>) -> Result<Self, XdpError> {
        debug_assert!(
            is_page_aligned(area),
            "UB: UMEM area must be page-aligned; caller is responsible for this"
        );
        debug_assert!(config.frame_size.is_power_of_two());
        debug_assert_eq!(area.len() as u32 % config.frame_size, 0);

        let fd = SocketFd::new().map_err(XdpError::SocketCreationFailed)?;

        let mut reg = XdpUmemReg {
            addr: area.as_ptr() as *mut u8 as u64,
            len: area.len() as u64,
            chunk_size: config.frame_size,
            headroom: config.headroom,
            flags: config.flags,
            tx_metadata_len: 0,
        };
        fd.set_opt(sockopt::SOL_XDP, sockopt::XDP_UMEM_REG, &mut reg)
            .map_err(XdpError::UmemRegistrationFailed)?;

        let frame_count = area.len() as u32 / config.frame_size;
        let free = (0..frame_count).map(|i| u64::from(i) * u64::from(config.frame_size)).collect();

        Ok(Umem {
            fd,
            area,
            config,
            devices: DeviceControl::default(),
            free,
        })
    }

    /// Number of frames currently on the free stack.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Total number of frames in the UMEM.
    pub fn frame_count(&self) -> u32 {
        self.area.len() as u32 / self.config.frame_size
    }

    /// Pop a frame address off the free stack.
    pub fn alloc_frame(&mut self) -> Option<u64> {
        self.free.pop()
    }

    /// Push a frame address back onto the free stack.
    ///
    /// Double-frees and addresses outside the UMEM are caught with `debug_assert!` in debug
    /// builds; release builds trust the caller, which is always internal dataplane code.
    pub fn free_frame(&mut self, addr: u64) {
        debug_assert!(addr % u64::from(self.config.frame_size) == 0, "misaligned frame address");
        debug_assert!(addr < self.area.len() as u64, "frame address out of range");
        debug_assert!(!self.free.contains(&addr), "double free of frame {addr}");
        self.free.push(addr);
    }

    /// The writable payload window of `addr`, i.e. `[addr + headroom, addr + frame_size)`.
    pub(crate) fn frame_payload_mut(&mut self, addr: u64) -> &mut [u8] {
        let start = addr as usize + self.config.headroom as usize;
        let len = self.config.frame_size as usize - self.config.headroom as usize;
        // Safety: `addr` is frame-aligned and within `area` per the invariants upheld by
        // `alloc_frame`/`free_frame`; we hold `&mut self` so no other accessor of this `Umem` can
        // race us.
        unsafe {
            let base = self.area.as_ptr() as *mut u8;
            core::slice::from_raw_parts_mut(base.add(start), len)
        }
    }

    pub(crate) fn frame_payload(&self, addr: u64, len: u32) -> &[u8] {
        let start = addr as usize;
        let len = len as usize;
        unsafe {
            let base = self.area.as_ptr() as *const u8;
            core::slice::from_raw_parts(base.add(start), len)
        }
    }

    /// Build a `Umem` directly over caller-provided memory with a dummy fd, for tests that drive
    /// the dataplane without a real AF_XDP socket.
    #[cfg(test)]
    pub(crate) fn from_area_for_test(config: UmemConfig, area: NonNull<[u8]>, free: Vec<u64>) -> Self {
        Umem {
            fd: crate::iface::SocketFd::dummy(),
            area,
            config,
            devices: DeviceControl::default(),
            free,
        }
    }
}

fn is_page_aligned(area: NonNull<[u8]>) -> bool {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    (area.as_ptr() as *mut u8 as usize & (page_size - 1)) == 0
}
