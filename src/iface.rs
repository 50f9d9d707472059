//! Interface lookup, the raw socket handle, and the kernel mmap-offset/statistics queries.

use alloc::string::String;
use alloc::vec::Vec;
use core::ffi::CStr;

use crate::control::IfCtx;
use crate::error::{Errno, LastErrno, XdpError};
use crate::sockopt;
use crate::xdp::{
    XdpMmapOffsets, XdpMmapOffsetsV1, XdpRingOffsets, XdpRingOffsetsV1, XdpStatistics,
    XdpStatisticsV2,
};

/// A socket's kernel file descriptor, shared between a `Umem` and every `XdpSocket` bound from
/// it (they may, per `SHARED_UMEM`, end up sharing one fd — not yet exercised by this crate, but
/// the reference-counted handle already supports it).
pub(crate) struct SocketFd(libc::c_int);

impl SocketFd {
    pub(crate) fn new() -> Result<Self, Errno> {
        let fd = unsafe { libc::socket(libc::AF_XDP, libc::SOCK_RAW, 0) };
        if fd < 0 {
            return Err(LastErrno.into());
        }
        Ok(SocketFd(fd))
    }

    pub(crate) fn as_raw_fd(&self) -> libc::c_int {
        self.0
    }

    /// A handle that never held a real descriptor, for tests that only exercise logic above the
    /// syscall boundary.
    #[cfg(test)]
    pub(crate) fn dummy() -> Self {
        SocketFd(-1)
    }

    /// `getsockopt` into `out`, returning the number of bytes the kernel actually wrote.
    pub(crate) fn get_opt<T>(&self, level: libc::c_int, name: libc::c_int, out: &mut T) -> Result<libc::socklen_t, Errno> {
        let mut len = core::mem::size_of::<T>() as libc::socklen_t;
        let err = unsafe {
            libc::getsockopt(
                self.0,
                level,
                name,
                out as *mut T as *mut libc::c_void,
                &mut len,
            )
        };
        if err != 0 {
            return Err(LastErrno.into());
        }
        Ok(len)
    }

    pub(crate) fn set_opt<T>(&self, level: libc::c_int, name: libc::c_int, val: &T) -> Result<(), Errno> {
        let err = unsafe {
            libc::setsockopt(
                self.0,
                level,
                name,
                val as *const T as *const libc::c_void,
                core::mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if err != 0 {
            return Err(LastErrno.into());
        }
        Ok(())
    }
}

impl Drop for SocketFd {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe { libc::close(self.0) };
        }
    }
}

/// A resolved network interface plus the queue this socket will bind to.
#[derive(Debug, Clone, Copy)]
pub struct IfInfo {
    pub(crate) ctx: IfCtx,
    ifname: [libc::c_char; libc::IFNAMSIZ],
}

impl IfInfo {
    /// An info referring to no device; overwrite with [`IfInfo::from_name`] or
    /// [`IfInfo::from_ifindex`] before use.
    pub fn invalid() -> Self {
        IfInfo {
            ctx: IfCtx { ifindex: 0, queue_id: 0, netnscookie: 0 },
            ifname: [0; libc::IFNAMSIZ],
        }
    }

    /// Resolve by name (`"eth0"`, `"lo"`, ...). Names of `IFNAMSIZ` bytes or longer are truncated
    /// to `IFNAMSIZ - 1` bytes and the lookup proceeds on the truncated name, matching the
    /// kernel's own `ifr_name` handling.
    pub fn from_name(name: &str) -> Result<Self, XdpError> {
        let mut buf = [0u8; libc::IFNAMSIZ];
        let bytes = name.as_bytes();
        let len = bytes.len().min(buf.len() - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        let cstr = CStr::from_bytes_with_nul(&buf[..=len]).map_err(|_| XdpError::InterfaceNotFound)?;

        let index = unsafe { libc::if_nametoindex(cstr.as_ptr()) };
        if index == 0 {
            return Err(XdpError::InterfaceNotFound);
        }

        let mut this = Self::invalid();
        this.ctx.ifindex = index;
        let raw = cstr.to_bytes_with_nul();
        // Safety: c_char is i8 on this platform family; copying raw bytes preserves the content.
        let raw = unsafe { &*(raw as *const [u8] as *const [libc::c_char]) };
        this.ifname[..raw.len()].copy_from_slice(raw);
        Ok(this)
    }

    /// Resolve by numeric interface index.
    pub fn from_ifindex(index: u32) -> Result<Self, XdpError> {
        let mut this = Self::invalid();
        let ptr = unsafe { libc::if_indextoname(index, this.ifname.as_mut_ptr()) };
        if ptr.is_null() {
            return Err(XdpError::InterfaceNotFound);
        }
        this.ctx.ifindex = index;
        Ok(this)
    }

    /// Select which hardware queue to bind to. Not validated until `bind`.
    pub fn set_queue(&mut self, queue_id: u32) {
        self.ctx.queue_id = queue_id;
    }

    pub fn ifindex(&self) -> u32 {
        self.ctx.ifindex
    }

    pub fn queue_id(&self) -> u32 {
        self.ctx.queue_id
    }
}

/// Whether AF_XDP socket creation is actually permitted on this host (kernel support plus
/// capability/namespace restrictions), without leaking the probe socket.
pub fn is_available() -> bool {
    match SocketFd::new() {
        Ok(_fd) => true,
        Err(_) => false,
    }
}

/// Best-effort enumeration of non-loopback network interfaces, via `/sys/class/net`. Actual XDP
/// capability is only established when a socket is bound to one of these names.
pub fn list_xdp_capable_interfaces() -> Vec<String> {
    const PATH: &CStr = c"/sys/class/net";

    let mut names = Vec::new();
    let dir = unsafe { libc::opendir(PATH.as_ptr()) };
    if dir.is_null() {
        return names;
    }

    loop {
        let entry = unsafe { libc::readdir(dir) };
        if entry.is_null() {
            break;
        }
        let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
        let name = name.to_string_lossy();
        if name == "." || name == ".." || name == "lo" {
            continue;
        }
        names.push(name.into_owned());
    }

    unsafe { libc::closedir(dir) };
    names
}

/// The kernel-reported ring layout for one socket, either the pre-5.4 (`V1`) or current shape.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SocketMmapOffsets {
    pub(crate) inner: XdpMmapOffsets,
}

impl SocketMmapOffsets {
    const OPT_V1: libc::socklen_t = core::mem::size_of::<XdpMmapOffsetsV1>() as libc::socklen_t;
    const OPT_LATEST: libc::socklen_t = core::mem::size_of::<XdpMmapOffsets>() as libc::socklen_t;

    pub(crate) fn query(sock: &SocketFd) -> Result<Self, XdpError> {
        fn fixup_v1(v1: XdpRingOffsetsV1) -> XdpRingOffsets {
            XdpRingOffsets {
                producer: v1.producer,
                consumer: v1.consumer,
                desc: v1.desc,
                flags: v1.consumer + core::mem::size_of::<u32>() as u64,
            }
        }

        union Offsets {
            v1: XdpMmapOffsetsV1,
            latest: XdpMmapOffsets,
        }

        let mut raw = Offsets { latest: XdpMmapOffsets::default() };
        let written = sock
            .get_opt(sockopt::SOL_XDP, sockopt::XDP_MMAP_OFFSETS, unsafe { &mut raw.latest })
            .map_err(XdpError::MmapOffsetsFailed)?;

        let inner = match written {
            Self::OPT_V1 => {
                let v1 = unsafe { raw.v1 };
                XdpMmapOffsets {
                    rx: fixup_v1(v1.rx),
                    tx: fixup_v1(v1.tx),
                    fr: fixup_v1(v1.fr),
                    cr: fixup_v1(v1.cr),
                }
            }
            Self::OPT_LATEST => unsafe { raw.latest },
            _ => return Err(XdpError::MmapOffsetsFailed(Errno(libc::EINVAL))),
        };

        Ok(SocketMmapOffsets { inner })
    }
}

pub(crate) fn fetch_statistics(sock: &SocketFd) -> Result<XdpStatisticsV2, XdpError> {
    let mut v2 = XdpStatisticsV2::default();
    match sock.get_opt(sockopt::SOL_XDP, sockopt::XDP_STATISTICS, &mut v2) {
        Ok(n) if n as usize >= core::mem::size_of::<XdpStatistics>() => Ok(v2),
        Ok(_) | Err(_) => {
            let mut v1 = XdpStatistics::default();
            sock.get_opt(sockopt::SOL_XDP, sockopt::XDP_STATISTICS, &mut v1)
                .map_err(XdpError::StatsFetchFailed)?;
            Ok(XdpStatisticsV2 {
                rx_dropped: v1.rx_dropped,
                rx_invalid_descs: v1.rx_invalid_descs,
                tx_invalid_descs: v1.tx_invalid_descs,
                ..XdpStatisticsV2::default()
            })
        }
    }
}
