//! Errno wrapping and the engine's error taxonomy.

/// Marker requesting that an [`Errno`] be read from `errno` at the point of conversion.
pub(crate) struct LastErrno;

/// A raw `errno` value, formatted via `strerror`.
pub struct Errno(pub(crate) libc::c_int);

impl From<LastErrno> for Errno {
    fn from(LastErrno: LastErrno) -> Self {
        Errno::new()
    }
}

impl Errno {
    pub(crate) fn new() -> Self {
        Errno(unsafe { *libc::__errno_location() })
    }

    /// The raw platform error code, for callers that want to match on specific values
    /// (`EAGAIN`, `EBUSY`, ...).
    pub fn raw(&self) -> libc::c_int {
        self.0
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = unsafe { libc::strerror(self.0) };
        let cstr = unsafe { core::ffi::CStr::from_ptr(st) };
        write!(f, "{}", cstr.to_string_lossy())
    }
}

impl core::fmt::Debug for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Errno({}: {})", self.0, self)
    }
}

/// Every way a bring-up or dataplane operation can fail.
///
/// Bring-up variants (`SocketCreationFailed` through `BindFailed`) are fatal: they abort
/// [`crate::socket::XdpSocket::open`] and roll back whatever was already acquired. `FrameExhausted`
/// and `KickFailed` are dataplane conditions, reported through the statistics counters as well as
/// (optionally) through a `Result` for callers that want to react immediately.
#[derive(Debug)]
pub enum XdpError {
    /// Not running on Linux, or `AF_XDP` is not supported by this kernel.
    Unsupported,
    /// `socket(AF_XDP, ...)` failed.
    SocketCreationFailed(Errno),
    /// `setsockopt(XDP_UMEM_REG)` failed.
    UmemRegistrationFailed(Errno),
    /// Setting one of the four ring sizes failed.
    RingSizeSetFailed(Errno),
    /// `getsockopt(XDP_MMAP_OFFSETS)` failed or returned an unrecognized size.
    MmapOffsetsFailed(Errno),
    /// `mmap` of a ring failed.
    RingMapFailed(Errno),
    /// `bind` of the XDP socket address failed.
    BindFailed(Errno),
    /// The named interface does not exist.
    InterfaceNotFound,
    /// The UMEM free-frame stack was empty when a frame was needed.
    FrameExhausted,
    /// The TX wakeup wasn't benign (not `EAGAIN`/`EBUSY`).
    KickFailed(Errno),
    /// `getsockopt(XDP_STATISTICS)` failed.
    StatsFetchFailed(Errno),
}

impl core::fmt::Display for XdpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            XdpError::Unsupported => write!(f, "AF_XDP is not supported on this host"),
            XdpError::SocketCreationFailed(e) => write!(f, "failed to create AF_XDP socket: {e}"),
            XdpError::UmemRegistrationFailed(e) => write!(f, "failed to register UMEM: {e}"),
            XdpError::RingSizeSetFailed(e) => write!(f, "failed to set ring size: {e}"),
            XdpError::MmapOffsetsFailed(e) => write!(f, "failed to query mmap offsets: {e}"),
            XdpError::RingMapFailed(e) => write!(f, "failed to mmap ring: {e}"),
            XdpError::BindFailed(e) => write!(f, "failed to bind XDP socket: {e}"),
            XdpError::InterfaceNotFound => write!(f, "interface not found"),
            XdpError::FrameExhausted => write!(f, "UMEM free-frame stack exhausted"),
            XdpError::KickFailed(e) => write!(f, "TX wakeup failed: {e}"),
            XdpError::StatsFetchFailed(e) => write!(f, "failed to fetch XDP statistics: {e}"),
        }
    }
}

impl core::error::Error for XdpError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        None
    }
}
