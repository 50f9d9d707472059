//! Bind to an interface, print the bring-up result and live kernel statistics.
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use xdp_engine::{IfInfo, SocketConfig, Umem, UmemConfig, XdpSocket};

#[repr(align(4096))]
struct PacketMap(UnsafeCell<[u8; 1 << 20]>);
// Safety: no direct data access, only handed to the kernel as a mapping.
unsafe impl Sync for PacketMap {}

static MEM: PacketMap = PacketMap(UnsafeCell::new([0; 1 << 20]));

fn main() {
    env_logger::init();
    let args = <Args as clap::Parser>::parse();

    let mem = NonNull::new(MEM.0.get() as *mut [u8]).unwrap();
    // Safety: `MEM` is a static mapping, aligned and alive for the process lifetime.
    let umem = unsafe { Umem::new(UmemConfig::default(), mem) }.unwrap();

    let mut info = IfInfo::from_name(&args.ifname).expect("interface not found");
    if let Some(queue) = args.queue_id {
        info.set_queue(queue);
    }

    let socket = XdpSocket::open(umem, info, SocketConfig::default()).expect("bring-up failed");
    eprintln!(
        "bound: rx_packets={} tx_packets={}",
        socket.stats().rx_packets(),
        socket.stats().tx_packets()
    );

    match socket.kernel_statistics() {
        Ok(stats) => eprintln!("{stats:?}"),
        Err(e) => eprintln!("failed to fetch kernel statistics: {e}"),
    }
}

#[derive(clap::Parser)]
struct Args {
    /// The name of the interface to use.
    ifname: String,
    /// Overwrite the queue_id.
    #[arg(long = "queue-id")]
    queue_id: Option<u32>,
}
