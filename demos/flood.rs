//! Flood a network interface with a fixed ARP packet, using the batched send path.
//!
//! Aim at a network interface with care!
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use xdp_engine::{IfInfo, Packet, PacketBatch, SocketConfig, Umem, UmemConfig, XdpSocket};

#[repr(align(4096))]
struct PacketMap(UnsafeCell<[u8; 1 << 20]>);
// Safety: no instance used for unsynchronized data access.
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

    let mut socket = XdpSocket::open(umem, info, SocketConfig::default()).expect("bring-up failed");

    let batch_size = args.batch.unwrap_or(1 << 10) as usize;
    let total: u64 = u64::from(args.total.unwrap_or(1 << 20));
    let payload = prepare_payload(args.length.unwrap_or(0));

    eprintln!("dumping {} B with {total} packets", payload.len() as u64 * total);

    let start = std::time::Instant::now();
    let mut queued: u64 = 0;
    let mut completed: u64 = 0;

    while completed < total {
        let mut batch = PacketBatch::with_capacity(batch_size);
        while batch.len() < batch_size && queued < total {
            batch.push(Packet::new(payload.clone()));
            queued += 1;
        }
        if !batch.is_empty() {
            socket.send(&mut batch);
        }
        completed += socket.complete_tx() as u64;
    }

    let secs = start.elapsed().as_secs_f32();
    let bytes = completed as f32 * payload.len() as f32;
    eprintln!(
        "{secs:?} s; {completed} pkt; {} pkt/s; {} B/s",
        completed as f32 / secs,
        bytes / secs
    );
}

fn prepare_payload(extra: u32) -> Vec<u8> {
    let mut payload = ARP.to_vec();
    payload.resize(ARP.len() + extra as usize, 0);
    payload
}

#[derive(clap::Parser)]
struct Args {
    /// The name of the interface to use.
    ifname: String,
    /// Overwrite the queue_id.
    #[arg(long = "queue-id")]
    queue_id: Option<u32>,
    /// Maximum number of packets submitted per send/complete iteration.
    #[arg(long = "batch-size")]
    batch: Option<u32>,
    /// The total number of packets to send.
    #[arg(long = "packets-total")]
    total: Option<u32>,
    /// Extra bytes appended after the fixed ARP payload.
    #[arg(long = "packet-length")]
    length: Option<u32>,
}

#[rustfmt::skip]
static ARP: [u8; 14+28] = [
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
    0x31, 0x32, 0x33, 0x34, 0x35, 0x36,
    0x08, 0x06,

    0x00, 0x01,
    0x08, 0x00, 0x06, 0x04,
    0x00, 0x01,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
    0x21, 0x22, 0x23, 0x24,
    0x31, 0x32, 0x33, 0x34, 0x35, 0x36,
    0x41, 0x42, 0x43, 0x44,
];
