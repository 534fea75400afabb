use core::mem;

use alloc::{boxed::Box, collections::VecDeque, sync::Arc, vec::Vec};
use array_macro::array;

use crate::{cpu::CPU_TABLE, mbuf::MBuf, spinlock::SpinLock};

use super::{ethernet, ip, toggle_endian16};

#[repr(C, packed)]
struct Header {
    src_port: u16,
    dst_port: u16,
    len: u16,
    checksum: u16,
}

pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const UPORT_BUCKET_SZ: usize = 101;
const MAX_PENDING_PACKETS: usize = 16;

fn hash(port: u16) -> usize {
    port as usize % UPORT_BUCKET_SZ
}

struct UPacket {
    buf: Vec<u8>,
    src_ip: u32,
    src_port: u16,
}

/// a bound port: its queue of packets not yet consumed by recv().
struct UPort {
    port: u16,
    queue: SpinLock<VecDeque<UPacket>>,
}

impl UPort {
    fn new(port: u16) -> Self {
        Self {
            port,
            queue: SpinLock::new(VecDeque::new(), "uport_queue"),
        }
    }

    /// stable address used as the sleep/wakeup channel for this port.
    fn chan(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

struct UTable {
    buckets: [SpinLock<Vec<Arc<UPort>>>; UPORT_BUCKET_SZ],
}

impl UTable {
    const fn new() -> Self {
        Self {
            buckets: array![_ => SpinLock::new(Vec::new(), "uport_bucket"); UPORT_BUCKET_SZ],
        }
    }

    fn find(&self, port: u16) -> Option<Arc<UPort>> {
        let bucket = self.buckets[hash(port)].lock();
        bucket.iter().find(|up| up.port == port).cloned()
    }
}

static UTAB: UTable = UTable::new();

/// bind(port): allocate the queue for packets addressed to `port`.
pub fn bind(port: u16) -> Result<(), &'static str> {
    let mut bucket = UTAB.buckets[hash(port)].lock();
    if bucket.iter().any(|up| up.port == port) {
        return Err("bind: port already in use");
    }
    bucket.push(Arc::new(UPort::new(port)));
    Ok(())
}

/// unbind(port): release the queue. packets addressed to `port` are dropped
/// from now on. a recv() already blocked on this port, if any, keeps its
/// own reference and runs to completion against an orphaned queue.
pub fn unbind(port: u16) -> Result<(), &'static str> {
    let mut bucket = UTAB.buckets[hash(port)].lock();
    let pos = bucket
        .iter()
        .position(|up| up.port == port)
        .ok_or("unbind: port not bound")?;
    bucket.remove(pos);
    Ok(())
}

/// recv(dport, ...): wait for and consume one queued packet addressed to
/// dport, copying its source address/port and payload out to user space.
pub fn recv(
    dport: u16,
    src_addr: usize,
    sport_addr: usize,
    buf_addr: usize,
    maxlen: usize,
) -> Result<usize, &'static str> {
    let uport = UTAB.find(dport).ok_or("recv: port not bound")?;
    let chan = uport.chan();

    let p = unsafe { CPU_TABLE.my_proc() };
    let mut guard = uport.queue.lock();
    while guard.is_empty() {
        if p.inner.lock().killed {
            return Err("recv: process killed");
        }
        guard = p.sleep(chan, guard);
    }

    let packet = guard.pop_front().unwrap();
    drop(guard);

    let mut len = maxlen;
    if packet.buf.len() < len {
        len = packet.buf.len();
    }

    let pdata = p.data.get_mut();
    pdata.copy_out(src_addr, &packet.src_ip as *const u32 as *const u8, mem::size_of::<u32>())?;
    pdata.copy_out(
        sport_addr,
        &packet.src_port as *const u16 as *const u8,
        mem::size_of::<u16>(),
    )?;
    pdata.copy_out(buf_addr, packet.buf.as_ptr(), len)?;

    Ok(len)
}

/// send(sport, dst, dport, buf): build and transmit one UDP datagram.
pub fn send(sport: u16, dst: u32, dport: u16, buf: &[u8]) -> Result<(), &'static str> {
    let mut m = MBuf::alloc(ethernet::HEADER_SIZE + ip::HEADER_SIZE + HEADER_SIZE);
    let dst_buf = m.append(buf.len());
    unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), dst_buf, buf.len()) };
    tx(m, sport, dport, dst);
    Ok(())
}

#[cfg(test)]
static mut MBUFS: Vec<(Box<MBuf>, u32, ip::Protocol)> = Vec::new();

/// updates the udp header and passes the packet to the ip stack
fn tx(mut m: Box<MBuf>, sport: u16, dport: u16, dst: u32) {
    let hdr = m.prepend::<Header>(HEADER_SIZE);

    hdr.src_port = toggle_endian16(sport);
    hdr.dst_port = toggle_endian16(dport);
    hdr.len = toggle_endian16(m.get_len() as u16);
    hdr.checksum = 0;

    #[cfg(test)]
    {
        unsafe { MBUFS.push((m, dst, ip::Protocol::UDP)) };
        return;
    }

    #[allow(unreachable_code)]
    ip::tx(m, dst, ip::Protocol::UDP);
}

/// rx is called when a UDP packet arrives. looks up the bound port by
/// destination port and enqueues the packet, dropping it if the port isn't
/// bound or its queue is already full.
pub fn rx(mut m: Box<MBuf>, src_ip_addr: u32) -> Result<(), &'static str> {
    let hdr = m.pop::<Header>(HEADER_SIZE);
    let dport = toggle_endian16(hdr.dst_port);
    let src_port = toggle_endian16(hdr.src_port);

    let uport = match UTAB.find(dport) {
        Some(uport) => uport,
        None => return Err("udp_rx: port not bound"),
    };

    let mut guard = uport.queue.lock();
    if guard.len() >= MAX_PENDING_PACKETS {
        return Err("udp_rx: queue full");
    }

    let len = m.get_len();
    let mut buf = alloc::vec![0u8; len];
    unsafe { core::ptr::copy_nonoverlapping(m.get_buf_head(), buf.as_mut_ptr(), len) };

    guard.push_back(UPacket {
        buf,
        src_ip: src_ip_addr,
        src_port,
    });

    let chan = uport.chan();
    drop(guard);
    unsafe { crate::process::PROCESS_TABLE.wakeup(chan) };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_bind_unbind() {
        assert!(bind(1234).is_ok());
        assert_eq!("bind: port already in use", bind(1234).err().unwrap());
        assert!(unbind(1234).is_ok());
        assert_eq!("unbind: port not bound", unbind(1234).err().unwrap());
    }

    #[test_case]
    fn test_send() {
        assert!(send(4000, 1234, 1234, &[1, 2, 3, 4]).is_ok());

        let mut m = unsafe { MBUFS.pop() }.unwrap();
        let hdr = unsafe { (m.0.pop(mem::size_of::<Header>()) as *const Header).as_ref() }.unwrap();
        assert_eq!(1234, toggle_endian16(hdr.dst_port));
        assert_eq!(4000, toggle_endian16(hdr.src_port));
        assert_eq!(1234, m.1);
        assert_eq!(ip::Protocol::UDP, m.2);
    }

    #[test_case]
    fn test_rx_queue_overflow() {
        assert!(bind(7777).is_ok());

        for _ in 0..MAX_PENDING_PACKETS {
            let mut m = MBuf::alloc(HEADER_SIZE);
            let hdr = m.prepend::<Header>(HEADER_SIZE);
            hdr.src_port = toggle_endian16(1);
            hdr.dst_port = toggle_endian16(7777);
            hdr.len = toggle_endian16(HEADER_SIZE as u16);
            hdr.checksum = 0;
            assert!(rx(m, 1).is_ok());
        }

        let mut m = MBuf::alloc(HEADER_SIZE);
        let hdr = m.prepend::<Header>(HEADER_SIZE);
        hdr.src_port = toggle_endian16(1);
        hdr.dst_port = toggle_endian16(7777);
        hdr.len = toggle_endian16(HEADER_SIZE as u16);
        hdr.checksum = 0;
        assert_eq!("udp_rx: queue full", rx(m, 1).err().unwrap());

        assert!(unbind(7777).is_ok());
    }

    #[test_case]
    fn test_recv_cancelled_by_killed() {
        assert!(bind(8888).is_ok());

        let p = unsafe { CPU_TABLE.my_proc() };
        p.inner.lock().killed = true;

        let mut src = 0u32;
        let mut sport = 0u16;
        let mut buf = [0u8; 16];
        let src_addr = &mut src as *mut u32 as usize;
        let sport_addr = &mut sport as *mut u16 as usize;
        let buf_addr = buf.as_mut_ptr() as usize;

        // the queue for port 8888 is empty, so recv must observe `killed` on
        // its first check and return rather than sleep forever.
        assert_eq!(
            "recv: process killed",
            recv(8888, src_addr, sport_addr, buf_addr, buf.len())
                .err()
                .unwrap()
        );

        p.inner.lock().killed = false;
        assert!(unbind(8888).is_ok());
    }
}
