use alloc::boxed::Box;
use core::convert::TryFrom;
use core::convert::TryInto;
use core::mem;
use core::ptr;

use crate::mbuf::MBuf;

use super::ethernet;
use super::toggle_endian16;
use super::toggle_endian32;
use super::LOCAL_IP_ADDR;
use super::LOCAL_MAC_ADDR;

const ETH_HTYPE: u16 = 1;
const IPV4_PTYPE: u16 = 0x800;
const ETH_HLEN: u8 = 6;
const IPV4_PLEN: u8 = 4;

#[repr(u16)]
#[derive(PartialEq, Debug)]
pub enum Operand {
    Request = 1,
    Reply = 2,
}

impl TryFrom<u16> for Operand {
    type Error = &'static str;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Operand::Request),
            2 => Ok(Operand::Reply),
            _ => Err("undefined arp operand"),
        }
    }
}

#[repr(C, packed)]
struct Header {
    htype: u16,
    ptype: u16,
    hlen: u8,
    plen: u8,
    oper: u16,
    sha: [u8; 6],
    spa: u32,
    tha: [u8; 6],
    tpa: u32,
}

pub fn tx(op: Operand, hw_addr: &[u8; 6], dst_mac: &[u8; 6], dst_ip: u32) {
    let mut m = MBuf::alloc(128);
    let hdr = unsafe { (m.append(mem::size_of::<Header>()) as *mut Header).as_mut() }.unwrap();
    hdr.htype = toggle_endian16(ETH_HTYPE);
    hdr.ptype = toggle_endian16(IPV4_PTYPE);
    hdr.hlen = ETH_HLEN;
    hdr.plen = IPV4_PLEN;
    hdr.oper = toggle_endian16(op as u16);
    unsafe { ptr::copy_nonoverlapping(LOCAL_MAC_ADDR.as_ptr(), hdr.sha.as_mut_ptr(), 6) };
    hdr.spa = toggle_endian32(LOCAL_IP_ADDR);
    unsafe { ptr::copy_nonoverlapping(hw_addr.as_ptr(), hdr.tha.as_mut_ptr(), 6) };
    hdr.tpa = toggle_endian32(dst_ip);

    ethernet::tx(m, ethernet::Type::ARP, dst_mac);
}

/// one-shot: reply to a request addressed to us, ignore everything else (in
/// particular, a reply is not cached — there is no resolver to feed it to).
pub fn rx(mut m: Box<MBuf>) {
    let hdr = m.pop::<Header>(mem::size_of::<Header>());
    let op = toggle_endian16(hdr.oper);
    match op.try_into() {
        Ok(Operand::Request) => {
            tx(Operand::Reply, &hdr.sha, &hdr.sha, toggle_endian32(hdr.spa));
        }
        Ok(Operand::Reply) | Err(_) => {}
    }
}
