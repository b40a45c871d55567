//! Linux packet socket module
//! This module provides the AF_PACKET datagram socket carrying boot switch frames.

// libc
use libc::{
    bind, c_void, close, recvfrom, sendto, setsockopt, sockaddr, sockaddr_ll, socket, socklen_t,
    timeval, AF_PACKET, EAGAIN, EINTR, MSG_DONTWAIT, SOCK_DGRAM, SOL_SOCKET,
    SO_RCVTIMEO,
};

// std
use std::io;
use std::mem;
use std::time::Duration;

// constants
use crate::constants::*;

// arbiter socket abstraction
use crate::arbiter::{LinkPeer, LinkSocket};

// hardware addresses
use crate::mac::MacAddr;

// interface names
use super::libc::c_ifnametoindex;

/// Raw Boot Switch Socket
///
/// A `SOCK_DGRAM` packet socket: the kernel builds and strips the Ethernet
/// header, only the 6-byte boot switch payload crosses this interface.
#[derive(Debug)]
pub struct RawSocket {
    fd: i32,
    ifindex: Option<i32>,
}

// RawSocket methods
impl RawSocket {
    // open() method
    /// Open a packet socket for the boot switch EtherType
    ///
    /// With an interface name the socket only sees that interface's traffic,
    /// otherwise it listens on every interface.
    pub fn open(iface: Option<&str>) -> io::Result<RawSocket> {
        // man 2 socket
        // returns a file descriptor or -1 if error.
        let fd = unsafe {
            match socket(AF_PACKET, SOCK_DGRAM, ETHER_P_UNBS.to_be() as i32) {
                -1 => return Err(io::Error::last_os_error()),
                fd => fd,
            }
        };
        let mut sock = RawSocket { fd, ifindex: None };

        if let Some(name) = iface {
            let ifindex = c_ifnametoindex(name)? as i32;
            let mut sa = sockaddr_ll_for(ifindex, None);
            unsafe {
                let ptr_sockaddr = mem::transmute::<*mut sockaddr_ll, *mut sockaddr>(&mut sa);
                if bind(fd, ptr_sockaddr, mem::size_of_val(&sa) as socklen_t) == -1 {
                    return Err(io::Error::last_os_error());
                }
            }
            sock.ifindex = Some(ifindex);
        }

        Ok(sock)
    }

    // ifindex() getter
    pub fn ifindex(&self) -> Option<i32> {
        self.ifindex
    }

    // set_read_timeout() method
    /// Bound every blocking receive, `None` blocks forever
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let tv = match timeout {
            Some(d) => timeval {
                tv_sec: d.as_secs() as libc::time_t,
                tv_usec: d.subsec_micros() as libc::suseconds_t,
            },
            None => timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };
        unsafe {
            match setsockopt(
                self.fd,
                SOL_SOCKET,
                SO_RCVTIMEO,
                &tv as *const timeval as *const c_void,
                mem::size_of_val(&tv) as socklen_t,
            ) {
                -1 => Err(io::Error::last_os_error()),
                _ => Ok(()),
            }
        }
    }

    // recv_frame() method
    /// Receive one frame and its sender
    ///
    /// Returns `Ok(None)` when the timeout expires, a signal interrupts the
    /// call or, with `nonblocking`, nothing is queued.
    pub fn recv_frame(
        &self,
        buf: &mut [u8],
        nonblocking: bool,
    ) -> io::Result<Option<(usize, LinkPeer)>> {
        let mut sa: sockaddr_ll = unsafe { mem::zeroed() };
        let mut addr_buf_len: socklen_t = mem::size_of::<sockaddr_ll>() as socklen_t;
        let flags = match nonblocking {
            true => MSG_DONTWAIT,
            false => 0,
        };

        let len = unsafe {
            let addr_ptr: *mut sockaddr = mem::transmute::<*mut sockaddr_ll, *mut sockaddr>(&mut sa);
            // man 2 recvfrom
            // returns length of message, -1 if error
            recvfrom(
                self.fd,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                flags,
                addr_ptr,
                &mut addr_buf_len,
            )
        };

        if len == -1 {
            let e = io::Error::last_os_error();
            return match e.raw_os_error() {
                // EWOULDBLOCK is EAGAIN on linux
                Some(EAGAIN) | Some(EINTR) => Ok(None),
                _ => Err(e),
            };
        }

        let peer = LinkPeer {
            ifindex: sa.sll_ifindex,
            protocol: u16::from_be(sa.sll_protocol),
            halen: sa.sll_halen as usize,
            addr: sa.sll_addr,
        };
        Ok(Some((len as usize, peer)))
    }

    // send_frame() method
    /// Send one frame to `dest` out of interface `ifindex`
    pub fn send_frame(&self, frame: &[u8], ifindex: i32, dest: MacAddr) -> io::Result<usize> {
        let mut sa = sockaddr_ll_for(ifindex, Some(dest));
        unsafe {
            let ptr_sockaddr = mem::transmute::<*mut sockaddr_ll, *mut sockaddr>(&mut sa);
            match sendto(
                self.fd,
                frame.as_ptr() as *const c_void,
                frame.len(),
                0,
                ptr_sockaddr,
                mem::size_of_val(&sa) as socklen_t,
            ) {
                -1 => Err(io::Error::last_os_error()),
                n => Ok(n as usize),
            }
        }
    }
}

impl LinkSocket for RawSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, LinkPeer)>> {
        self.recv_frame(buf, false)
    }
    fn send(&mut self, frame: &[u8], peer: &LinkPeer) -> io::Result<usize> {
        let dest = peer.mac().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "peer has no ethernet address")
        })?;
        self.send_frame(frame, peer.ifindex, dest)
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe {
            close(self.fd);
        }
    }
}

// sockaddr_ll_for() function
// sockaddr_ll (man 7 packet)
fn sockaddr_ll_for(ifindex: i32, dest: Option<MacAddr>) -> sockaddr_ll {
    let mut sa = sockaddr_ll {
        sll_family: AF_PACKET as u16,
        sll_protocol: ETHER_P_UNBS.to_be(),
        sll_ifindex: ifindex,
        sll_hatype: 0,
        sll_pkttype: 0,
        sll_halen: 0,
        sll_addr: [0; 8],
    };
    if let Some(mac) = dest {
        sa.sll_halen = ETHER_ADDR_LEN as u8;
        sa.sll_addr[..ETHER_ADDR_LEN].copy_from_slice(&mac.octets());
    }
    sa
}
