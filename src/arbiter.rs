//! arbiter module
//! This module includes the arbiter's receive loop and its two states.
//!
//! The loop blocks on the raw socket, answers every valid request with the
//! requester's boot code (or the unknown-requester code) and reloads the
//! client table when a reload has been requested.

// std
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

// constants
use crate::constants::*;

// client table
use crate::clients::{ClientTable, LoadError};

// debugging
use crate::debug::{print_debug, Verbose};

// hardware addresses
use crate::mac::MacAddr;

// frame codec
use crate::packets;

/// Link-Layer Peer
///
/// Link-layer view of a received frame's sender, as returned by the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPeer {
    pub ifindex: i32,
    pub protocol: u16,
    pub halen: usize,
    pub addr: [u8; 8],
}

// LinkPeer methods
impl LinkPeer {
    // new() method
    pub fn new(ifindex: i32, protocol: u16, mac: MacAddr) -> LinkPeer {
        let mut addr = [0u8; 8];
        addr[..ETHER_ADDR_LEN].copy_from_slice(&mac.octets());
        LinkPeer {
            ifindex,
            protocol,
            halen: ETHER_ADDR_LEN,
            addr,
        }
    }
    // mac() method
    // sender's MAC address, if it has an Ethernet-sized address
    pub fn mac(&self) -> Option<MacAddr> {
        match self.halen {
            ETHER_ADDR_LEN => MacAddr::from_slice(&self.addr),
            _ => None,
        }
    }
}

/// Raw Link Socket
pub trait LinkSocket {
    // receive one frame; Ok(None) when nothing arrived (timeout, interrupted call)
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, LinkPeer)>>;
    // send one frame to `peer` on the interface it was received from
    fn send(&mut self, frame: &[u8], peer: &LinkPeer) -> io::Result<usize>;
}

/// Arbiter States
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum States {
    Listening,
    Reloading,
}

impl fmt::Display for States {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            States::Listening => write!(f, "listening"),
            States::Reloading => write!(f, "reloading"),
        }
    }
}

/// Arbiter Statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub received: u64, // frames received
    pub answered: u64, // replies sent
    pub misses: u64,   // requests from unknown requesters
    pub dropped: u64,  // frames discarded without a reply
    pub reloads: u64,  // client table reloads
    pub errors: u64,   // failed receive calls
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "received {}, answered {}, unknown {}, dropped {}, reloads {}, errors {}",
            self.received, self.answered, self.misses, self.dropped, self.reloads, self.errors
        )
    }
}

// load_clients() function
/// Load the client database at `path` into `table` and report what was read
pub fn load_clients(
    table: &mut ClientTable,
    path: &str,
    debug: &Verbose,
) -> Result<usize, LoadError> {
    let report = table.load(path)?;

    if let Some(line) = report.stopped_at {
        print_debug(
            debug,
            DEBUG_LEVEL_INFO,
            DEBUG_SRC_DB,
            format!("warning: malformed record at {}:{}, rest of file ignored", path, line),
        );
    }
    if report.ignored > 0 {
        print_debug(
            debug,
            DEBUG_LEVEL_INFO,
            DEBUG_SRC_DB,
            format!(
                "warning: client table full ({} max), {} record(s) ignored",
                table.capacity(),
                report.ignored
            ),
        );
    }
    for mac in &report.duplicates {
        print_debug(
            debug,
            DEBUG_LEVEL_INFO,
            DEBUG_SRC_DB,
            format!("warning: {} listed more than once, first entry used", mac),
        );
    }
    if report.loaded == 0 {
        print_debug(
            debug,
            DEBUG_LEVEL_INFO,
            DEBUG_SRC_DB,
            format!("warning: no client loaded from {}", path),
        );
    }
    print_debug(
        debug,
        DEBUG_LEVEL_LOW,
        DEBUG_SRC_DB,
        format!("{} client(s) loaded from {}", report.loaded, path),
    );
    for record in table.iter() {
        print_debug(
            debug,
            DEBUG_LEVEL_EXTENSIVE,
            DEBUG_SRC_DB,
            format!("client {} boot code {:04x}", record.mac(), record.code()),
        );
    }

    Ok(report.loaded)
}

/// Boot Arbiter
pub struct Arbiter<'a, S: LinkSocket> {
    socket: S,
    table: ClientTable,
    database: String,
    state: States,
    stats: Statistics,
    shutdown: Arc<AtomicBool>,
    reload: &'a AtomicBool,
    debug: Verbose,
}

// Arbiter methods
impl<'a, S: LinkSocket> Arbiter<'a, S> {
    // new() method
    /// Build an arbiter around an already loaded client table
    pub fn new(
        socket: S,
        table: ClientTable,
        database: String,
        shutdown: Arc<AtomicBool>,
        reload: &'a AtomicBool,
        debug: Verbose,
    ) -> Arbiter<'a, S> {
        Arbiter {
            socket,
            table,
            database,
            state: States::Listening,
            stats: Statistics::default(),
            shutdown,
            reload,
            debug,
        }
    }

    // getters
    pub fn state(&self) -> States {
        self.state
    }
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }
    pub fn table(&self) -> &ClientTable {
        &self.table
    }

    // run() method
    /// Serve requests until the shutdown flag is set
    pub fn run(&mut self) -> Statistics {
        let mut buf = [0u8; UNBS_RX_BUFFER_SIZE];

        print_debug(
            &self.debug,
            DEBUG_LEVEL_LOW,
            DEBUG_SRC_ARBITER,
            format!("{} with {} client(s)", self.state, self.table.len()),
        );

        loop {
            // check if global shutdown variable is set
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            // block until a frame arrives or the receive timeout expires
            let received = match self.socket.recv(&mut buf) {
                Ok(r) => r,
                Err(e) => {
                    self.stats.errors += 1;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_INFO,
                        DEBUG_SRC_SOCKET,
                        format!("error: receive failed: {}", e),
                    );
                    // a persistent socket error must not spin the loop
                    thread::sleep(UNBS_RECV_ERROR_BACKOFF);
                    continue;
                }
            };

            // a pending reload is served before the frame that woke us up
            if self.reload.swap(false, Ordering::Relaxed) {
                self.reload_clients();
                if received.is_some() {
                    self.stats.received += 1;
                    self.stats.dropped += 1;
                    print_debug(
                        &self.debug,
                        DEBUG_LEVEL_MEDIUM,
                        DEBUG_SRC_ARBITER,
                        "frame received during reload dropped".to_string(),
                    );
                }
                continue;
            }

            if let Some((len, peer)) = received {
                self.handle_frame(&buf[..len], &peer);
            }
        }

        print_debug(
            &self.debug,
            DEBUG_LEVEL_LOW,
            DEBUG_SRC_ARBITER,
            format!("shutting down: {}", self.stats),
        );
        self.stats
    }

    // reload_clients() method
    /// Reload the client table, keeping the current one if the database is unreadable
    fn reload_clients(&mut self) {
        self.state = States::Reloading;
        print_debug(
            &self.debug,
            DEBUG_LEVEL_INFO,
            DEBUG_SRC_DB,
            format!("reloading client database {}", self.database),
        );

        if let Err(e) = load_clients(&mut self.table, &self.database, &self.debug) {
            print_debug(
                &self.debug,
                DEBUG_LEVEL_INFO,
                DEBUG_SRC_DB,
                format!("error: {}, keeping {} client(s)", e, self.table.len()),
            );
        }

        self.stats.reloads += 1;
        self.state = States::Listening;
    }

    // handle_frame() method
    /// Validate one received frame and answer it
    fn handle_frame(&mut self, frame: &[u8], peer: &LinkPeer) {
        self.stats.received += 1;

        // transport-level checks come before the codec
        let mac = match peer.mac() {
            Some(m) => m,
            None => {
                self.drop_frame(format!("sender address length {} ignored", peer.halen));
                return;
            }
        };
        if peer.protocol != ETHER_P_UNBS {
            self.drop_frame(format!("ethertype {:#06x} from {} ignored", peer.protocol, mac));
            return;
        }
        if let Err(e) = packets::decode(frame) {
            self.drop_frame(format!("invalid request from {}: {}", mac, e));
            return;
        }

        let code = match self.table.lookup(&mac) {
            Some(c) => {
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_LOW,
                    DEBUG_SRC_ARBITER,
                    format!("request from {}, boot code {:04x}", mac, c),
                );
                c
            }
            None => {
                self.stats.misses += 1;
                print_debug(
                    &self.debug,
                    DEBUG_LEVEL_LOW,
                    DEBUG_SRC_ARBITER,
                    format!("request from unknown client {}", mac),
                );
                UNBS_CODE_UNKNOWN
            }
        };

        let reply = packets::encode_response(code);
        match self.socket.send(&reply, peer) {
            Ok(n) if n == reply.len() => self.stats.answered += 1,
            Ok(n) => print_debug(
                &self.debug,
                DEBUG_LEVEL_INFO,
                DEBUG_SRC_SOCKET,
                format!("error: short send to {}, {} of {} bytes", mac, n, reply.len()),
            ),
            Err(e) => print_debug(
                &self.debug,
                DEBUG_LEVEL_INFO,
                DEBUG_SRC_SOCKET,
                format!("error: reply to {} failed: {}", mac, e),
            ),
        }
    }

    // drop_frame() method
    fn drop_frame(&mut self, reason: String) {
        self.stats.dropped += 1;
        print_debug(&self.debug, DEBUG_LEVEL_MEDIUM, DEBUG_SRC_PACKET, reason);
    }
}
