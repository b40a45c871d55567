//! agent transport module
//! This module sends boot code requests to the arbiter and polls for its answer.
//!
//! There is no connection: an attempt is one request frame followed by a
//! bounded number of receive polls. The firmware gives no usable "packet
//! arrived" event, so the poll count stands in for a timeout.

// alloc
use alloc::vec;

// core
use core::fmt;

// log
use log::{debug, info, warn};

// constants
use crate::constants::*;

// hardware addresses
use crate::mac::MacAddr;

// boot switch frames
use crate::packets;

// firmware status
use super::FwStatus;

/// Network Interface State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Stopped,
    Started,
    Initialized,
}

/// Network Interface Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    // nothing received yet, expected while polling
    NotReady,
    Device(FwStatus),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkError::NotReady => write!(f, "not ready"),
            LinkError::Device(s) => write!(f, "device error ({})", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LinkError {}

/// Received Frame Information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub len: usize,         // bytes written to the buffer, media header included
    pub header_size: usize, // media header size
    pub source: MacAddr,
    pub ethertype: u16,
}

/// Raw Ethernet Interface Capability
pub trait LinkInterface {
    fn state(&self) -> LinkState;
    fn start(&mut self) -> Result<(), LinkError>;
    fn initialize(&mut self) -> Result<(), LinkError>;
    fn shutdown(&mut self) -> Result<(), LinkError>;
    fn stop(&mut self) -> Result<(), LinkError>;
    // size of the media header the interface fills in on transmit
    fn media_header_size(&self) -> usize;
    // `frame` starts with `header_size` bytes reserved for the media header
    fn transmit(
        &mut self,
        header_size: usize,
        frame: &[u8],
        dest: MacAddr,
        ethertype: u16,
    ) -> Result<(), LinkError>;
    // non-blocking, `LinkError::NotReady` when nothing is queued
    fn receive(&mut self, buf: &mut [u8]) -> Result<Received, LinkError>;
    // called after each empty poll
    fn idle(&mut self) {}
}

/// Network Interface Session
///
/// Brings the interface up for the duration of the session and puts it back
/// in the state it was found in when dropped.
pub struct LinkSession<'a, L: LinkInterface> {
    link: &'a mut L,
    started: bool,
    initialized: bool,
}

// LinkSession methods
impl<'a, L: LinkInterface> LinkSession<'a, L> {
    // open() method
    pub fn open(link: &'a mut L) -> Result<LinkSession<'a, L>, LinkError> {
        // built first so that an error below unwinds what was already done
        let mut session = LinkSession {
            link,
            started: false,
            initialized: false,
        };

        if session.link.state() == LinkState::Stopped {
            session.link.start().map_err(|e| {
                warn!("could not start network: {}", e);
                e
            })?;
            session.started = true;
        }

        if session.link.state() == LinkState::Started {
            session.link.initialize().map_err(|e| {
                warn!("could not initialise network: {}", e);
                e
            })?;
            session.initialized = true;
        }

        Ok(session)
    }
    // link() getter
    pub fn link(&mut self) -> &mut L {
        &mut *self.link
    }
}

impl<'a, L: LinkInterface> Drop for LinkSession<'a, L> {
    fn drop(&mut self) {
        if self.initialized {
            if let Err(e) = self.link.shutdown() {
                warn!("network shutdown failed: {}", e);
            }
        }
        if self.started {
            if let Err(e) = self.link.stop() {
                warn!("network stop failed: {}", e);
            }
        }
    }
}

/// Query Outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    // the arbiter assigned a boot code
    Assigned(u16),
    // the arbiter does not know this machine
    Unknown,
    // no valid answer within the attempt ceiling
    NoResponse,
}

/// Agent Transport
#[derive(Debug, Clone)]
pub struct Transport {
    server: MacAddr,
    attempts: u32,
    polls: u32,
    rx_buffer_size: usize,
}

// Transport methods
impl Transport {
    // new() method
    pub fn new(server: MacAddr) -> Transport {
        Transport {
            server,
            attempts: AGENT_TX_ATTEMPTS,
            polls: AGENT_RX_POLLS,
            rx_buffer_size: AGENT_RX_BUFFER_SIZE,
        }
    }
    // with_attempts() method
    pub fn with_attempts(mut self, attempts: u32) -> Transport {
        self.attempts = attempts;
        self
    }
    // with_polls() method
    pub fn with_polls(mut self, polls: u32) -> Transport {
        self.polls = polls;
        self
    }
    // server() getter
    pub fn server(&self) -> MacAddr {
        self.server
    }

    // query() method
    /// Ask the arbiter for this machine's boot code
    ///
    /// The first valid answer ends the exchange, whatever attempts remain.
    pub fn query<L: LinkInterface>(&self, link: &mut L) -> QueryOutcome {
        for attempt in 1..=self.attempts {
            info!(
                "transmit boot code request to {} ({}/{})",
                self.server, attempt, self.attempts
            );
            // keep polling even if the transmit failed, the frame may still have left
            if let Err(e) = self.transmit_request(link) {
                warn!("transmit failed: {}", e);
            }

            if let Some(code) = self.poll_response(link) {
                if code == UNBS_CODE_UNKNOWN {
                    return QueryOutcome::Unknown;
                }
                return QueryOutcome::Assigned(code);
            }
        }
        QueryOutcome::NoResponse
    }

    // transmit_request() method
    fn transmit_request<L: LinkInterface>(&self, link: &mut L) -> Result<(), LinkError> {
        let header_size = link.media_header_size();
        let mut packet = vec![0u8; header_size + UNBS_FRAME_LEN];
        packet[header_size..].copy_from_slice(&packets::encode_request());
        link.transmit(header_size, &packet, self.server, ETHER_P_UNBS)
    }

    // poll_response() method
    fn poll_response<L: LinkInterface>(&self, link: &mut L) -> Option<u16> {
        let mut buf = vec![0u8; self.rx_buffer_size];

        for poll in 0..self.polls {
            match link.receive(&mut buf) {
                Ok(rx) => {
                    if let Some(code) = self.accept(&buf, &rx) {
                        info!("receive success on poll {}", poll);
                        return Some(code);
                    }
                }
                Err(LinkError::NotReady) => link.idle(),
                Err(e) => warn!("receive failed: {}", e),
            }
        }
        None
    }

    // accept() method
    // validate a received frame, returning its boot code
    fn accept(&self, buf: &[u8], rx: &Received) -> Option<u16> {
        debug!(
            "received {} bytes (header {}) from {}, ethertype {:#06x}",
            rx.len, rx.header_size, rx.source, rx.ethertype
        );

        // the firmware hands us everything addressed to this interface
        if rx.ethertype != ETHER_P_UNBS {
            debug!("ignoring frame with ethertype {:#06x}", rx.ethertype);
            return None;
        }

        let end = rx.len.min(buf.len());
        if rx.header_size > end {
            warn!("received frame shorter than its media header");
            return None;
        }

        let frame = match packets::decode(&buf[rx.header_size..end]) {
            Ok(f) => f,
            Err(e) => {
                warn!("invalid response: {}", e);
                return None;
            }
        };

        let code = match frame.code() {
            Some(c) => c,
            None => {
                warn!("response carries no boot code");
                return None;
            }
        };

        // some firmware report a bogus source address, so this is not fatal
        if rx.source != self.server {
            warn!(
                "response source {} differs from arbiter {}",
                rx.source, self.server
            );
        }

        Some(code)
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    const SERVER: MacAddr = MacAddr::new([0x52, 0x54, 0x00, 0x00, 0x00, 0x01]);

    // scripted network interface
    struct MockLink {
        state: LinkState,
        header_size: usize,
        sent: Vec<(Vec<u8>, MacAddr, u16)>,
        // one script entry per receive() call, NotReady once exhausted
        script: VecDeque<Result<(Vec<u8>, MacAddr, u16), LinkError>>,
        calls: Vec<&'static str>,
        receives: usize,
        fail_initialize: bool,
    }

    impl MockLink {
        fn new(state: LinkState) -> MockLink {
            MockLink {
                state,
                header_size: 14,
                sent: Vec::new(),
                script: VecDeque::new(),
                calls: Vec::new(),
                receives: 0,
                fail_initialize: false,
            }
        }
        fn respond(&mut self, payload: &[u8], source: MacAddr, ethertype: u16) {
            let mut frame = vec![0u8; self.header_size];
            frame.extend_from_slice(payload);
            self.script.push_back(Ok((frame, source, ethertype)));
        }
    }

    impl LinkInterface for MockLink {
        fn state(&self) -> LinkState {
            self.state
        }
        fn start(&mut self) -> Result<(), LinkError> {
            self.calls.push("start");
            self.state = LinkState::Started;
            Ok(())
        }
        fn initialize(&mut self) -> Result<(), LinkError> {
            self.calls.push("initialize");
            if self.fail_initialize {
                return Err(LinkError::Device(FwStatus(7)));
            }
            self.state = LinkState::Initialized;
            Ok(())
        }
        fn shutdown(&mut self) -> Result<(), LinkError> {
            self.calls.push("shutdown");
            self.state = LinkState::Started;
            Ok(())
        }
        fn stop(&mut self) -> Result<(), LinkError> {
            self.calls.push("stop");
            self.state = LinkState::Stopped;
            Ok(())
        }
        fn media_header_size(&self) -> usize {
            self.header_size
        }
        fn transmit(
            &mut self,
            header_size: usize,
            frame: &[u8],
            dest: MacAddr,
            ethertype: u16,
        ) -> Result<(), LinkError> {
            self.sent
                .push((frame[header_size..].to_vec(), dest, ethertype));
            Ok(())
        }
        fn receive(&mut self, buf: &mut [u8]) -> Result<Received, LinkError> {
            self.receives += 1;
            match self.script.pop_front() {
                Some(Ok((frame, source, ethertype))) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(Received {
                        len: frame.len(),
                        header_size: self.header_size,
                        source,
                        ethertype,
                    })
                }
                Some(Err(e)) => Err(e),
                None => Err(LinkError::NotReady),
            }
        }
    }

    #[test]
    fn first_answer_wins() {
        let mut link = MockLink::new(LinkState::Initialized);
        link.script.push_back(Err(LinkError::NotReady));
        link.respond(&packets::encode_response(0x0007), SERVER, ETHER_P_UNBS);
        link.respond(&packets::encode_response(0x0008), SERVER, ETHER_P_UNBS);

        let outcome = Transport::new(SERVER).query(&mut link);
        assert_eq!(outcome, QueryOutcome::Assigned(0x0007));
        assert_eq!(link.sent.len(), 1);
        assert_eq!(link.sent[0].0, packets::encode_request().to_vec());
        assert_eq!(link.sent[0].1, SERVER);
        assert_eq!(link.sent[0].2, ETHER_P_UNBS);
        assert_eq!(link.receives, 2);
    }

    #[test]
    fn exhaust_attempts() {
        let mut link = MockLink::new(LinkState::Initialized);
        let outcome = Transport::new(SERVER).with_polls(50).query(&mut link);
        assert_eq!(outcome, QueryOutcome::NoResponse);
        assert_eq!(link.sent.len(), AGENT_TX_ATTEMPTS as usize);
        assert_eq!(link.receives, 150);
    }

    #[test]
    fn unknown_requester() {
        let mut link = MockLink::new(LinkState::Initialized);
        link.respond(
            &packets::encode_response(UNBS_CODE_UNKNOWN),
            SERVER,
            ETHER_P_UNBS,
        );
        assert_eq!(
            Transport::new(SERVER).query(&mut link),
            QueryOutcome::Unknown
        );
    }

    #[test]
    fn skip_invalid_frames() {
        let mut link = MockLink::new(LinkState::Initialized);
        // foreign ethertype, bad magic, magic without code, device error
        link.respond(&packets::encode_response(1), SERVER, 0x0800);
        link.respond(&[0xde, 0xad, 0xbe, 0xef, 0x01, 0x00], SERVER, ETHER_P_UNBS);
        link.respond(&UNBS_MAGIC, SERVER, ETHER_P_UNBS);
        link.script
            .push_back(Err(LinkError::Device(FwStatus(0x8000_0000_0000_0007))));
        // a reply from an unexpected source is still accepted
        let other = MacAddr::new([0, 0, 0, 0, 0, 0]);
        link.respond(&packets::encode_response(0x0102), other, ETHER_P_UNBS);

        let outcome = Transport::new(SERVER).query(&mut link);
        assert_eq!(outcome, QueryOutcome::Assigned(0x0102));
        assert_eq!(link.sent.len(), 1);
        assert_eq!(link.receives, 5);
    }

    #[test]
    fn later_attempt_succeeds() {
        let mut link = MockLink::new(LinkState::Initialized);
        for _ in 0..10 {
            link.script.push_back(Err(LinkError::NotReady));
        }
        link.respond(&packets::encode_response(3), SERVER, ETHER_P_UNBS);

        let outcome = Transport::new(SERVER).with_polls(10).query(&mut link);
        assert_eq!(outcome, QueryOutcome::Assigned(3));
        assert_eq!(link.sent.len(), 2);
    }

    #[test]
    fn session_restores_stopped_interface() {
        let mut link = MockLink::new(LinkState::Stopped);
        {
            let session = LinkSession::open(&mut link).unwrap();
            drop(session);
        }
        assert_eq!(link.calls, vec!["start", "initialize", "shutdown", "stop"]);
        assert_eq!(link.state, LinkState::Stopped);
    }

    #[test]
    fn session_leaves_initialized_interface_alone() {
        let mut link = MockLink::new(LinkState::Initialized);
        {
            let mut session = LinkSession::open(&mut link).unwrap();
            assert_eq!(session.link().state(), LinkState::Initialized);
        }
        assert!(link.calls.is_empty());
    }

    #[test]
    fn session_unwinds_failed_initialize() {
        let mut link = MockLink::new(LinkState::Stopped);
        link.fail_initialize = true;
        let result = LinkSession::open(&mut link).map(|_| ());
        assert_eq!(result, Err(LinkError::Device(FwStatus(7))));
        assert_eq!(link.calls, vec!["start", "initialize", "stop"]);
    }
}
