//! unbs-query - unbs arbiter query utility
//! This program sends one boot code request from a Linux host, exactly as the
//! firmware boot agent would, and prints the arbiter's answer.

// std
use std::error::Error;
use std::fmt;
use std::time::Duration;

// clap
use clap::{crate_version, App, Arg};

// unbs
use unbs::agent::transport::{
    LinkError, LinkInterface, LinkSession, LinkState, QueryOutcome, Received, Transport,
};
use unbs::agent::FwStatus;
use unbs::constants::*;
use unbs::mac::MacAddr;
use unbs::os::linux::socket::RawSocket;

// MyError type
#[derive(Debug)]
struct MyError {
    msg: String,
}

impl MyError {
    fn new(msg: &str) -> MyError {
        MyError {
            msg: msg.to_string(),
        }
    }
}

impl fmt::Display for MyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.msg)
    }
}

impl Error for MyError {}

/// Packet Socket Link
///
/// The host interface is already up, start and initialize only track state.
struct PacketLink {
    socket: RawSocket,
    ifindex: i32,
    state: LinkState,
    idle: Duration,
}

impl LinkInterface for PacketLink {
    fn state(&self) -> LinkState {
        self.state
    }
    fn start(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::Started;
        Ok(())
    }
    fn initialize(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::Initialized;
        Ok(())
    }
    fn shutdown(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::Started;
        Ok(())
    }
    fn stop(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::Stopped;
        Ok(())
    }
    fn media_header_size(&self) -> usize {
        // the kernel builds the ethernet header of SOCK_DGRAM sockets
        0
    }
    fn transmit(
        &mut self,
        header_size: usize,
        frame: &[u8],
        dest: MacAddr,
        _ethertype: u16,
    ) -> Result<(), LinkError> {
        self.socket
            .send_frame(&frame[header_size..], self.ifindex, dest)
            .map(|_| ())
            .map_err(os_error)
    }
    fn receive(&mut self, buf: &mut [u8]) -> Result<Received, LinkError> {
        match self.socket.recv_frame(buf, true) {
            Ok(Some((len, peer))) => Ok(Received {
                len,
                header_size: 0,
                source: peer.mac().unwrap_or_default(),
                ethertype: peer.protocol,
            }),
            Ok(None) => Err(LinkError::NotReady),
            Err(e) => Err(os_error(e)),
        }
    }
    fn idle(&mut self) {
        std::thread::sleep(self.idle);
    }
}

// os_error() function
fn os_error(e: std::io::Error) -> LinkError {
    LinkError::Device(FwStatus(e.raw_os_error().unwrap_or(0) as usize))
}

// main() function
fn main() {
    let matches = App::new("unbs-query")
        .version(crate_version!())
        .about("Ask a unbs arbiter which boot code it assigns to this machine")
        .arg(
            Arg::with_name("iface")
                .short("i")
                .long("iface")
                .takes_value(true)
                .help("ethernet interface to send the request on")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("server")
                .short("s")
                .long("server")
                .takes_value(true)
                .help("arbiter's MAC address (xx:xx:xx:xx:xx:xx)")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("attempts")
                .short("a")
                .long("attempts")
                .takes_value(true)
                .help("number of requests sent before giving up (default: 3)"),
        )
        .arg(
            Arg::with_name("polls")
                .short("p")
                .long("polls")
                .takes_value(true)
                .help("receive polls per request, one per millisecond (default: 1000)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("print every transport step"),
        )
        .after_help(
            "EXIT STATUS:\n\
        0\tboot code assigned\n\
        1\terror\n\
        2\tunknown requester\n\
        3\tno response\n",
        )
        .get_matches();

    let iface = matches.value_of("iface").unwrap_or_default();
    let server = matches.value_of("server").unwrap_or_default();
    let attempts = matches.value_of("attempts");
    let polls = matches.value_of("polls");

    // log records of the transport go through tracing
    let level = match matches.is_present("verbose") {
        true => tracing::Level::DEBUG,
        false => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match query(iface, server, attempts, polls) {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(QueryOutcome::Assigned(code)) => {
            println!("{:04x}", code);
            std::process::exit(0);
        }
        Ok(QueryOutcome::Unknown) => {
            println!("unknown");
            std::process::exit(2);
        }
        Ok(QueryOutcome::NoResponse) => {
            println!("no response");
            std::process::exit(3);
        }
    }
}

/// query() function
/// Send the request and wait for the arbiter's answer
fn query(
    iface: &str,
    server: &str,
    attempts: Option<&str>,
    polls: Option<&str>,
) -> Result<QueryOutcome, MyError> {
    let server = server
        .parse::<MacAddr>()
        .map_err(|e| MyError::new(&format!("invalid server address {}: {}", server, e)))?;
    let attempts = parse_count(attempts, AGENT_TX_ATTEMPTS, "attempts")?;
    let polls = parse_count(polls, AGENT_RX_POLLS, "polls")?;

    let socket = RawSocket::open(Some(iface))
        .map_err(|e| MyError::new(&format!("cannot open packet socket on {}: {}", iface, e)))?;
    let ifindex = socket
        .ifindex()
        .ok_or_else(|| MyError::new("socket is not bound to an interface"))?;

    let mut link = PacketLink {
        socket,
        ifindex,
        state: LinkState::Stopped,
        idle: Duration::from_millis(1),
    };
    let transport = Transport::new(server)
        .with_attempts(attempts)
        .with_polls(polls);

    let mut session = LinkSession::open(&mut link)
        .map_err(|e| MyError::new(&format!("cannot bring {} up: {}", iface, e)))?;
    Ok(transport.query(session.link()))
}

/// parse_count() function
fn parse_count(value: Option<&str>, default: u32, name: &str) -> Result<u32, MyError> {
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(MyError::new(&format!("invalid number of {}: {}", name, v))),
        },
    }
}
