//! boot flow module
//! This module chains the agent steps: query the arbiter, resolve the boot option, complete its path and launch it.

// core
use core::fmt;

// log
use log::{error, info};

// device paths
use crate::devpath::DevicePath;

// agent steps
use super::completer::{DevicePathCompleter, VolumeSource};
use super::resolver::{BootEntryResolver, ResolveError, VariableStore};
use super::transport::{LinkError, LinkInterface, LinkSession, QueryOutcome, Transport};
use super::FwStatus;

/// Image Loading Capability
pub trait ImageLauncher {
    // load the image at `path` and transfer control to it
    fn launch(&mut self, path: &DevicePath) -> Result<(), FwStatus>;
}

/// Reason for handing control back to the firmware boot manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    // the arbiter's address could not be read
    NoServerAddress,
    Link(LinkError),
    NoResponse,
    UnknownRequester,
    Resolve(ResolveError),
    NoMatchingVolume,
    Launch(FwStatus),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FallbackReason::NoServerAddress => write!(f, "arbiter address unavailable"),
            FallbackReason::Link(e) => write!(f, "network unavailable: {}", e),
            FallbackReason::NoResponse => write!(f, "no answer from the arbiter"),
            FallbackReason::UnknownRequester => write!(f, "arbiter does not know this machine"),
            FallbackReason::Resolve(e) => write!(f, "{}", e),
            FallbackReason::NoMatchingVolume => write!(f, "boot option volume not present"),
            FallbackReason::Launch(e) => write!(f, "could not start image: {}", e),
        }
    }
}

/// Boot Flow Outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    // the image was started and has returned
    Launched,
    Fallback(FallbackReason),
}

// request_boot_code() function
/// Bring the network up, ask the arbiter and bring the network back down
pub fn request_boot_code<L: LinkInterface>(
    transport: &Transport,
    link: &mut L,
) -> Result<u16, FallbackReason> {
    let outcome = {
        let mut session = LinkSession::open(link).map_err(FallbackReason::Link)?;
        transport.query(session.link())
    };

    match outcome {
        QueryOutcome::Assigned(code) => {
            info!("boot code received: {:04x}", code);
            Ok(code)
        }
        QueryOutcome::Unknown => Err(FallbackReason::UnknownRequester),
        QueryOutcome::NoResponse => Err(FallbackReason::NoResponse),
    }
}

/// Boot Switch
///
/// Borrows every firmware capability the boot flow needs.
pub struct BootSwitch<'a, L, V, S, I>
where
    L: LinkInterface,
    V: VariableStore + ?Sized,
    S: VolumeSource + ?Sized,
    I: ImageLauncher + ?Sized,
{
    pub transport: Transport,
    pub link: &'a mut L,
    pub variables: &'a V,
    pub volumes: &'a S,
    pub launcher: &'a mut I,
}

// BootSwitch methods
impl<'a, L, V, S, I> BootSwitch<'a, L, V, S, I>
where
    L: LinkInterface,
    V: VariableStore + ?Sized,
    S: VolumeSource + ?Sized,
    I: ImageLauncher + ?Sized,
{
    // run() method
    /// Run the whole boot flow
    ///
    /// Every failure is logged and reported as a fallback, the caller then
    /// returns to the firmware boot manager.
    pub fn run(&mut self) -> BootOutcome {
        match self.try_run() {
            Ok(()) => BootOutcome::Launched,
            Err(reason) => {
                error!("{}, returning to firmware boot manager", reason);
                BootOutcome::Fallback(reason)
            }
        }
    }

    // try_run() method
    fn try_run(&mut self) -> Result<(), FallbackReason> {
        let code = request_boot_code(&self.transport, self.link)?;

        let partial = BootEntryResolver::new(self.variables)
            .resolve(code)
            .map_err(FallbackReason::Resolve)?;

        let path = DevicePathCompleter::new(self.volumes)
            .complete(&partial)
            .ok_or(FallbackReason::NoMatchingVolume)?;

        info!("final booting: {}", path);
        self.launcher.launch(&path).map_err(FallbackReason::Launch)
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::agent::resolver::VariableError;
    use crate::agent::transport::{LinkState, Received};
    use crate::constants::*;
    use crate::devpath::DevicePathNode;
    use crate::mac::MacAddr;
    use crate::packets;
    use std::collections::HashMap;

    const SERVER: MacAddr = MacAddr::new([2, 0, 0, 0, 0, 1]);

    // answers every request with a fixed code, or never
    struct AnsweringLink {
        answer: Option<u16>,
        pending: bool,
        transmits: usize,
        state: LinkState,
    }

    impl AnsweringLink {
        fn new(answer: Option<u16>) -> AnsweringLink {
            AnsweringLink {
                answer,
                pending: false,
                transmits: 0,
                state: LinkState::Stopped,
            }
        }
    }

    impl LinkInterface for AnsweringLink {
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
            0
        }
        fn transmit(&mut self, _: usize, _: &[u8], _: MacAddr, _: u16) -> Result<(), LinkError> {
            self.transmits += 1;
            self.pending = self.answer.is_some();
            Ok(())
        }
        fn receive(&mut self, buf: &mut [u8]) -> Result<Received, LinkError> {
            match (self.pending, self.answer) {
                (true, Some(code)) => {
                    self.pending = false;
                    buf[..UNBS_FRAME_LEN].copy_from_slice(&packets::encode_response(code));
                    Ok(Received {
                        len: UNBS_FRAME_LEN,
                        header_size: 0,
                        source: SERVER,
                        ethertype: ETHER_P_UNBS,
                    })
                }
                _ => Err(LinkError::NotReady),
            }
        }
    }

    // variable store that must never be reached
    struct Variables(HashMap<String, Vec<u8>>, std::cell::Cell<usize>);

    impl VariableStore for Variables {
        fn get_variable(&self, name: &str, buf: &mut [u8]) -> Result<usize, VariableError> {
            self.1.set(self.1.get() + 1);
            let data = self.0.get(name).ok_or(VariableError::NotFound)?;
            if buf.len() < data.len() {
                return Err(VariableError::BufferTooSmall(data.len()));
            }
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    struct Volumes(Vec<DevicePath>);

    impl VolumeSource for Volumes {
        fn volume_paths(&self) -> Result<Vec<DevicePath>, FwStatus> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Launcher(Vec<DevicePath>);

    impl ImageLauncher for Launcher {
        fn launch(&mut self, path: &DevicePath) -> Result<(), FwStatus> {
            self.0.push(path.clone());
            Ok(())
        }
    }

    fn hd() -> DevicePathNode {
        DevicePathNode::new(EFI_DP_TYPE_MEDIA, EFI_DP_SUBTYPE_HARD_DRIVE, vec![1; 42]).unwrap()
    }

    fn file() -> DevicePathNode {
        DevicePathNode::file_path("\\EFI\\fedora\\shimx64.efi").unwrap()
    }

    fn boot_option(path: &DevicePath) -> Vec<u8> {
        let path = path.to_bytes();
        let mut blob = vec![1, 0, 0, 0];
        blob.extend_from_slice(&(path.len() as u16).to_le_bytes());
        blob.extend_from_slice(&[0x46, 0x00, 0x00, 0x00]); // "F"
        blob.extend_from_slice(&path);
        blob
    }

    fn volume() -> DevicePath {
        DevicePath::new(vec![
            DevicePathNode::new(0x02, 0x01, vec![0; 8]).unwrap(),
            hd(),
        ])
    }

    fn variables() -> Variables {
        let mut vars = HashMap::new();
        vars.insert(
            "Boot0007".to_string(),
            boot_option(&DevicePath::new(vec![hd(), file()])),
        );
        Variables(vars, std::cell::Cell::new(0))
    }

    #[test]
    fn boot_assigned_entry() {
        let mut link = AnsweringLink::new(Some(0x0007));
        let vars = variables();
        let volumes = Volumes(vec![volume()]);
        let mut launcher = Launcher::default();

        let outcome = BootSwitch {
            transport: Transport::new(SERVER),
            link: &mut link,
            variables: &vars,
            volumes: &volumes,
            launcher: &mut launcher,
        }
        .run();

        assert_eq!(outcome, BootOutcome::Launched);
        assert_eq!(launcher.0, vec![volume().append(&[file()])]);
        // the network was brought back down before booting
        assert_eq!(link.state, LinkState::Stopped);
    }

    #[test]
    fn no_response_skips_resolution() {
        let mut link = AnsweringLink::new(None);
        let vars = variables();
        let volumes = Volumes(vec![volume()]);
        let mut launcher = Launcher::default();

        let outcome = BootSwitch {
            transport: Transport::new(SERVER).with_polls(20),
            link: &mut link,
            variables: &vars,
            volumes: &volumes,
            launcher: &mut launcher,
        }
        .run();

        assert_eq!(outcome, BootOutcome::Fallback(FallbackReason::NoResponse));
        assert_eq!(link.transmits, 3);
        assert_eq!(vars.1.get(), 0);
        assert!(launcher.0.is_empty());
    }

    #[test]
    fn unknown_requester_falls_back() {
        let mut link = AnsweringLink::new(Some(UNBS_CODE_UNKNOWN));
        let vars = variables();
        let volumes = Volumes(vec![volume()]);
        let mut launcher = Launcher::default();

        let outcome = BootSwitch {
            transport: Transport::new(SERVER),
            link: &mut link,
            variables: &vars,
            volumes: &volumes,
            launcher: &mut launcher,
        }
        .run();

        assert_eq!(
            outcome,
            BootOutcome::Fallback(FallbackReason::UnknownRequester)
        );
        assert_eq!(link.transmits, 1);
        assert_eq!(vars.1.get(), 0);
    }

    #[test]
    fn missing_entry_and_missing_volume() {
        let vars = variables();
        let mut launcher = Launcher::default();

        let mut link = AnsweringLink::new(Some(0x0008));
        let volumes = Volumes(vec![volume()]);
        let outcome = BootSwitch {
            transport: Transport::new(SERVER),
            link: &mut link,
            variables: &vars,
            volumes: &volumes,
            launcher: &mut launcher,
        }
        .run();
        match outcome {
            BootOutcome::Fallback(FallbackReason::Resolve(ResolveError::NotFound {
                name, ..
            })) => assert_eq!(name, "Boot0008"),
            other => panic!("unexpected outcome {:?}", other),
        }

        let mut link = AnsweringLink::new(Some(0x0007));
        let volumes = Volumes(Vec::new());
        let outcome = BootSwitch {
            transport: Transport::new(SERVER),
            link: &mut link,
            variables: &vars,
            volumes: &volumes,
            launcher: &mut launcher,
        }
        .run();
        assert_eq!(
            outcome,
            BootOutcome::Fallback(FallbackReason::NoMatchingVolume)
        );
        assert!(launcher.0.is_empty());
    }
}
