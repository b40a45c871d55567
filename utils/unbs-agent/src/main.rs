//! unbs-agent - UEFI Network Boot Switch agent
//! This UEFI application asks the arbiter which boot option this machine
//! should start, then loads and starts it. Whenever a step fails it returns
//! to the firmware boot manager, which carries on with its own boot order.
#![no_std]
#![no_main]

extern crate alloc;

// alloc
use alloc::vec::Vec;

// log
use log::{error, info, warn};

// uefi
use uefi::prelude::*;
use uefi::proto::device_path::{DevicePath as FwDevicePath, FfiDevicePath};
use uefi::proto::loaded_image::LoadedImage;
use uefi::proto::media::file::{File, FileAttribute, FileMode};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::proto::network::snp::{NetworkState, SimpleNetwork};
use uefi::proto::network::MacAddress;
use uefi::table::boot::{
    BootServices, LoadImageSource, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol,
};
use uefi::table::runtime::{RuntimeServices, VariableVendor};
use uefi::CStr16;

// unbs
use unbs::agent::boot::{BootOutcome, BootSwitch, FallbackReason, ImageLauncher};
use unbs::agent::completer::VolumeSource;
use unbs::agent::resolver::{VariableError, VariableStore};
use unbs::agent::transport::{LinkError, LinkInterface, LinkState, Received, Transport};
use unbs::agent::FwStatus;
use unbs::constants::*;
use unbs::devpath::DevicePath;
use unbs::mac::{parse_server_identity, MacAddr};

// pause before handing back to the firmware, in microseconds
const AGENT_EXIT_PAUSE: usize = 3_000_000;
// the server identity file is one short line
const AGENT_SERVER_MAC_FILE_MAX: usize = 64;

// fw_status() function
fn fw_status(status: Status) -> FwStatus {
    FwStatus(status.0)
}

/// Simple Network Protocol Link
struct FirmwareLink<'a> {
    snp: ScopedProtocol<'a, SimpleNetwork>,
}

impl<'a> LinkInterface for FirmwareLink<'a> {
    fn state(&self) -> LinkState {
        let state = self.snp.mode().state;
        if state == NetworkState::INITIALIZED {
            LinkState::Initialized
        } else if state == NetworkState::STARTED {
            LinkState::Started
        } else {
            LinkState::Stopped
        }
    }
    fn start(&mut self) -> Result<(), LinkError> {
        self.snp
            .start()
            .map_err(|e| LinkError::Device(fw_status(e.status())))
    }
    fn initialize(&mut self) -> Result<(), LinkError> {
        self.snp
            .initialize(0, 0)
            .map_err(|e| LinkError::Device(fw_status(e.status())))
    }
    fn shutdown(&mut self) -> Result<(), LinkError> {
        self.snp
            .shutdown()
            .map_err(|e| LinkError::Device(fw_status(e.status())))
    }
    fn stop(&mut self) -> Result<(), LinkError> {
        self.snp
            .stop()
            .map_err(|e| LinkError::Device(fw_status(e.status())))
    }
    fn media_header_size(&self) -> usize {
        self.snp.mode().media_header_size as usize
    }
    fn transmit(
        &mut self,
        header_size: usize,
        frame: &[u8],
        dest: MacAddr,
        ethertype: u16,
    ) -> Result<(), LinkError> {
        let mut addr = MacAddress([0u8; 32]);
        addr.0[..ETHER_ADDR_LEN].copy_from_slice(&dest.octets());
        self.snp
            .transmit(header_size, frame, None, Some(addr), Some(ethertype))
            .map_err(|e| LinkError::Device(fw_status(e.status())))
    }
    fn receive(&mut self, buf: &mut [u8]) -> Result<Received, LinkError> {
        let mut header_size = 0usize;
        let mut source = MacAddress([0u8; 32]);
        let mut ethertype = 0u16;
        match self.snp.receive(
            buf,
            Some(&mut header_size),
            Some(&mut source),
            None,
            Some(&mut ethertype),
        ) {
            Ok(len) => Ok(Received {
                len,
                header_size,
                source: MacAddr::from_slice(&source.0).unwrap_or_default(),
                ethertype,
            }),
            Err(e) if e.status() == Status::NOT_READY => Err(LinkError::NotReady),
            Err(e) => Err(LinkError::Device(fw_status(e.status()))),
        }
    }
}

/// Runtime Variable Store
struct FirmwareVariables<'a> {
    rt: &'a RuntimeServices,
}

// variable_error() function
fn variable_error(status: Status) -> VariableError {
    match status {
        Status::NOT_FOUND => VariableError::NotFound,
        s => VariableError::Device(fw_status(s)),
    }
}

impl<'a> VariableStore for FirmwareVariables<'a> {
    fn get_variable(&self, name: &str, buf: &mut [u8]) -> Result<usize, VariableError> {
        let mut name_buf = [0u16; 16];
        let fw_name =
            CStr16::from_str_with_buf(name, &mut name_buf).map_err(|_| VariableError::NotFound)?;
        match self
            .rt
            .get_variable(fw_name, &VariableVendor::GLOBAL_VARIABLE, buf)
        {
            Ok((data, _attributes)) => Ok(data.len()),
            // a short read does not report the size, ask for it
            Err(e) if e.status() == Status::BUFFER_TOO_SMALL => {
                Err(VariableError::BufferTooSmall(self.variable_size(name)?))
            }
            Err(e) => Err(variable_error(e.status())),
        }
    }

    fn variable_size(&self, name: &str) -> Result<usize, VariableError> {
        let mut name_buf = [0u16; 16];
        let fw_name =
            CStr16::from_str_with_buf(name, &mut name_buf).map_err(|_| VariableError::NotFound)?;
        self.rt
            .get_variable_size(fw_name, &VariableVendor::GLOBAL_VARIABLE)
            .map_err(|e| variable_error(e.status()))
    }
}

/// Filesystem Volumes
struct FirmwareVolumes<'a> {
    bs: &'a BootServices,
    image: Handle,
}

impl<'a> VolumeSource for FirmwareVolumes<'a> {
    fn volume_paths(&self) -> Result<Vec<DevicePath>, FwStatus> {
        let handles = self
            .bs
            .find_handles::<SimpleFileSystem>()
            .map_err(|e| fw_status(e.status()))?;

        let mut paths = Vec::with_capacity(handles.len());
        for handle in handles {
            // GetProtocol does not disconnect the drivers using the handle
            let fw_path = unsafe {
                self.bs.open_protocol::<FwDevicePath>(
                    OpenProtocolParams {
                        handle,
                        agent: self.image,
                        controller: None,
                    },
                    OpenProtocolAttributes::GetProtocol,
                )
            };
            let fw_path = match fw_path {
                Ok(p) => p,
                Err(e) => {
                    warn!("volume without device path: {:?}", e.status());
                    continue;
                }
            };
            match convert_path(&fw_path) {
                Some(path) => paths.push(path),
                None => warn!("volume with malformed device path skipped"),
            }
        }
        Ok(paths)
    }
}

// convert_path() function
// decode the raw bytes of a firmware device path, terminating node included
fn convert_path(fw_path: &FwDevicePath) -> Option<DevicePath> {
    let span = fw_path
        .node_iter()
        .map(|node| usize::from(node.length()))
        .sum::<usize>()
        + EFI_DP_HEADER_LEN;
    // the node iterator walked these bytes up to the end-of-path node
    let bytes = unsafe { core::slice::from_raw_parts(fw_path.as_ffi_ptr().cast::<u8>(), span) };
    DevicePath::from_bytes(bytes).ok()
}

/// LoadImage / StartImage Launcher
struct FirmwareLauncher<'a> {
    bs: &'a BootServices,
    image: Handle,
}

impl<'a> ImageLauncher for FirmwareLauncher<'a> {
    fn launch(&mut self, path: &DevicePath) -> Result<(), FwStatus> {
        let bytes = path.to_bytes();
        // the encoded path is terminated, device path nodes are byte aligned
        let fw_path = unsafe { FwDevicePath::from_ffi_ptr(bytes.as_ptr().cast::<FfiDevicePath>()) };

        let child = self
            .bs
            .load_image(
                self.image,
                LoadImageSource::FromFilePath {
                    file_path: fw_path,
                    from_boot_manager: false,
                },
            )
            .map_err(|e| fw_status(e.status()))?;
        info!("image loaded, starting");
        self.bs.start_image(child).map_err(|e| fw_status(e.status()))
    }
}

// load_server_mac() function
/// Read the arbiter's address from the volume this agent was loaded from
fn load_server_mac(bs: &BootServices, image: Handle) -> Option<MacAddr> {
    let device = match bs.open_protocol_exclusive::<LoadedImage>(image) {
        Ok(loaded) => loaded.device(),
        Err(e) => {
            error!("cannot query loaded image: {:?}", e.status());
            return None;
        }
    };
    let mut fs = match bs.open_protocol_exclusive::<SimpleFileSystem>(device) {
        Ok(fs) => fs,
        Err(e) => {
            error!("cannot open boot volume: {:?}", e.status());
            return None;
        }
    };
    let mut root = fs.open_volume().ok()?;

    let mut name_buf = [0u16; 32];
    let name = CStr16::from_str_with_buf(AGENT_SERVER_MAC_FILE, &mut name_buf).ok()?;
    let mut file = match root.open(name, FileMode::Read, FileAttribute::empty()) {
        Ok(h) => h.into_regular_file()?,
        Err(e) => {
            error!("cannot open {}: {:?}", AGENT_SERVER_MAC_FILE, e.status());
            return None;
        }
    };

    let mut content = [0u8; AGENT_SERVER_MAC_FILE_MAX];
    let len = file.read(&mut content).ok()?;
    match parse_server_identity(&content[..len]) {
        Ok(mac) => Some(mac),
        Err(e) => {
            error!("invalid server address in {}: {}", AGENT_SERVER_MAC_FILE, e);
            None
        }
    }
}

// run() function
fn run(image: Handle, st: &SystemTable<Boot>) -> BootOutcome {
    let bs = st.boot_services();

    let server = match load_server_mac(bs, image) {
        Some(mac) => mac,
        None => return BootOutcome::Fallback(FallbackReason::NoServerAddress),
    };
    info!("server MAC: {}", server);

    // the first network interface found is used
    let snp = match bs
        .get_handle_for_protocol::<SimpleNetwork>()
        .and_then(|h| bs.open_protocol_exclusive::<SimpleNetwork>(h))
    {
        Ok(snp) => snp,
        Err(e) => {
            error!("no network interface: {:?}", e.status());
            let reason = FallbackReason::Link(LinkError::Device(fw_status(e.status())));
            return BootOutcome::Fallback(reason);
        }
    };

    let mut link = FirmwareLink { snp };
    let variables = FirmwareVariables {
        rt: st.runtime_services(),
    };
    let volumes = FirmwareVolumes { bs, image };
    let mut launcher = FirmwareLauncher { bs, image };

    BootSwitch {
        transport: Transport::new(server),
        link: &mut link,
        variables: &variables,
        volumes: &volumes,
        launcher: &mut launcher,
    }
    .run()
}

// efi_main() function
#[entry]
fn efi_main(image: Handle, mut system_table: SystemTable<Boot>) -> Status {
    if uefi_services::init(&mut system_table).is_err() {
        return Status::SUCCESS;
    }
    info!("UEFI Network Boot Switch v{}", UNBS_VERSION);

    if let BootOutcome::Fallback(reason) = run(image, &system_table) {
        warn!("{}", reason);
        info!("returning to UEFI boot manager...");
        system_table.boot_services().stall(AGENT_EXIT_PAUSE);
    }

    // the firmware moves on to its next boot option either way
    Status::SUCCESS
}
