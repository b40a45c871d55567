//! boot agent module
//! This module regroups the firmware-independent parts of the boot agent.
//!
//! The agent runs before any operating system is loaded. Everything it needs
//! from the firmware is reached through the capability traits defined in the
//! submodules, so the same code drives the UEFI application and the host
//! side test doubles:
//!
//! - [`transport::LinkInterface`]: raw Ethernet access
//! - [`resolver::VariableStore`]: firmware variable store
//! - [`completer::VolumeSource`]: live filesystem volumes
//! - [`boot::ImageLauncher`]: load and start an image

// core
use core::fmt;

// agent transport
pub mod transport;

// boot entry resolution
pub mod resolver;

// device path completion
pub mod completer;

// boot flow
pub mod boot;

/// Firmware Status Code
///
/// Raw status returned by a firmware call that failed in a way the agent
/// does not interpret any further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwStatus(pub usize);

impl fmt::Display for FwStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "firmware status {:#x}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FwStatus {}
