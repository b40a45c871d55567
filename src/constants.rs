//! Constants module
//! This module regroups all the program's and protocol's constants.

// core
use core::time::Duration;

// Program Constants
pub const UNBS_BANNER: &str = r"
  _   _ _ __ | |__  ___
 | | | | '_ \| '_ \/ __|
 | |_| | | | | |_) \__ \
  \__,_|_| |_|_.__/|___/
";
pub const UNBS_DFLT_CFG_FILE: &str = "/etc/unbs/unbsd.conf";
pub const UNBS_DFLT_PIDFILE: &str = "/var/run/unbsd.pid";
pub const UNBS_DFLT_WORKDIR: &str = "/tmp";
pub const UNBS_DFLT_LOGFILE: &str = "/var/log/unbsd.log";
pub const UNBS_DFLT_ELOGFILE: &str = "/var/log/unbsd-error.log";
pub const UNBS_DFLT_DATABASE: &str = "/etc/unbs/clients.db";
pub const UNBS_DFLT_DATE_FORMAT: &str = "%b %e %Y %T";
pub const UNBS_NAME: &str = env!("CARGO_PKG_NAME");
pub const UNBS_VERSION: &str = env!("CARGO_PKG_VERSION");

// Debug Constants
pub const DEBUG_LEVEL_INFO: u8 = 0;
pub const DEBUG_LEVEL_LOW: u8 = 1;
pub const DEBUG_LEVEL_MEDIUM: u8 = 2;
pub const DEBUG_LEVEL_HIGH: u8 = 3;
pub const DEBUG_LEVEL_EXTENSIVE: u8 = 5;
pub const DEBUG_SRC_INFO: &str = "info";
pub const DEBUG_SRC_MAIN: &str = "main";
pub const DEBUG_SRC_DB: &str = "db";
pub const DEBUG_SRC_ARBITER: &str = "arbiter";
pub const DEBUG_SRC_PACKET: &str = "packet";
pub const DEBUG_SRC_SOCKET: &str = "socket";
pub const DEBUG_SRC_SIGNAL: &str = "signal";

// Ethernet Constants
pub const ETHER_P_UNBS: u16 = 0x88B6; // local experimental ethertype (IEEE 802 / 0x88B5-0x88B6)
pub const ETHER_ADDR_LEN: usize = 6;

// Boot Switch Protocol Constants
pub const UNBS_MAGIC: [u8; 4] = [0xB0, 0x07, 0xB0, 0x07];
pub const UNBS_MAGIC_LEN: usize = 4;
pub const UNBS_CODE_POS: usize = 4; // position of the 16-bit boot code
pub const UNBS_FRAME_LEN: usize = 6;
pub const UNBS_CODE_UNKNOWN: u16 = 0xFFFF; // requester not in the client table
pub const UNBS_RX_BUFFER_SIZE: usize = 100;
pub const UNBS_RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100); // pause after a failed receive

// Client Table Constants
pub const CLIENTS_DFLT_MAX: usize = 10;

// Agent Constants
pub const AGENT_TX_ATTEMPTS: u32 = 3;
pub const AGENT_RX_POLLS: u32 = 1000;
pub const AGENT_RX_BUFFER_SIZE: usize = 1024;
pub const AGENT_SERVER_MAC_FILE: &str = "\\EFI\\UNBS\\server.mac";

// Firmware Constants
pub const EFI_BOOT_OPTION_PREFIX: &str = "Boot";
pub const EFI_LOAD_OPTION_ATTR_LEN: usize = 4;
pub const EFI_LOAD_OPTION_FPL_LEN: usize = 2;
pub const EFI_DP_HEADER_LEN: usize = 4;
pub const EFI_DP_TYPE_MEDIA: u8 = 0x04;
pub const EFI_DP_TYPE_END: u8 = 0x7F;
pub const EFI_DP_SUBTYPE_HARD_DRIVE: u8 = 0x01;
pub const EFI_DP_SUBTYPE_FILE_PATH: u8 = 0x04;
pub const EFI_DP_SUBTYPE_END_INSTANCE: u8 = 0x01;
pub const EFI_DP_SUBTYPE_END_ENTIRE: u8 = 0xFF;
