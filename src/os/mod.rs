//! operating systems support module

// Linux Operating System support
#[cfg(target_os = "linux")]
pub mod linux;
