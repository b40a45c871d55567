//! Linux Operating System support

// standard C library compatibility
pub mod libc;
// packet socket support
pub mod socket;
// signal support
pub mod signal;
