//! Linux signal handling module
//! This module installs the SIGUSR1 handler requesting a client database reload.

// std
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

// pending reload request, set from the signal handler
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

// on_sigusr1() function
extern "C" fn on_sigusr1(_signum: libc::c_int) {
    RELOAD_REQUESTED.store(true, Ordering::Relaxed);
}

// reload_flag() function
/// The flag raised by SIGUSR1, consumed by the arbiter loop
pub fn reload_flag() -> &'static AtomicBool {
    &RELOAD_REQUESTED
}

// set_reload_handler() function
/// Install the SIGUSR1 handler (see 'man 2 sigaction')
///
/// SA_RESTART is left unset so a blocked receive returns with EINTR.
pub fn set_reload_handler() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = on_sigusr1 as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        match libc::sigaction(libc::SIGUSR1, &action, ptr::null_mut()) {
            -1 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        }
    }
}
