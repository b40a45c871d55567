//! standard C library compatibility module
//! This module wraps the interface name calls of the C library.

// std
use std::ffi::{CStr, CString};
use std::io;
use std::os::raw::c_char;

// c_ifnametoindex() function
/// see 'man 3 if_nametoindex'
pub fn c_ifnametoindex(ifname: &str) -> io::Result<u32> {
    let c_ifname = CString::new(ifname)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL"))?;
    unsafe {
        let r = libc::if_nametoindex(c_ifname.as_ptr());
        if r == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(r)
        }
    }
}

// c_ifindextoname() function
/// see 'man 3 if_indextoname'
pub fn c_ifindextoname(ifindex: i32) -> io::Result<String> {
    let mut buf = [0 as c_char; libc::IF_NAMESIZE];
    unsafe {
        if libc::if_indextoname(ifindex as u32, buf.as_mut_ptr()).is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned())
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_interface() {
        assert!(c_ifnametoindex("unbs-no-such0").is_err());
        assert!(c_ifnametoindex("eth\0").is_err());
    }

    #[test]
    fn loopback_name_round_trip() {
        // every linux network namespace has a loopback device
        let index = c_ifnametoindex("lo").unwrap();
        assert_eq!(c_ifindextoname(index as i32).unwrap(), "lo");
    }
}
