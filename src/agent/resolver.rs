//! boot entry resolution module
//! This module turns a boot code into the device path stored in the matching firmware boot option.
//!
//! Boot options live in global firmware variables named `BootXXXX`. Their
//! content is an `EFI_LOAD_OPTION`:
//!
//! ```text
//!  attributes       u32
//!  file path length u16
//!  description      NUL-terminated UCS-2 string
//!  file path list   device path(s), `file path length` bytes
//!  optional data    remaining bytes
//! ```

// alloc
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

// core
use core::fmt;

// byteorder
use byteorder::{ByteOrder, LittleEndian};

// log
use log::{debug, info};

// constants
use crate::constants::*;

// device paths
use crate::devpath::{DevicePath, DevicePathError};

// firmware status
use super::FwStatus;

/// Firmware Variable Access Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableError {
    // the buffer cannot hold the variable, which needs that many bytes
    BufferTooSmall(usize),
    NotFound,
    Device(FwStatus),
}

impl fmt::Display for VariableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VariableError::BufferTooSmall(n) => write!(f, "buffer too small, {} bytes needed", n),
            VariableError::NotFound => write!(f, "variable not found"),
            VariableError::Device(s) => write!(f, "{}", s),
        }
    }
}

/// Firmware Variable Store Capability
///
/// Only the global variable namespace is used.
pub trait VariableStore {
    // copy the variable into `buf`, returning its size
    fn get_variable(&self, name: &str, buf: &mut [u8]) -> Result<usize, VariableError>;

    // variable_size() method
    /// Size of a variable in bytes
    ///
    /// Asks with an empty buffer by default. Stores whose short reads do
    /// not report the required size answer through a dedicated query.
    fn variable_size(&self, name: &str) -> Result<usize, VariableError> {
        match self.get_variable(name, &mut []) {
            Ok(len) => Ok(len),
            Err(VariableError::BufferTooSmall(size)) => Ok(size),
            Err(e) => Err(e),
        }
    }
}

/// Load Option Decoding Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOptionError {
    // shorter than the attributes and length fields
    TruncatedHeader(usize),
    UnterminatedDescription,
    FilePathListOverrun { declared: usize, available: usize },
    DevicePath(DevicePathError),
}

impl fmt::Display for LoadOptionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadOptionError::TruncatedHeader(len) => {
                write!(f, "load option truncated ({} bytes)", len)
            }
            LoadOptionError::UnterminatedDescription => {
                write!(f, "load option description is not terminated")
            }
            LoadOptionError::FilePathListOverrun {
                declared,
                available,
            } => write!(
                f,
                "file path list of {} bytes but only {} bytes left",
                declared, available
            ),
            LoadOptionError::DevicePath(e) => write!(f, "{}", e),
        }
    }
}

/// Boot Entry Resolution Error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound { name: String, cause: VariableError },
    Malformed { name: String, cause: LoadOptionError },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::NotFound { name, cause } => {
                write!(f, "could not load boot entry {}: {}", name, cause)
            }
            ResolveError::Malformed { name, cause } => {
                write!(f, "malformed boot entry {}: {}", name, cause)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ResolveError {}

/// Decoded Firmware Load Option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOption {
    attributes: u32,
    description: String,
    file_path: DevicePath,
    optional_data: Vec<u8>,
}

// LoadOption methods
impl LoadOption {
    // parse() method
    /// Decode an `EFI_LOAD_OPTION` blob
    ///
    /// Only the first device path of the file path list is kept.
    pub fn parse(blob: &[u8]) -> Result<LoadOption, LoadOptionError> {
        let header_len = EFI_LOAD_OPTION_ATTR_LEN + EFI_LOAD_OPTION_FPL_LEN;
        if blob.len() < header_len {
            return Err(LoadOptionError::TruncatedHeader(blob.len()));
        }

        // attributes and file path list length
        let attributes = LittleEndian::read_u32(&blob[..EFI_LOAD_OPTION_ATTR_LEN]);
        let fpl_len =
            usize::from(LittleEndian::read_u16(&blob[EFI_LOAD_OPTION_ATTR_LEN..header_len]));

        // description, UCS-2 up to and including its NUL
        let mut units = Vec::new();
        let mut pos = header_len;
        loop {
            if blob.len() - pos < 2 {
                return Err(LoadOptionError::UnterminatedDescription);
            }
            let unit = LittleEndian::read_u16(&blob[pos..pos + 2]);
            pos += 2;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        let description = core::char::decode_utf16(units.iter().cloned())
            .map(|c| c.unwrap_or(core::char::REPLACEMENT_CHARACTER))
            .collect::<String>();

        // file path list
        let available = blob.len() - pos;
        if fpl_len > available {
            return Err(LoadOptionError::FilePathListOverrun {
                declared: fpl_len,
                available,
            });
        }
        let file_path_list = &blob[pos..pos + fpl_len];
        let file_path =
            DevicePath::from_bytes(file_path_list).map_err(LoadOptionError::DevicePath)?;

        Ok(LoadOption {
            attributes,
            description,
            file_path,
            optional_data: blob[pos + fpl_len..].to_vec(),
        })
    }
    // getters
    pub fn attributes(&self) -> u32 {
        self.attributes
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn file_path(&self) -> &DevicePath {
        &self.file_path
    }
    pub fn optional_data(&self) -> &[u8] {
        &self.optional_data
    }
    // into_file_path() method
    pub fn into_file_path(self) -> DevicePath {
        self.file_path
    }
}

// boot_option_name() function
/// Name of the firmware variable holding boot option `code`
pub fn boot_option_name(code: u16) -> String {
    format!("{}{:04X}", EFI_BOOT_OPTION_PREFIX, code)
}

// fetch_variable() function
/// Read a variable of unknown size
///
/// Queries the size first, then reads the variable into a buffer of that
/// size.
pub fn fetch_variable<V: VariableStore + ?Sized>(
    store: &V,
    name: &str,
) -> Result<Vec<u8>, VariableError> {
    let size = store.variable_size(name)?;
    // an empty variable is as good as no variable
    if size == 0 {
        return Err(VariableError::NotFound);
    }

    let mut buf = vec![0u8; size];
    match store.get_variable(name, &mut buf) {
        Ok(len) => {
            buf.truncate(len);
            Ok(buf)
        }
        Err(e) => Err(e),
    }
}

/// Boot Entry Resolver
pub struct BootEntryResolver<'a, V: VariableStore + ?Sized> {
    store: &'a V,
}

// BootEntryResolver methods
impl<'a, V: VariableStore + ?Sized> BootEntryResolver<'a, V> {
    // new() method
    pub fn new(store: &'a V) -> BootEntryResolver<'a, V> {
        BootEntryResolver { store }
    }

    // load_option() method
    pub fn load_option(&self, code: u16) -> Result<LoadOption, ResolveError> {
        let name = boot_option_name(code);
        debug!("reading boot option variable {}", name);

        let blob = match fetch_variable(self.store, &name) {
            Ok(b) => b,
            Err(cause) => return Err(ResolveError::NotFound { name, cause }),
        };

        match LoadOption::parse(&blob) {
            Ok(option) => Ok(option),
            Err(cause) => Err(ResolveError::Malformed { name, cause }),
        }
    }

    // resolve() method
    /// Fetch boot option `code` and return its partial device path
    pub fn resolve(&self, code: u16) -> Result<DevicePath, ResolveError> {
        let option = self.load_option(code)?;
        info!("BOOTING: description '{}'", option.description());
        info!("boot option path: {}", option.file_path());
        Ok(option.into_file_path())
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;
    use crate::devpath::DevicePathNode;
    use std::cell::RefCell;
    use std::collections::HashMap;

    // in-memory variable store
    #[derive(Default)]
    struct MockStore {
        vars: HashMap<String, Vec<u8>>,
        // fail the second read with this error
        fail_read: Option<VariableError>,
        calls: RefCell<Vec<usize>>,
    }

    impl VariableStore for MockStore {
        fn get_variable(&self, name: &str, buf: &mut [u8]) -> Result<usize, VariableError> {
            self.calls.borrow_mut().push(buf.len());
            let data = self.vars.get(name).ok_or(VariableError::NotFound)?;
            if buf.len() < data.len() {
                return Err(VariableError::BufferTooSmall(data.len()));
            }
            if let Some(e) = self.fail_read {
                return Err(e);
            }
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    fn partial_path() -> DevicePath {
        let mut hd = vec![1, 0, 0, 0];
        hd.extend_from_slice(&[0x11; 38]);
        DevicePath::new(vec![
            DevicePathNode::new(EFI_DP_TYPE_MEDIA, EFI_DP_SUBTYPE_HARD_DRIVE, hd).unwrap(),
            DevicePathNode::file_path("\\EFI\\debian\\shimx64.efi").unwrap(),
        ])
    }

    fn load_option(description: &str, path: &DevicePath, trailing: &[u8]) -> Vec<u8> {
        let path = path.to_bytes();
        let mut blob = Vec::new();
        blob.extend_from_slice(&1u32.to_le_bytes()); // LOAD_OPTION_ACTIVE
        blob.extend_from_slice(&(path.len() as u16).to_le_bytes());
        for unit in description.encode_utf16().chain(std::iter::once(0)) {
            blob.extend_from_slice(&unit.to_le_bytes());
        }
        blob.extend_from_slice(&path);
        blob.extend_from_slice(trailing);
        blob
    }

    #[test]
    fn variable_names() {
        assert_eq!(boot_option_name(0x0007), "Boot0007");
        assert_eq!(boot_option_name(0x00ab), "Boot00AB");
        assert_eq!(boot_option_name(0x1000), "Boot1000");
    }

    #[test]
    fn resolve_boot_entry() {
        let mut store = MockStore::default();
        store.vars.insert(
            "Boot0007".to_string(),
            load_option("debian", &partial_path(), &[]),
        );

        let path = BootEntryResolver::new(&store).resolve(0x0007).unwrap();
        assert_eq!(path, partial_path());
        // size query with an empty buffer, then the real read
        let blob_len = store.vars["Boot0007"].len();
        assert_eq!(*store.calls.borrow(), vec![0, blob_len]);
    }

    #[test]
    fn trailing_data_is_discarded() {
        let mut store = MockStore::default();
        let mut second = partial_path().to_bytes();
        second.extend_from_slice(b"optional");
        store.vars.insert(
            "Boot0002".to_string(),
            load_option("Windows Boot Manager", &partial_path(), &second),
        );

        let option = BootEntryResolver::new(&store).load_option(2).unwrap();
        assert_eq!(option.attributes(), 1);
        assert_eq!(option.description(), "Windows Boot Manager");
        assert_eq!(option.file_path(), &partial_path());
        assert_eq!(option.optional_data(), &second[..]);
    }

    #[test]
    fn missing_variable() {
        let store = MockStore::default();
        let err = BootEntryResolver::new(&store).resolve(0x0042).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotFound {
                name: "Boot0042".to_string(),
                cause: VariableError::NotFound
            }
        );
    }

    #[test]
    fn failed_second_read() {
        let mut store = MockStore::default();
        store.vars.insert(
            "Boot0001".to_string(),
            load_option("x", &partial_path(), &[]),
        );
        store.fail_read = Some(VariableError::Device(FwStatus(3)));
        match BootEntryResolver::new(&store).resolve(1) {
            Err(ResolveError::NotFound { cause, .. }) => {
                assert_eq!(cause, VariableError::Device(FwStatus(3)))
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    // short reads carry no size, like runtime services GetVariable wrappers
    // that only return a status
    struct SizeQueryStore {
        data: Vec<u8>,
    }

    impl VariableStore for SizeQueryStore {
        fn get_variable(&self, _name: &str, buf: &mut [u8]) -> Result<usize, VariableError> {
            if buf.len() < self.data.len() {
                return Err(VariableError::BufferTooSmall(0));
            }
            buf[..self.data.len()].copy_from_slice(&self.data);
            Ok(self.data.len())
        }
        fn variable_size(&self, _name: &str) -> Result<usize, VariableError> {
            Ok(self.data.len())
        }
    }

    #[test]
    fn size_from_dedicated_query() {
        let store = SizeQueryStore {
            data: load_option("debian", &partial_path(), &[]),
        };
        let path = BootEntryResolver::new(&store).resolve(0x0007).unwrap();
        assert_eq!(path, partial_path());
    }

    #[test]
    fn zero_size_is_not_found() {
        let mut store = MockStore::default();
        store.vars.insert("Boot0004".to_string(), vec![1, 2, 3]);
        // a store answering a short read without the required size
        struct Lossy<'a>(&'a MockStore);
        impl<'a> VariableStore for Lossy<'a> {
            fn get_variable(&self, name: &str, buf: &mut [u8]) -> Result<usize, VariableError> {
                match self.0.get_variable(name, buf) {
                    Err(VariableError::BufferTooSmall(_)) => Err(VariableError::BufferTooSmall(0)),
                    other => other,
                }
            }
        }
        assert_eq!(
            fetch_variable(&Lossy(&store), "Boot0004"),
            Err(VariableError::NotFound)
        );
    }

    #[test]
    fn empty_variable_is_not_found() {
        let mut store = MockStore::default();
        store.vars.insert("Boot0003".to_string(), Vec::new());
        assert_eq!(
            fetch_variable(&store, "Boot0003"),
            Err(VariableError::NotFound)
        );
    }

    #[test]
    fn malformed_load_options() {
        assert_eq!(
            LoadOption::parse(&[1, 0, 0]),
            Err(LoadOptionError::TruncatedHeader(3))
        );
        // description never terminated
        assert_eq!(
            LoadOption::parse(&[1, 0, 0, 0, 4, 0, 0x41, 0x00, 0x42]),
            Err(LoadOptionError::UnterminatedDescription)
        );
        // file path list longer than the blob
        let mut blob = load_option("x", &partial_path(), &[]);
        blob.truncate(blob.len() - 2);
        match LoadOption::parse(&blob) {
            Err(LoadOptionError::FilePathListOverrun { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
        // file path list without end node
        let mut blob = vec![1, 0, 0, 0, 6, 0, 0, 0];
        blob.extend_from_slice(&[0x04, 0x04, 0x06, 0x00, 0x41, 0x00]);
        assert_eq!(
            LoadOption::parse(&blob),
            Err(LoadOptionError::DevicePath(DevicePathError::Unterminated))
        );
    }
}
