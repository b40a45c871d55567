//! client table module
//! This module holds the table mapping requester MAC addresses to boot codes.
//!
//! The table is read from a text database, one client per line:
//!
//! ```text
//! # mac address       boot code
//! aa:bb:cc:dd:ee:ff   0007
//! 52:54:00:12:34:56   0x0001
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. The first malformed
//! line ends the load, the records read so far are kept.

// std
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

// itertools
use itertools::Itertools;

// constants
use crate::constants::*;

// hardware addresses
use crate::mac::MacAddr;

/// Client Record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRecord {
    mac: MacAddr,
    code: u16,
}

// ClientRecord methods
impl ClientRecord {
    // new() method
    pub fn new(mac: MacAddr, code: u16) -> ClientRecord {
        ClientRecord { mac, code }
    }
    // mac() getter
    pub fn mac(&self) -> MacAddr {
        self.mac
    }
    // code() getter
    pub fn code(&self) -> u16 {
        self.code
    }
}

/// Client Database Loading Error
#[derive(Debug)]
pub enum LoadError {
    Unreadable(io::Error),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::Unreadable(e) => write!(f, "cannot read client database: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Load Report
///
/// What happened while reading a client database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    // records loaded into the table
    pub loaded: usize,
    // 1-based line number of the line that ended the load, if any
    pub stopped_at: Option<usize>,
    // records left out because the table was full
    pub ignored: usize,
    // MAC addresses present more than once
    pub duplicates: Vec<MacAddr>,
}

/// Client Table
#[derive(Debug, Clone)]
pub struct ClientTable {
    records: Vec<ClientRecord>,
    capacity: usize,
}

// ClientTable methods
impl ClientTable {
    // new() method
    pub fn new(capacity: usize) -> ClientTable {
        ClientTable {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    // load() method
    /// Replace the table with the content of the database at `path`
    ///
    /// If the file cannot be opened the current table is left untouched.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport, LoadError> {
        let file = File::open(path).map_err(LoadError::Unreadable)?;
        Ok(self.load_from_reader(BufReader::new(file)))
    }

    // load_from_reader() method
    /// Replace the table with the records read from `reader`
    pub fn load_from_reader<R: BufRead>(&mut self, reader: R) -> LoadReport {
        let mut report = LoadReport::default();
        let mut records = Vec::with_capacity(self.capacity);

        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(_) => {
                    report.stopped_at = Some(index + 1);
                    break;
                }
            };
            let line = line.trim();

            // skip comments and blank lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let record = match parse_record(line) {
                Some(r) => r,
                None => {
                    report.stopped_at = Some(index + 1);
                    break;
                }
            };

            if records.len() < self.capacity {
                records.push(record);
            } else {
                report.ignored += 1;
            }
        }

        report.loaded = records.len();
        report.duplicates = records.iter().map(|r| r.mac).duplicates().collect();

        // swap in the new table as a whole
        self.records = records;
        report
    }

    // lookup() method
    /// Boot code of `mac`, the first record wins
    pub fn lookup(&self, mac: &MacAddr) -> Option<u16> {
        self.records
            .iter()
            .find(|r| r.mac == *mac)
            .map(|r| r.code)
    }

    // getters
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn iter(&self) -> std::slice::Iter<'_, ClientRecord> {
        self.records.iter()
    }
}

impl Default for ClientTable {
    fn default() -> Self {
        ClientTable::new(CLIENTS_DFLT_MAX)
    }
}

// parse_record() function
// parse one 'MAC CODE' line
fn parse_record(line: &str) -> Option<ClientRecord> {
    let (mac, code) = line.split_whitespace().collect_tuple()?;
    let mac = mac.parse::<MacAddr>().ok()?;
    let code = code
        .strip_prefix("0x")
        .or_else(|| code.strip_prefix("0X"))
        .unwrap_or(code);
    if code.is_empty() || code.len() > 4 || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let code = u16::from_str_radix(code, 16).ok()?;
    Some(ClientRecord::new(mac, code))
}
