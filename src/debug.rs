//! debugging module
//! This module provides the daemon's timestamped debugging output.

// chrono
use chrono::{DateTime, Local, Utc};

// constants
use crate::constants::*;

// Verbose Structure
#[derive(Debug, Clone, Copy)]
pub struct Verbose {
    level: u8,
    time_zone: u8,
    time_format: u8,
}

// Verbose type implementation
impl Verbose {
    // new() method
    pub fn new(level: u8, time_zone: u8, time_format: u8) -> Verbose {
        Verbose {
            level,
            time_zone,
            time_format,
        }
    }
    // level() getter
    pub fn level(&self) -> u8 {
        self.level
    }
    // enabled() method
    pub fn enabled(&self, msg_level: u8) -> bool {
        self.level >= msg_level
    }
}

// timestamp() function
fn timestamp(debug: &Verbose) -> String {
    match debug.time_zone {
        // UTC
        1 => {
            let now: DateTime<Utc> = Utc::now();
            match debug.time_format {
                2 => now.to_rfc2822(),
                _ => now.format(UNBS_DFLT_DATE_FORMAT).to_string(),
            }
        }
        // local
        _ => {
            let now: DateTime<Local> = Local::now();
            match debug.time_format {
                2 => now.to_rfc2822(),
                _ => now.format(UNBS_DFLT_DATE_FORMAT).to_string(),
            }
        }
    }
}

// format_debug() function
fn format_debug(debug: &Verbose, src: &str, msg: &str) -> String {
    match debug.time_format {
        // timestamps disabled
        0 => format!("{}: {}", src, msg),
        _ => format!("[{}] {}: {}", timestamp(debug), src, msg),
    }
}

// print_debug() function
/// Print debugging information if `msg_level` is enabled
///
/// Informational messages go to stdout, everything at a higher level to stderr
/// so both end up in the daemon's log files.
pub fn print_debug(debug: &Verbose, msg_level: u8, src: &str, msg: String) {
    if debug.enabled(msg_level) {
        let line = format_debug(debug, src, &msg);
        match msg_level {
            DEBUG_LEVEL_INFO => println!("{}", line),
            _ => eprintln!("{}", line),
        }
    }
}
