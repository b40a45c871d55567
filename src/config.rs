//! configuration file handling module
//! This module provides structure and methods related to configuration file handling.

// std
use std::fmt;
use std::io;
use std::path::Path;

// serde
use serde_derive::Deserialize;

// constants
use crate::constants::*;

/// Main Configuration Structure
#[derive(Debug, Default, Deserialize)]
pub struct CConfig {
    pub debug: Option<u8>,
    pub time_zone: Option<String>,
    pub time_format: Option<String>,
    pub pid: Option<String>,
    pub working_dir: Option<String>,
    pub main_log: Option<String>,
    pub error_log: Option<String>,
    pub database: Option<String>,
    pub interface: Option<String>,
    pub max_clients: Option<usize>,
}

impl CConfig {
    // debug() getter
    pub fn debug(&self) -> u8 {
        match self.debug {
            Some(v) => v,
            None => DEBUG_LEVEL_INFO,
        }
    }
    // time_zone() getter
    pub fn time_zone(&self) -> u8 {
        match &self.time_zone {
            Some(s) => match &s[..] {
                "local" => 0,
                "utc" => 1,
                _ => 0,
            },
            None => 0,
        }
    }
    // time_format() getter
    pub fn time_format(&self) -> u8 {
        match &self.time_format {
            Some(s) => match &s[..] {
                "disabled" => 0,
                "short" => 1,
                "rfc2822" => 2,
                _ => 1,
            },
            None => 1,
        }
    }
    // pid() getter
    pub fn pid(&self) -> String {
        match &self.pid {
            Some(v) => v.clone(),
            None => UNBS_DFLT_PIDFILE.to_string(),
        }
    }
    // working_dir() getter
    pub fn working_dir(&self) -> String {
        match &self.working_dir {
            Some(v) => v.clone(),
            None => UNBS_DFLT_WORKDIR.to_string(),
        }
    }
    // main_log() getter
    pub fn main_log(&self) -> String {
        match &self.main_log {
            Some(v) => v.clone(),
            None => UNBS_DFLT_LOGFILE.to_string(),
        }
    }
    // error_log() getter
    pub fn error_log(&self) -> String {
        match &self.error_log {
            Some(v) => v.clone(),
            None => UNBS_DFLT_ELOGFILE.to_string(),
        }
    }
    // database() getter
    pub fn database(&self) -> String {
        match &self.database {
            Some(v) => v.clone(),
            None => UNBS_DFLT_DATABASE.to_string(),
        }
    }
    // interface() getter
    pub fn interface(&self) -> Option<String> {
        self.interface.clone()
    }
    // max_clients() getter
    pub fn max_clients(&self) -> usize {
        match self.max_clients {
            Some(0) | None => CLIENTS_DFLT_MAX,
            Some(v) => v,
        }
    }
}

/// Configuration Error
#[derive(Debug)]
pub enum ConfigError {
    Read(String, io::Error),
    Parse(String, toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Read(file, e) => {
                write!(f, "cannot read configuration file {}: {}", file, e)
            }
            ConfigError::Parse(file, e) => {
                write!(f, "cannot parse configuration file {}:\n {}", file, e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// parse_config() function
/// decode the content of a configuration file
pub fn parse_config(filename: &str, content: &str) -> Result<CConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(filename.to_string(), e))
}

// decode_config() function
/// read and decode configuration file
pub fn decode_config(filename: &str) -> Result<CConfig, ConfigError> {
    let file = std::fs::read_to_string(filename)
        .map_err(|e| ConfigError::Read(filename.to_string(), e))?;
    parse_config(filename, &file)
}

// load_config() function
/// read the configuration given on the command line, or the default one
///
/// A missing default configuration file is not an error, the built-in
/// defaults apply instead.
pub fn load_config(filename: Option<&str>) -> Result<CConfig, ConfigError> {
    match filename {
        Some(f) => decode_config(f),
        None if !Path::new(UNBS_DFLT_CFG_FILE).exists() => Ok(CConfig::default()),
        None => decode_config(UNBS_DFLT_CFG_FILE),
    }
}
