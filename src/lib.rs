//! # unbs library
//!
//! UEFI Network Boot Switch. A machine's boot agent asks the arbiter, over
//! raw Ethernet, which firmware boot option it should start.
//!
//! The firmware-independent agent core (frame codec, device paths, agent
//! transport, boot option resolution and path completion) builds without
//! `std`. The `std` feature adds the arbiter daemon.
#![cfg_attr(not(any(feature = "std", test)), no_std)]

extern crate alloc;

// generic constants
pub mod constants;

// hardware addresses
pub mod mac;

// boot switch frames
pub mod packets;

// firmware device paths
pub mod devpath;

// boot agent core
pub mod agent;

// client table
#[cfg(feature = "std")]
pub mod clients;

// debug
#[cfg(feature = "std")]
pub mod debug;

// config
#[cfg(feature = "std")]
pub mod config;

// arbiter loop
#[cfg(feature = "std")]
pub mod arbiter;

// operating systems support
#[cfg(feature = "std")]
pub mod os;

#[cfg(all(feature = "std", target_os = "linux"))]
pub use daemon::{listen_boot_queries, Config, StartupError};

// arbiter daemon entry point
#[cfg(all(feature = "std", target_os = "linux"))]
mod daemon {
    // std
    use std::fmt;
    use std::fs::File;
    use std::io;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    // deamonize
    use daemonize::Daemonize;

    use crate::arbiter::{load_clients, Arbiter, Statistics};
    use crate::clients::{ClientTable, LoadError};
    use crate::config::{load_config, ConfigError};
    use crate::constants::*;
    use crate::debug::{print_debug, Verbose};
    use crate::os::linux::signal;
    use crate::os::linux::socket::RawSocket;

    /// Library Config Structure
    ///
    /// Includes library configuration parameters
    pub struct Config {
        iface: Option<String>,
        mode: u8,
        conf: Option<String>,
        debug: Option<u8>,
    }

    // Config Implementation
    impl Config {
        // new() method
        pub fn new(
            iface: Option<String>,
            mode: u8,
            conf: Option<String>,
            debug: Option<u8>,
        ) -> Config {
            Config {
                iface,
                mode,
                conf,
                debug,
            }
        }
        // iface() getter
        pub fn iface(&self) -> Option<&str> {
            self.iface.as_deref()
        }
        // mode() getter
        pub fn mode(&self) -> u8 {
            self.mode
        }
        // conf() getter
        pub fn conf(&self) -> Option<&str> {
            self.conf.as_deref()
        }
        // debug() getter
        pub fn debug(&self) -> Option<u8> {
            self.debug
        }
    }

    /// Arbiter Startup Error
    #[derive(Debug)]
    pub enum StartupError {
        Mode(u8),
        Config(ConfigError),
        Database(String, LoadError),
        Socket(io::Error),
        Signal(io::Error),
        Daemon(String),
    }

    impl fmt::Display for StartupError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self {
                StartupError::Mode(m) => write!(f, "unknown operation mode {}", m),
                StartupError::Config(e) => write!(f, "{}", e),
                StartupError::Database(path, e) => write!(f, "{} ({})", e, path),
                StartupError::Socket(e) => write!(f, "cannot open packet socket: {}", e),
                StartupError::Signal(e) => write!(f, "cannot install SIGUSR1 handler: {}", e),
                StartupError::Daemon(e) => write!(f, "cannot start daemon: {}", e),
            }
        }
    }

    impl std::error::Error for StartupError {}

    impl From<ConfigError> for StartupError {
        fn from(e: ConfigError) -> Self {
            StartupError::Config(e)
        }
    }

    // listen_boot_queries() function
    /// Listen for boot queries
    ///
    /// Library entry point for the arbiter daemon. Loads the client database,
    /// opens the packet socket and answers requests until `shutdown` is set.
    pub fn listen_boot_queries(
        cfg: &Config,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Statistics, StartupError> {
        // 1 foreground, 2 daemon
        if cfg.mode() != 1 && cfg.mode() != 2 {
            return Err(StartupError::Mode(cfg.mode()));
        }

        // read configuration file
        let config = load_config(cfg.conf())?;

        // read debugging level from Config first
        let debug_level = match cfg.debug() {
            Some(v) => v,
            // if None, then read debug level from configuration file
            None => config.debug(),
        };
        let debug = Verbose::new(debug_level, config.time_zone(), config.time_format());

        // the initial database must be readable
        let database = config.database();
        let mut table = ClientTable::new(config.max_clients());
        load_clients(&mut table, &database, &debug)
            .map_err(|e| StartupError::Database(database.clone(), e))?;

        // the command line interface takes precedence
        let iface = match cfg.iface() {
            Some(i) => Some(i.to_string()),
            None => config.interface(),
        };
        let socket = RawSocket::open(iface.as_deref()).map_err(StartupError::Socket)?;
        socket
            .set_read_timeout(Some(Duration::from_secs(1)))
            .map_err(StartupError::Socket)?;
        print_debug(
            &debug,
            DEBUG_LEVEL_LOW,
            DEBUG_SRC_SOCKET,
            format!(
                "listening for ethertype {:#06x} on {}",
                ETHER_P_UNBS,
                iface.as_deref().unwrap_or("all interfaces")
            ),
        );

        signal::set_reload_handler().map_err(StartupError::Signal)?;

        // if the mode is 2, then daemonize
        if cfg.mode() == 2 {
            start_daemon(
                &config.main_log(),
                &config.error_log(),
                &config.pid(),
                &config.working_dir(),
            )?;
            print_debug(
                &debug,
                DEBUG_LEVEL_INFO,
                DEBUG_SRC_MAIN,
                format!("{} (v{}) daemon started", UNBS_NAME, UNBS_VERSION),
            );
        } else {
            // failures are logged, the arbiter runs without a pid file
            let _ = write_pid_file(&config.pid(), &debug);
        }

        let mut arbiter = Arbiter::new(
            socket,
            table,
            database,
            shutdown,
            signal::reload_flag(),
            debug,
        );
        let stats = arbiter.run();

        // daemonize owns the pid file in daemon mode
        if cfg.mode() == 1 {
            let _ = remove_pid_file(&config.pid(), &debug);
        }

        Ok(stats)
    }

    // write_pid_file() function
    fn write_pid_file(path: &str, debug: &Verbose) -> io::Result<()> {
        let result = std::fs::write(path, format!("{}\n", std::process::id()));
        if let Err(e) = &result {
            print_debug(
                debug,
                DEBUG_LEVEL_INFO,
                DEBUG_SRC_MAIN,
                format!("warning: cannot write pid file {}: {}", path, e),
            );
        }
        result
    }

    // remove_pid_file() function
    fn remove_pid_file(path: &str, debug: &Verbose) -> io::Result<()> {
        let result = std::fs::remove_file(path);
        if let Err(e) = &result {
            print_debug(
                debug,
                DEBUG_LEVEL_INFO,
                DEBUG_SRC_MAIN,
                format!("warning: cannot remove pid file {}: {}", path, e),
            );
        }
        result
    }

    // start_daemon() function
    fn start_daemon(
        main_log: &str,
        error_log: &str,
        pid: &str,
        working_dir: &str,
    ) -> Result<(), StartupError> {
        // create log files
        let stdout = File::create(main_log)
            .map_err(|e| StartupError::Daemon(format!("{}: {}", main_log, e)))?;
        let stderr = File::create(error_log)
            .map_err(|e| StartupError::Daemon(format!("{}: {}", error_log, e)))?;
        // initialize the daemon
        let daemon = Daemonize::new()
            .pid_file(pid)
            .chown_pid_file(true)
            .working_directory(working_dir)
            .umask(0o027)
            .stdout(stdout)
            .stderr(stderr);
        // daemonize the process
        daemon
            .start()
            .map_err(|e| StartupError::Daemon(e.to_string()))
    }

}
