//! # unbsd
//!
//! `unbsd` is the boot arbiter daemon of the UEFI Network Boot Switch.
use unbs::constants::{UNBS_BANNER, UNBS_VERSION};
use unbs::{listen_boot_queries, Config};

// getopts
use getopts::Options;

// std
use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// MyError Type
#[derive(Debug)]
struct MyError(String);

impl std::fmt::Display for MyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}
impl Error for MyError {}

// print_usage() function
fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} -m1|2 [options]", program);
    print!("{}", opts.usage(&brief));
}

// parse_cli_opts() function
// Ok(None) when only the usage was requested
fn parse_cli_opts(args: &[String]) -> Result<Option<Config>, Box<dyn Error>> {
    let program = args[0].clone();
    let mut opts = Options::new();

    opts.optflag("h", "help", "display help information");
    opts.optopt("i", "iface", "ethernet interface to listen on", "INTERFACE");
    opts.optopt(
        "m",
        "mode",
        "operation mode:\n 1(foreground), 2(daemon)",
        "MODE",
    );
    opts.optopt("c", "conf", "path to configuration file", "FILE");
    opts.optopt(
        "d",
        "debug",
        "debugging level:\n0(none), 1(low), 2(medium), 3(high), 5(extensive)",
        "LEVEL",
    );

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => return Err(Box::new(MyError(f.to_string()))),
    };

    // help command-line option
    if matches.opt_present("help") || args[1..].is_empty() {
        print_usage(&program, opts);
        return Ok(None);
    }

    // mode command-line option
    let mode = match matches.opt_str("mode") {
        Some(x) => match x.parse::<u8>() {
            Ok(m) if m == 1 || m == 2 => m,
            _ => return Err(Box::new(MyError(format!("Invalid operation mode: {}", x)))),
        },
        None => {
            return Err(Box::new(MyError("No operation mode specified (-m)".into())));
        }
    };

    // iface command-line option
    let iface = matches.opt_str("iface");

    // config command-line option
    let conf = matches.opt_str("conf");

    // debug level command-line option
    let debug = match matches.opt_str("debug") {
        Some(x) => match x.parse::<u8>() {
            Ok(d) => Some(d),
            Err(_) => return Err(Box::new(MyError(format!("Invalid debug level: {}", x)))),
        },
        // left to the configuration file
        None => None,
    };

    Ok(Some(Config::new(iface, mode, conf, debug)))
}

// run() function
fn run(cfg: Config) -> Result<(), Box<dyn Error>> {
    // print information
    println!("{}", UNBS_BANNER);
    println!("Starting unbsd v{}", UNBS_VERSION);

    // Thread safe shared variable
    let shutdown = Arc::new(AtomicBool::new(false));

    // Set up SIGINT signal handler
    let shutdown_c1 = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\nReceived CTRL-C (SIGINT)");
        shutdown_c1.store(true, Ordering::Relaxed);
    })
    .map_err(|e| MyError(format!("Error while setting SIGINT signal handler: {}", e)))?;

    // Serve boot queries
    match listen_boot_queries(&cfg, shutdown) {
        Ok(stats) => {
            println!("Exiting... ({})", stats);
            Ok(())
        }
        Err(e) => Err(Box::new(MyError(format!(
            "An error occured while starting the arbiter: {}",
            e
        )))),
    }
}

// main() function
fn main() {
    let args: Vec<String> = env::args().collect();

    match parse_cli_opts(&args) {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(None) => std::process::exit(1),
        Ok(Some(c)) => match run(c) {
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
            Ok(_) => {
                std::process::exit(0);
            }
        },
    }
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_command_line() {
        let cfg = parse_cli_opts(&args(&[
            "unbsd", "-m", "2", "-i", "eth0", "-c", "/tmp/u.conf", "-d", "3",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(cfg.mode(), 2);
        assert_eq!(cfg.iface(), Some("eth0"));
        assert_eq!(cfg.conf(), Some("/tmp/u.conf"));
        assert_eq!(cfg.debug(), Some(3));
    }

    #[test]
    fn defaults_left_to_config() {
        let cfg = parse_cli_opts(&args(&["unbsd", "-m1"])).unwrap().unwrap();
        assert_eq!(cfg.iface(), None);
        assert_eq!(cfg.conf(), None);
        assert_eq!(cfg.debug(), None);
    }

    #[test]
    fn rejected_command_lines() {
        assert!(parse_cli_opts(&args(&["unbsd", "-i", "eth0"])).is_err());
        assert!(parse_cli_opts(&args(&["unbsd", "-m", "0"])).is_err());
        assert!(parse_cli_opts(&args(&["unbsd", "-m", "1", "-d", "high"])).is_err());
        assert!(parse_cli_opts(&args(&["unbsd", "-x"])).is_err());
        assert!(parse_cli_opts(&args(&["unbsd", "-h"])).unwrap().is_none());
    }
}
