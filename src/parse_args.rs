const HELP: &str = "\
gantry - port tool for the gantry middleware

Serves or drives a message port over any registered carrier.

USAGE:
  gantry <listen|read|write> [OPTIONS]

MODES:
  listen                Serve a port and print incoming messages
  read                  Serve a port for a single session, then exit
  write                 Dial a port and send stdin lines as messages

OPTIONS:
  -h, --help            Prints help information
  --name <port>         Port name (default: /gantry)
  --tcp <host:port>     Listen or dial over TCP
  --socket <path>       Unix socket path (default: /tmp/gantry.sock)
  --carrier <name>      Carrier for write mode (default: flow)
  --echo                listen: answer every message with itself
  --reply               write: wait for and print a reply to each message
  -v, --verbose         Show connection and handshake events
  -vv, --trace          Show carrier traffic
  --log <file>          Write trace output to file instead of stderr
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// No debug output
    Quiet = 0,
    /// Connection events, errors
    Verbose = 1,
    /// All carrier traffic
    Trace = 2,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Quiet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Listen,
    Read,
    Write,
}

#[derive(Debug)]
pub struct AppArgs {
    pub mode: Mode,
    pub name: String,
    pub tcp_addr: Option<String>,
    pub socket_path: Option<String>,
    pub carrier: String,
    pub echo: bool,
    pub reply: bool,
    pub verbosity: Verbosity,
    pub log_file: Option<String>,
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    let mode = match pargs.subcommand()?.as_deref() {
        Some("listen") => Mode::Listen,
        Some("read") => Mode::Read,
        Some("write") => Mode::Write,
        Some(other) => {
            eprintln!("Unknown mode '{}'\n", other);
            print!("{}", HELP);
            std::process::exit(1);
        }
        None => {
            print!("{}", HELP);
            std::process::exit(1);
        }
    };

    let verbosity = if pargs.contains("--trace") || pargs.contains("-vv") {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };

    let args = AppArgs {
        mode,
        name: pargs
            .opt_value_from_str("--name")?
            .unwrap_or_else(|| "/gantry".to_string()),
        tcp_addr: pargs.opt_value_from_str("--tcp")?,
        socket_path: pargs.opt_value_from_str("--socket")?,
        carrier: pargs
            .opt_value_from_str("--carrier")?
            .unwrap_or_else(|| "flow".to_string()),
        echo: pargs.contains("--echo"),
        reply: pargs.contains("--reply"),
        verbosity,
        log_file: pargs.opt_value_from_str("--log")?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}
