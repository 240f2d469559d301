mod logger;
mod parse_args;

use gantry_protocol::{
    default_registry, CarrierRegistry, InputPort, Message, OutputPort, StreamAddr, TransportError,
};
use gantry_xmlrpc::XmlRpcCarrier;
use logger::Logger;
use parse_args::{parse_args, AppArgs, Mode, Verbosity};

use std::io::{self, BufRead};

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            std::process::exit(1);
        }
    };

    // Set up logger
    let logger = match &args.log_file {
        Some(path) => match Logger::file(path, args.verbosity) {
            Ok(l) => {
                eprintln!("Logging to: {}", path);
                l
            }
            Err(e) => {
                eprintln!("Failed to open log file '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => Logger::stderr(args.verbosity),
    };

    // Determine socket address
    let addr = if let Some(tcp) = &args.tcp_addr {
        StreamAddr::tcp(tcp.clone())
    } else {
        let path = args
            .socket_path
            .clone()
            .unwrap_or_else(|| gantry_protocol::DEFAULT_SOCKET_PATH.to_string());
        #[cfg(unix)]
        {
            StreamAddr::unix(&path)
        }
        #[cfg(not(unix))]
        {
            eprintln!("Unix sockets not supported on this platform, use --tcp");
            std::process::exit(1);
        }
    };

    let registry = build_registry();

    let result = match args.mode {
        Mode::Listen => run_serve(&args, &addr, &registry, &logger, true),
        Mode::Read => run_serve(&args, &addr, &registry, &logger, false),
        Mode::Write => run_write(&args, &addr, &registry, &logger),
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

/// Every carrier this tool will entertain, native and bridged. Both
/// XML-RPC registrations share one header; incoming connections land on
/// the plain one, the ROS flavor is reachable by name when dialing.
fn build_registry() -> CarrierRegistry {
    let mut registry = default_registry();
    registry.register(Box::new(XmlRpcCarrier::plain()));
    registry.register(Box::new(XmlRpcCarrier::meta()));
    registry
}

fn run_serve(
    args: &AppArgs,
    addr: &StreamAddr,
    registry: &CarrierRegistry,
    logger: &Logger,
    forever: bool,
) -> Result<(), TransportError> {
    let mut input = InputPort::bind(&args.name, addr, registry)?;
    eprintln!("Serving {} at {}", input.name(), input.local_addr()?);

    loop {
        logger.verbose("[PORT] Waiting for a peer...");
        match input.accept() {
            Ok(()) => {
                if let Some(route) = input.route() {
                    logger.verbose(&format!("[PORT] Connected: {}", route));
                    if logger.verbosity() < Verbosity::Verbose {
                        eprintln!("Connected: {}", route);
                    }
                }
                serve_session(&mut input, args, logger);
                let _ = input.disconnect();
                eprintln!("Peer disconnected");
                if !forever {
                    return Ok(());
                }
            }
            Err(e) => {
                eprintln!("Rejected connection: {}", e);
            }
        }
    }
}

fn serve_session(input: &mut InputPort, args: &AppArgs, logger: &Logger) {
    loop {
        let mut msg = Message::new();
        match input.read(&mut msg) {
            Ok(admin) => {
                logger.trace(&format!("[PORT] <- {}", msg));
                if admin {
                    println!("[admin] {}", msg);
                } else {
                    println!("{}", msg);
                }
                if args.echo && !admin {
                    logger.trace(&format!("[PORT] -> {}", msg));
                    if let Err(e) = input.reply(&msg) {
                        eprintln!("Reply failed: {}", e);
                        return;
                    }
                }
            }
            Err(TransportError::TransportClosed) => return,
            Err(e) => {
                eprintln!("Connection error: {}", e);
                return;
            }
        }
    }
}

fn run_write(
    args: &AppArgs,
    addr: &StreamAddr,
    registry: &CarrierRegistry,
    logger: &Logger,
) -> Result<(), TransportError> {
    eprintln!("Dialing {} at {} over {}", args.name, addr, args.carrier);
    let mut output = OutputPort::open_addr(registry, "/console", &args.name, &args.carrier, addr)?;
    logger.verbose(&format!("[PORT] Connected: {}", output.route()));
    if logger.verbosity() < Verbosity::Verbose {
        eprintln!("Connected: {}", output.route());
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let msg = match Message::from_text(&line) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Cannot parse '{}': {}", line, e);
                continue;
            }
        };
        if args.reply {
            let mut reply = Message::new();
            output.write_with_reply(&msg, &mut reply)?;
            println!("{}", reply);
        } else {
            logger.trace(&format!("[PORT] -> {}", msg));
            output.write(&msg)?;
        }
    }

    output.close()?;
    Ok(())
}
