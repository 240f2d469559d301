//! Protocol trace logging, to stderr or a file.

use crate::parse_args::Verbosity;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

enum Sink {
    Stderr,
    File(BufWriter<File>),
}

/// Level-gated logger. Clones share one sink, so per-connection threads
/// can carry their own copy.
pub struct Logger {
    sink: Arc<Mutex<Sink>>,
    verbosity: Verbosity,
}

impl Logger {
    pub fn stderr(verbosity: Verbosity) -> Self {
        Logger {
            sink: Arc::new(Mutex::new(Sink::Stderr)),
            verbosity,
        }
    }

    pub fn file(path: &str, verbosity: Verbosity) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Logger {
            sink: Arc::new(Mutex::new(Sink::File(BufWriter::new(file)))),
            verbosity,
        })
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn write_line(&self, msg: &str) {
        if let Ok(mut sink) = self.sink.lock() {
            match &mut *sink {
                Sink::Stderr => eprintln!("{}", msg),
                Sink::File(f) => {
                    let _ = writeln!(f, "{}", msg);
                    // flushed per line so a crash loses nothing
                    let _ = f.flush();
                }
            }
        }
    }

    /// Connection and handshake events.
    pub fn verbose(&self, msg: &str) {
        if self.verbosity >= Verbosity::Verbose {
            self.write_line(msg);
        }
    }

    /// Per-message carrier traffic.
    pub fn trace(&self, msg: &str) {
        if self.verbosity >= Verbosity::Trace {
            self.write_line(msg);
        }
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Logger {
            sink: self.sink.clone(),
            verbosity: self.verbosity,
        }
    }
}
