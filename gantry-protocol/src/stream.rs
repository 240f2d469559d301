//! Byte streams: addresses, listeners, raw sockets, and the read helpers
//! the handshake layer leans on.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use crate::error::TransportError;

/// Where a port lives when nobody says otherwise.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/gantry.sock";

/// Contact information for a peer: a Unix socket path or a TCP address.
#[derive(Debug, Clone)]
pub enum StreamAddr {
    #[cfg(unix)]
    Unix(String),
    Tcp(String),
}

impl StreamAddr {
    #[cfg(unix)]
    pub fn unix<P: AsRef<Path>>(path: P) -> Self {
        StreamAddr::Unix(path.as_ref().to_string_lossy().to_string())
    }

    pub fn tcp<S: Into<String>>(addr: S) -> Self {
        StreamAddr::Tcp(addr.into())
    }
}

impl std::fmt::Display for StreamAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            StreamAddr::Unix(path) => write!(f, "{}", path),
            StreamAddr::Tcp(addr) => write!(f, "{}", addr),
        }
    }
}

enum ListenerInner {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// Accepts raw connections for an input port.
pub struct StreamListener {
    inner: ListenerInner,
    addr: StreamAddr,
}

impl StreamListener {
    pub fn bind(addr: &StreamAddr) -> Result<Self, std::io::Error> {
        let inner = match addr {
            #[cfg(unix)]
            StreamAddr::Unix(path) => {
                // a stale socket file from a previous run blocks the bind
                let _ = std::fs::remove_file(path);
                ListenerInner::Unix(UnixListener::bind(path)?)
            }
            StreamAddr::Tcp(addr_str) => ListenerInner::Tcp(TcpListener::bind(addr_str)?),
        };
        Ok(StreamListener {
            inner,
            addr: addr.clone(),
        })
    }

    /// Block until the next peer dials in.
    pub fn accept(&self) -> Result<RawStream, std::io::Error> {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(listener) => {
                let (stream, _) = listener.accept()?;
                RawStream::from_unix(stream)
            }
            ListenerInner::Tcp(listener) => {
                let (stream, _) = listener.accept()?;
                RawStream::from_tcp(stream)
            }
        }
    }

    /// The address peers should dial, with the port the OS picked when
    /// binding to port 0.
    pub fn local_addr(&self) -> Result<StreamAddr, std::io::Error> {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(_) => Ok(self.addr.clone()),
            ListenerInner::Tcp(listener) => {
                Ok(StreamAddr::Tcp(listener.local_addr()?.to_string()))
            }
        }
    }
}

#[cfg(unix)]
impl Drop for StreamListener {
    fn drop(&mut self) {
        if let StreamAddr::Unix(path) = &self.addr {
            let _ = std::fs::remove_file(path);
        }
    }
}

enum StreamInner {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl StreamInner {
    fn shutdown(&self, how: std::net::Shutdown) -> Result<(), std::io::Error> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.shutdown(how),
            StreamInner::Tcp(s) => s.shutdown(how),
        }
    }
}

impl Read for StreamInner {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.read(buf),
            StreamInner::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for StreamInner {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.write(buf),
            StreamInner::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.flush(),
            StreamInner::Tcp(s) => s.flush(),
        }
    }
}

/// The byte-level duplex channel every carrier talks through.
///
/// Carriers that translate a foreign protocol replace the connection's
/// stream with a wrapper implementing this trait; everything above the
/// carrier stays unaware. Wrappers report decode trouble through
/// `ErrorKind::InvalidData`, which the error type turns back into an
/// encoding error.
pub trait TwoWayStream: Send {
    /// Read whatever is available, blocking until at least one byte
    /// arrives. Ok(0) means the peer closed.
    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()>;

    /// Tear the channel down; any blocked read on it must return promptly.
    fn close(&mut self) -> std::io::Result<()>;
}

/// A plain socket connection, buffered in both directions.
pub struct RawStream {
    reader: BufReader<StreamInner>,
    writer: BufWriter<StreamInner>,
}

impl RawStream {
    #[cfg(unix)]
    fn from_unix(stream: UnixStream) -> Result<Self, std::io::Error> {
        let reader = BufReader::new(StreamInner::Unix(stream.try_clone()?));
        let writer = BufWriter::new(StreamInner::Unix(stream));
        Ok(RawStream { reader, writer })
    }

    fn from_tcp(stream: TcpStream) -> Result<Self, std::io::Error> {
        // handshake words are tiny; Nagle would sit on them
        let _ = stream.set_nodelay(true);
        let reader = BufReader::new(StreamInner::Tcp(stream.try_clone()?));
        let writer = BufWriter::new(StreamInner::Tcp(stream));
        Ok(RawStream { reader, writer })
    }

    pub fn connect(addr: &StreamAddr) -> Result<Self, std::io::Error> {
        match addr {
            #[cfg(unix)]
            StreamAddr::Unix(path) => Self::from_unix(UnixStream::connect(path)?),
            StreamAddr::Tcp(addr_str) => Self::from_tcp(TcpStream::connect(addr_str)?),
        }
    }
}

impl TwoWayStream for RawStream {
    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    fn close(&mut self) -> std::io::Result<()> {
        let _ = self.writer.flush();
        match self.writer.get_ref().shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Borrow a two-way stream as a `std::io::Read` for the codec layer.
pub struct StreamReader<'a>(pub &'a mut dyn TwoWayStream);

impl Read for StreamReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read_some(buf)
    }
}

/// Fill `buf` completely, treating early closure as a transport error.
pub fn read_full(stream: &mut dyn TwoWayStream, buf: &mut [u8]) -> Result<(), TransportError> {
    let mut pos = 0;
    while pos < buf.len() {
        let n = stream.read_some(&mut buf[pos..])?;
        if n == 0 {
            return Err(TransportError::TransportClosed);
        }
        pos += n;
    }
    Ok(())
}

pub fn read_byte(stream: &mut dyn TwoWayStream) -> Result<u8, TransportError> {
    let mut b = [0u8; 1];
    read_full(stream, &mut b)?;
    Ok(b[0])
}

/// Read one line, consuming the terminator. Accepts `\n` and `\r\n`.
pub fn read_text_line(stream: &mut dyn TwoWayStream) -> Result<String, TransportError> {
    let mut line = Vec::new();
    loop {
        let b = read_byte(stream)?;
        if b == b'\n' {
            break;
        }
        line.push(b);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .map_err(|_| TransportError::Encoding("line is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_tcp_stream_communication() {
        let listener = StreamListener::bind(&StreamAddr::tcp("127.0.0.1:0")).unwrap();
        let addr = listener.local_addr().unwrap();

        let server_thread = thread::spawn(move || {
            let mut conn = listener.accept().unwrap();
            let line = read_text_line(&mut conn).unwrap();
            assert_eq!(line, "hello server");
            conn.write_all(b"hello client\r\n").unwrap();
            conn.flush().unwrap();
        });

        thread::sleep(Duration::from_millis(50));

        let mut conn = RawStream::connect(&addr).unwrap();
        conn.write_all(b"hello server\n").unwrap();
        conn.flush().unwrap();
        let line = read_text_line(&mut conn).unwrap();
        assert_eq!(line, "hello client");

        server_thread.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_unix_stream_communication() {
        let socket_path = "/tmp/gantry-test-stream.sock";
        let addr = StreamAddr::unix(socket_path);

        let addr_clone = addr.clone();
        let server_thread = thread::spawn(move || {
            let listener = StreamListener::bind(&addr_clone).unwrap();
            let mut conn = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            read_full(&mut conn, &mut buf).unwrap();
            assert_eq!(&buf, b"ping");
            conn.write_all(b"pong").unwrap();
            conn.flush().unwrap();
        });

        // Give server time to start
        thread::sleep(Duration::from_millis(50));

        let mut conn = RawStream::connect(&addr).unwrap();
        conn.write_all(b"ping").unwrap();
        conn.flush().unwrap();
        let mut buf = [0u8; 4];
        read_full(&mut conn, &mut buf).unwrap();
        assert_eq!(&buf, b"pong");

        server_thread.join().unwrap();
    }

    #[test]
    fn test_read_full_reports_closure() {
        let listener = StreamListener::bind(&StreamAddr::tcp("127.0.0.1:0")).unwrap();
        let addr = listener.local_addr().unwrap();

        let server_thread = thread::spawn(move || {
            let mut conn = listener.accept().unwrap();
            conn.write_all(b"ab").unwrap();
            conn.flush().unwrap();
            conn.close().unwrap();
        });

        let mut conn = RawStream::connect(&addr).unwrap();
        let mut buf = [0u8; 8];
        let err = read_full(&mut conn, &mut buf).unwrap_err();
        assert!(matches!(err, TransportError::TransportClosed));

        server_thread.join().unwrap();
    }
}
