//! WebSocket carrier, for browser peers.
//!
//! The 8-byte header is the start of the HTTP upgrade request, so a port
//! can share its listener with the other carriers. Once recognized, the
//! whole upgrade is delegated to tungstenite and the connection's stream
//! is replaced by a frame-buffering wrapper; above that wrapper the
//! normal index/payload traffic applies unchanged.

use std::io::{Read, Write};

use tungstenite::protocol::Message as WsMessage;
use tungstenite::WebSocket;

use crate::carrier::Carrier;
use crate::error::TransportError;
use crate::protocol::ConnectionState;
use crate::stream::TwoWayStream;

const WS_HEADER: [u8; 8] = *b"GET /?ws";

pub struct WsCarrier {
    header: [u8; 8],
}

impl WsCarrier {
    pub fn new() -> Self {
        WsCarrier { header: WS_HEADER }
    }
}

impl Default for WsCarrier {
    fn default() -> Self {
        WsCarrier::new()
    }
}

impl Carrier for WsCarrier {
    fn name(&self) -> &str {
        "ws"
    }

    fn header(&self) -> [u8; 8] {
        WS_HEADER
    }

    fn check_header(&self, header: &[u8; 8]) -> bool {
        header == &WS_HEADER
    }

    fn set_parameters(&mut self, header: &[u8; 8]) {
        // keep the sniffed bytes to replay them into the HTTP parser
        self.header = *header;
    }

    fn fresh(&self) -> Box<dyn Carrier> {
        Box::new(WsCarrier::new())
    }

    fn requires_ack(&self) -> bool {
        false
    }

    fn supports_reply(&self) -> bool {
        false
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let stream = match state.take_stream() {
            Some(s) => s,
            None => return Err(TransportError::TransportClosed),
        };
        let transport = ReplayStream::plain(stream);
        let (socket, _response) = tungstenite::client("ws://gantry/?ws", transport)
            .map_err(|e| TransportError::ProtocolViolation(format!("upgrade failed: {}", e)))?;
        state.replace_stream(Box::new(WsStream::new(socket)));
        Ok(())
    }

    /// The upgrade response was consumed by the client handshake; there
    /// is no separate reply and no sender name on this carrier.
    fn expect_sender_specifier(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        state.route.from = "websocket".to_string();
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let stream = match state.take_stream() {
            Some(s) => s,
            None => return Err(TransportError::TransportClosed),
        };
        let transport = ReplayStream::new(self.header.to_vec(), stream);
        let socket = tungstenite::accept(transport)
            .map_err(|e| TransportError::ProtocolViolation(format!("upgrade failed: {}", e)))?;
        state.replace_stream(Box::new(WsStream::new(socket)));
        Ok(())
    }
}

/// Serves a sniffed prefix before reading from the wrapped stream, and
/// bridges `TwoWayStream` to the `Read + Write` tungstenite expects.
struct ReplayStream {
    prefix: Vec<u8>,
    pos: usize,
    inner: Box<dyn TwoWayStream>,
}

impl ReplayStream {
    fn new(prefix: Vec<u8>, inner: Box<dyn TwoWayStream>) -> Self {
        ReplayStream {
            prefix,
            pos: 0,
            inner,
        }
    }

    fn plain(inner: Box<dyn TwoWayStream>) -> Self {
        ReplayStream::new(Vec::new(), inner)
    }
}

impl Read for ReplayStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos < self.prefix.len() {
            let n = buf.len().min(self.prefix.len() - self.pos);
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        self.inner.read_some(buf)
    }
}

impl Write for ReplayStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write_all(buf)?;
        // the handshake machine blocks on the peer's reply straight after
        // writing, with no flush call in between; a buffered upgrade
        // request would leave both sides waiting
        self.inner.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Byte-stream view of a websocket: writes buffer until a flush sends
/// one binary frame, reads drain incoming frames.
struct WsStream {
    socket: WebSocket<ReplayStream>,
    inbuf: Vec<u8>,
    inpos: usize,
    outbuf: Vec<u8>,
}

impl WsStream {
    fn new(socket: WebSocket<ReplayStream>) -> Self {
        WsStream {
            socket,
            inbuf: Vec::new(),
            inpos: 0,
            outbuf: Vec::new(),
        }
    }
}

fn convert_ws_error(e: tungstenite::Error) -> std::io::Error {
    match e {
        tungstenite::Error::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::ConnectionReset, other.to_string()),
    }
}

impl TwoWayStream for WsStream {
    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.inpos >= self.inbuf.len() {
            match self.socket.read() {
                Ok(WsMessage::Binary(data)) => {
                    self.inbuf = data;
                    self.inpos = 0;
                }
                Ok(WsMessage::Text(text)) => {
                    self.inbuf = text.into_bytes();
                    self.inpos = 0;
                }
                Ok(WsMessage::Ping(data)) => {
                    let _ = self.socket.send(WsMessage::Pong(data));
                }
                Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                Ok(WsMessage::Close(_)) => return Ok(0),
                Err(tungstenite::Error::ConnectionClosed) => return Ok(0),
                Err(e) => return Err(convert_ws_error(e)),
            }
        }
        let n = buf.len().min(self.inbuf.len() - self.inpos);
        buf[..n].copy_from_slice(&self.inbuf[self.inpos..self.inpos + n]);
        self.inpos += n;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.outbuf.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.outbuf.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.outbuf);
        self.socket
            .send(WsMessage::Binary(data))
            .map_err(convert_ws_error)
    }

    fn close(&mut self) -> std::io::Result<()> {
        let _ = self.flush();
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::protocol::{Connection, Route};
    use crate::stream::{read_full, RawStream, StreamAddr, StreamListener};
    use std::thread;
    use std::time::Duration;

    fn tcp_pair() -> (Box<dyn TwoWayStream>, Box<dyn TwoWayStream>) {
        let listener = StreamListener::bind(&StreamAddr::tcp("127.0.0.1:0")).unwrap();
        let addr = listener.local_addr().unwrap();
        let join = thread::spawn(move || listener.accept().unwrap());
        thread::sleep(Duration::from_millis(50));
        let client = RawStream::connect(&addr).unwrap();
        let server = join.join().unwrap();
        (Box::new(client), Box::new(server))
    }

    #[test]
    fn test_websocket_exchange() {
        let (client, server) = tcp_pair();

        let receiver = thread::spawn(move || {
            let mut stream = server;
            let mut header = [0u8; 8];
            read_full(stream.as_mut(), &mut header).unwrap();
            assert_eq!(&header, b"GET /?ws");
            let mut conn =
                Connection::accept(stream, header, "/in", Box::new(WsCarrier::new())).unwrap();
            assert_eq!(conn.route().from, "websocket");
            let mut msg = Message::new();
            conn.read(&mut msg).unwrap();
            let mut second = Message::new();
            conn.read(&mut second).unwrap();
            (msg, second)
        });

        let mut conn = Connection::connect(
            client,
            Route::new("/out", "/in", "ws"),
            Box::new(WsCarrier::new()),
        )
        .unwrap();
        let mut msg = Message::new();
        msg.add_vocab(crate::value::vocab_encode("go"));
        msg.add_f64(0.5);
        conn.write(&msg).unwrap();
        let mut second = Message::new();
        second.add_string("stop now");
        conn.write(&second).unwrap();

        let (got_first, got_second) = receiver.join().unwrap();
        assert_eq!(got_first, msg);
        assert_eq!(got_second, second);
    }
}
