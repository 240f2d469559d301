//! The XML-RPC carrier.
//!
//! The 8-byte header is the opening of the HTTP request line, so this
//! carrier shares a listening port with the native ones. Nothing extra
//! is exchanged at handshake time: the sender's first call carries the
//! whole request line, and the receiver's translator replays the
//! sniffed header bytes into its parse buffer. Above the translator
//! the connection reads ordinary message text, one line per document,
//! and HTTP headers are consumed with each document however many calls
//! share the link.
//!
//! In meta mode (registered as "rosrpc") each incoming document is
//! preceded by a stream command line so the port can tell node
//! bookkeeping from application traffic, the same discrimination the
//! text carrier applies.

use gantry_protocol::carrier::Carrier;
use gantry_protocol::protocol::ConnectionState;
use gantry_protocol::stream::{read_text_line, TwoWayStream};
use gantry_protocol::{Message, TransportError};

use crate::document::{self, Document, ParseStatus};
use crate::value;

/// Calls a ROS node addresses to the port itself rather than to the
/// application behind it.
pub const ADMIN_CALLS: &[&str] = &[
    "publisherUpdate",
    "paramUpdate",
    "requestTopic",
    "getPid",
    "getBusInfo",
    "shutdown",
    "getSubscriptions",
    "getPublications",
];

const XMLRPC_HEADER: [u8; 8] = *b"POST /RP";

pub struct XmlRpcCarrier {
    meta: bool,
    sender: bool,
}

impl XmlRpcCarrier {
    /// Plain bridge, for ordinary XML-RPC peers.
    pub fn plain() -> Self {
        XmlRpcCarrier {
            meta: false,
            sender: false,
        }
    }

    /// ROS-flavored bridge: admin calls are flagged for the port.
    pub fn meta() -> Self {
        XmlRpcCarrier {
            meta: true,
            sender: false,
        }
    }
}

impl Carrier for XmlRpcCarrier {
    fn name(&self) -> &str {
        if self.meta {
            "rosrpc"
        } else {
            "xmlrpc"
        }
    }

    fn header(&self) -> [u8; 8] {
        XMLRPC_HEADER
    }

    fn check_header(&self, header: &[u8; 8]) -> bool {
        header == &XMLRPC_HEADER
    }

    fn fresh(&self) -> Box<dyn Carrier> {
        Box::new(XmlRpcCarrier {
            meta: self.meta,
            sender: false,
        })
    }

    fn is_text_mode(&self) -> bool {
        true
    }

    fn can_escape(&self) -> bool {
        self.meta
    }

    fn is_push(&self) -> bool {
        false
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn requires_ack(&self) -> bool {
        false
    }

    /// Nothing goes out yet; the first call carries the request line.
    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        self.sender = true;
        let stream = match state.take_stream() {
            Some(s) => s,
            None => return Err(TransportError::TransportClosed),
        };
        state.replace_stream(Box::new(XmlRpcStream::new(stream, self.meta, Vec::new())));
        Ok(())
    }

    /// HTTP carries no sender name; the route records the protocol.
    fn expect_sender_specifier(
        &mut self,
        state: &mut ConnectionState,
    ) -> Result<(), TransportError> {
        state.route.from = self.name().to_string();
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let stream = match state.take_stream() {
            Some(s) => s,
            None => return Err(TransportError::TransportClosed),
        };
        state.replace_stream(Box::new(XmlRpcStream::new(
            stream,
            self.meta,
            self.header().to_vec(),
        )));
        Ok(())
    }

    fn write(&mut self, state: &mut ConnectionState, msg: &Message) -> Result<(), TransportError> {
        let framed = if self.sender {
            let method = msg.get(0).to_string();
            let params = value::request_params(msg.tail());
            let body = document::generate_request(&method, &params);
            document::http_request(&body, &state.route.to)
        } else {
            let reply = value::response_value(msg);
            let body = document::generate_response(reply.as_ref());
            document::http_response(&body)
        };
        state.stream()?.write_all(framed.as_bytes())?;
        Ok(())
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        if !self.meta {
            return Ok(());
        }
        let line = read_text_line(state.stream()?)?;
        match line.trim() {
            "d" => Ok(()),
            "a" => {
                state.admin_message = true;
                Ok(())
            }
            other => Err(TransportError::ProtocolViolation(format!(
                "unknown stream command '{}'",
                other
            ))),
        }
    }
}

/// Translator between HTTP documents below and message text above.
struct XmlRpcStream {
    delegate: Box<dyn TwoWayStream>,
    inbuf: Vec<u8>,
    served: Vec<u8>,
    served_pos: usize,
    meta: bool,
}

impl XmlRpcStream {
    fn new(delegate: Box<dyn TwoWayStream>, meta: bool, residual: Vec<u8>) -> Self {
        XmlRpcStream {
            delegate,
            inbuf: residual,
            served: Vec::new(),
            served_pos: 0,
            meta,
        }
    }

    fn serve(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.served_pos < self.served.len() {
            let n = buf.len().min(self.served.len() - self.served_pos);
            buf[..n].copy_from_slice(&self.served[self.served_pos..self.served_pos + n]);
            self.served_pos += n;
            Some(n)
        } else {
            None
        }
    }

    fn render(&self, doc: Document) -> Vec<u8> {
        let mut text = Vec::new();
        match doc {
            Document::Request { method, params } => {
                if self.meta {
                    if ADMIN_CALLS.contains(&method.as_str()) {
                        text.extend_from_slice(b"a\n");
                    } else {
                        text.extend_from_slice(b"d\n");
                    }
                }
                let msg = value::params_message(&method, &params);
                text.extend_from_slice(msg.to_string().as_bytes());
                text.push(b'\n');
            }
            Document::Response { value } => {
                if self.meta {
                    text.extend_from_slice(b"d\n");
                }
                let msg = value::value_message(value.as_ref());
                text.extend_from_slice(msg.to_string().as_bytes());
                text.push(b'\n');
            }
        }
        text
    }
}

impl TwoWayStream for XmlRpcStream {
    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(n) = self.serve(buf) {
                return Ok(n);
            }
            match document::try_parse(&self.inbuf) {
                Ok(ParseStatus::Complete { doc, consumed }) => {
                    self.inbuf.drain(..consumed);
                    self.served = self.render(doc);
                    self.served_pos = 0;
                }
                Ok(ParseStatus::Incomplete) => {
                    // only re-parse after the buffer has grown
                    let mut chunk = [0u8; 2048];
                    let n = self.delegate.read_some(&mut chunk)?;
                    if n == 0 {
                        if self.inbuf.iter().any(|b| !b.is_ascii_whitespace()) {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "connection closed inside an XML-RPC document",
                            ));
                        }
                        return Ok(0);
                    }
                    self.inbuf.extend_from_slice(&chunk[..n]);
                }
                Err(e) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    ))
                }
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.delegate.write_all(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.delegate.flush()
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.delegate.close()
    }
}
