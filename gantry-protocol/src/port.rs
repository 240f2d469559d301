//! Ports: named endpoints layered over connections.
//!
//! An output port dials one peer; an input port listens, recognizes the
//! carrier from the first 8 bytes of each connection, and serves one
//! peer at a time. Placing each accepted link on its own thread is the
//! caller's business.

use std::collections::HashMap;

use crate::carrier::CarrierRegistry;
use crate::error::TransportError;
use crate::message::Message;
use crate::protocol::{Connection, Route};
use crate::stream::{read_full, RawStream, StreamAddr, StreamListener, TwoWayStream};

/// Resolves a port name to contact information. Consulted only while
/// opening a connection; its own wire protocol is somebody else's
/// problem.
pub trait NameLookup {
    fn lookup(&self, name: &str) -> Result<StreamAddr, TransportError>;
}

/// Name table filled by hand, for processes that know their peers.
#[derive(Default)]
pub struct StaticNames {
    entries: HashMap<String, StreamAddr>,
}

impl StaticNames {
    pub fn new() -> Self {
        StaticNames {
            entries: HashMap::new(),
        }
    }

    pub fn add(&mut self, name: &str, addr: StreamAddr) {
        self.entries.insert(name.to_string(), addr);
    }
}

impl NameLookup for StaticNames {
    fn lookup(&self, name: &str) -> Result<StreamAddr, TransportError> {
        match self.entries.get(name) {
            Some(addr) => Ok(addr.clone()),
            None => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address registered for {}", name),
            ))),
        }
    }
}

/// The sending end of a link.
pub struct OutputPort {
    name: String,
    conn: Connection,
}

impl OutputPort {
    /// Open a connection to `to`, resolving its address first.
    pub fn open(
        resolver: &dyn NameLookup,
        registry: &CarrierRegistry,
        from: &str,
        to: &str,
        carrier_name: &str,
    ) -> Result<Self, TransportError> {
        let addr = resolver.lookup(to)?;
        Self::open_addr(registry, from, to, carrier_name, &addr)
    }

    /// Open a connection to a known address.
    pub fn open_addr(
        registry: &CarrierRegistry,
        from: &str,
        to: &str,
        carrier_name: &str,
        addr: &StreamAddr,
    ) -> Result<Self, TransportError> {
        let carrier = registry
            .get(carrier_name)
            .ok_or(TransportError::UnsupportedCapability("carrier"))?;
        let stream = RawStream::connect(addr)?;
        let route = Route::new(from, to, carrier_name);
        let conn = Connection::connect(Box::new(stream), route, carrier)?;
        Ok(OutputPort {
            name: from.to_string(),
            conn,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn route(&self) -> &Route {
        self.conn.route()
    }

    pub fn write(&mut self, msg: &Message) -> Result<(), TransportError> {
        self.conn.write(msg)
    }

    /// Send `cmd` and collect the peer's answer, where the carrier
    /// supports replies.
    pub fn write_with_reply(
        &mut self,
        cmd: &Message,
        reply: &mut Message,
    ) -> Result<(), TransportError> {
        self.conn.write_with_reply(cmd, reply)
    }

    pub fn close(&mut self) -> Result<(), TransportError> {
        self.conn.close()
    }
}

/// The receiving end: listens, recognizes carriers, serves one peer at
/// a time.
pub struct InputPort<'r> {
    name: String,
    listener: StreamListener,
    registry: &'r CarrierRegistry,
    conn: Option<Connection>,
}

impl<'r> InputPort<'r> {
    pub fn bind(
        name: &str,
        addr: &StreamAddr,
        registry: &'r CarrierRegistry,
    ) -> Result<Self, TransportError> {
        let listener = StreamListener::bind(addr)?;
        Ok(InputPort {
            name: name.to_string(),
            listener,
            registry,
            conn: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actual listening address, with the port the OS picked.
    pub fn local_addr(&self) -> Result<StreamAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next connection and run its handshake. An
    /// unrecognized header gets a courtesy error line before the
    /// connection is dropped.
    pub fn accept(&mut self) -> Result<(), TransportError> {
        let mut stream = self.listener.accept()?;
        let mut header = [0u8; 8];
        read_full(&mut stream, &mut header)?;
        let carrier = match self.registry.recognize(&header) {
            Some(c) => c,
            None => {
                let _ = stream.write_all(b"* Error: no carrier recognized this connection\r\n");
                let _ = stream.flush();
                let _ = stream.close();
                return Err(TransportError::MalformedHeader(header));
            }
        };
        let conn = Connection::accept(Box::new(stream), header, &self.name, carrier)?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Route of the connection being served.
    pub fn route(&self) -> Option<&Route> {
        self.conn.as_ref().map(|c| c.route())
    }

    /// Read the next message from the active connection. Returns true
    /// when the carrier flagged it as administrative.
    pub fn read(&mut self, msg: &mut Message) -> Result<bool, TransportError> {
        self.active()?.read(msg)
    }

    /// Answer the peer on the active connection.
    pub fn reply(&mut self, msg: &Message) -> Result<(), TransportError> {
        self.active()?.write(msg)
    }

    /// Close the connection being served, keeping the listener.
    pub fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut conn) = self.conn.take() {
            conn.close()?;
        }
        Ok(())
    }

    fn active(&mut self) -> Result<&mut Connection, TransportError> {
        match &mut self.conn {
            Some(conn) => Ok(conn),
            None => Err(TransportError::ProtocolViolation(
                "no connection is being served".to_string(),
            )),
        }
    }
}
