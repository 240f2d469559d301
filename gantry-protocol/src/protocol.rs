//! Handshake state machine and the control-word currency it trades in.
//!
//! Every carrier runs the same phase ladder; a carrier that has nothing to
//! do in a phase implements it as a no-op success. Phases are never
//! skipped, so the transition count of a finished handshake is the same
//! for every carrier.

use crate::carrier::Carrier;
use crate::error::TransportError;
use crate::message::Message;
use crate::stream::{read_full, StreamReader, TwoWayStream};

/// Control words carry one i32 between fixed guard bytes, 8 bytes total.
pub(crate) fn control_word(x: i32) -> [u8; 8] {
    let n = x.to_le_bytes();
    [b'G', b'A', n[0], n[1], n[2], n[3], b'T', b'Y']
}

pub(crate) fn parse_control_word(buf: &[u8; 8]) -> Result<i32, TransportError> {
    if buf[0] != b'G' || buf[1] != b'A' || buf[6] != b'T' || buf[7] != b'Y' {
        return Err(TransportError::ProtocolViolation(format!(
            "bad control word {:02x?}",
            buf
        )));
    }
    Ok(i32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]))
}

const MAX_SENDER_NAME: i32 = 1000;
const MAX_INDEX_BLOCKS: i32 = 32;

/// Phases of a connection's life. `Init` is initial, `Closed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    SendHeader,
    CheckHeader,
    ExpectReplyToHeader,
    ExpectSenderSpecifier,
    ExpectExtraHeader,
    RespondToHeader,
    Established,
    SendIndex,
    ExpectIndex,
    SendAck,
    ExpectAck,
    Closed,
}

/// Who talks to whom, and how.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub from: String,
    pub to: String,
    pub carrier: String,
}

impl Route {
    pub fn new(from: &str, to: &str, carrier: &str) -> Self {
        Route {
            from: from.to_string(),
            to: to.to_string(),
            carrier: carrier.to_string(),
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}->{}", self.from, self.carrier, self.to)
    }
}

/// Connection-local state handed to every carrier callback.
///
/// Kept apart from the carrier itself so a callback can mutate both
/// freely; a carrier may take the stream out, wrap it, and put the
/// wrapper back.
pub struct ConnectionState {
    stream: Option<Box<dyn TwoWayStream>>,
    pub route: Route,
    phase: Phase,
    transitions: u32,
    /// Set during a read when the carrier flags the incoming payload as
    /// administrative rather than application data.
    pub admin_message: bool,
}

impl ConnectionState {
    pub fn new(stream: Box<dyn TwoWayStream>, route: Route) -> Self {
        ConnectionState {
            stream: Some(stream),
            route,
            phase: Phase::Init,
            transitions: 0,
            admin_message: false,
        }
    }

    /// The live stream, or a transport-closed error once it is gone.
    pub fn stream(&mut self) -> Result<&mut dyn TwoWayStream, TransportError> {
        match &mut self.stream {
            Some(s) => Ok(s.as_mut()),
            None => Err(TransportError::TransportClosed),
        }
    }

    /// Remove the stream, e.g. to wrap it in a translator.
    pub fn take_stream(&mut self) -> Option<Box<dyn TwoWayStream>> {
        self.stream.take()
    }

    pub fn replace_stream(&mut self, stream: Box<dyn TwoWayStream>) {
        self.stream = Some(stream);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of phase transitions so far; identical across carriers for
    /// the same operation sequence.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.transitions += 1;
    }
}

// Default phase currency, shared by every carrier that does not override
// the corresponding callback.

pub(crate) fn write_sender_specifier(state: &mut ConnectionState) -> Result<(), TransportError> {
    let name = if state.route.from.is_empty() {
        "anonymous".to_string()
    } else {
        state.route.from.clone()
    };
    let stream = state.stream()?;
    stream.write_all(&control_word(name.len() as i32))?;
    stream.write_all(name.as_bytes())?;
    Ok(())
}

pub(crate) fn read_sender_specifier(state: &mut ConnectionState) -> Result<String, TransportError> {
    let stream = state.stream()?;
    let mut cw = [0u8; 8];
    read_full(stream, &mut cw)?;
    let len = parse_control_word(&cw)?;
    if !(1..=MAX_SENDER_NAME).contains(&len) {
        return Err(TransportError::ProtocolViolation(format!(
            "implausible sender name length {}",
            len
        )));
    }
    let mut name = vec![0u8; len as usize];
    read_full(stream, &mut name)?;
    String::from_utf8(name)
        .map_err(|_| TransportError::Encoding("sender name is not valid UTF-8".to_string()))
}

pub(crate) fn write_index(state: &mut ConnectionState, len: usize) -> Result<(), TransportError> {
    let stream = state.stream()?;
    stream.write_all(&control_word(1))?;
    stream.write_all(&control_word(len as i32))?;
    Ok(())
}

pub(crate) fn read_index(state: &mut ConnectionState) -> Result<(), TransportError> {
    let stream = state.stream()?;
    let mut cw = [0u8; 8];
    read_full(stream, &mut cw)?;
    let blocks = parse_control_word(&cw)?;
    if !(1..=MAX_INDEX_BLOCKS).contains(&blocks) {
        return Err(TransportError::ProtocolViolation(format!(
            "implausible index block count {}",
            blocks
        )));
    }
    for _ in 0..blocks {
        read_full(stream, &mut cw)?;
        let len = parse_control_word(&cw)?;
        if len < 0 {
            return Err(TransportError::ProtocolViolation(format!(
                "negative block length {} in index",
                len
            )));
        }
    }
    Ok(())
}

pub(crate) fn write_ack(state: &mut ConnectionState) -> Result<(), TransportError> {
    state.stream()?.write_all(&control_word(0))?;
    Ok(())
}

pub(crate) fn read_ack(state: &mut ConnectionState) -> Result<(), TransportError> {
    let stream = state.stream()?;
    let mut cw = [0u8; 8];
    read_full(stream, &mut cw)?;
    let x = parse_control_word(&cw)?;
    if x != 0 {
        return Err(TransportError::ProtocolViolation(format!(
            "acknowledgement carried {}, expected 0",
            x
        )));
    }
    Ok(())
}

/// One established link: the state machine plus the carrier driving it.
pub struct Connection {
    state: ConnectionState,
    carrier: Box<dyn Carrier>,
}

impl Connection {
    /// Run the sender side of the handshake over an open stream.
    pub fn connect(
        stream: Box<dyn TwoWayStream>,
        route: Route,
        mut carrier: Box<dyn Carrier>,
    ) -> Result<Self, TransportError> {
        let mut state = ConnectionState::new(stream, route);
        state.set_phase(Phase::SendHeader);
        carrier.send_header(&mut state)?;
        state.stream()?.flush()?;
        state.set_phase(Phase::ExpectReplyToHeader);
        carrier.expect_reply_to_header(&mut state)?;
        state.set_phase(Phase::Established);
        Ok(Connection { state, carrier })
    }

    /// Run the receiver side of the handshake. `header` holds the 8
    /// bytes already sniffed off the stream by carrier recognition; they
    /// are re-verified so a mismatched carrier fails before any
    /// application data is touched.
    pub fn accept(
        stream: Box<dyn TwoWayStream>,
        header: [u8; 8],
        to_name: &str,
        mut carrier: Box<dyn Carrier>,
    ) -> Result<Self, TransportError> {
        let route = Route::new("", to_name, carrier.name());
        let mut state = ConnectionState::new(stream, route);
        state.set_phase(Phase::CheckHeader);
        if !carrier.check_header(&header) {
            return Err(TransportError::MalformedHeader(header));
        }
        carrier.set_parameters(&header);
        state.set_phase(Phase::ExpectSenderSpecifier);
        carrier.expect_sender_specifier(&mut state)?;
        state.set_phase(Phase::ExpectExtraHeader);
        carrier.expect_extra_header(&mut state)?;
        state.set_phase(Phase::RespondToHeader);
        carrier.respond_to_header(&mut state)?;
        state.stream()?.flush()?;
        state.set_phase(Phase::Established);
        Ok(Connection { state, carrier })
    }

    pub fn route(&self) -> &Route {
        &self.state.route
    }

    pub fn carrier(&self) -> &dyn Carrier {
        self.carrier.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn transitions(&self) -> u32 {
        self.state.transitions()
    }

    /// Send one message: index, payload, then wait for the peer's
    /// acknowledgement if this carrier trades in them.
    pub fn write(&mut self, msg: &Message) -> Result<(), TransportError> {
        self.require_established("write")?;
        self.state.set_phase(Phase::SendIndex);
        self.carrier.write(&mut self.state, msg)?;
        self.state.stream()?.flush()?;
        self.state.set_phase(Phase::ExpectAck);
        self.carrier.expect_ack(&mut self.state)?;
        self.state.set_phase(Phase::Established);
        Ok(())
    }

    /// Receive one message into `msg`. Returns true when the carrier
    /// flagged it as administrative.
    pub fn read(&mut self, msg: &mut Message) -> Result<bool, TransportError> {
        self.require_established("read")?;
        self.state.admin_message = false;
        self.state.set_phase(Phase::ExpectIndex);
        self.carrier.expect_index(&mut self.state)?;
        *msg = Message::read_from(&mut StreamReader(self.state.stream()?))?;
        self.state.set_phase(Phase::SendAck);
        self.carrier.send_ack(&mut self.state)?;
        self.state.stream()?.flush()?;
        self.state.set_phase(Phase::Established);
        Ok(self.state.admin_message)
    }

    /// Send `cmd` and wait for the peer's answer on the same link.
    pub fn write_with_reply(
        &mut self,
        cmd: &Message,
        reply: &mut Message,
    ) -> Result<(), TransportError> {
        if !self.carrier.supports_reply() {
            return Err(TransportError::UnsupportedCapability("reply"));
        }
        self.write(cmd)?;
        self.read(reply)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), TransportError> {
        self.state.set_phase(Phase::Closed);
        if let Some(mut stream) = self.state.take_stream() {
            stream.close()?;
        }
        Ok(())
    }

    fn require_established(&self, what: &str) -> Result<(), TransportError> {
        if self.state.phase() != Phase::Established {
            return Err(TransportError::ProtocolViolation(format!(
                "{} attempted in phase {:?}",
                what,
                self.state.phase()
            )));
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state.phase() != Phase::Closed {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::Carrier;
    use crate::stream::{RawStream, StreamAddr, StreamListener};
    use std::thread;
    use std::time::Duration;

    /// Carrier relying entirely on default phase behavior.
    struct PlainCarrier;

    impl Carrier for PlainCarrier {
        fn name(&self) -> &str {
            "plain"
        }

        fn header(&self) -> [u8; 8] {
            *b"PLAIN\0\0\0"
        }

        fn check_header(&self, header: &[u8; 8]) -> bool {
            header == &self.header()
        }

        fn fresh(&self) -> Box<dyn Carrier> {
            Box::new(PlainCarrier)
        }
    }

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
    fn test_control_word_round_trip() {
        let cw = control_word(1234);
        assert_eq!(cw[0], b'G');
        assert_eq!(cw[7], b'Y');
        assert_eq!(parse_control_word(&cw).unwrap(), 1234);
        assert!(parse_control_word(b"XXxxxxXX").is_err());
    }

    #[test]
    fn test_handshake_and_traffic() {
        let (client, server) = tcp_pair();

        let receiver = thread::spawn(move || {
            let mut stream = server;
            let mut header = [0u8; 8];
            read_full(stream.as_mut(), &mut header).unwrap();
            let mut conn =
                Connection::accept(stream, header, "/sink", Box::new(PlainCarrier)).unwrap();
            assert_eq!(conn.route().from, "/probe");
            let mut msg = Message::new();
            let admin = conn.read(&mut msg).unwrap();
            assert!(!admin);
            assert_eq!(msg.get(0).as_i32(), 42);
            conn.transitions()
        });

        let mut conn = Connection::connect(
            client,
            Route::new("/probe", "/sink", "plain"),
            Box::new(PlainCarrier),
        )
        .unwrap();
        // sender ladder: SendHeader, ExpectReplyToHeader, Established
        assert_eq!(conn.transitions(), 3);
        assert_eq!(conn.phase(), Phase::Established);

        let mut msg = Message::new();
        msg.add_i32(42);
        conn.write(&msg).unwrap();
        // plus SendIndex, ExpectAck, Established
        assert_eq!(conn.transitions(), 6);

        let receiver_transitions = receiver.join().unwrap();
        // receiver ladder: CheckHeader, ExpectSenderSpecifier,
        // ExpectExtraHeader, RespondToHeader, Established, then
        // ExpectIndex, SendAck, Established for the read
        assert_eq!(receiver_transitions, 8);
    }

    #[test]
    fn test_header_mismatch_rejected_before_data() {
        let (client, server) = tcp_pair();
        drop(client);
        let err = match Connection::accept(server, *b"BOGUS\0\0\0", "/sink", Box::new(PlainCarrier))
        {
            Ok(_) => panic!("a bogus header must not produce a connection"),
            Err(e) => e,
        };
        assert!(matches!(err, TransportError::MalformedHeader(_)));
    }

    #[test]
    fn test_write_before_establishment_rejected() {
        let (client, _server) = tcp_pair();
        let state = ConnectionState::new(client, Route::new("/a", "/b", "plain"));
        let mut conn = Connection {
            state,
            carrier: Box::new(PlainCarrier),
        };
        let msg = Message::new();
        assert!(matches!(
            conn.write(&msg),
            Err(TransportError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_write_with_reply() {
        let (client, server) = tcp_pair();

        let responder = thread::spawn(move || {
            let mut stream = server;
            let mut header = [0u8; 8];
            read_full(stream.as_mut(), &mut header).unwrap();
            let mut conn =
                Connection::accept(stream, header, "/svc", Box::new(PlainCarrier)).unwrap();
            let mut cmd = Message::new();
            conn.read(&mut cmd).unwrap();
            let mut answer = Message::new();
            answer.add_i32(cmd.get(1).as_i32() + cmd.get(2).as_i32());
            conn.write(&answer).unwrap();
        });

        let mut conn = Connection::connect(
            client,
            Route::new("/cli", "/svc", "plain"),
            Box::new(PlainCarrier),
        )
        .unwrap();
        let mut cmd = Message::new();
        cmd.add_string("add");
        cmd.add_i32(10);
        cmd.add_i32(20);
        let mut reply = Message::new();
        conn.write_with_reply(&cmd, &mut reply).unwrap();
        assert_eq!(reply.get(0).as_i32(), 30);

        responder.join().unwrap();
    }
}
