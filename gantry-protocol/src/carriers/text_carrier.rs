//! A carrier a human can drive from a telnet session.
//!
//! The connection opens with `CONNECT <name>` and is greeted with a
//! `Welcome` line. After that, each payload line is introduced by a
//! one-letter command line: `d` for data, `a` for an administrative
//! message, `q` to hang up. No index words, no acknowledgements;
//! everything on the wire is typable text.

use crate::carrier::Carrier;
use crate::error::TransportError;
use crate::message::Message;
use crate::protocol::ConnectionState;
use crate::stream::read_text_line;

pub struct TextCarrier;

impl TextCarrier {
    pub fn new() -> Self {
        TextCarrier
    }
}

impl Default for TextCarrier {
    fn default() -> Self {
        TextCarrier::new()
    }
}

impl Carrier for TextCarrier {
    fn name(&self) -> &str {
        "text"
    }

    fn header(&self) -> [u8; 8] {
        *b"CONNECT "
    }

    fn check_header(&self, header: &[u8; 8]) -> bool {
        header == &self.header()
    }

    fn fresh(&self) -> Box<dyn Carrier> {
        Box::new(TextCarrier)
    }

    fn is_text_mode(&self) -> bool {
        true
    }

    fn can_escape(&self) -> bool {
        true
    }

    fn requires_ack(&self) -> bool {
        false
    }

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let name = if state.route.from.is_empty() {
            "anonymous".to_string()
        } else {
            state.route.from.clone()
        };
        let line = format!("CONNECT {}\r\n", name);
        state.stream()?.write_all(line.as_bytes())?;
        Ok(())
    }

    fn expect_reply_to_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let line = read_text_line(state.stream()?)?;
        if !line.starts_with("Welcome") {
            return Err(TransportError::ProtocolViolation(format!(
                "expected a Welcome line, got '{}'",
                line
            )));
        }
        Ok(())
    }

    /// The sender's name is the rest of the CONNECT line; the fixed
    /// `CONNECT ` prefix was consumed as the header.
    fn expect_sender_specifier(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let line = read_text_line(state.stream()?)?;
        state.route.from = line.trim().to_string();
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let line = format!("Welcome {}\r\n", state.route.to);
        state.stream()?.write_all(line.as_bytes())?;
        Ok(())
    }

    fn write(&mut self, state: &mut ConnectionState, msg: &Message) -> Result<(), TransportError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"d\n");
        msg.write_to(&mut payload, true)?;
        state.stream()?.write_all(&payload)?;
        Ok(())
    }

    /// The command line takes the place of the index. Blank lines are a
    /// human catching their breath and are ignored.
    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        loop {
            let line = read_text_line(state.stream()?)?;
            match line.trim() {
                "d" => return Ok(()),
                "a" => {
                    state.admin_message = true;
                    return Ok(());
                }
                "q" => return Err(TransportError::TransportClosed),
                "" => continue,
                other => {
                    return Err(TransportError::ProtocolViolation(format!(
                        "unknown stream command '{}'",
                        other
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Connection, Route};
    use crate::stream::{read_full, RawStream, StreamAddr, StreamListener, TwoWayStream};
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

    fn accept_text(mut stream: Box<dyn TwoWayStream>) -> Connection {
        let mut header = [0u8; 8];
        read_full(stream.as_mut(), &mut header).unwrap();
        Connection::accept(stream, header, "/in", Box::new(TextCarrier)).unwrap()
    }

    #[test]
    fn test_text_exchange() {
        let (client, server) = tcp_pair();

        let receiver = thread::spawn(move || {
            let mut conn = accept_text(server);
            assert_eq!(conn.route().from, "/typist");
            let mut msg = Message::new();
            let admin = conn.read(&mut msg).unwrap();
            (admin, msg)
        });

        let mut conn = Connection::connect(
            client,
            Route::new("/typist", "/in", "text"),
            Box::new(TextCarrier),
        )
        .unwrap();
        let mut msg = Message::new();
        msg.add_string("hello there");
        msg.add_i32(5);
        conn.write(&msg).unwrap();

        let (admin, received) = receiver.join().unwrap();
        assert!(!admin);
        assert_eq!(received, msg);
    }

    #[test]
    fn test_hand_typed_session() {
        // what a human would type into telnet, blank line and all
        let (client, server) = tcp_pair();

        let receiver = thread::spawn(move || {
            let mut conn = accept_text(server);
            let mut first = Message::new();
            let first_admin = conn.read(&mut first).unwrap();
            let mut second = Message::new();
            let second_admin = conn.read(&mut second).unwrap();
            (first_admin, first, second_admin, second)
        });

        let mut raw = client;
        raw.write_all(b"CONNECT /console\r\n").unwrap();
        raw.flush().unwrap();
        let mut greeting = [0u8; 8];
        read_full(raw.as_mut(), &mut greeting).unwrap();
        assert_eq!(&greeting, b"Welcome ");
        // swallow the rest of the greeting line
        let mut b = [0u8; 1];
        while b[0] != b'\n' {
            raw.read_some(&mut b).unwrap();
        }

        raw.write_all(b"\nd\nset speed 0.5\n").unwrap();
        raw.write_all(b"a\nstatus\n").unwrap();
        raw.flush().unwrap();

        let (first_admin, first, second_admin, second) = receiver.join().unwrap();
        assert!(!first_admin);
        assert_eq!(first.get(0).as_str(), "set");
        assert_eq!(first.get(2).as_f64(), 0.5);
        assert!(second_admin);
        assert_eq!(second.get(0).as_str(), "status");
    }

    #[test]
    fn test_quit_command_closes() {
        let (client, server) = tcp_pair();

        let receiver = thread::spawn(move || {
            let mut conn = accept_text(server);
            let mut msg = Message::new();
            conn.read(&mut msg).unwrap_err()
        });

        let mut raw = client;
        raw.write_all(b"CONNECT /console\r\n").unwrap();
        raw.flush().unwrap();
        raw.write_all(b"q\n").unwrap();
        raw.flush().unwrap();

        let err = receiver.join().unwrap();
        assert!(matches!(err, TransportError::TransportClosed));
    }
}
