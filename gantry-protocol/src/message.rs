//! Ordered sequence of values, and the read/write pair that moves one
//! over a stream in either representation.

use std::io::{Read, Write};

use crate::error::TransportError;
use crate::text;
use crate::value::Value;
use crate::wire;

static NULL_VALUE: Value = Value::Null;

/// A message: what one `write` sends and one `read` receives.
///
/// Reading auto-detects the representation from the first byte, so a
/// single receiver handles binary and text peers without negotiation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub(crate) items: Vec<Value>,
}

impl Message {
    pub fn new() -> Self {
        Message { items: Vec::new() }
    }

    /// Parse a message from its text form.
    pub fn from_text(text: &str) -> Result<Self, TransportError> {
        text::parse_message(text)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn add(&mut self, v: Value) {
        self.items.push(v);
    }

    pub fn add_bool(&mut self, x: bool) {
        self.items.push(Value::Bool(x));
    }

    pub fn add_i8(&mut self, x: i8) {
        self.items.push(Value::Int8(x));
    }

    pub fn add_i16(&mut self, x: i16) {
        self.items.push(Value::Int16(x));
    }

    pub fn add_i32(&mut self, x: i32) {
        self.items.push(Value::Int32(x));
    }

    pub fn add_i64(&mut self, x: i64) {
        self.items.push(Value::Int64(x));
    }

    pub fn add_f32(&mut self, x: f32) {
        self.items.push(Value::Float32(x));
    }

    pub fn add_f64(&mut self, x: f64) {
        self.items.push(Value::Float64(x));
    }

    pub fn add_vocab(&mut self, code: i32) {
        self.items.push(Value::Vocab(code));
    }

    pub fn add_string(&mut self, s: &str) {
        self.items.push(Value::String(s.to_string()));
    }

    pub fn add_blob(&mut self, bytes: &[u8]) {
        self.items.push(Value::Blob(bytes.to_vec()));
    }

    /// Append an empty sublist and hand it back for filling in place.
    pub fn add_list(&mut self) -> &mut Message {
        self.items.push(Value::List(Message::new()));
        match self.items.last_mut() {
            Some(Value::List(m)) => m,
            _ => unreachable!(),
        }
    }

    /// Value at `i`, or a Null value when out of range. Never fails.
    pub fn get(&self, i: usize) -> &Value {
        self.items.get(i).unwrap_or(&NULL_VALUE)
    }

    /// Everything after the first element.
    pub fn tail(&self) -> &[Value] {
        self.items.get(1..).unwrap_or(&[])
    }

    /// Look up `key` in property-style content: a `(key value)` pair
    /// list, or a dict entry. Null when absent.
    pub fn find(&self, key: &str) -> &Value {
        for item in &self.items {
            match item {
                Value::List(m) if m.len() >= 2 && key_matches(m.get(0), key) => {
                    return m.get(1);
                }
                Value::Dict(pairs) => {
                    for (k, v) in pairs {
                        if key_matches(k, key) {
                            return v;
                        }
                    }
                }
                _ => {}
            }
        }
        &NULL_VALUE
    }

    /// Write this message in the representation the carrier asked for.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        w: &mut W,
        text_mode: bool,
    ) -> Result<(), TransportError> {
        if text_mode {
            let mut line = text::format_message(self);
            line.push('\n');
            w.write_all(line.as_bytes())?;
        } else {
            w.write_all(&wire::encode(self)?)?;
        }
        Ok(())
    }

    /// Read one message, deciding the representation from the first byte.
    ///
    /// The binary form always opens with a list tag whose low byte is a
    /// known subcode; no text message starts with one of those bytes, so
    /// a single byte settles the question. A bare LF is the text form of
    /// an empty message; the binary encoder keeps the one colliding
    /// subcode (FLOAT64) out of its leading tag. Text input is
    /// accumulated line by line until quotes and brackets balance.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Message, TransportError> {
        let b0 = read_byte(r)?;
        if b0 == b'\n' {
            return Ok(Message::new());
        }
        if is_binary_start(b0) {
            return wire::read_message_with_first(r, b0);
        }
        let mut buf: Vec<u8> = vec![b0];
        loop {
            loop {
                let b = read_byte(r)?;
                if b == b'\n' {
                    break;
                }
                buf.push(b);
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            let line = std::str::from_utf8(&buf).map_err(|_| {
                TransportError::Encoding("text message is not valid UTF-8".to_string())
            })?;
            if text::is_complete(line) {
                return text::parse_message(line);
            }
            buf.push(b'\n');
        }
    }
}

fn key_matches(v: &Value, key: &str) -> bool {
    match v {
        Value::String(s) => s == key,
        Value::Vocab(x) => crate::value::vocab_decode(*x) == key,
        _ => false,
    }
}

/// Low bytes a binary message can open with: the top-level list
/// subcodes plus 0. FLOAT64 (10) is absent; the encoder never hoists it
/// into a top-level tag, leaving LF to mean an empty text message.
fn is_binary_start(b: u8) -> bool {
    matches!(b, 0 | 1 | 4 | 9 | 12 | 17 | 32 | 64 | 128)
}

fn read_byte<R: Read + ?Sized>(r: &mut R) -> Result<u8, TransportError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::vocab_encode;

    #[test]
    fn test_get_out_of_range_is_null() {
        let mut msg = Message::new();
        msg.add_i32(1);
        assert_eq!(*msg.get(0), Value::Int32(1));
        assert!(msg.get(1).is_null());
        assert!(msg.get(100).is_null());
    }

    #[test]
    fn test_find_pairs_and_dicts() {
        let mut msg = Message::new();
        let pair = msg.add_list();
        pair.add_string("speed");
        pair.add_f64(0.5);
        msg.add(Value::Dict(vec![(
            Value::Vocab(vocab_encode("axis")),
            Value::Int32(2),
        )]));
        assert_eq!(msg.find("speed").as_f64(), 0.5);
        assert_eq!(msg.find("axis").as_i32(), 2);
        assert!(msg.find("missing").is_null());
    }

    #[test]
    fn test_read_detects_binary() {
        let mut msg = Message::new();
        msg.add_i32(42);
        msg.add_string("x");
        let mut wire_bytes = Vec::new();
        msg.write_to(&mut wire_bytes, false).unwrap();
        let back = Message::read_from(&mut wire_bytes.as_slice()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_read_detects_text() {
        let mut input: &[u8] = b"(1 2) go\n";
        let msg = Message::read_from(&mut input).unwrap();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get(0).as_list().unwrap().len(), 2);
        assert_eq!(*msg.get(1), Value::String("go".to_string()));
    }

    #[test]
    fn test_specialized_lists_never_mistaken_for_text() {
        // vocab and int8 subcodes put TAB and space in the first wire
        // byte; floats exercise the tagged fallback that keeps LF out
        let mut floats = Message::new();
        floats.add_f64(1.0);
        floats.add_f64(2.0);
        let mut vocabs = Message::new();
        vocabs.add_vocab(vocab_encode("go"));
        vocabs.add_vocab(vocab_encode("stop"));
        let mut bytes8 = Message::new();
        bytes8.add_i8(-1);
        bytes8.add_i8(1);
        for msg in [&floats, &vocabs, &bytes8] {
            let mut wire_bytes = Vec::new();
            msg.write_to(&mut wire_bytes, false).unwrap();
            let back = Message::read_from(&mut wire_bytes.as_slice()).unwrap();
            assert_eq!(&back, msg);
        }
    }

    #[test]
    fn test_text_write_read_round_trip() {
        let mut msg = Message::new();
        msg.add_string("cmd");
        msg.add_i32(3);
        let mut out = Vec::new();
        msg.write_to(&mut out, true).unwrap();
        assert_eq!(out, b"cmd 3\n");
        let back = Message::read_from(&mut out.as_slice()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_empty_message_round_trips_as_text() {
        let msg = Message::new();
        let mut out = Vec::new();
        msg.write_to(&mut out, true).unwrap();
        assert_eq!(out, b"\n");
        let back = Message::read_from(&mut out.as_slice()).unwrap();
        assert!(back.is_empty());
        // a CRLF peer gets the same answer
        let mut input: &[u8] = b"\r\n";
        assert!(Message::read_from(&mut input).unwrap().is_empty());
    }

    #[test]
    fn test_multiline_text_accumulates() {
        let mut input: &[u8] = b"(1 2\n3) done\n";
        let msg = Message::read_from(&mut input).unwrap();
        assert_eq!(msg.get(0).as_list().unwrap().len(), 3);
        assert_eq!(*msg.get(1), Value::String("done".to_string()));
    }

    #[test]
    fn test_closed_stream_reports_transport_closed() {
        let mut input: &[u8] = b"";
        assert!(matches!(
            Message::read_from(&mut input),
            Err(TransportError::TransportClosed)
        ));
        // mid-message closure too
        let mut input: &[u8] = b"(1 2\n";
        assert!(matches!(
            Message::read_from(&mut input),
            Err(TransportError::TransportClosed)
        ));
    }
}
