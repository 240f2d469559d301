//! Binary codec: little-endian tagged values.
//!
//! A message travels as a list: `[i32 tag][i32 count][elements]`. The tag is
//! `LIST | subcode`; when every element is a scalar of one kind the shared
//! tag is hoisted into the subcode and the per-element tags are omitted.
//! Mixed, empty and nested-group lists use subcode 0 and tag each element.

use std::io::Read;

use crate::error::TransportError;
use crate::message::Message;
use crate::value::{tag, Value, VOCAB_FALSE, VOCAB_TRUE};

/// Refuse length prefixes beyond this, so a corrupt stream fails cleanly
/// instead of forcing a giant allocation.
const MAX_BLOCK: usize = 256 * 1024 * 1024;

/// Encode a whole message into its binary wire form.
///
/// The low byte of the leading tag is what format detection inspects,
/// and LF there means "empty text message"; a top-level list therefore
/// never uses the FLOAT64 subcode (0x0a) and writes per-element tags
/// instead. Nested lists are free to specialize on it.
pub fn encode(msg: &Message) -> Result<Vec<u8>, TransportError> {
    let mut out = Vec::new();
    let mut sub = subcode(&msg.items);
    if sub == tag::FLOAT64 {
        sub = 0;
    }
    write_list_body(&mut out, &msg.items, sub)?;
    Ok(out)
}

/// Decode one message from a complete buffer.
pub fn decode(buf: &[u8]) -> Result<Message, TransportError> {
    let mut r = buf;
    let msg = read_message(&mut r).map_err(|e| match e {
        // a slice running dry is a framing problem, not a dead connection
        TransportError::TransportClosed => {
            TransportError::Encoding("truncated binary message".to_string())
        }
        e => e,
    })?;
    if !r.is_empty() {
        return Err(TransportError::Encoding(format!(
            "{} trailing bytes after binary message",
            r.len()
        )));
    }
    Ok(msg)
}

/// Read one message from a stream.
pub fn read_message<R: Read + ?Sized>(r: &mut R) -> Result<Message, TransportError> {
    let t = read_i32(r)?;
    read_message_body(r, t)
}

/// Read one message whose leading tag byte was already consumed by
/// format sniffing.
pub(crate) fn read_message_with_first<R: Read + ?Sized>(
    r: &mut R,
    first: u8,
) -> Result<Message, TransportError> {
    let mut rest = [0u8; 3];
    r.read_exact(&mut rest)?;
    let t = i32::from_le_bytes([first, rest[0], rest[1], rest[2]]);
    read_message_body(r, t)
}

fn read_message_body<R: Read + ?Sized>(r: &mut R, t: i32) -> Result<Message, TransportError> {
    if t & tag::LIST == 0 || t & tag::DICT != 0 {
        return Err(TransportError::Encoding(format!(
            "expected list tag at start of message, found {:#x}",
            t
        )));
    }
    let items = read_list_items(r, t)?;
    Ok(Message { items })
}

// ------------------- encoding -------------------

/// Shared scalar tag of a homogeneous list, or 0. Group elements and
/// mixed or empty lists never specialize.
pub(crate) fn subcode(items: &[Value]) -> i32 {
    let mut code = 0;
    for (i, v) in items.iter().enumerate() {
        let c = v.code();
        if c & tag::GROUP_MASK != 0 {
            return 0;
        }
        if i == 0 {
            code = c;
        } else if c != code {
            return 0;
        }
    }
    code
}

fn write_i32(out: &mut Vec<u8>, x: i32) {
    out.extend_from_slice(&x.to_le_bytes());
}

fn write_list(out: &mut Vec<u8>, items: &[Value]) -> Result<(), TransportError> {
    write_list_body(out, items, subcode(items))
}

fn write_list_body(out: &mut Vec<u8>, items: &[Value], sub: i32) -> Result<(), TransportError> {
    write_i32(out, tag::LIST | sub);
    write_i32(out, items.len() as i32);
    for v in items {
        write_value(out, v, sub == 0)?;
    }
    Ok(())
}

fn write_dict(out: &mut Vec<u8>, pairs: &[(Value, Value)]) -> Result<(), TransportError> {
    write_i32(out, tag::LIST | tag::DICT);
    write_i32(out, pairs.len() as i32);
    for (k, v) in pairs {
        write_value(out, k, true)?;
        write_value(out, v, true)?;
    }
    Ok(())
}

fn write_value(out: &mut Vec<u8>, v: &Value, tagged: bool) -> Result<(), TransportError> {
    // groups always carry their own header, whatever the enclosing subcode
    if tagged && v.code() & tag::GROUP_MASK == 0 {
        write_i32(out, v.code());
    }
    match v {
        Value::Null => {
            return Err(TransportError::Encoding(
                "null value has no binary form".to_string(),
            ))
        }
        Value::Bool(b) => write_i32(out, if *b { VOCAB_TRUE } else { VOCAB_FALSE }),
        Value::Int8(x) => out.push(*x as u8),
        Value::Int16(x) => out.extend_from_slice(&x.to_le_bytes()),
        Value::Int32(x) => write_i32(out, *x),
        Value::Int64(x) => out.extend_from_slice(&x.to_le_bytes()),
        Value::Float32(x) => out.extend_from_slice(&x.to_le_bytes()),
        Value::Float64(x) => out.extend_from_slice(&x.to_le_bytes()),
        Value::Vocab(x) => write_i32(out, *x),
        Value::String(s) => {
            write_i32(out, s.len() as i32);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            write_i32(out, b.len() as i32);
            out.extend_from_slice(b);
        }
        Value::List(m) => write_list(out, &m.items)?,
        Value::Dict(pairs) => write_dict(out, pairs)?,
    }
    Ok(())
}

// ------------------- decoding -------------------

fn read_i32<R: Read + ?Sized>(r: &mut R) -> Result<i32, TransportError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_len<R: Read + ?Sized>(r: &mut R) -> Result<usize, TransportError> {
    let n = read_i32(r)?;
    if n < 0 || n as usize > MAX_BLOCK {
        return Err(TransportError::Encoding(format!(
            "implausible length prefix {}",
            n
        )));
    }
    Ok(n as usize)
}

fn valid_scalar(code: i32) -> bool {
    matches!(
        code,
        tag::INT8
            | tag::INT16
            | tag::INT32
            | tag::INT64
            | tag::FLOAT32
            | tag::FLOAT64
            | tag::VOCAB
            | tag::STRING
            | tag::BLOB
    )
}

fn read_list_items<R: Read + ?Sized>(r: &mut R, t: i32) -> Result<Vec<Value>, TransportError> {
    let sub = t & !tag::GROUP_MASK;
    if sub != 0 && !valid_scalar(sub) {
        return Err(TransportError::Encoding(format!(
            "unknown list subcode {:#x}",
            sub
        )));
    }
    let n = read_len(r)?;
    let mut items = Vec::new();
    for _ in 0..n {
        let v = if sub == 0 {
            read_tagged_value(r)?
        } else {
            read_scalar(r, sub)?
        };
        items.push(v);
    }
    Ok(items)
}

fn read_tagged_value<R: Read + ?Sized>(r: &mut R) -> Result<Value, TransportError> {
    let t = read_i32(r)?;
    if t & tag::DICT != 0 {
        let n = read_len(r)?;
        let mut pairs = Vec::new();
        for _ in 0..n {
            let k = read_tagged_value(r)?;
            let v = read_tagged_value(r)?;
            pairs.push((k, v));
        }
        return Ok(Value::Dict(pairs));
    }
    if t & tag::LIST != 0 {
        let items = read_list_items(r, t)?;
        return Ok(Value::List(Message { items }));
    }
    read_scalar(r, t)
}

fn read_scalar<R: Read + ?Sized>(r: &mut R, code: i32) -> Result<Value, TransportError> {
    match code {
        tag::INT8 => {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            Ok(Value::Int8(b[0] as i8))
        }
        tag::INT16 => {
            let mut b = [0u8; 2];
            r.read_exact(&mut b)?;
            Ok(Value::Int16(i16::from_le_bytes(b)))
        }
        tag::INT32 => Ok(Value::Int32(read_i32(r)?)),
        tag::INT64 => {
            let mut b = [0u8; 8];
            r.read_exact(&mut b)?;
            Ok(Value::Int64(i64::from_le_bytes(b)))
        }
        tag::FLOAT32 => {
            let mut b = [0u8; 4];
            r.read_exact(&mut b)?;
            Ok(Value::Float32(f32::from_le_bytes(b)))
        }
        tag::FLOAT64 => {
            let mut b = [0u8; 8];
            r.read_exact(&mut b)?;
            Ok(Value::Float64(f64::from_le_bytes(b)))
        }
        tag::VOCAB => {
            let x = read_i32(r)?;
            // the boolean storage codes are reserved
            Ok(match x {
                VOCAB_FALSE => Value::Bool(false),
                VOCAB_TRUE => Value::Bool(true),
                x => Value::Vocab(x),
            })
        }
        tag::STRING => {
            let n = read_len(r)?;
            let mut buf = vec![0u8; n];
            r.read_exact(&mut buf)?;
            let s = String::from_utf8(buf)
                .map_err(|_| TransportError::Encoding("string is not valid UTF-8".to_string()))?;
            Ok(Value::String(s))
        }
        tag::BLOB => {
            let n = read_len(r)?;
            let mut buf = vec![0u8; n];
            r.read_exact(&mut buf)?;
            Ok(Value::Blob(buf))
        }
        code => Err(TransportError::Encoding(format!(
            "unknown value tag {:#x}",
            code
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::vocab_encode;

    #[test]
    fn test_wire_format_mixed_list() {
        let mut msg = Message::new();
        msg.add_i32(7);
        msg.add_string("hi");
        let bytes = encode(&msg).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x01, 0x00, 0x00, // LIST, subcode 0
                0x02, 0x00, 0x00, 0x00, // two elements
                0x01, 0x00, 0x00, 0x00, // INT32
                0x07, 0x00, 0x00, 0x00, // 7
                0x04, 0x00, 0x00, 0x00, // STRING
                0x02, 0x00, 0x00, 0x00, // two bytes
                0x68, 0x69, // "hi"
            ]
        );
    }

    #[test]
    fn test_wire_format_specialized_list() {
        let mut msg = Message::new();
        msg.add_i32(1);
        msg.add_i32(2);
        msg.add_i32(3);
        let bytes = encode(&msg).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x01, 0x01, 0x00, 0x00, // LIST | INT32
                0x03, 0x00, 0x00, 0x00, // three elements, untagged
                0x01, 0x00, 0x00, 0x00, //
                0x02, 0x00, 0x00, 0x00, //
                0x03, 0x00, 0x00, 0x00, //
            ]
        );
    }

    #[test]
    fn test_specialization_is_transparent() {
        let mut msg = Message::new();
        for v in [3, 1, 4, 1, 5] {
            msg.add_i32(v);
        }
        let specialized = encode(&msg).unwrap();
        assert_eq!(&specialized[0..4], &[0x01, 0x01, 0x00, 0x00]);
        assert_eq!(decode(&specialized).unwrap(), msg);
        // a writer is free to skip the specialization and tag every element
        let mut plain = Vec::new();
        plain.extend_from_slice(&tag::LIST.to_le_bytes());
        plain.extend_from_slice(&5i32.to_le_bytes());
        for v in [3i32, 1, 4, 1, 5] {
            plain.extend_from_slice(&tag::INT32.to_le_bytes());
            plain.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode(&plain).unwrap(), msg);
        let mut mixed = Message::new();
        mixed.add_f64(1.5);
        mixed.add_string("x");
        assert_eq!(decode(&encode(&mixed).unwrap()).unwrap(), mixed);
    }

    #[test]
    fn test_nested_structures_round_trip() {
        let mut msg = Message::new();
        msg.add_vocab(vocab_encode("set"));
        let inner = msg.add_list();
        inner.add_i32(10);
        inner.add_i32(20);
        msg.add(Value::Dict(vec![
            (
                Value::String("speed".to_string()),
                Value::Float64(0.25),
            ),
            (Value::String("axis".to_string()), Value::Int32(2)),
        ]));
        msg.add_blob(&[0, 1, 255]);
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_top_level_float_lists_stay_tagged() {
        let mut msg = Message::new();
        msg.add_f64(1.0);
        msg.add_f64(2.0);
        let bytes = encode(&msg).unwrap();
        // no subcode: LF never leads a binary message
        assert_eq!(&bytes[0..4], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(decode(&bytes).unwrap(), msg);

        // nested float lists still specialize
        let mut outer = Message::new();
        let inner = outer.add_list();
        inner.add_f64(1.0);
        inner.add_f64(2.0);
        let bytes = encode(&outer).unwrap();
        assert_eq!(&bytes[8..12], &[0x0a, 0x01, 0x00, 0x00]);
        assert_eq!(decode(&bytes).unwrap(), outer);

        // a buffer a writer did specialize at top level still decodes
        let mut wire = Vec::new();
        wire.extend_from_slice(&(tag::LIST | tag::FLOAT64).to_le_bytes());
        wire.extend_from_slice(&2i32.to_le_bytes());
        for x in [1.0f64, 2.0] {
            wire.extend_from_slice(&x.to_le_bytes());
        }
        assert_eq!(decode(&wire).unwrap(), msg);
    }

    #[test]
    fn test_bool_storage_reserved() {
        let mut msg = Message::new();
        msg.add_bool(true);
        msg.add_bool(false);
        let bytes = encode(&msg).unwrap();
        // homogeneous vocab list
        assert_eq!(&bytes[0..4], &[0x09, 0x01, 0x00, 0x00]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(*decoded.get(0), Value::Bool(true));
        assert_eq!(*decoded.get(1), Value::Bool(false));
    }

    #[test]
    fn test_null_has_no_wire_form() {
        let mut msg = Message::new();
        msg.add(Value::Null);
        assert!(matches!(
            encode(&msg),
            Err(TransportError::Encoding(_))
        ));
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let mut msg = Message::new();
        msg.add_string("payload");
        let bytes = encode(&msg).unwrap();
        let err = decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, TransportError::Encoding(_)));
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(tag::LIST).to_le_bytes());
        bytes.extend_from_slice(&(-4i32).to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(TransportError::Encoding(_))
        ));
    }

    #[test]
    fn test_empty_message() {
        let msg = Message::new();
        let bytes = encode(&msg).unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }
}
