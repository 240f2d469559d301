//! The XML-RPC value model and its mapping onto port messages.
//!
//! Scalars translate one to one. Aggregates need judgement: an array
//! arriving from a foreign peer becomes a list, and an outgoing list
//! becomes an array unless every element is a two-element `[key, value]`
//! sub-list with a string key, in which case it travels as a struct.
//! That test is a heuristic: a genuine list of such pairs is
//! indistinguishable from a dictionary and will be converted too.

use gantry_protocol::{vocab_decode, Message, Value};

/// A value in the foreign protocol's model.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Int(i32),
    Long(i64),
    Bool(bool),
    Double(f64),
    Str(String),
    Base64(Vec<u8>),
    Array(Vec<RpcValue>),
    Struct(Vec<(String, RpcValue)>),
}

/// Whether every element of `m` is a `[string-key, value]` pair.
pub fn looks_like_dict(m: &Message) -> bool {
    if m.is_empty() {
        return false;
    }
    (0..m.len()).all(|i| match m.get(i) {
        Value::List(pair) => pair.len() == 2 && matches!(pair.get(0), Value::String(_)),
        _ => false,
    })
}

fn key_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Vocab(code) => vocab_decode(*code),
        other => other.to_string(),
    }
}

pub fn from_value(v: &Value) -> RpcValue {
    match v {
        Value::Null => RpcValue::Str(String::new()),
        Value::Bool(b) => RpcValue::Bool(*b),
        Value::Int8(x) => RpcValue::Int(i32::from(*x)),
        Value::Int16(x) => RpcValue::Int(i32::from(*x)),
        Value::Int32(x) => RpcValue::Int(*x),
        Value::Int64(x) => RpcValue::Long(*x),
        Value::Float32(x) => RpcValue::Double(f64::from(*x)),
        Value::Float64(x) => RpcValue::Double(*x),
        Value::Vocab(code) => RpcValue::Str(vocab_decode(*code)),
        Value::String(s) => RpcValue::Str(s.clone()),
        Value::Blob(bytes) => RpcValue::Base64(bytes.clone()),
        Value::List(items) => {
            if looks_like_dict(items) {
                RpcValue::Struct(
                    (0..items.len())
                        .map(|i| match items.get(i) {
                            Value::List(pair) => (key_text(pair.get(0)), from_value(pair.get(1))),
                            _ => unreachable!(),
                        })
                        .collect(),
                )
            } else {
                RpcValue::Array((0..items.len()).map(|i| from_value(items.get(i))).collect())
            }
        }
        Value::Dict(pairs) => RpcValue::Struct(
            pairs
                .iter()
                .map(|(k, v)| (key_text(k), from_value(v)))
                .collect(),
        ),
    }
}

pub fn to_value(v: &RpcValue) -> Value {
    match v {
        RpcValue::Int(x) => Value::Int32(*x),
        RpcValue::Long(x) => Value::Int64(*x),
        RpcValue::Bool(b) => Value::Bool(*b),
        RpcValue::Double(x) => Value::Float64(*x),
        RpcValue::Str(s) => Value::String(s.clone()),
        RpcValue::Base64(bytes) => Value::Blob(bytes.clone()),
        RpcValue::Array(items) => {
            let mut m = Message::new();
            for item in items {
                m.add(to_value(item));
            }
            Value::List(m)
        }
        RpcValue::Struct(pairs) => Value::Dict(
            pairs
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), to_value(v)))
                .collect(),
        ),
    }
}

/// The params of an outgoing call. One argument travels bare; two or
/// more travel as an array, which the document layer spreads into
/// positional parameters. A call with a single list argument is
/// therefore indistinguishable on the wire from a call with that many
/// scalar arguments. Peers have depended on this for long enough that
/// it is kept as-is.
pub fn request_params(tail: &[Value]) -> RpcValue {
    if tail.len() == 1 {
        from_value(&tail[0])
    } else {
        RpcValue::Array(tail.iter().map(from_value).collect())
    }
}

/// The single value of an outgoing reply, if any.
pub fn response_value(msg: &Message) -> Option<RpcValue> {
    match msg.len() {
        0 => None,
        1 => Some(from_value(msg.get(0))),
        _ => Some(RpcValue::Array(
            (0..msg.len()).map(|i| from_value(msg.get(i))).collect(),
        )),
    }
}

/// Rebuild an incoming call as a message: method first, then one
/// element per positional parameter.
pub fn params_message(method: &str, params: &[RpcValue]) -> Message {
    let mut msg = Message::new();
    msg.add_string(method);
    for p in params {
        msg.add(to_value(p));
    }
    msg
}

/// Rebuild an incoming reply as a message. A bare array spreads into
/// the top level; anything else becomes a single element; an absent
/// value gives the empty message.
pub fn value_message(value: Option<&RpcValue>) -> Message {
    match value {
        None => Message::new(),
        Some(v) => match to_value(v) {
            Value::List(m) => m,
            single => {
                let mut msg = Message::new();
                msg.add(single);
                msg
            }
        },
    }
}
