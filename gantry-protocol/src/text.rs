//! Text codec: the same values as human-readable words.
//!
//! One message is one line. Strings are quoted when they could be mistaken
//! for anything else, vocabs wear square brackets, lists parentheses, blobs
//! decimal bytes in braces. The text form is lossy about integer width
//! (everything that fits rereads as Int32) and about Float32 (rereads as
//! Float64), and a dict rereads as a list of pairs; apart from these the
//! codecs are interchangeable.

use std::fmt;

use crate::error::TransportError;
use crate::message::Message;
use crate::value::{vocab_decode, vocab_encode, Value, VOCAB_FALSE, VOCAB_TRUE};

/// Render a message as one line of text, without the line terminator.
pub fn format_message(msg: &Message) -> String {
    let mut parts = Vec::with_capacity(msg.items.len());
    for v in &msg.items {
        parts.push(format_nested(v));
    }
    parts.join(" ")
}

/// Render a value the way it appears inside a message line.
fn format_nested(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Int8(x) => x.to_string(),
        Value::Int16(x) => x.to_string(),
        Value::Int32(x) => x.to_string(),
        Value::Int64(x) => x.to_string(),
        // {:?} keeps a decimal point or exponent, so floats reread as floats
        Value::Float32(x) => format!("{:?}", x),
        Value::Float64(x) => format!("{:?}", x),
        Value::Vocab(x) => format!("[{}]", vocab_decode(*x)),
        Value::String(s) => quote_string(s),
        Value::Blob(b) => {
            let parts: Vec<String> = b.iter().map(|x| x.to_string()).collect();
            format!("{{{}}}", parts.join(" "))
        }
        Value::List(m) => format!("({})", format_message(m)),
        Value::Dict(pairs) => {
            let parts: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("({} {})", format_nested(k), format_nested(v)))
                .collect();
            format!("({})", parts.join(" "))
        }
    }
}

/// Quote and escape a string unless it reads back unchanged as a bareword.
fn quote_string(s: &str) -> String {
    let mut need = s.is_empty();
    for (i, c) in s.chars().enumerate() {
        let ok = c.is_ascii_alphabetic()
            || c == '_'
            || (i > 0 && (c.is_ascii_digit() || c == '.' || c == '-'));
        if !ok {
            need = true;
            break;
        }
    }
    // barewords the reader claims for itself
    if s == "true" || s == "false" {
        need = true;
    }
    if !need {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// True once `text` holds a parseable whole message: every quote and
/// bracket closed, and no continuation backslash dangling at the end.
pub fn is_complete(text: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut escape = false;
    for b in text.bytes() {
        if in_quote {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_quote = false;
            }
        } else {
            match b {
                b'"' => in_quote = true,
                b'(' | b'{' | b'[' => depth += 1,
                b')' | b'}' | b']' => depth -= 1,
                _ => {}
            }
        }
    }
    if in_quote || depth > 0 {
        return false;
    }
    !text.trim_end_matches(['\r', '\n']).ends_with('\\')
}

/// Parse one message from its text form.
pub fn parse_message(text: &str) -> Result<Message, TransportError> {
    let mut cur = Cursor {
        bytes: text.as_bytes(),
        pos: 0,
    };
    let items = cur.read_items(false)?;
    Ok(Message { items })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => self.pos += 1,
                // a backslash swallows the line break after it
                Some(b'\\') => {
                    let mut j = self.pos + 1;
                    if self.bytes.get(j) == Some(&b'\r') {
                        j += 1;
                    }
                    match self.bytes.get(j) {
                        Some(&b'\n') => self.pos = j + 1,
                        None => self.pos = j,
                        _ => return,
                    }
                }
                _ => return,
            }
        }
    }

    /// Values until end of input, or until ')' when inside a list.
    fn read_items(&mut self, nested: bool) -> Result<Vec<Value>, TransportError> {
        let mut items = Vec::new();
        loop {
            self.skip_space();
            match self.peek() {
                None => {
                    if nested {
                        return Err(TransportError::Encoding(
                            "unterminated list in text message".to_string(),
                        ));
                    }
                    return Ok(items);
                }
                Some(b')') => {
                    if nested {
                        self.pos += 1;
                        return Ok(items);
                    }
                    return Err(TransportError::Encoding(
                        "unbalanced ')' in text message".to_string(),
                    ));
                }
                Some(_) => items.push(self.read_value()?),
            }
        }
    }

    fn read_value(&mut self) -> Result<Value, TransportError> {
        match self.peek() {
            Some(b'"') => self.read_quoted(),
            Some(b'[') => self.read_vocab(),
            Some(b'{') => self.read_blob(),
            Some(b'(') => {
                self.pos += 1;
                let items = self.read_items(true)?;
                Ok(Value::List(Message { items }))
            }
            _ => Ok(self.read_bareword()),
        }
    }

    fn read_quoted(&mut self) -> Result<Value, TransportError> {
        self.pos += 1;
        let mut out = Vec::new();
        let mut escape = false;
        loop {
            let b = match self.peek() {
                Some(b) => b,
                None => {
                    return Err(TransportError::Encoding(
                        "unterminated quoted string".to_string(),
                    ))
                }
            };
            self.pos += 1;
            if escape {
                out.push(match b {
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b'0' => 0,
                    b => b,
                });
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                break;
            } else {
                out.push(b);
            }
        }
        let s = String::from_utf8(out)
            .map_err(|_| TransportError::Encoding("string is not valid UTF-8".to_string()))?;
        Ok(Value::String(s))
    }

    fn read_vocab(&mut self) -> Result<Value, TransportError> {
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b']' {
                let word = &self.bytes[start..self.pos];
                self.pos += 1;
                let word = String::from_utf8_lossy(word);
                let code = match word.as_ref() {
                    "true" => VOCAB_TRUE,
                    "false" => VOCAB_FALSE,
                    w => vocab_encode(w),
                };
                return Ok(match code {
                    VOCAB_FALSE => Value::Bool(false),
                    VOCAB_TRUE => Value::Bool(true),
                    code => Value::Vocab(code),
                });
            }
            self.pos += 1;
        }
        Err(TransportError::Encoding(
            "unterminated vocab bracket".to_string(),
        ))
    }

    fn read_blob(&mut self) -> Result<Value, TransportError> {
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'}' {
                let body = String::from_utf8_lossy(&self.bytes[start..self.pos]);
                self.pos += 1;
                let mut bytes = Vec::new();
                for word in body.split_ascii_whitespace() {
                    let x: i64 = word.parse().map_err(|_| {
                        TransportError::Encoding(format!("bad byte '{}' in blob", word))
                    })?;
                    bytes.push(x as u8);
                }
                return Ok(Value::Blob(bytes));
            }
            self.pos += 1;
        }
        Err(TransportError::Encoding(
            "unterminated blob brace".to_string(),
        ))
    }

    fn read_bareword(&mut self) -> Value {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'"' | b'\\' => break,
                _ => self.pos += 1,
            }
        }
        // a backslash that opened no continuation stands as its own word,
        // keeping the cursor moving
        if self.pos == start {
            self.pos += 1;
        }
        let word = String::from_utf8_lossy(&self.bytes[start..self.pos]);
        classify_bareword(&word)
    }
}

/// Decide what kind of value an unquoted word is. Only words that start
/// like a number are tried as numbers; unparseable ones fall back to
/// strings rather than failing the whole message.
fn classify_bareword(word: &str) -> Value {
    if word == "true" {
        return Value::Bool(true);
    }
    if word == "false" {
        return Value::Bool(false);
    }
    let first = word.as_bytes()[0];
    if first.is_ascii_digit() || first == b'-' || first == b'+' || first == b'.' {
        if !word.contains(&['.', 'e', 'E'][..]) {
            if let Ok(x) = word.parse::<i64>() {
                if x >= i32::MIN as i64 && x <= i32::MAX as i64 {
                    return Value::Int32(x as i32);
                }
                return Value::Int64(x);
            }
        }
        if let Ok(x) = word.parse::<f64>() {
            return Value::Float64(x);
        }
    }
    Value::String(word.to_string())
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_message(self))
    }
}

impl fmt::Display for Value {
    /// Standalone form: the content itself, without message-level quoting
    /// or vocab brackets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Vocab(x) => f.write_str(&vocab_decode(*x)),
            Value::Blob(b) => {
                let parts: Vec<String> = b.iter().map(|x| x.to_string()).collect();
                f.write_str(&parts.join(" "))
            }
            Value::List(m) => f.write_str(&format_message(m)),
            Value::Dict(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("({} {})", format_nested(k), format_nested(v)))
                    .collect();
                f.write_str(&parts.join(" "))
            }
            v => f.write_str(&format_nested(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reread(msg: &Message) -> Message {
        parse_message(&format_message(msg)).unwrap()
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut msg = Message::new();
        msg.add_string("hello");
        msg.add_i32(-4);
        msg.add_f64(3.5);
        msg.add_bool(true);
        msg.add_vocab(vocab_encode("stop"));
        assert_eq!(format_message(&msg), "hello -4 3.5 true [stop]");
        assert_eq!(reread(&msg), msg);
    }

    #[test]
    fn test_quoting() {
        let mut msg = Message::new();
        msg.add_string("hi there");
        msg.add_string("true");
        msg.add_string("");
        msg.add_string("5pm");
        assert_eq!(format_message(&msg), "\"hi there\" \"true\" \"\" \"5pm\"");
        assert_eq!(reread(&msg), msg);
    }

    #[test]
    fn test_escapes_round_trip() {
        let mut msg = Message::new();
        msg.add_string("a\"b\\c\nd\re\0f");
        assert_eq!(reread(&msg), msg);
    }

    #[test]
    fn test_nested_lists_and_blob() {
        let mut msg = Message::new();
        let inner = msg.add_list();
        inner.add_i32(1);
        let deeper = inner.add_list();
        deeper.add_string("x y");
        msg.add_blob(&[0, 7, 255]);
        assert_eq!(format_message(&msg), "(1 (\"x y\")) {0 7 255}");
        assert_eq!(reread(&msg), msg);
    }

    #[test]
    fn test_integer_width_collapses() {
        let mut msg = Message::new();
        msg.add_i8(5);
        msg.add_i64(6);
        msg.add_i64(5_000_000_000);
        msg.add_f32(2.5);
        let back = reread(&msg);
        assert_eq!(*back.get(0), Value::Int32(5));
        assert_eq!(*back.get(1), Value::Int32(6));
        assert_eq!(*back.get(2), Value::Int64(5_000_000_000));
        assert_eq!(*back.get(3), Value::Float64(2.5));
    }

    #[test]
    fn test_whole_floats_stay_floats() {
        let mut msg = Message::new();
        msg.add_f64(5.0);
        assert_eq!(format_message(&msg), "5.0");
        assert_eq!(*reread(&msg).get(0), Value::Float64(5.0));
    }

    #[test]
    fn test_dict_rereads_as_pair_list() {
        let mut msg = Message::new();
        msg.add(Value::Dict(vec![(
            Value::String("speed".to_string()),
            Value::Float64(0.25),
        )]));
        assert_eq!(format_message(&msg), "((speed 0.25))");
        let back = reread(&msg);
        let outer = back.get(0).as_list().unwrap();
        let pair = outer.get(0).as_list().unwrap();
        assert_eq!(pair.get(0).as_str(), "speed");
        assert_eq!(pair.get(1).as_f64(), 0.25);
    }

    #[test]
    fn test_completeness() {
        assert!(is_complete("(1 2)"));
        assert!(!is_complete("(1 2"));
        assert!(!is_complete("\"ab"));
        assert!(!is_complete("a \\"));
        assert!(!is_complete("a \\\r\n"));
        assert!(is_complete("\"a(b\""));
        // over-closed input is complete so the parser can reject it
        assert!(is_complete("())"));
        assert!(parse_message("())").is_err());
    }

    #[test]
    fn test_line_continuation() {
        let msg = parse_message("1 2 \\\n3").unwrap();
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.get(2).as_i32(), 3);
    }

    #[test]
    fn test_stray_backslash_is_a_word() {
        let msg = parse_message("a \\x").unwrap();
        assert_eq!(msg.len(), 3);
        assert_eq!(*msg.get(1), Value::String("\\".to_string()));
        assert_eq!(*msg.get(2), Value::String("x".to_string()));
    }

    #[test]
    fn test_unquoted_words_are_strings() {
        let msg = parse_message("go inf 1.2.3").unwrap();
        assert_eq!(*msg.get(0), Value::String("go".to_string()));
        // letters first means string, never a float
        assert_eq!(*msg.get(1), Value::String("inf".to_string()));
        assert_eq!(*msg.get(2), Value::String("1.2.3".to_string()));
    }

    #[test]
    fn test_display_is_plain() {
        assert_eq!(Value::String("a b".to_string()).to_string(), "a b");
        assert_eq!(Value::Vocab(vocab_encode("go")).to_string(), "go");
        assert_eq!(Value::Int32(7).to_string(), "7");
    }
}
