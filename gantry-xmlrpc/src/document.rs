//! HTTP-framed XML-RPC documents.
//!
//! Covers exactly the subset the carrier speaks: methodCall and
//! methodResponse with i4/int/i8/boolean/double/string/base64/array/
//! struct values and the five named entities. Framing is by
//! Content-Length when the peer supplies one, by closing-tag scan when
//! it does not. `try_parse` reports whether a buffer holds a complete
//! document yet, which is what lets the carrier's read loop wait for
//! more bytes instead of guessing.

use gantry_protocol::TransportError;

use crate::value::RpcValue;

/// One parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Request {
        method: String,
        params: Vec<RpcValue>,
    },
    /// A response carries at most one value; a fault's value surfaces
    /// the same way.
    Response { value: Option<RpcValue> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseStatus {
    /// More bytes are needed before a document can be cut.
    Incomplete,
    /// A document was cut from the front of the buffer; bytes past
    /// `consumed` belong to the next one.
    Complete { doc: Document, consumed: usize },
}

// --- generation ---

pub fn generate_request(method: &str, params: &RpcValue) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?>\r\n<methodCall><methodName>");
    body.push_str(&xml_escape(method));
    body.push_str("</methodName>\r\n<params>");
    // an array of params spreads into one <param> each; any other
    // value is the call's single parameter
    match params {
        RpcValue::Array(items) => {
            for item in items {
                body.push_str("<param>");
                write_value(item, &mut body);
                body.push_str("</param>");
            }
        }
        single => {
            body.push_str("<param>");
            write_value(single, &mut body);
            body.push_str("</param>");
        }
    }
    body.push_str("</params></methodCall>\r\n");
    body
}

pub fn generate_response(value: Option<&RpcValue>) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?>\r\n<methodResponse>");
    if let Some(v) = value {
        body.push_str("<params><param>");
        write_value(v, &mut body);
        body.push_str("</param></params>");
    }
    body.push_str("</methodResponse>\r\n");
    body
}

pub fn http_request(body: &str, host: &str) -> String {
    format!(
        "POST /RPC2 HTTP/1.1\r\nUser-Agent: gantry-xmlrpc\r\nHost: {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
        host,
        body.len(),
        body
    )
}

pub fn http_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nServer: gantry-xmlrpc\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn write_value(v: &RpcValue, out: &mut String) {
    out.push_str("<value>");
    match v {
        RpcValue::Int(x) => out.push_str(&format!("<i4>{}</i4>", x)),
        RpcValue::Long(x) => out.push_str(&format!("<i8>{}</i8>", x)),
        RpcValue::Bool(b) => out.push_str(if *b {
            "<boolean>1</boolean>"
        } else {
            "<boolean>0</boolean>"
        }),
        RpcValue::Double(x) => out.push_str(&format!("<double>{}</double>", x)),
        RpcValue::Str(s) => out.push_str(&format!("<string>{}</string>", xml_escape(s))),
        RpcValue::Base64(bytes) => {
            out.push_str(&format!("<base64>{}</base64>", base64_encode(bytes)))
        }
        RpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(item, out);
            }
            out.push_str("</data></array>");
        }
        RpcValue::Struct(pairs) => {
            out.push_str("<struct>");
            for (k, v) in pairs {
                out.push_str(&format!("<member><name>{}</name>", xml_escape(k)));
                write_value(v, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

// --- framing ---

/// Cut one document off the front of `buf`, if a whole one has arrived.
/// Transport header lines are consumed with the document so a
/// multi-call session never re-reads them as payload.
pub fn try_parse(buf: &[u8]) -> Result<ParseStatus, TransportError> {
    let start = match buf.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(i) => i,
        None => return Ok(ParseStatus::Incomplete),
    };
    let rest = &buf[start..];

    let (body_start, body_end) = if starts_like(rest, b"POST ") || starts_like(rest, b"HTTP/") {
        let (blank, sep_len) = match find(rest, b"\r\n\r\n") {
            Some(i) => (i, 4),
            None => match find(rest, b"\n\n") {
                Some(i) => (i, 2),
                None => return Ok(ParseStatus::Incomplete),
            },
        };
        let header = String::from_utf8_lossy(&rest[..blank]);
        let body_start = blank + sep_len;
        match content_length(&header) {
            Some(len) => {
                if rest.len() < body_start + len {
                    return Ok(ParseStatus::Incomplete);
                }
                (body_start, body_start + len)
            }
            None => match document_end(&rest[body_start..]) {
                Some(end) => (body_start, body_start + end),
                None => return Ok(ParseStatus::Incomplete),
            },
        }
    } else if rest[0] == b'<' {
        match document_end(rest) {
            Some(end) => (0, end),
            None => return Ok(ParseStatus::Incomplete),
        }
    } else {
        return Err(TransportError::Encoding(
            "stream does not hold an XML-RPC document".to_string(),
        ));
    };

    let body = std::str::from_utf8(&rest[body_start..body_end])
        .map_err(|_| TransportError::Encoding("document is not valid UTF-8".to_string()))?;
    let doc = parse_document(body)?;
    Ok(ParseStatus::Complete {
        doc,
        consumed: start + body_end,
    })
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

fn starts_like(rest: &[u8], pat: &[u8]) -> bool {
    let n = rest.len().min(pat.len());
    rest[..n] == pat[..n]
}

fn content_length(header: &str) -> Option<usize> {
    for line in header.lines() {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

fn document_end(body: &[u8]) -> Option<usize> {
    let call = find(body, b"</methodCall>").map(|i| i + "</methodCall>".len());
    let resp = find(body, b"</methodResponse>").map(|i| i + "</methodResponse>".len());
    match (call, resp) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

// --- parsing ---

fn parse_document(body: &str) -> Result<Document, TransportError> {
    let mut scan = Scan::new(body);
    scan.skip_ws();
    if scan.eat("<?xml") {
        scan.until("?>")?;
        scan.skip_ws();
    }
    if scan.eat("<methodCall>") {
        scan.skip_ws();
        scan.expect("<methodName>")?;
        let method = xml_unescape(scan.until("</methodName>")?);
        scan.skip_ws();
        let mut params = Vec::new();
        if scan.eat("<params>") {
            loop {
                scan.skip_ws();
                if !scan.eat("<param>") {
                    break;
                }
                scan.skip_ws();
                params.push(parse_value(&mut scan)?);
                scan.skip_ws();
                scan.expect("</param>")?;
            }
            scan.expect("</params>")?;
            scan.skip_ws();
        }
        scan.expect("</methodCall>")?;
        Ok(Document::Request { method, params })
    } else if scan.eat("<methodResponse>") {
        scan.skip_ws();
        let value = if scan.eat("<params>") {
            scan.skip_ws();
            scan.expect("<param>")?;
            scan.skip_ws();
            let v = parse_value(&mut scan)?;
            scan.skip_ws();
            scan.expect("</param>")?;
            scan.skip_ws();
            scan.expect("</params>")?;
            scan.skip_ws();
            Some(v)
        } else if scan.eat("<fault>") {
            scan.skip_ws();
            let v = parse_value(&mut scan)?;
            scan.skip_ws();
            scan.expect("</fault>")?;
            scan.skip_ws();
            Some(v)
        } else {
            None
        };
        scan.expect("</methodResponse>")?;
        Ok(Document::Response { value })
    } else {
        Err(scan.fail("expected methodCall or methodResponse"))
    }
}

fn parse_value(scan: &mut Scan) -> Result<RpcValue, TransportError> {
    scan.expect("<value>")?;
    let text = scan.take_until_tag()?;
    if scan.eat("</value>") {
        // no type tag: the raw content is a string
        return Ok(RpcValue::Str(xml_unescape(text)));
    }
    let v = if scan.eat("<i4>") {
        RpcValue::Int(parse_num(scan.until("</i4>")?, "i4")?)
    } else if scan.eat("<int>") {
        RpcValue::Int(parse_num(scan.until("</int>")?, "int")?)
    } else if scan.eat("<i8>") {
        RpcValue::Long(parse_num(scan.until("</i8>")?, "i8")?)
    } else if scan.eat("<boolean>") {
        match scan.until("</boolean>")?.trim() {
            "1" | "true" => RpcValue::Bool(true),
            "0" | "false" => RpcValue::Bool(false),
            other => {
                return Err(TransportError::Encoding(format!(
                    "bad boolean '{}'",
                    other
                )))
            }
        }
    } else if scan.eat("<double>") {
        RpcValue::Double(parse_num(scan.until("</double>")?, "double")?)
    } else if scan.eat("<string>") {
        RpcValue::Str(xml_unescape(scan.until("</string>")?))
    } else if scan.eat("<base64>") {
        RpcValue::Base64(base64_decode(scan.until("</base64>")?)?)
    } else if scan.eat("<array>") {
        scan.skip_ws();
        scan.expect("<data>")?;
        let mut items = Vec::new();
        loop {
            scan.skip_ws();
            if scan.eat("</data>") {
                break;
            }
            items.push(parse_value(scan)?);
        }
        scan.skip_ws();
        scan.expect("</array>")?;
        RpcValue::Array(items)
    } else if scan.eat("<struct>") {
        let mut pairs = Vec::new();
        loop {
            scan.skip_ws();
            if scan.eat("</struct>") {
                break;
            }
            scan.expect("<member>")?;
            scan.skip_ws();
            scan.expect("<name>")?;
            let name = xml_unescape(scan.until("</name>")?);
            scan.skip_ws();
            let v = parse_value(scan)?;
            scan.skip_ws();
            scan.expect("</member>")?;
            pairs.push((name, v));
        }
        RpcValue::Struct(pairs)
    } else {
        return Err(scan.fail("unknown value tag"));
    };
    scan.skip_ws();
    scan.expect("</value>")?;
    Ok(v)
}

fn parse_num<T: std::str::FromStr>(text: &str, what: &str) -> Result<T, TransportError> {
    text.trim()
        .parse()
        .map_err(|_| TransportError::Encoding(format!("bad {} '{}'", what, text.trim())))
}

struct Scan<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Scan<'a> {
    fn new(s: &'a str) -> Self {
        Scan { s, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, pat: &str) -> bool {
        if self.rest().starts_with(pat) {
            self.pos += pat.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, pat: &str) -> Result<(), TransportError> {
        if self.eat(pat) {
            Ok(())
        } else {
            Err(self.fail(&format!("expected {}", pat)))
        }
    }

    /// Content up to `pat`, consuming both.
    fn until(&mut self, pat: &str) -> Result<&'a str, TransportError> {
        match self.rest().find(pat) {
            Some(idx) => {
                let text = &self.rest()[..idx];
                self.pos += idx + pat.len();
                Ok(text)
            }
            None => Err(self.fail(&format!("missing {}", pat))),
        }
    }

    /// Content up to the next tag, which stays unconsumed.
    fn take_until_tag(&mut self) -> Result<&'a str, TransportError> {
        match self.rest().find('<') {
            Some(idx) => {
                let text = &self.rest()[..idx];
                self.pos += idx;
                Ok(text)
            }
            None => Err(self.fail("unterminated value")),
        }
    }

    fn fail(&self, what: &str) -> TransportError {
        let at: String = self.rest().chars().take(24).collect();
        TransportError::Encoding(format!("{} at '{}'", what, at))
    }
}

// --- text helpers ---

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn xml_unescape(s: &str) -> String {
    const NAMED: [(&str, char); 5] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
    ];
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        match NAMED.iter().find(|(pat, _)| rest.starts_with(pat)) {
            Some((pat, c)) => {
                out.push(*c);
                rest = &rest[pat.len()..];
            }
            None => {
                // unknown entity, keep it verbatim
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

const B64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let n = u32::from(chunk[0]) << 16
            | u32::from(*chunk.get(1).unwrap_or(&0)) << 8
            | u32::from(*chunk.get(2).unwrap_or(&0));
        out.push(B64[(n >> 18 & 63) as usize] as char);
        out.push(B64[(n >> 12 & 63) as usize] as char);
        out.push(if chunk.len() > 1 {
            B64[(n >> 6 & 63) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            B64[(n & 63) as usize] as char
        } else {
            '='
        });
    }
    out
}

/// Tolerates the line breaks peers fold into long base64 runs.
fn base64_decode(text: &str) -> Result<Vec<u8>, TransportError> {
    let mut out = Vec::new();
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for c in text.chars() {
        if c.is_ascii_whitespace() || c == '=' {
            continue;
        }
        let v = match c {
            'A'..='Z' => c as u32 - 'A' as u32,
            'a'..='z' => c as u32 - 'a' as u32 + 26,
            '0'..='9' => c as u32 - '0' as u32 + 52,
            '+' => 62,
            '/' => 63,
            _ => {
                return Err(TransportError::Encoding(format!(
                    "stray '{}' in base64 data",
                    c
                )))
            }
        };
        acc = acc << 6 | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    Ok(out)
}
