//! Error type shared by every layer of the transport core.

/// Transport error kinds
#[derive(Debug)]
pub enum TransportError {
    /// I/O error during read/write
    Io(std::io::Error),
    /// First 8 bytes of a connection matched no registered carrier
    MalformedHeader([u8; 8]),
    /// A handshake phase ran out of order, or a reply was missing a required field
    ProtocolViolation(String),
    /// Text/binary decode failed mid-stream, or a foreign document never parsed
    Encoding(String),
    /// Peer closed before a phase or decode completed
    TransportClosed,
    /// Carrier was asked for a phase it cannot run and that has no defined no-op
    UnsupportedCapability(&'static str),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {}", e),
            TransportError::MalformedHeader(h) => {
                write!(f, "Malformed header:")?;
                for b in h {
                    write!(f, " {:02x}", b)?;
                }
                Ok(())
            }
            TransportError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
            TransportError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            TransportError::TransportClosed => write!(f, "Transport closed"),
            TransportError::UnsupportedCapability(what) => {
                write!(f, "Unsupported capability: {}", what)
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// `UnexpectedEof` becomes `TransportClosed`; `InvalidData` is how wrapped
/// streams (websocket frames, foreign-protocol translators) smuggle decode
/// failures through the `std::io` plumbing, so it becomes `Encoding`.
impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => TransportError::TransportClosed,
            std::io::ErrorKind::InvalidData => TransportError::Encoding(e.to_string()),
            _ => TransportError::Io(e),
        }
    }
}
