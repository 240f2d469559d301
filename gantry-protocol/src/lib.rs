//! # Gantry Protocol
//!
//! Transport core for gantry ports: a self-describing message format with
//! interchangeable binary and text encodings, and a carrier layer that
//! negotiates how those messages travel over a stream.
//!
//! ## Wire Format
//!
//! Every message is a list of tagged values. The binary form is
//! little-endian and length-prefixed:
//! ```text
//! [LIST|subcode:i32][count:i32][item...]
//! ```
//! where a non-zero subcode means every item shares that scalar tag and the
//! per-item tags are omitted. The text form is the same list written as a
//! space-separated line. A reader can take either: the first byte of a
//! binary message is always a list subcode, which no text message starts
//! with (an empty message is a bare LF, and the encoder keeps that byte
//! value out of its leading tag).
//!
//! ## Carriers
//!
//! A connection opens with an 8-byte header that selects the carrier:
//!
//! | Header | Carrier | Traffic |
//! |--------|---------|---------|
//! | `GA <7777+flags> TY` | flow / fastflow | binary, indexed, acked |
//! | `CONNECT ` | text | line-oriented, human-typeable |
//! | `GET /?ws` | ws | binary inside WebSocket frames |
//!
//! Unrecognized headers are refused with a one-line error so that a human
//! probing the port with a terminal sees what went wrong.

pub mod carrier;
pub mod carriers;
mod error;
mod message;
pub mod port;
pub mod protocol;
pub mod stream;
pub mod text;
pub mod value;
pub mod wire;

pub use carrier::{Carrier, CarrierRegistry};
pub use carriers::{default_registry, FlowCarrier, TextCarrier, WsCarrier};
pub use error::TransportError;
pub use message::Message;
pub use port::{InputPort, NameLookup, OutputPort, StaticNames};
pub use protocol::{Connection, ConnectionState, Phase, Route};
pub use stream::{
    RawStream, StreamAddr, StreamListener, StreamReader, TwoWayStream, DEFAULT_SOCKET_PATH,
};
pub use value::{vocab32, vocab_decode, vocab_encode, Value};
