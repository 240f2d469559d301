//! Carrier contract: per-protocol strategy behind a uniform handshake.

use crate::error::TransportError;
use crate::message::Message;
use crate::protocol::{self, ConnectionState};

/// One transport flavor. The default method bodies implement the plain
/// persistent stream protocol; a concrete carrier overrides only the
/// phases where its wire format differs, so the phase ladder stays
/// uniform across all of them.
///
/// Instances are connection-local: the registry keeps prototypes and
/// hands out `fresh()` copies, never the prototype itself.
pub trait Carrier: Send {
    fn name(&self) -> &str;

    /// The 8 bytes opening every connection of this carrier.
    fn header(&self) -> [u8; 8];

    /// Whether `header` identifies this carrier. Exact match for fixed
    /// headers; prefix or pattern match where the tail carries flags.
    fn check_header(&self, header: &[u8; 8]) -> bool;

    /// Absorb variant flags the peer encoded in its header.
    fn set_parameters(&mut self, _header: &[u8; 8]) {}

    /// A fresh connection-local instance of this carrier.
    fn fresh(&self) -> Box<dyn Carrier>;

    // Capabilities.

    fn is_connectionless(&self) -> bool {
        false
    }

    /// Payloads travel as text rather than binary.
    fn is_text_mode(&self) -> bool {
        false
    }

    /// Whether the carrier can mark a payload as administrative.
    fn can_escape(&self) -> bool {
        false
    }

    /// Whether the peer can answer on the same link.
    fn supports_reply(&self) -> bool {
        true
    }

    /// Push-style: the sender drives traffic. Pull-style carriers answer
    /// requests instead.
    fn is_push(&self) -> bool {
        true
    }

    /// Whether the link survives across messages. Non-persistent carriers
    /// re-handshake for every logical exchange.
    fn is_persistent(&self) -> bool {
        true
    }

    /// Whether every payload is chased by an acknowledgement word.
    fn requires_ack(&self) -> bool {
        true
    }

    // Sender-side handshake phases.

    fn send_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let header = self.header();
        state.stream()?.write_all(&header)?;
        protocol::write_sender_specifier(state)
    }

    fn expect_reply_to_header(&mut self, _state: &mut ConnectionState) -> Result<(), TransportError> {
        Ok(())
    }

    // Receiver-side handshake phases. Header verification itself happens
    // in `Connection::accept` before these run.

    fn expect_sender_specifier(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let name = protocol::read_sender_specifier(state)?;
        state.route.from = name;
        Ok(())
    }

    fn expect_extra_header(&mut self, _state: &mut ConnectionState) -> Result<(), TransportError> {
        Ok(())
    }

    fn respond_to_header(&mut self, _state: &mut ConnectionState) -> Result<(), TransportError> {
        Ok(())
    }

    // Established traffic.

    /// Emit one message: the index announcing it, then the payload in
    /// this carrier's representation.
    fn write(&mut self, state: &mut ConnectionState, msg: &Message) -> Result<(), TransportError> {
        let mut payload = Vec::new();
        msg.write_to(&mut payload, self.is_text_mode())?;
        protocol::write_index(state, payload.len())?;
        state.stream()?.write_all(&payload)?;
        Ok(())
    }

    fn expect_index(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        protocol::read_index(state)
    }

    fn send_ack(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        if self.requires_ack() {
            protocol::write_ack(state)?;
        }
        Ok(())
    }

    fn expect_ack(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        if self.requires_ack() {
            protocol::read_ack(state)?;
        }
        Ok(())
    }
}

/// The set of carriers a port will entertain, in recognition order.
///
/// Built once at startup and threaded by reference into every port; no
/// process-wide mutable state.
pub struct CarrierRegistry {
    carriers: Vec<Box<dyn Carrier>>,
}

impl CarrierRegistry {
    pub fn new() -> Self {
        CarrierRegistry {
            carriers: Vec::new(),
        }
    }

    pub fn register(&mut self, carrier: Box<dyn Carrier>) {
        self.carriers.push(carrier);
    }

    /// Fresh instance of the named carrier, if registered.
    pub fn get(&self, name: &str) -> Option<Box<dyn Carrier>> {
        self.carriers
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.fresh())
    }

    /// Fresh instance of the first carrier claiming these header bytes.
    pub fn recognize(&self, header: &[u8; 8]) -> Option<Box<dyn Carrier>> {
        self.carriers
            .iter()
            .find(|c| c.check_header(header))
            .map(|c| c.fresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCarrier {
        name: &'static str,
        header: [u8; 8],
    }

    impl Carrier for FixedCarrier {
        fn name(&self) -> &str {
            self.name
        }

        fn header(&self) -> [u8; 8] {
            self.header
        }

        fn check_header(&self, header: &[u8; 8]) -> bool {
            header == &self.header
        }

        fn fresh(&self) -> Box<dyn Carrier> {
            Box::new(FixedCarrier {
                name: self.name,
                header: self.header,
            })
        }
    }

    fn registry() -> CarrierRegistry {
        let mut reg = CarrierRegistry::new();
        reg.register(Box::new(FixedCarrier {
            name: "alpha",
            header: *b"ALPHA\0\0\0",
        }));
        reg.register(Box::new(FixedCarrier {
            name: "beta",
            header: *b"BETA\0\0\0\0",
        }));
        reg
    }

    #[test]
    fn test_recognize_dispatches_on_header() {
        let reg = registry();
        assert_eq!(reg.recognize(b"ALPHA\0\0\0").unwrap().name(), "alpha");
        assert_eq!(reg.recognize(b"BETA\0\0\0\0").unwrap().name(), "beta");
        assert!(reg.recognize(b"GAMMA\0\0\0").is_none());
    }

    #[test]
    fn test_get_by_name() {
        let reg = registry();
        assert_eq!(reg.get("beta").unwrap().name(), "beta");
        assert!(reg.get("delta").is_none());
    }
}
