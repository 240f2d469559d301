//! The default persistent stream carrier.
//!
//! Its header is a control word around `BASE + flags`, so the variant
//! flags ride inside the 8 magic bytes. The receiver echoes the agreed
//! header back, which lets the two sides settle the acknowledgement mode
//! before any payload moves.

use crate::carrier::Carrier;
use crate::error::TransportError;
use crate::protocol::{self, ConnectionState};
use crate::stream::read_full;

const FLOW_BASE: i32 = 7777;
const FLAG_SPACE: i32 = 16;
/// Set when payloads are not chased by acknowledgements.
const FLAG_NO_ACK: i32 = 8;

pub struct FlowCarrier {
    ack: bool,
}

impl FlowCarrier {
    pub fn new() -> Self {
        FlowCarrier { ack: true }
    }

    /// The fire-and-forget variant, named "fastflow".
    pub fn without_ack() -> Self {
        FlowCarrier { ack: false }
    }

    fn flags(&self) -> i32 {
        if self.ack {
            0
        } else {
            FLAG_NO_ACK
        }
    }
}

impl Default for FlowCarrier {
    fn default() -> Self {
        FlowCarrier::new()
    }
}

impl Carrier for FlowCarrier {
    fn name(&self) -> &str {
        if self.ack {
            "flow"
        } else {
            "fastflow"
        }
    }

    fn header(&self) -> [u8; 8] {
        protocol::control_word(FLOW_BASE + self.flags())
    }

    fn check_header(&self, header: &[u8; 8]) -> bool {
        match protocol::parse_control_word(header) {
            Ok(x) => (0..FLAG_SPACE).contains(&(x - FLOW_BASE)),
            Err(_) => false,
        }
    }

    fn set_parameters(&mut self, header: &[u8; 8]) {
        if let Ok(x) = protocol::parse_control_word(header) {
            self.ack = (x - FLOW_BASE) & FLAG_NO_ACK == 0;
        }
    }

    fn fresh(&self) -> Box<dyn Carrier> {
        Box::new(FlowCarrier { ack: self.ack })
    }

    fn requires_ack(&self) -> bool {
        self.ack
    }

    fn expect_reply_to_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let stream = state.stream()?;
        let mut echo = [0u8; 8];
        read_full(stream, &mut echo)?;
        let x = protocol::parse_control_word(&echo)?;
        let flags = x - FLOW_BASE;
        if !(0..FLAG_SPACE).contains(&flags) {
            return Err(TransportError::ProtocolViolation(format!(
                "header echo carried {}, outside the flow family",
                x
            )));
        }
        self.ack = flags & FLAG_NO_ACK == 0;
        Ok(())
    }

    fn respond_to_header(&mut self, state: &mut ConnectionState) -> Result<(), TransportError> {
        let header = self.header();
        state.stream()?.write_all(&header)?;
        Ok(())
    }
}
