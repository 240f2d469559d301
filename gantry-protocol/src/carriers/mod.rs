//! Bundled carriers: the plain stream protocol, its telnet-friendly text
//! twin, and websocket framing.

pub mod flow;
pub mod text_carrier;
pub mod ws;

pub use flow::FlowCarrier;
pub use text_carrier::TextCarrier;
pub use ws::WsCarrier;

use crate::carrier::CarrierRegistry;

/// Registry holding every carrier this crate ships.
pub fn default_registry() -> CarrierRegistry {
    let mut reg = CarrierRegistry::new();
    reg.register(Box::new(FlowCarrier::new()));
    reg.register(Box::new(FlowCarrier::without_ack()));
    reg.register(Box::new(TextCarrier::new()));
    reg.register(Box::new(WsCarrier::new()));
    reg
}
