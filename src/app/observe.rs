use coap_lite::{CoapOption, Packet};

use crate::app::coap_utils::decode_uint;

/// Interpretation of a request's Observe option (RFC 7641 §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveCommand {
    /// Observe value 0, normally sent as an empty option.
    Start,
    /// Observe value 1.
    Stop,
    /// Any other value; not a subscribe/unsubscribe request.
    Other(u32),
}

impl ObserveCommand {
    /// `None` if the packet carries no Observe option at all.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        let raw = packet.get_option(CoapOption::Observe)?.front()?;
        let command = match decode_uint(raw) {
            Some(0) => Self::Start,
            Some(1) => Self::Stop,
            Some(value) => Self::Other(value),
            None => Self::Other(u32::MAX),
        };
        Some(command)
    }
}
