use std::collections::HashMap;

use coap_lite::{CoapOption, MessageClass, MessageType, Packet};

/// Minimal big-endian encoding of a CoAP `uint` option value (RFC 7252 §3.2); zero is empty.
pub fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

pub fn decode_uint(bytes: &[u8]) -> Option<u32> {
    if bytes.len() > 4 {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

/// Replace any existing values of `option` with the single `uint` value given.
pub fn set_uint_option(packet: &mut Packet, option: CoapOption, value: u32) {
    packet.clear_option(option);
    packet.add_option(option, encode_uint(value));
}

pub fn get_uint_option(packet: &Packet, option: CoapOption) -> Option<u32> {
    packet
        .get_option(option)
        .and_then(|values| values.front())
        .and_then(|raw| decode_uint(raw))
}

/// Reply to a Confirmable empty message ("CoAP ping") with a Reset carrying the same ID.
pub fn new_pong_message(ping: &Packet) -> Packet {
    let mut pong = Packet::new();
    pong.header.set_type(MessageType::Reset);
    pong.header.code = MessageClass::Empty;
    pong.header.message_id = ping.header.message_id;
    pong
}

/// Uri-Query options of the form `key=value`; anything else is skipped.
pub fn request_get_queries(packet: &Packet) -> HashMap<String, String> {
    packet
        .get_option(CoapOption::UriQuery)
        .map_or_else(HashMap::new, |options| {
            options
                .iter()
                .filter_map(|raw| {
                    let query = String::from_utf8_lossy(raw);
                    let (key, value) = query.split_once('=')?;
                    Some((key.to_string(), value.to_string()))
                })
                .collect()
        })
}
