use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use coap_lite::Packet;
use rand::Rng;

use crate::transport::{PacketSender, TransportError};

pub type MessageId = u16;

/// Outbound path for unsolicited messages.  Responses reuse the request's message ID, but
/// notifications need fresh ones, so they are stamped here before being handed to the
/// transport.
pub struct Notifier<Endpoint> {
    sender: Arc<dyn PacketSender<Endpoint>>,
    next_message_id: AtomicU16,
}

impl<Endpoint> Notifier<Endpoint> {
    pub fn new(sender: Arc<dyn PacketSender<Endpoint>>) -> Self {
        Self::with_initial_message_id(sender, rand::thread_rng().gen())
    }

    pub fn with_initial_message_id(
        sender: Arc<dyn PacketSender<Endpoint>>,
        message_id: MessageId,
    ) -> Self {
        Self {
            sender,
            next_message_id: AtomicU16::new(message_id),
        }
    }

    pub fn sender(&self) -> &Arc<dyn PacketSender<Endpoint>> {
        &self.sender
    }

    /// Send a response to a request; the packet is passed through untouched.
    pub fn reply(&self, peer: &Endpoint, packet: Packet) -> Result<(), TransportError> {
        self.sender.send(peer, packet)
    }

    pub fn send_notification(
        &self,
        peer: &Endpoint,
        mut packet: Packet,
    ) -> Result<(), TransportError> {
        packet.header.message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.sender.send(peer, packet)
    }
}
