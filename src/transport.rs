use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use coap_lite::error::MessageError;
use coap_lite::Packet;
use futures::{Sink, Stream};
use tokio::sync::mpsc::UnboundedSender;

/// Generalization of the underlying CoAP transport.  The endpoint only needs a stream of parsed
/// inbound packets and a sink for outbound ones; UDP is provided by [`crate::udp::UdpTransport`].
#[async_trait]
pub trait Transport {
    type Endpoint: Debug + Send + Clone;

    /// Begin accepting data from this transport.  Packets that arrive before the server starts
    /// serving are buffered by the binding.
    async fn bind(self) -> Result<BoxedFramedBinding<Self::Endpoint>, TransportError>;
}

pub type BoxedFramedBinding<Endpoint> = Pin<Box<dyn FramedBinding<Endpoint>>>;

/// A bound socket exposed as both a stream of inbound packets and a sink for outbound ones.
pub trait FramedBinding<Endpoint>:
    Send
    + Stream<Item = Result<FramedItem<Endpoint>, FramedReadError<Endpoint>>>
    + Sink<FramedItem<Endpoint>, Error = FramedWriteError>
{
}

/// Parsed CoAP packet paired with the remote peer it came from (or is going to).
pub type FramedItem<Endpoint> = (Packet, Endpoint);

/// Error when receiving from a remote peer.  The peer is absent when the failure is not tied to
/// any one of them (for example the bound socket itself failed), which the server treats as fatal.
pub type FramedReadError<Endpoint> = (TransportError, Option<Endpoint>);

pub type FramedWriteError = TransportError;

/// The outbound `send(address, packet)` primitive used for both responses and notifications.
///
/// Implementations must never block the caller: the dispatcher and the observation scheduler
/// both call this while holding a resource's lock.
pub trait PacketSender<Endpoint>: Send + Sync {
    fn send(&self, peer: &Endpoint, packet: Packet) -> Result<(), TransportError>;
}

/// [`PacketSender`] that relays packets to the server loop, which owns the actual binding.
pub struct ChannelSender<Endpoint> {
    relay_tx: UnboundedSender<FramedItem<Endpoint>>,
}

impl<Endpoint> ChannelSender<Endpoint> {
    pub fn new(relay_tx: UnboundedSender<FramedItem<Endpoint>>) -> Self {
        Self { relay_tx }
    }
}

impl<Endpoint: Clone + Send + Sync> PacketSender<Endpoint> for ChannelSender<Endpoint> {
    fn send(&self, peer: &Endpoint, packet: Packet) -> Result<(), TransportError> {
        self.relay_tx
            .send((packet, peer.clone()))
            .map_err(|_| TransportError::RelayClosed)
    }
}

/// Transport-level failures.  Most of these are non-fatal and only affect a single exchange.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet was malformed: {0:?}")]
    MalformedPacket(MessageError),

    #[error("outbound relay is closed")]
    RelayClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<MessageError> for TransportError {
    fn from(x: MessageError) -> Self {
        Self::MalformedPacket(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_sender_relays_to_peer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = ChannelSender::new(tx);

        let mut packet = Packet::new();
        packet.payload = b"hi".to_vec();
        sender.send(&7u32, packet).unwrap();

        let (relayed, peer) = rx.try_recv().unwrap();
        assert_eq!(peer, 7);
        assert_eq!(relayed.payload, b"hi");
    }

    #[test]
    fn test_channel_sender_reports_closed_relay() {
        let (tx, rx) = mpsc::unbounded_channel::<FramedItem<u32>>();
        drop(rx);
        let sender = ChannelSender::new(tx);

        let result = sender.send(&1, Packet::new());
        assert!(matches!(result, Err(TransportError::RelayClosed)));
    }
}
