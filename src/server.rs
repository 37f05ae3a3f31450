use std::fmt::Debug;
use std::sync::Arc;

use coap_lite::{CoapRequest, MessageClass, MessageType, Packet};
use futures::stream::Fuse;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::app::coap_utils::new_pong_message;
use crate::app::{Connector, Dispatched, Options, RegistrationState};
use crate::transport::{
    BoxedFramedBinding, ChannelSender, FramedItem, FramedReadError, PacketSender, Transport,
    TransportError,
};

/// Primary server API: bind a transport, assemble the connector, then pump packets "forever".
///
/// Inbound requests are dispatched one at a time on the serving task.  Outbound packets
/// (responses and notifications alike) are queued on a relay channel and written to the binding
/// by the same loop, so nothing that sends ever blocks on the socket.
pub struct ConnectorServer<Endpoint> {
    binding: Fuse<BoxedFramedBinding<Endpoint>>,
    packet_relay_rx: UnboundedReceiver<FramedItem<Endpoint>>,
    packet_relay_tx: UnboundedSender<FramedItem<Endpoint>>,
}

impl<Endpoint: Debug + Clone + Send + Sync + 'static> ConnectorServer<Endpoint> {
    /// Bind the server to a specific source of incoming packets in a transport-agnostic way.
    /// Most customers will wish to use [`crate::udp::UdpTransport`].
    pub async fn bind<T: Transport<Endpoint = Endpoint>>(
        transport: T,
    ) -> Result<Self, TransportError> {
        let binding = transport.bind().await?;
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        Ok(Self {
            binding: binding.fuse(),
            packet_relay_rx: packet_rx,
            packet_relay_tx: packet_tx,
        })
    }

    /// The `send(address, packet)` primitive backed by this server's relay.
    pub fn sender(&self) -> Arc<dyn PacketSender<Endpoint>> {
        Arc::new(ChannelSender::new(self.packet_relay_tx.clone()))
    }

    /// Assemble a [`Connector`] from `options` and serve it.
    pub async fn serve(
        self,
        options: Options,
        registration: Arc<dyn RegistrationState>,
    ) -> Result<(), FatalServerError> {
        let connector = Connector::assemble(options, self.sender(), registration);
        self.run(connector).await
    }

    /// Run an already assembled connector.  Use this instead of [`ConnectorServer::serve`] when
    /// application code needs to hold on to handlers (for example to call
    /// [`crate::app::DynamicHandler::notify`]); assemble it with [`ConnectorServer::sender`].
    ///
    /// Only returns on a fatal transport error.
    pub async fn run(mut self, connector: Connector<Endpoint>) -> Result<(), FatalServerError> {
        connector.start();
        info!(
            "Serving {} resources for {}",
            connector.registry().len(),
            connector.options().endpoint_name
        );

        loop {
            tokio::select! {
                event = self.binding.select_next_some() => {
                    self.handle_rx_event(&connector, event)?;
                }
                Some(item) = self.packet_relay_rx.recv() => {
                    self.handle_packet_relay(item).await;
                }
            }
        }
    }

    fn handle_rx_event(
        &self,
        connector: &Connector<Endpoint>,
        result: Result<FramedItem<Endpoint>, FramedReadError<Endpoint>>,
    ) -> Result<(), FatalServerError> {
        match result {
            Ok((packet, peer)) => {
                trace!("Incoming packet from {peer:?}: {packet:?}");
                if let Some(reply) = Self::handle_packet(connector, packet, peer.clone()) {
                    self.relay(reply, peer);
                }
            }
            Err((transport_err, peer)) => {
                warn!("Error from {peer:?}: {transport_err}");
                if peer.is_none() {
                    return Err(transport_err.into());
                }
            }
        }

        Ok(())
    }

    /// Server-layer handling.  Returns a reply only for what the connector itself does not
    /// answer: pings, discovery, and unknown paths.
    fn handle_packet(
        connector: &Connector<Endpoint>,
        packet: Packet,
        peer: Endpoint,
    ) -> Option<Packet> {
        match packet.header.code {
            MessageClass::Request(_) => {
                let mut request = CoapRequest::from_packet(packet, peer);
                match connector.handle_request(&request) {
                    Ok(Dispatched::Discovery(reply)) => Some(reply),
                    Ok(Dispatched::Responded | Dispatched::Dropped(_)) => None,
                    Err(e) => {
                        if request.apply_from_error(e.into_handling_error()) {
                            request.response.map(|r| r.message)
                        } else {
                            None
                        }
                    }
                }
            }
            MessageClass::Response(_) => {
                warn!("Spurious response message from {peer:?}, ignoring...");
                None
            }
            MessageClass::Empty => match packet.header.get_type() {
                MessageType::Confirmable => {
                    // A common way in CoAP to trigger a cheap "ping" to make sure
                    // the server is alive.
                    Some(new_pong_message(&packet))
                }
                t => {
                    debug!("Ignoring {t:?} Empty message from {peer:?}");
                    None
                }
            },
            code => {
                warn!("Unhandled message code {code} from {peer:?}, ignoring...");
                None
            }
        }
    }

    fn relay(&self, packet: Packet, peer: Endpoint) {
        // The receiving half lives in `self`, so the relay cannot be closed here.
        let _ = self.packet_relay_tx.send((packet, peer));
    }

    async fn handle_packet_relay(&mut self, item: FramedItem<Endpoint>) {
        let peer = item.1.clone();
        trace!("Outgoing packet to {:?}: {:?}", peer, item.0);
        if let Err(e) = self.binding.send(item).await {
            error!("Error sending to {peer:?}: {e:?}");
        }
    }
}

/// Fatal error preventing the server from starting or continuing.  Typically the result of
/// misconfiguration.
#[derive(thiserror::Error, Debug)]
pub enum FatalServerError {
    /// Transport error that is not related to any individual peer but would prevent any future
    /// packet exchanges on the transport.  Must abort the server.
    #[error("fatal transport error: {0}")]
    Transport(#[from] TransportError),
}
