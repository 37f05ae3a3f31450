//! Test doubles shared by the unit tests of the `app` module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use coap_lite::{CoapOption, CoapRequest, MessageClass, MessageType, Packet, RequestType};

use crate::app::notifier::Notifier;
use crate::app::resource::DynamicResource;
use crate::transport::{PacketSender, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TestEndpoint(pub u8);

/// Collects everything sent through it; can be switched into failing mode.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(TestEndpoint, Packet)>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(TestEndpoint, Packet)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PacketSender<TestEndpoint> for RecordingSender {
    fn send(&self, peer: &TestEndpoint, packet: Packet) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::RelayClosed);
        }
        self.sent.lock().unwrap().push((*peer, packet));
        Ok(())
    }
}

pub fn new_notifier(sender: &Arc<RecordingSender>) -> Notifier<TestEndpoint> {
    Notifier::with_initial_message_id(sender.clone(), 0)
}

/// `get` reports how many times `put`/`post` were called.
#[derive(Debug, Default)]
pub struct CounterResource {
    count: u32,
}

impl DynamicResource for CounterResource {
    fn get(&mut self) -> String {
        self.count.to_string()
    }

    fn put(&mut self, _value: String) {
        self.count += 1;
    }

    fn post(&mut self, _value: String) {
        self.count += 1;
    }
}

/// Stores whatever it is given and echoes it back.
#[derive(Debug, Default)]
pub struct EchoResource {
    value: String,
}

impl EchoResource {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

impl DynamicResource for EchoResource {
    fn get(&mut self) -> String {
        self.value.clone()
    }

    fn put(&mut self, value: String) {
        self.value = value;
    }
}

/// Two-state actuator that only accepts `"0"` and `"1"`.
#[derive(Debug)]
pub struct RelayResource {
    state: String,
}

impl Default for RelayResource {
    fn default() -> Self {
        Self {
            state: "0".to_string(),
        }
    }
}

impl DynamicResource for RelayResource {
    fn get(&mut self) -> String {
        self.state.clone()
    }

    fn put(&mut self, value: String) {
        if value == "0" || value == "1" {
            self.state = value;
        }
    }
}

pub struct RequestBuilder {
    packet: Packet,
    method: RequestType,
    path: String,
    peer: TestEndpoint,
}

impl RequestBuilder {
    pub fn new(method: RequestType, path: &str) -> Self {
        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Confirmable);
        packet.header.message_id = 42;
        Self {
            packet,
            method,
            path: path.to_string(),
            peer: TestEndpoint(1),
        }
    }

    pub fn token(mut self, token: &[u8]) -> Self {
        self.packet.set_token(token.to_vec());
        self
    }

    pub fn observe(mut self, value: u32) -> Self {
        self.packet.set_observe_value(value);
        self
    }

    pub fn payload(mut self, payload: &str) -> Self {
        self.packet.payload = payload.as_bytes().to_vec();
        self
    }

    pub fn query(mut self, query: &str) -> Self {
        self.packet
            .add_option(CoapOption::UriQuery, query.as_bytes().to_vec());
        self
    }

    pub fn peer(mut self, peer: TestEndpoint) -> Self {
        self.peer = peer;
        self
    }

    pub fn non_confirmable(mut self) -> Self {
        self.packet.header.set_type(MessageType::NonConfirmable);
        self
    }

    pub fn build(mut self) -> CoapRequest<TestEndpoint> {
        self.packet.header.code = MessageClass::Request(self.method);
        let mut request = CoapRequest::from_packet(self.packet, self.peer);
        request.set_path(&self.path);
        request
    }
}
