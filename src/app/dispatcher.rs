use std::fmt::Debug;
use std::sync::Arc;

use coap_lite::{CoapOption, CoapRequest, CoapResponse, Packet, RequestType, ResponseType};
use log::{debug, warn};

use crate::app::coap_utils::set_uint_option;
use crate::app::error::DispatchError;
use crate::app::handler::{DynamicHandler, Handler, HandlerState, Subscriber};
use crate::app::notifier::Notifier;
use crate::app::observe::ObserveCommand;
use crate::app::resource::{ResourceEntry, StaticResource};
use crate::app::scheduler::ObservationScheduler;
use crate::app::AccessMask;

/// Executes a single request against its resolved handler and assembles the response.
///
/// Requests are dispatched one at a time by the server loop; the only concurrent actor is the
/// observation scheduler, which is why every dynamic handler access goes through its lock.
pub struct Dispatcher<Endpoint> {
    scheduler: Arc<ObservationScheduler<Endpoint>>,
    notifier: Arc<Notifier<Endpoint>>,
    get_observation_control: bool,
    max_value_length: usize,
}

impl<Endpoint: Debug + Clone + Send + Sync + 'static> Dispatcher<Endpoint> {
    pub fn new(
        scheduler: Arc<ObservationScheduler<Endpoint>>,
        notifier: Arc<Notifier<Endpoint>>,
        get_observation_control: bool,
        max_value_length: usize,
    ) -> Self {
        Self {
            scheduler,
            notifier,
            get_observation_control,
            max_value_length,
        }
    }

    pub fn scheduler(&self) -> &Arc<ObservationScheduler<Endpoint>> {
        &self.scheduler
    }

    pub fn notifier(&self) -> &Arc<Notifier<Endpoint>> {
        &self.notifier
    }

    /// Dispatch `request` and send the response back to its source.  Disallowed operations are
    /// logged and dropped without any reply.
    pub fn respond(
        &self,
        request: &CoapRequest<Endpoint>,
        handler: &Handler<Endpoint>,
    ) -> Result<(), DispatchError> {
        let response = self.dispatch(request, handler).map_err(|e| {
            warn!("{e}");
            e
        })?;
        match &request.source {
            Some(peer) => {
                if let Err(e) = self.notifier.reply(peer, response) {
                    warn!("Failed to respond to {peer:?} for [{}]: {e}", handler.path());
                }
            }
            None => debug!("No source for request to [{}], response discarded", handler.path()),
        }
        Ok(())
    }

    /// Translate one request into its response packet without sending it.
    pub fn dispatch(
        &self,
        request: &CoapRequest<Endpoint>,
        handler: &Handler<Endpoint>,
    ) -> Result<Packet, DispatchError> {
        let method = *request.get_method();
        let entry = handler.entry();
        debug!(
            "Dispatching {method:?} [{}] from {:?}",
            entry.path, request.source
        );

        if AccessMask::for_method(method).is_none() {
            return Err(DispatchError::UnsupportedMethod {
                path: entry.path.clone(),
                method,
            });
        }
        if !entry.access_mask.allows(method) {
            return Err(DispatchError::MaskedOperation {
                path: entry.path.clone(),
                method,
                mask: entry.access_mask.bits(),
            });
        }

        let response = new_response(request, entry)?;
        match (handler, method) {
            (Handler::Static(resource), _) => Ok(self.get_static(resource, response)),
            (Handler::Dynamic(resource), RequestType::Get) => {
                Ok(self.get_dynamic(request, resource, response))
            }
            (Handler::Dynamic(resource), _) => self.update_dynamic(request, resource, response),
        }
    }

    fn get_static(&self, resource: &StaticResource, mut response: CoapResponse) -> Packet {
        response.message.payload = resource.value().to_vec();
        set_content_metadata(&mut response.message, resource.entry());
        response.message
    }

    fn get_dynamic(
        &self,
        request: &CoapRequest<Endpoint>,
        handler: &DynamicHandler<Endpoint>,
        mut response: CoapResponse,
    ) -> Packet {
        let mut state = handler.lock();
        let value = state.resource.get();

        let token = request.message.get_token();
        if !token.is_empty() {
            if let Some(peer) = &request.source {
                state.subscriber = Some(Subscriber {
                    peer: peer.clone(),
                    token: token.to_vec(),
                });
            }
        }

        if let Some(command) = ObserveCommand::from_packet(&request.message) {
            if handler.entry().observable {
                self.apply_observe(command, handler, &mut state, &mut response.message);
            } else {
                debug!("Ignoring Observe on non-observable [{}]", handler.path());
            }
        }

        response.message.payload = handler.wrap(value.as_bytes());
        set_content_metadata(&mut response.message, handler.entry());
        response.message
    }

    /// Observe-option handling for GET.  With GET observation control on, Observe=0 subscribes,
    /// Observe=1 unsubscribes and anything else is ignored; with it off, any Observe arms the
    /// subscription.
    fn apply_observe(
        &self,
        command: ObserveCommand,
        handler: &DynamicHandler<Endpoint>,
        state: &mut HandlerState<Endpoint>,
        response: &mut Packet,
    ) {
        match (self.get_observation_control, command) {
            (true, ObserveCommand::Stop) => {
                self.scheduler.stop_observation(handler);
                return;
            }
            (true, ObserveCommand::Other(value)) => {
                debug!("Ignoring Observe={value} on [{}]", handler.path());
                return;
            }
            (true, ObserveCommand::Start) | (false, _) => {}
        }

        state.sequence = state.sequence.next();
        response.set_observe_value(state.sequence.value());
        if !self.scheduler.begin_observation(handler) {
            debug!(
                "[{}] has no scheduled observer, resource notifies on its own",
                handler.path()
            );
        }
    }

    fn update_dynamic(
        &self,
        request: &CoapRequest<Endpoint>,
        handler: &DynamicHandler<Endpoint>,
        mut response: CoapResponse,
    ) -> Result<Packet, DispatchError> {
        let method = *request.get_method();
        let payload = &request.message.payload;
        if payload.is_empty() {
            return Err(DispatchError::EmptyPayload {
                path: handler.path().to_string(),
                method,
            });
        }
        let value = self.decode_value(handler, payload);

        {
            let mut state = handler.lock();
            match method {
                RequestType::Put => state.resource.put(value),
                RequestType::Post => state.resource.post(value),
                RequestType::Delete => state.resource.del(value),
                _ => {
                    return Err(DispatchError::UnsupportedMethod {
                        path: handler.path().to_string(),
                        method,
                    })
                }
            }
        }

        response.set_status(ResponseType::Changed);
        response.message.payload = Vec::new();
        Ok(response.message)
    }

    /// Unwrap an inbound payload into the string value handed to the resource, truncated to at
    /// most the configured maximum length in bytes without splitting a character.
    fn decode_value(&self, handler: &DynamicHandler<Endpoint>, payload: &[u8]) -> String {
        let raw = handler.unwrap(payload);
        let mut value = String::from_utf8_lossy(&raw).into_owned();
        if value.len() > self.max_value_length {
            let mut cut = self.max_value_length;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            debug!(
                "Truncating {} byte value for [{}] to {cut}",
                value.len(),
                handler.path()
            );
            value.truncate(cut);
        }
        value
    }
}

fn new_response<Endpoint>(
    request: &CoapRequest<Endpoint>,
    entry: &ResourceEntry,
) -> Result<CoapResponse, DispatchError> {
    let mut response =
        CoapResponse::new(&request.message).ok_or_else(|| DispatchError::Unanswerable {
            path: entry.path.clone(),
        })?;
    response.set_status(ResponseType::Content);
    Ok(response)
}

fn set_content_metadata(packet: &mut Packet, entry: &ResourceEntry) {
    set_uint_option(
        packet,
        CoapOption::ContentFormat,
        u32::from(entry.content_format),
    );
    set_uint_option(packet, CoapOption::MaxAge, u32::from(entry.max_age));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use coap_lite::{MessageClass, MessageType};

    use super::*;
    use crate::app::coap_utils::get_uint_option;
    use crate::app::data_wrapper::DataWrapper;
    use crate::app::registration::RegistrationFlag;
    use crate::app::resource::DynamicResource;
    use crate::app::scheduler::ObserverStrategy;
    use crate::app::sequence::ObserveSequence;
    use crate::app::test_support::{
        CounterResource, EchoResource, RecordingSender, RelayResource, RequestBuilder,
        TestEndpoint,
    };
    use crate::app::ObserveOutcome;

    struct Fixture {
        sender: Arc<RecordingSender>,
        dispatcher: Dispatcher<TestEndpoint>,
    }

    fn fixture_with(
        get_observation_control: bool,
        observed: &[Arc<DynamicHandler<TestEndpoint>>],
    ) -> Fixture {
        fixture_with_limit(get_observation_control, observed, 128)
    }

    fn fixture_with_limit(
        get_observation_control: bool,
        observed: &[Arc<DynamicHandler<TestEndpoint>>],
        max_value_length: usize,
    ) -> Fixture {
        let sender = RecordingSender::new();
        let notifier = Arc::new(Notifier::with_initial_message_id(sender.clone(), 0));
        let mut scheduler = ObservationScheduler::new(
            ObserverStrategy::Threaded,
            notifier.clone(),
            Arc::new(RegistrationFlag::new(true)),
        );
        for handler in observed {
            scheduler.add_subscription(handler.clone(), Duration::from_secs(10));
        }
        let dispatcher = Dispatcher::new(
            Arc::new(scheduler),
            notifier,
            get_observation_control,
            max_value_length,
        );
        Fixture { sender, dispatcher }
    }

    /// Sensor whose `get` calls are counted.
    struct Probe {
        gets: Arc<AtomicUsize>,
    }

    impl DynamicResource for Probe {
        fn get(&mut self) -> String {
            self.gets.fetch_add(1, Ordering::SeqCst);
            "42".to_string()
        }
    }

    fn dynamic(
        path: &str,
        mask: AccessMask,
        observable: bool,
        resource: impl DynamicResource,
    ) -> Arc<DynamicHandler<TestEndpoint>> {
        Arc::new(DynamicHandler::new(
            ResourceEntry::new(path, "Test", mask, observable),
            resource,
        ))
    }

    fn observe_value(packet: &Packet) -> Option<u32> {
        packet.get_observe_value().map(|v| v.unwrap())
    }

    #[test]
    fn test_get_populates_metadata() {
        let mut entry = ResourceEntry::new("echo", "Echo", AccessMask::GET, false);
        entry.max_age = 30;
        entry.content_format = 50;
        let handler = Arc::new(DynamicHandler::new(entry, EchoResource::new("hello")));
        let f = fixture_with(true, &[]);

        let request = RequestBuilder::new(RequestType::Get, "echo").build();
        let response = f
            .dispatcher
            .dispatch(&request, &Handler::Dynamic(handler))
            .unwrap();

        assert_eq!(response.header.code, MessageClass::Response(ResponseType::Content));
        assert_eq!(response.header.get_type(), MessageType::Acknowledgement);
        assert_eq!(response.header.message_id, 42);
        assert_eq!(response.payload, b"hello");
        assert_eq!(get_uint_option(&response, CoapOption::MaxAge), Some(30));
        assert_eq!(get_uint_option(&response, CoapOption::ContentFormat), Some(50));
        assert_eq!(observe_value(&response), None);
    }

    #[test]
    fn test_masked_get_never_reaches_resource() {
        let gets = Arc::new(AtomicUsize::new(0));
        let handler = dynamic(
            "secret",
            AccessMask::PUT,
            false,
            Probe { gets: gets.clone() },
        );
        let f = fixture_with(true, &[]);

        let request = RequestBuilder::new(RequestType::Get, "secret").build();
        let result = f.dispatcher.respond(&request, &Handler::Dynamic(handler));

        assert!(matches!(result, Err(DispatchError::MaskedOperation { .. })));
        assert_eq!(gets.load(Ordering::SeqCst), 0);
        assert!(f.sender.sent().is_empty());
    }

    #[test]
    fn test_observe_start_without_get_control_increments_once() {
        let handler = dynamic("counter", AccessMask::GET, true, CounterResource::default());
        let f = fixture_with(false, &[handler.clone()]);
        let before = handler.sequence();

        let request = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T9")
            .observe(0)
            .build();
        let response = f
            .dispatcher
            .dispatch(&request, &Handler::Dynamic(handler.clone()))
            .unwrap();

        assert_eq!(observe_value(&response), Some(before.value() + 1));
        assert_eq!(handler.sequence(), before.next());
        assert!(f.dispatcher.scheduler().is_observing(&handler));
    }

    #[test]
    fn test_observe_stop_with_get_control() {
        let handler = dynamic("counter", AccessMask::GET, true, CounterResource::default());
        let f = fixture_with(true, &[handler.clone()]);
        let as_handler = Handler::Dynamic(handler.clone());

        let start = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T1")
            .observe(0)
            .build();
        f.dispatcher.dispatch(&start, &as_handler).unwrap();
        assert!(f.dispatcher.scheduler().is_observing(&handler));

        let stop = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T1")
            .observe(1)
            .build();
        let response = f.dispatcher.dispatch(&stop, &as_handler).unwrap();

        assert!(!f.dispatcher.scheduler().is_observing(&handler));
        assert_eq!(observe_value(&response), None);
        assert_eq!(handler.sequence(), ObserveSequence::new(1));
    }

    #[test]
    fn test_observe_without_get_control_always_arms() {
        let handler = dynamic("counter", AccessMask::GET, true, CounterResource::default());
        let f = fixture_with(false, &[handler.clone()]);
        let as_handler = Handler::Dynamic(handler.clone());

        // Observe=1 would be a deregistration with GET control on.
        let request = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T1")
            .observe(1)
            .build();
        let response = f.dispatcher.dispatch(&request, &as_handler).unwrap();

        assert!(f.dispatcher.scheduler().is_observing(&handler));
        assert_eq!(observe_value(&response), Some(1));
    }

    #[test]
    fn test_get_token_replaces_subscriber() {
        let handler = dynamic("counter", AccessMask::GET, true, CounterResource::default());
        let f = fixture_with(true, &[handler.clone()]);
        let as_handler = Handler::Dynamic(handler.clone());

        let first = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T1")
            .peer(TestEndpoint(1))
            .build();
        f.dispatcher.dispatch(&first, &as_handler).unwrap();
        let second = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T2")
            .peer(TestEndpoint(2))
            .build();
        f.dispatcher.dispatch(&second, &as_handler).unwrap();
        let tokenless = RequestBuilder::new(RequestType::Get, "counter")
            .peer(TestEndpoint(3))
            .build();
        f.dispatcher.dispatch(&tokenless, &as_handler).unwrap();

        let subscriber = handler.lock().subscriber.clone();
        assert_eq!(
            subscriber,
            Some(Subscriber {
                peer: TestEndpoint(2),
                token: b"T2".to_vec()
            })
        );
    }

    #[test]
    fn test_moisture_scenario() {
        let gets = Arc::new(AtomicUsize::new(0));
        let handler = dynamic(
            "moisture",
            AccessMask::GET,
            true,
            Probe { gets: gets.clone() },
        );
        let f = fixture_with(true, &[handler.clone()]);
        let as_handler = Handler::Dynamic(handler.clone());

        let start = RequestBuilder::new(RequestType::Get, "moisture")
            .token(b"T1")
            .observe(0)
            .build();
        f.dispatcher.respond(&start, &as_handler).unwrap();
        let sent = f.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(observe_value(&sent[0].1), Some(1));
        assert_eq!(sent[0].1.get_token(), b"T1");
        assert_eq!(sent[0].1.payload, b"42");

        // What the scheduler does at the first tick.
        let outcome = handler.observe(f.dispatcher.notifier()).unwrap();
        assert_eq!(outcome, ObserveOutcome::Sent(ObserveSequence::new(2)));
        let sent = f.sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.get_token(), b"T1");
        assert_eq!(observe_value(&sent[1].1), Some(2));
        assert_eq!(sent[1].1.header.get_type(), MessageType::NonConfirmable);

        let gets_before_put = gets.load(Ordering::SeqCst);
        let put = RequestBuilder::new(RequestType::Put, "moisture")
            .payload("99")
            .build();
        let result = f.dispatcher.respond(&put, &as_handler);
        assert!(matches!(
            result,
            Err(DispatchError::MaskedOperation {
                method: RequestType::Put,
                ..
            })
        ));
        assert_eq!(f.sender.sent().len(), 2);
        assert_eq!(gets.load(Ordering::SeqCst), gets_before_put);
        assert_eq!(handler.get(), "42");
    }

    #[test]
    fn test_relay_scenario() {
        let handler = dynamic(
            "relay",
            AccessMask::GET | AccessMask::PUT,
            false,
            RelayResource::default(),
        );
        let f = fixture_with(true, &[]);
        let as_handler = Handler::Dynamic(handler);

        let get = || {
            let request = RequestBuilder::new(RequestType::Get, "relay").build();
            f.dispatcher.dispatch(&request, &as_handler).unwrap().payload
        };
        let put = |value: &str| {
            let request = RequestBuilder::new(RequestType::Put, "relay")
                .payload(value)
                .build();
            f.dispatcher.dispatch(&request, &as_handler).unwrap()
        };

        assert_eq!(get(), b"0");
        let changed = put("1");
        assert_eq!(changed.header.code, MessageClass::Response(ResponseType::Changed));
        assert!(changed.payload.is_empty());
        assert_eq!(get(), b"1");

        put("7");
        assert_eq!(get(), b"1");
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let handler = dynamic("echo", AccessMask::ALL, false, EchoResource::default());
        let f = fixture_with(true, &[]);
        let as_handler = Handler::Dynamic(handler);

        for value in ["a", "twenty-one", "ünïcödé"] {
            let put = RequestBuilder::new(RequestType::Put, "echo")
                .payload(value)
                .build();
            f.dispatcher.dispatch(&put, &as_handler).unwrap();
            let get = RequestBuilder::new(RequestType::Get, "echo").build();
            let response = f.dispatcher.dispatch(&get, &as_handler).unwrap();
            assert_eq!(response.payload, value.as_bytes());
        }
    }

    #[test]
    fn test_empty_payload_dropped() {
        let handler = dynamic("counter", AccessMask::ALL, false, CounterResource::default());
        let f = fixture_with(true, &[]);
        let as_handler = Handler::Dynamic(handler.clone());

        for method in [RequestType::Put, RequestType::Post, RequestType::Delete] {
            let request = RequestBuilder::new(method, "counter").build();
            let result = f.dispatcher.respond(&request, &as_handler);
            assert!(matches!(result, Err(DispatchError::EmptyPayload { .. })));
        }
        assert!(f.sender.sent().is_empty());
        assert_eq!(handler.get(), "0");
    }

    #[test]
    fn test_post_and_delete_respond_changed() {
        let handler = dynamic("counter", AccessMask::ALL, false, CounterResource::default());
        let f = fixture_with(true, &[]);
        let as_handler = Handler::Dynamic(handler.clone());

        for method in [RequestType::Post, RequestType::Delete] {
            let request = RequestBuilder::new(method, "counter").payload("x").build();
            let response = f.dispatcher.dispatch(&request, &as_handler).unwrap();
            assert_eq!(response.header.code, MessageClass::Response(ResponseType::Changed));
        }
        // Only post counts; delete is a no-op by default.
        assert_eq!(handler.get(), "1");
    }

    #[test]
    fn test_static_resource_is_get_only() {
        let handler: Handler<TestEndpoint> =
            Handler::Static(Arc::new(StaticResource::new("dev/mfg", "acme")));
        let f = fixture_with(true, &[]);

        let get = RequestBuilder::new(RequestType::Get, "dev/mfg").build();
        assert_eq!(f.dispatcher.dispatch(&get, &handler).unwrap().payload, b"acme");

        let put = RequestBuilder::new(RequestType::Put, "dev/mfg")
            .payload("other")
            .build();
        assert!(matches!(
            f.dispatcher.dispatch(&put, &handler),
            Err(DispatchError::MaskedOperation { .. })
        ));
    }

    #[test]
    fn test_unsupported_method() {
        let handler = dynamic("echo", AccessMask::ALL, false, EchoResource::default());
        let f = fixture_with(true, &[]);
        let request = RequestBuilder::new(RequestType::Fetch, "echo")
            .payload("x")
            .build();
        assert!(matches!(
            f.dispatcher.dispatch(&request, &Handler::Dynamic(handler)),
            Err(DispatchError::UnsupportedMethod { .. })
        ));
    }

    #[test]
    fn test_long_values_truncated() {
        let handler = dynamic("echo", AccessMask::ALL, false, EchoResource::default());
        let f = fixture_with(true, &[]);
        let as_handler = Handler::Dynamic(handler.clone());

        let long = "x".repeat(300);
        let put = RequestBuilder::new(RequestType::Put, "echo")
            .payload(&long)
            .build();
        f.dispatcher.dispatch(&put, &as_handler).unwrap();
        assert_eq!(handler.get().len(), 128);
    }

    #[test]
    fn test_truncation_keeps_whole_characters() {
        let handler = dynamic("echo", AccessMask::ALL, false, EchoResource::default());
        let f = fixture_with_limit(true, &[], 4);
        let as_handler = Handler::Dynamic(handler.clone());

        let put = RequestBuilder::new(RequestType::Put, "echo")
            .payload("abcé")
            .build();
        f.dispatcher.dispatch(&put, &as_handler).unwrap();
        assert_eq!(handler.get(), "abc");

        let put = RequestBuilder::new(RequestType::Put, "echo")
            .payload("abé")
            .build();
        f.dispatcher.dispatch(&put, &as_handler).unwrap();
        assert_eq!(handler.get(), "abé");
    }

    /// Frames values as `v=<value>` on the wire.
    struct PrefixWrapper;

    impl DataWrapper for PrefixWrapper {
        fn wrap(&self, data: &[u8]) -> Vec<u8> {
            [b"v=".as_slice(), data].concat()
        }

        fn unwrap(&self, data: &[u8]) -> Vec<u8> {
            data.strip_prefix(b"v=").unwrap_or(data).to_vec()
        }
    }

    #[test]
    fn test_data_wrapper_applies_in_both_directions() {
        let handler = Arc::new(DynamicHandler::from_parts(
            ResourceEntry::new("led", "Led", AccessMask::GET | AccessMask::PUT, true),
            Box::new(EchoResource::new("off")),
            Box::new(PrefixWrapper),
        ));
        let f = fixture_with(true, &[handler.clone()]);
        let as_handler = Handler::Dynamic(handler.clone());

        let put = RequestBuilder::new(RequestType::Put, "led")
            .payload("v=red")
            .build();
        f.dispatcher.dispatch(&put, &as_handler).unwrap();
        assert_eq!(handler.get(), "red");

        let subscribe = RequestBuilder::new(RequestType::Get, "led")
            .token(b"T1")
            .observe(0)
            .build();
        let response = f.dispatcher.dispatch(&subscribe, &as_handler).unwrap();
        assert_eq!(response.payload, b"v=red");

        handler.observe(f.dispatcher.notifier()).unwrap();
        let sent = f.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.payload, b"v=red");
    }

    #[test]
    fn test_non_confirmable_get() {
        let handler = dynamic("echo", AccessMask::GET, false, EchoResource::new("hi"));
        let f = fixture_with(true, &[]);

        let request = RequestBuilder::new(RequestType::Get, "echo")
            .token(b"N1")
            .non_confirmable()
            .build();
        let response = f
            .dispatcher
            .dispatch(&request, &Handler::Dynamic(handler))
            .unwrap();

        assert_eq!(response.header.get_type(), MessageType::NonConfirmable);
        assert_eq!(response.get_token(), b"N1");
        assert_eq!(response.payload, b"hi");
    }

    #[test]
    fn test_concurrent_requests_and_notifications_stay_consistent() {
        let handler = dynamic("counter", AccessMask::ALL, true, CounterResource::default());
        let f = fixture_with(true, &[handler.clone()]);
        let as_handler = Handler::Dynamic(handler.clone());

        let subscribe = RequestBuilder::new(RequestType::Get, "counter")
            .token(b"T1")
            .observe(0)
            .build();
        f.dispatcher.dispatch(&subscribe, &as_handler).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let put = RequestBuilder::new(RequestType::Put, "counter")
                            .payload("+1")
                            .build();
                        f.dispatcher.dispatch(&put, &as_handler).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..100 {
                    handler.observe(f.dispatcher.notifier()).unwrap();
                }
            });
        });

        assert_eq!(handler.get(), "400");
        let sequences: Vec<u32> = f
            .sender
            .sent()
            .iter()
            .map(|(_, packet)| observe_value(packet).unwrap())
            .collect();
        let expected: Vec<u32> = (2..=101).collect();
        assert_eq!(sequences, expected);
        assert_eq!(handler.sequence(), ObserveSequence::new(101));
    }
}
