use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use coap_lite::{CoapOption, MessageClass, MessageType, Packet, ResponseType};
use log::trace;

use crate::app::coap_utils::set_uint_option;
use crate::app::data_wrapper::{DataWrapper, Identity};
use crate::app::error::NotifyError;
use crate::app::notifier::Notifier;
use crate::app::resource::{DynamicResource, ResourceEntry, StaticResource};
use crate::app::sequence::ObserveSequence;

/// A bound resource as seen by the registry and dispatcher.  Cloning is cheap and preserves
/// identity (see [`Handler::ptr_eq`]).
pub enum Handler<Endpoint> {
    Static(Arc<StaticResource>),
    Dynamic(Arc<DynamicHandler<Endpoint>>),
}

impl<Endpoint> Clone for Handler<Endpoint> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(x) => Self::Static(x.clone()),
            Self::Dynamic(x) => Self::Dynamic(x.clone()),
        }
    }
}

impl<Endpoint> fmt::Debug for Handler<Endpoint> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(x) => f.debug_tuple("Static").field(&x.path()).finish(),
            Self::Dynamic(x) => f.debug_tuple("Dynamic").field(&x.path()).finish(),
        }
    }
}

impl<Endpoint> Handler<Endpoint> {
    pub fn entry(&self) -> &ResourceEntry {
        match self {
            Self::Static(x) => x.entry(),
            Self::Dynamic(x) => x.entry(),
        }
    }

    pub fn path(&self) -> &str {
        &self.entry().path
    }

    pub fn as_dynamic(&self) -> Option<&Arc<DynamicHandler<Endpoint>>> {
        match self {
            Self::Dynamic(x) => Some(x),
            Self::Static(_) => None,
        }
    }

    /// True when both refer to the same bound instance.
    pub fn ptr_eq(&self, other: &Handler<Endpoint>) -> bool {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) => Arc::ptr_eq(a, b),
            (Self::Dynamic(a), Self::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Peer and token of the most recent client to GET the resource.  Notifications go here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber<Endpoint> {
    pub peer: Endpoint,
    pub token: Vec<u8>,
}

/// What a call to [`DynamicHandler::observe`] (or a scheduler tick) actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    Sent(ObserveSequence),
    /// Subscription is idle; nothing sampled.
    Inactive,
    /// Endpoint has not completed directory registration yet.
    Unregistered,
    NotObservable,
    /// No client has supplied a token yet, so there is nobody to notify.
    NoSubscriber,
    /// Resource produced an empty value.
    NoData,
}

/// Mutable state shared by the dispatch path and the observation scheduler.  Only ever touched
/// through [`DynamicHandler::lock`], so a notification's token, sequence number and payload are
/// always read as one consistent snapshot.
pub(crate) struct HandlerState<Endpoint> {
    pub resource: Box<dyn DynamicResource>,
    pub subscriber: Option<Subscriber<Endpoint>>,
    pub sequence: ObserveSequence,
}

/// Live instance of a dynamic resource: its fixed metadata plus lock-protected value source and
/// observation bookkeeping.
pub struct DynamicHandler<Endpoint> {
    entry: ResourceEntry,
    wrapper: Box<dyn DataWrapper>,
    state: Mutex<HandlerState<Endpoint>>,
}

impl<Endpoint> fmt::Debug for DynamicHandler<Endpoint> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicHandler")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl<Endpoint> DynamicHandler<Endpoint> {
    pub fn new(entry: ResourceEntry, resource: impl DynamicResource) -> Self {
        Self::from_parts(entry, Box::new(resource), Box::new(Identity))
    }

    pub(crate) fn from_parts(
        entry: ResourceEntry,
        resource: Box<dyn DynamicResource>,
        wrapper: Box<dyn DataWrapper>,
    ) -> Self {
        Self {
            entry,
            wrapper,
            state: Mutex::new(HandlerState {
                resource,
                subscriber: None,
                sequence: ObserveSequence::MIN,
            }),
        }
    }

    pub fn entry(&self) -> &ResourceEntry {
        &self.entry
    }

    pub fn path(&self) -> &str {
        &self.entry.path
    }

    pub fn sequence(&self) -> ObserveSequence {
        self.lock().sequence
    }

    pub fn implements_observation(&self) -> bool {
        self.lock().resource.implements_observation()
    }

    /// Sample the resource directly, bypassing the dispatcher.
    pub fn get(&self) -> String {
        self.lock().resource.get()
    }

    // The state is plain data that is never left half-updated across a panic, so a poisoned
    // lock is still safe to use.
    pub(crate) fn lock(&self) -> MutexGuard<'_, HandlerState<Endpoint>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wrap(&self, data: &[u8]) -> Vec<u8> {
        self.wrapper.wrap(data)
    }

    pub(crate) fn unwrap(&self, data: &[u8]) -> Vec<u8> {
        self.wrapper.unwrap(data)
    }

    /// Sample the resource and push its current value to the subscriber.
    pub fn observe(&self, notifier: &Notifier<Endpoint>) -> Result<ObserveOutcome, NotifyError> {
        self.observe_while(notifier, || true)
    }

    /// Like [`DynamicHandler::observe`], but `active` is evaluated with the lock held so that a
    /// concurrent unsubscribe, which also runs under the lock, is never overtaken.
    pub(crate) fn observe_while(
        &self,
        notifier: &Notifier<Endpoint>,
        active: impl FnOnce() -> bool,
    ) -> Result<ObserveOutcome, NotifyError> {
        if !self.entry.observable {
            return Ok(ObserveOutcome::NotObservable);
        }
        let mut state = self.lock();
        if !active() {
            return Ok(ObserveOutcome::Inactive);
        }
        if state.subscriber.is_none() {
            return Ok(ObserveOutcome::NoSubscriber);
        }
        let value = state.resource.get();
        self.notify_locked(&mut state, notifier, &value)
    }

    /// Push an explicit value to the subscriber.  This is the entry point for resources that
    /// implement their own observation instead of using the scheduler.
    pub fn notify(
        &self,
        notifier: &Notifier<Endpoint>,
        value: &str,
    ) -> Result<ObserveOutcome, NotifyError> {
        let mut state = self.lock();
        self.notify_locked(&mut state, notifier, value)
    }

    fn notify_locked(
        &self,
        state: &mut HandlerState<Endpoint>,
        notifier: &Notifier<Endpoint>,
        value: &str,
    ) -> Result<ObserveOutcome, NotifyError> {
        if value.is_empty() {
            return Ok(ObserveOutcome::NoData);
        }
        let subscriber = match &state.subscriber {
            Some(subscriber) => subscriber,
            None => return Ok(ObserveOutcome::NoSubscriber),
        };

        // Only commit the new sequence number once the transport has accepted the packet.
        let sequence = state.sequence.next();
        let packet = self.notification_packet(&subscriber.token, sequence, value);
        notifier
            .send_notification(&subscriber.peer, packet)
            .map_err(|source| NotifyError::SendFailed {
                path: self.entry.path.clone(),
                source,
            })?;
        state.sequence = sequence;
        trace!("Notified [{}] seq={sequence}", self.entry.path);
        Ok(ObserveOutcome::Sent(sequence))
    }

    fn notification_packet(&self, token: &[u8], sequence: ObserveSequence, value: &str) -> Packet {
        let mut packet = Packet::new();
        packet.header.set_type(MessageType::NonConfirmable);
        packet.header.code = MessageClass::Response(ResponseType::Content);
        packet.set_token(token.to_vec());
        packet.set_observe_value(sequence.value());
        set_uint_option(
            &mut packet,
            CoapOption::ContentFormat,
            u32::from(self.entry.content_format),
        );
        set_uint_option(&mut packet, CoapOption::MaxAge, u32::from(self.entry.max_age));
        packet.payload = self.wrap(value.as_bytes());
        packet
    }
}
