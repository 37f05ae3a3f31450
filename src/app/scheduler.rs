//! Background delivery of Observe notifications (RFC 7641).
//!
//! Every observable dynamic resource gets one [`ResourceObserver`] holding its subscription
//! state.  Two strategies drive the periodic sample-and-notify tick and are chosen once per
//! endpoint: a long-lived task that sleeps between ticks ([`ObserverStrategy::Threaded`]), or a
//! whole-second interval timer that is only armed once somebody subscribes
//! ([`ObserverStrategy::Ticker`]).  Either way a tick does nothing unless the subscription is
//! active and the endpoint is registered with its directory.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, trace, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

use crate::app::error::NotifyError;
use crate::app::handler::{DynamicHandler, ObserveOutcome};
use crate::app::notifier::Notifier;
use crate::app::registration::RegistrationState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ObserverStrategy {
    /// Dedicated task per subscription, started with the endpoint and sleeping `cadence`
    /// between ticks for the endpoint's lifetime.
    #[default]
    Threaded,

    /// Periodic timer with whole-second resolution, armed on the first
    /// [`ResourceObserver::begin_observation`] and never disarmed afterwards.
    Ticker,
}

/// Subscription driver for a single observable resource.
pub trait ResourceObserver<Endpoint>: Send + Sync {
    fn path(&self) -> &str;

    fn cadence(&self) -> Duration;

    /// True if this observer drives `handler`.
    fn observes(&self, handler: &DynamicHandler<Endpoint>) -> bool;

    /// Begin background delivery.  Called once the endpoint is up.
    fn start(&self);

    fn begin_observation(&self);

    fn stop_observation(&self);

    fn is_observing(&self) -> bool;
}

/// State shared between an observer and its background task.
struct Subscription<Endpoint> {
    handler: Arc<DynamicHandler<Endpoint>>,
    cadence: Duration,
    active: AtomicBool,
    notifier: Arc<Notifier<Endpoint>>,
    registration: Arc<dyn RegistrationState>,
}

impl<Endpoint> Subscription<Endpoint> {
    fn new(
        handler: Arc<DynamicHandler<Endpoint>>,
        cadence: Duration,
        notifier: Arc<Notifier<Endpoint>>,
        registration: Arc<dyn RegistrationState>,
    ) -> Self {
        Self {
            handler,
            cadence,
            active: AtomicBool::new(false),
            notifier,
            registration,
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn set_active(&self, active: bool) {
        let was_active = self.active.swap(active, Ordering::AcqRel);
        if was_active != active {
            debug!(
                "Observation of [{}] {}",
                self.handler.path(),
                if active { "armed" } else { "stopped" }
            );
        }
    }

    fn tick(&self) -> Result<ObserveOutcome, NotifyError> {
        if !self.is_active() {
            return Ok(ObserveOutcome::Inactive);
        }
        if !self.registration.is_registered() {
            return Ok(ObserveOutcome::Unregistered);
        }
        self.handler.observe_while(&self.notifier, || self.is_active())
    }

    /// Failures are only logged; the subscription stays armed and the next tick retries.
    fn tick_and_log(&self) {
        match self.tick() {
            Ok(outcome) => trace!("Tick for [{}]: {outcome:?}", self.handler.path()),
            Err(e) => warn!("{e}"),
        }
    }
}

fn abort_task(task: &Mutex<Option<JoinHandle<()>>>) {
    let mut task = task.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(task) = task.take() {
        task.abort();
    }
}

pub struct ThreadedResourceObserver<Endpoint> {
    subscription: Arc<Subscription<Endpoint>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<Endpoint: Send + Sync + 'static> ThreadedResourceObserver<Endpoint> {
    fn new(subscription: Subscription<Endpoint>) -> Self {
        Self {
            subscription: Arc::new(subscription),
            task: Mutex::new(None),
        }
    }
}

impl<Endpoint: Send + Sync + 'static> ResourceObserver<Endpoint>
    for ThreadedResourceObserver<Endpoint>
{
    fn path(&self) -> &str {
        self.subscription.handler.path()
    }

    fn cadence(&self) -> Duration {
        self.subscription.cadence
    }

    fn observes(&self, handler: &DynamicHandler<Endpoint>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.subscription.handler), handler)
    }

    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let subscription = self.subscription.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                time::sleep(subscription.cadence).await;
                subscription.tick_and_log();
            }
        }));
    }

    fn begin_observation(&self) {
        self.subscription.set_active(true);
    }

    fn stop_observation(&self) {
        self.subscription.set_active(false);
    }

    fn is_observing(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<Endpoint> Drop for ThreadedResourceObserver<Endpoint> {
    fn drop(&mut self) {
        abort_task(&self.task);
    }
}

pub struct TickerResourceObserver<Endpoint> {
    subscription: Arc<Subscription<Endpoint>>,
    period: Duration,
    started: AtomicBool,
    armed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<Endpoint: Send + Sync + 'static> TickerResourceObserver<Endpoint> {
    fn new(subscription: Subscription<Endpoint>) -> Self {
        let seconds = subscription.cadence.as_secs();
        let period = if seconds == 0 {
            warn!(
                "Cadence {:?} for [{}] is below timer resolution, using 1s",
                subscription.cadence,
                subscription.handler.path()
            );
            Duration::from_secs(1)
        } else {
            Duration::from_secs(seconds)
        };
        Self {
            subscription: Arc::new(subscription),
            period,
            started: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Timer period actually in use, i.e. the cadence truncated to whole seconds.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    fn arm(&self) {
        if self
            .armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        debug!("Arming {:?} timer for [{}]", self.period, self.path());
        let subscription = self.subscription.clone();
        let period = self.period;
        let first_tick = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(interval);
            while ticks.next().await.is_some() {
                subscription.tick_and_log();
            }
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

impl<Endpoint: Send + Sync + 'static> ResourceObserver<Endpoint>
    for TickerResourceObserver<Endpoint>
{
    fn path(&self) -> &str {
        self.subscription.handler.path()
    }

    fn cadence(&self) -> Duration {
        self.subscription.cadence
    }

    fn observes(&self, handler: &DynamicHandler<Endpoint>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.subscription.handler), handler)
    }

    fn start(&self) {
        self.started.store(true, Ordering::Release);
        if self.subscription.is_active() {
            self.arm();
        }
    }

    fn begin_observation(&self) {
        self.subscription.set_active(true);
        if self.started.load(Ordering::Acquire) {
            self.arm();
        }
    }

    // Timer stays armed; the cleared flag is enough to suppress ticks.
    fn stop_observation(&self) {
        self.subscription.set_active(false);
    }

    fn is_observing(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<Endpoint> Drop for TickerResourceObserver<Endpoint> {
    fn drop(&mut self) {
        abort_task(&self.task);
    }
}

/// Owns every subscription of an endpoint and routes begin/stop requests to the right one.
pub struct ObservationScheduler<Endpoint> {
    strategy: ObserverStrategy,
    notifier: Arc<Notifier<Endpoint>>,
    registration: Arc<dyn RegistrationState>,
    observers: Vec<Box<dyn ResourceObserver<Endpoint>>>,
}

impl<Endpoint> fmt::Debug for ObservationScheduler<Endpoint> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<_> = self.observers.iter().map(|o| o.path()).collect();
        f.debug_struct("ObservationScheduler")
            .field("strategy", &self.strategy)
            .field("observers", &paths)
            .finish()
    }
}

impl<Endpoint: Send + Sync + 'static> ObservationScheduler<Endpoint> {
    pub fn new(
        strategy: ObserverStrategy,
        notifier: Arc<Notifier<Endpoint>>,
        registration: Arc<dyn RegistrationState>,
    ) -> Self {
        Self {
            strategy,
            notifier,
            registration,
            observers: Vec::new(),
        }
    }

    pub fn strategy(&self) -> ObserverStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Create the (initially idle) subscription for `handler`.
    pub fn add_subscription(&mut self, handler: Arc<DynamicHandler<Endpoint>>, cadence: Duration) {
        debug!(
            "Adding {:?} observer for [{}] every {cadence:?}",
            self.strategy,
            handler.path()
        );
        let subscription = Subscription::new(
            handler,
            cadence,
            self.notifier.clone(),
            self.registration.clone(),
        );
        let observer: Box<dyn ResourceObserver<Endpoint>> = match self.strategy {
            ObserverStrategy::Threaded => Box::new(ThreadedResourceObserver::new(subscription)),
            ObserverStrategy::Ticker => Box::new(TickerResourceObserver::new(subscription)),
        };
        self.observers.push(observer);
    }

    fn find(&self, handler: &DynamicHandler<Endpoint>) -> Option<&dyn ResourceObserver<Endpoint>> {
        self.observers
            .iter()
            .find(|o| o.observes(handler))
            .map(|o| o.as_ref())
    }

    /// Start every observer.  Must be called from within a tokio runtime.
    pub fn start(&self) {
        for observer in &self.observers {
            observer.start();
        }
    }

    /// Returns false if `handler` has no subscription (not observable, or it manages its own
    /// notifications).
    pub fn begin_observation(&self, handler: &DynamicHandler<Endpoint>) -> bool {
        match self.find(handler) {
            Some(observer) => {
                observer.begin_observation();
                true
            }
            None => false,
        }
    }

    pub fn stop_observation(&self, handler: &DynamicHandler<Endpoint>) -> bool {
        match self.find(handler) {
            Some(observer) => {
                observer.stop_observation();
                true
            }
            None => false,
        }
    }

    pub fn is_observing(&self, handler: &DynamicHandler<Endpoint>) -> bool {
        self.find(handler).map_or(false, |o| o.is_observing())
    }

    /// Arm every subscription at once, as done at startup with immediate observation enabled.
    pub fn begin_all(&self) {
        for observer in &self.observers {
            observer.begin_observation();
        }
    }
}
