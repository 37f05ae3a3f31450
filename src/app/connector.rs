use std::fmt::Debug;
use std::sync::Arc;

use coap_lite::{CoapRequest, Packet};
use log::{debug, error, info};

use crate::app::discovery::Discovery;
use crate::app::dispatcher::Dispatcher;
use crate::app::error::{CoapError, DispatchError, RegistrationError};
use crate::app::handler::{DynamicHandler, Handler};
use crate::app::notifier::Notifier;
use crate::app::options::Options;
use crate::app::registration::RegistrationState;
use crate::app::registry::ResourceRegistry;
use crate::app::scheduler::ObservationScheduler;
use crate::transport::PacketSender;

/// Result of handing one request to the connector.
#[derive(Debug)]
pub enum Dispatched {
    /// A response was produced and sent.
    Responded,
    /// The request was rejected and deliberately left unanswered.
    Dropped(DispatchError),
    /// Discovery request; the response is returned for the caller to send.
    Discovery(Packet),
}

/// The assembled endpoint: every configured resource bound into the registry, subscriptions
/// created for the observable ones, and a dispatcher wired to both.
pub struct Connector<Endpoint> {
    options: Options,
    registry: ResourceRegistry<Endpoint>,
    dispatcher: Dispatcher<Endpoint>,
    discovery: Discovery,
}

impl<Endpoint: Debug + Clone + Send + Sync + 'static> Connector<Endpoint> {
    /// Bind phase.  Static resources are registered first, then dynamic ones.  A resource that
    /// cannot be bound is logged and skipped; the rest of the endpoint is unaffected.
    pub fn assemble(
        mut options: Options,
        sender: Arc<dyn PacketSender<Endpoint>>,
        registration: Arc<dyn RegistrationState>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(sender));
        let mut registry = ResourceRegistry::with_capacity(options.capacity);
        let mut scheduler =
            ObservationScheduler::new(options.strategy, notifier.clone(), registration);

        for resource in std::mem::take(&mut options.static_resources) {
            let path = resource.path().to_string();
            let _ = bind(&mut registry, &path, Handler::Static(Arc::new(resource)));
        }

        let mut observed = Vec::new();
        for resource in std::mem::take(&mut options.dynamic_resources) {
            let path = resource.entry.path.clone();
            let cadence = resource.cadence.unwrap_or(options.observation_cadence);
            let use_observer = resource.use_observer;
            let handler = Arc::new(DynamicHandler::from_parts(
                resource.entry,
                resource.resource,
                resource.wrapper,
            ));
            let bound = bind(&mut registry, &path, Handler::Dynamic(handler.clone()));
            if bound.is_ok() && handler.entry().observable && use_observer {
                observed.push((handler, cadence));
            }
        }

        // A later binding may have replaced an earlier one at the same path.
        for (handler, cadence) in observed {
            let still_bound = registry
                .resolve(handler.path())
                .and_then(Handler::as_dynamic)
                .map_or(false, |bound| Arc::ptr_eq(bound, &handler));
            if still_bound {
                scheduler.add_subscription(handler, cadence);
            } else {
                debug!("[{}] was rebound, not observing the replaced resource", handler.path());
            }
        }

        if options.immediate_observation {
            debug!("Immediate observation enabled, arming {} subscriptions", scheduler.len());
            scheduler.begin_all();
        }

        let discovery = Discovery::from_entries(registry.handlers().map(|h| h.entry()));
        let dispatcher = Dispatcher::new(
            Arc::new(scheduler),
            notifier,
            options.get_observation_control,
            options.max_value_length,
        );

        info!(
            "Assembled endpoint {} ({}) with {}/{} resources bound",
            options.endpoint_name,
            options.endpoint_type,
            registry.len(),
            registry.capacity()
        );

        Self {
            options,
            registry,
            dispatcher,
            discovery,
        }
    }

    /// Start background observation.  Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.dispatcher.scheduler().start();
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &ResourceRegistry<Endpoint> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher<Endpoint> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &ObservationScheduler<Endpoint> {
        self.dispatcher.scheduler()
    }

    pub fn notifier(&self) -> &Arc<Notifier<Endpoint>> {
        self.dispatcher.notifier()
    }

    pub fn resolve(&self, path: &str) -> Option<&Handler<Endpoint>> {
        self.registry.resolve(path)
    }

    /// Convenience lookup for application code that wants to push values itself through
    /// [`DynamicHandler::notify`].
    pub fn dynamic(&self, path: &str) -> Option<&Arc<DynamicHandler<Endpoint>>> {
        self.resolve(path).and_then(Handler::as_dynamic)
    }

    /// Resolve and dispatch one request.  Unknown paths yield a 4.04 [`CoapError`] for the
    /// server layer to reply with; anything the dispatcher rejects is dropped silently.
    pub fn handle_request(
        &self,
        request: &CoapRequest<Endpoint>,
    ) -> Result<Dispatched, CoapError> {
        let path = request.get_path();
        if Discovery::is_discovery_path(&path) {
            return self.discovery.respond(request).map(Dispatched::Discovery);
        }

        let handler = self.registry.resolve(&path).ok_or_else(|| {
            debug!("No resource bound at [{path}]");
            CoapError::not_found()
        })?;
        match self.dispatcher.respond(request, handler) {
            Ok(()) => Ok(Dispatched::Responded),
            Err(e) => Ok(Dispatched::Dropped(e)),
        }
    }
}

fn bind<Endpoint>(
    registry: &mut ResourceRegistry<Endpoint>,
    path: &str,
    handler: Handler<Endpoint>,
) -> Result<(), RegistrationError> {
    match registry.register(path, handler) {
        Ok(()) => {
            info!("Bound resource [{path}]");
            Ok(())
        }
        Err(e) => {
            error!("Failed to bind resource [{path}]: {e}");
            Err(e)
        }
    }
}
