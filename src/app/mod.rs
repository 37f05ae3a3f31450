pub use access_mask::AccessMask;
pub use connector::{Connector, Dispatched};
pub use data_wrapper::DataWrapper;
pub use dispatcher::Dispatcher;
pub use error::{CoapError, DispatchError, NotifyError, OptionsError, RegistrationError};
pub use handler::{DynamicHandler, Handler, ObserveOutcome, Subscriber};
pub use notifier::Notifier;
pub use observe::ObserveCommand;
pub use options::{Options, OptionsBuilder, ResourceBuilder};
pub use registration::{RegistrationFlag, RegistrationState};
pub use registry::ResourceRegistry;
pub use resource::{DynamicResource, ResourceEntry, StaticResource};
pub use scheduler::{ObservationScheduler, ObserverStrategy, ResourceObserver};
pub use sequence::ObserveSequence;

mod access_mask;
pub mod coap_utils;
mod connector;
pub mod data_wrapper;
pub mod discovery;
mod dispatcher;
pub mod error;
mod handler;
mod notifier;
mod observe;
pub mod options;
mod registration;
pub mod registry;
pub mod resource;
pub mod scheduler;
mod sequence;
#[cfg(test)]
pub(crate) mod test_support;

pub fn new() -> OptionsBuilder {
    OptionsBuilder::new()
}

/// Shorthand for [`ResourceBuilder::new`].
pub fn resource(
    path: &str,
    resource_type: &str,
    resource: impl DynamicResource,
) -> ResourceBuilder {
    ResourceBuilder::new(path, resource_type, resource)
}
