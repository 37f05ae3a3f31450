use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::app::data_wrapper::{DataWrapper, Identity};
use crate::app::error::OptionsError;
use crate::app::registry::DEFAULT_CAPACITY;
use crate::app::resource::{DynamicResource, ResourceEntry, StaticResource};
use crate::app::scheduler::ObserverStrategy;
use crate::app::AccessMask;

pub const DEFAULT_ENDPOINT_NAME: &str = "mbed-endpoint";
pub const DEFAULT_ENDPOINT_TYPE: &str = "mbed-device";
pub const DEFAULT_DOMAIN: &str = "domain";
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(120);
pub const DEFAULT_DIRECTORY_PORT: u16 = 5683;
pub const DEFAULT_REGISTRATION_UPDATE_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_OBSERVATION_CADENCE: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 128;

/// Finished, validated endpoint configuration.  Produced by [`OptionsBuilder::build`] and
/// consumed by [`crate::app::Connector::assemble`].
pub struct Options {
    pub endpoint_name: String,
    pub endpoint_type: String,
    pub domain: String,
    pub lifetime: Duration,
    pub directory: SocketAddr,
    pub registration_update_period: Duration,
    pub observation_cadence: Duration,
    pub capacity: usize,
    pub max_value_length: usize,
    pub immediate_observation: bool,
    pub get_observation_control: bool,
    pub strategy: ObserverStrategy,
    pub(crate) static_resources: Vec<StaticResource>,
    pub(crate) dynamic_resources: Vec<DynamicResourceOptions>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("endpoint_name", &self.endpoint_name)
            .field("endpoint_type", &self.endpoint_type)
            .field("domain", &self.domain)
            .field("lifetime", &self.lifetime)
            .field("directory", &self.directory)
            .field("registration_update_period", &self.registration_update_period)
            .field("observation_cadence", &self.observation_cadence)
            .field("capacity", &self.capacity)
            .field("max_value_length", &self.max_value_length)
            .field("immediate_observation", &self.immediate_observation)
            .field("get_observation_control", &self.get_observation_control)
            .field("strategy", &self.strategy)
            .field("static_resources", &self.static_resources.len())
            .field("dynamic_resources", &self.dynamic_resources.len())
            .finish()
    }
}

impl Options {
    pub fn static_resources(&self) -> &[StaticResource] {
        &self.static_resources
    }

    pub fn dynamic_entries(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.dynamic_resources.iter().map(|r| &r.entry)
    }
}

/// One dynamic resource plus its scheduling parameters, as accumulated by the builder.
pub(crate) struct DynamicResourceOptions {
    pub entry: ResourceEntry,
    pub resource: Box<dyn DynamicResource>,
    pub wrapper: Box<dyn DataWrapper>,
    pub cadence: Option<Duration>,
    pub use_observer: bool,
}

/// Chained builder for [`Options`].  Every setter is plain data; nothing takes effect until the
/// endpoint is assembled.
pub struct OptionsBuilder {
    endpoint_name: String,
    endpoint_type: String,
    domain: String,
    lifetime: Duration,
    directory: SocketAddr,
    registration_update_period: Duration,
    observation_cadence: Duration,
    capacity: usize,
    max_value_length: usize,
    immediate_observation: bool,
    get_observation_control: bool,
    strategy: ObserverStrategy,
    static_resources: Vec<StaticResource>,
    dynamic_resources: Vec<DynamicResourceOptions>,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self {
            endpoint_name: DEFAULT_ENDPOINT_NAME.to_string(),
            endpoint_type: DEFAULT_ENDPOINT_TYPE.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            lifetime: DEFAULT_LIFETIME,
            directory: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                DEFAULT_DIRECTORY_PORT,
            ),
            registration_update_period: DEFAULT_REGISTRATION_UPDATE_PERIOD,
            observation_cadence: DEFAULT_OBSERVATION_CADENCE,
            capacity: DEFAULT_CAPACITY,
            max_value_length: DEFAULT_MAX_VALUE_LENGTH,
            immediate_observation: false,
            get_observation_control: true,
            strategy: ObserverStrategy::default(),
            static_resources: Vec::new(),
            dynamic_resources: Vec::new(),
        }
    }
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn endpoint_name(mut self, name: impl Into<String>) -> Self {
        self.endpoint_name = name.into();
        self
    }

    pub fn endpoint_type(mut self, endpoint_type: impl Into<String>) -> Self {
        self.endpoint_type = endpoint_type.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Address of the resource directory.  Keeps the currently configured port.
    pub fn directory_address(mut self, address: IpAddr) -> Self {
        self.directory.set_ip(address);
        self
    }

    pub fn directory_port(mut self, port: u16) -> Self {
        self.directory.set_port(port);
        self
    }

    pub fn registration_update_period(mut self, period: Duration) -> Self {
        self.registration_update_period = period;
        self
    }

    /// Cadence for observable resources that don't set their own.
    pub fn observation_cadence(mut self, cadence: Duration) -> Self {
        self.observation_cadence = cadence;
        self
    }

    /// Number of registry slots.  Resources beyond this are not bound.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn max_value_length(mut self, length: usize) -> Self {
        self.max_value_length = length;
        self
    }

    /// Arm every subscription as soon as the endpoint starts, without waiting for a client to
    /// subscribe.
    pub fn immediate_observation(mut self, enabled: bool) -> Self {
        self.immediate_observation = enabled;
        self
    }

    /// When enabled, a GET's Observe value is honoured as subscribe (0) or unsubscribe (1).
    /// When disabled, any Observe option subscribes.
    pub fn get_observation_control(mut self, enabled: bool) -> Self {
        self.get_observation_control = enabled;
        self
    }

    pub fn strategy(mut self, strategy: ObserverStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn static_resource(mut self, resource: StaticResource) -> Self {
        self.static_resources.push(resource);
        self
    }

    pub fn resource(mut self, resource: ResourceBuilder) -> Self {
        self.dynamic_resources.push(resource.build());
        self
    }

    /// Convenience method to add multiple resources at once.
    pub fn resources(mut self, resources: Vec<ResourceBuilder>) -> Self {
        for resource in resources {
            self = self.resource(resource);
        }
        self
    }

    pub fn build(self) -> Result<Options, OptionsError> {
        if self.capacity == 0 {
            return Err(OptionsError::ZeroCapacity);
        }
        if self.max_value_length == 0 {
            return Err(OptionsError::ZeroValueLength);
        }
        if self.observation_cadence.is_zero() {
            return Err(OptionsError::ZeroDefaultCadence);
        }
        if let Some(resource) = self
            .dynamic_resources
            .iter()
            .find(|r| r.cadence.map_or(false, |c| c.is_zero()))
        {
            return Err(OptionsError::ZeroCadence {
                path: resource.entry.path.clone(),
            });
        }

        Ok(Options {
            endpoint_name: self.endpoint_name,
            endpoint_type: self.endpoint_type,
            domain: self.domain,
            lifetime: self.lifetime,
            directory: self.directory,
            registration_update_period: self.registration_update_period,
            observation_cadence: self.observation_cadence,
            capacity: self.capacity,
            max_value_length: self.max_value_length,
            immediate_observation: self.immediate_observation,
            get_observation_control: self.get_observation_control,
            strategy: self.strategy,
            static_resources: self.static_resources,
            dynamic_resources: self.dynamic_resources,
        })
    }
}

/// Configure a single dynamic resource.  By default the resource is GET-only, not observable,
/// and uses the endpoint's cadence.
pub struct ResourceBuilder {
    entry: ResourceEntry,
    resource: Box<dyn DynamicResource>,
    wrapper: Box<dyn DataWrapper>,
    cadence: Option<Duration>,
    use_observer: Option<bool>,
}

impl ResourceBuilder {
    pub fn new(
        path: impl Into<String>,
        resource_type: impl Into<String>,
        resource: impl DynamicResource,
    ) -> Self {
        Self {
            entry: ResourceEntry::new(path, resource_type, AccessMask::GET, false),
            resource: Box::new(resource),
            wrapper: Box::new(Identity),
            cadence: None,
            use_observer: None,
        }
    }

    /// Methods the resource accepts.  Anything else is dropped by the dispatcher.
    pub fn mask(mut self, mask: AccessMask) -> Self {
        self.entry.access_mask = mask;
        self
    }

    pub fn observable(mut self, observable: bool) -> Self {
        self.entry.observable = observable;
        self
    }

    /// Override the endpoint's observation cadence for this resource.
    pub fn cadence(mut self, cadence: Duration) -> Self {
        self.cadence = Some(cadence);
        self
    }

    /// Whether the observation scheduler drives notifications for this resource.  Defaults to
    /// true unless the resource reports that it implements observation itself.
    pub fn use_observer(mut self, use_observer: bool) -> Self {
        self.use_observer = Some(use_observer);
        self
    }

    pub fn max_age(mut self, max_age: u8) -> Self {
        self.entry.max_age = max_age;
        self
    }

    pub fn content_format(mut self, content_format: u8) -> Self {
        self.entry.content_format = content_format;
        self
    }

    pub fn data_wrapper(mut self, wrapper: impl DataWrapper) -> Self {
        self.wrapper = Box::new(wrapper);
        self
    }

    pub(crate) fn build(self) -> DynamicResourceOptions {
        let use_observer = self
            .use_observer
            .unwrap_or_else(|| !self.resource.implements_observation());
        DynamicResourceOptions {
            entry: self.entry,
            resource: self.resource,
            wrapper: self.wrapper,
            cadence: self.cadence,
            use_observer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::{CounterResource, EchoResource};

    struct SelfNotifying;

    impl DynamicResource for SelfNotifying {
        fn get(&mut self) -> String {
            "x".to_string()
        }

        fn implements_observation(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_defaults() {
        let options = OptionsBuilder::new().build().unwrap();
        assert_eq!(options.endpoint_name, "mbed-endpoint");
        assert_eq!(options.endpoint_type, "mbed-device");
        assert_eq!(options.domain, "domain");
        assert_eq!(options.lifetime, Duration::from_secs(120));
        assert_eq!(options.directory, "0.0.0.0:5683".parse().unwrap());
        assert_eq!(options.registration_update_period, Duration::from_secs(30));
        assert_eq!(options.observation_cadence, Duration::from_secs(10));
        assert_eq!(options.capacity, 16);
        assert_eq!(options.max_value_length, 128);
        assert!(!options.immediate_observation);
        assert!(options.get_observation_control);
        assert_eq!(options.strategy, ObserverStrategy::Threaded);
    }

    #[test]
    fn test_setters() {
        let options = OptionsBuilder::new()
            .endpoint_name("board-7")
            .directory_address("10.0.0.2".parse().unwrap())
            .directory_port(5684)
            .immediate_observation(true)
            .get_observation_control(false)
            .strategy(ObserverStrategy::Ticker)
            .static_resource(StaticResource::new("dev/mfg", "acme"))
            .resource(
                ResourceBuilder::new("relay", "Relay", EchoResource::new("0"))
                    .mask(AccessMask::GET | AccessMask::PUT),
            )
            .build()
            .unwrap();

        assert_eq!(options.endpoint_name, "board-7");
        assert_eq!(options.directory, "10.0.0.2:5684".parse().unwrap());
        assert!(options.immediate_observation);
        assert!(!options.get_observation_control);
        assert_eq!(options.strategy, ObserverStrategy::Ticker);
        assert_eq!(options.static_resources().len(), 1);
        let entry = options.dynamic_entries().next().unwrap();
        assert_eq!(entry.access_mask, AccessMask::GET | AccessMask::PUT);
    }

    #[test]
    fn test_use_observer_default_follows_resource() {
        let scheduled = ResourceBuilder::new("a", "A", CounterResource::default()).build();
        assert!(scheduled.use_observer);

        let self_notifying = ResourceBuilder::new("b", "B", SelfNotifying).build();
        assert!(!self_notifying.use_observer);

        let forced = ResourceBuilder::new("c", "C", SelfNotifying)
            .use_observer(true)
            .build();
        assert!(forced.use_observer);
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            OptionsBuilder::new().capacity(0).build().unwrap_err(),
            OptionsError::ZeroCapacity
        );
        assert_eq!(
            OptionsBuilder::new().max_value_length(0).build().unwrap_err(),
            OptionsError::ZeroValueLength
        );
        assert_eq!(
            OptionsBuilder::new()
                .observation_cadence(Duration::ZERO)
                .build()
                .unwrap_err(),
            OptionsError::ZeroDefaultCadence
        );
        assert_eq!(
            OptionsBuilder::new()
                .resource(
                    ResourceBuilder::new("moisture", "Moisture", CounterResource::default())
                        .observable(true)
                        .cadence(Duration::ZERO)
                )
                .build()
                .unwrap_err(),
            OptionsError::ZeroCadence {
                path: "moisture".to_string()
            }
        );
    }
}
