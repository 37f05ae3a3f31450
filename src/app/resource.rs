use crate::app::data_wrapper::DataWrapper;
use crate::app::AccessMask;

/// Default cache lifetime (seconds) attached to GET responses.
pub const DEFAULT_MAX_AGE: u8 = 60;

/// `text/plain; charset=utf-8`.
pub const DEFAULT_CONTENT_FORMAT: u8 = 0;

/// Metadata describing a bindable resource.  Fixed once the resource is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub path: String,
    /// Link-format `rt` attribute advertised through discovery.
    pub resource_type: String,
    pub access_mask: AccessMask,
    pub observable: bool,
    pub content_format: u8,
    pub max_age: u8,
}

impl ResourceEntry {
    pub fn new(
        path: impl Into<String>,
        resource_type: impl Into<String>,
        access_mask: AccessMask,
        observable: bool,
    ) -> Self {
        Self {
            path: path.into(),
            resource_type: resource_type.into(),
            access_mask,
            observable,
            content_format: DEFAULT_CONTENT_FORMAT,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// A resource whose value is fixed at configuration time and only ever answers GET.
#[derive(Debug, Clone)]
pub struct StaticResource {
    entry: ResourceEntry,
    value: Vec<u8>,
}

impl StaticResource {
    pub fn new(path: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            entry: ResourceEntry::new(path, "", AccessMask::GET, false),
            value: value.into(),
        }
    }

    pub fn with_content_format(mut self, content_format: u8) -> Self {
        self.entry.content_format = content_format;
        self
    }

    /// Wrap the stored value once, up front, since it never changes.
    pub fn with_data_wrapper(mut self, wrapper: &dyn DataWrapper) -> Self {
        self.value = wrapper.wrap(&self.value);
        self
    }

    pub fn entry(&self) -> &ResourceEntry {
        &self.entry
    }

    pub fn path(&self) -> &str {
        &self.entry.path
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Value source behind a dynamic resource.  Every dynamic resource answers GET; the remaining
/// verbs default to doing nothing and are only reachable if the resource's [`AccessMask`]
/// permits them.
///
/// Implementations are always called with the owning handler's lock held, so they never race
/// with a notification being assembled for the same resource.
pub trait DynamicResource: Send + 'static {
    fn get(&mut self) -> String;

    fn put(&mut self, _value: String) {}

    fn post(&mut self, _value: String) {}

    /// Deletion is resource-defined; the resource itself stays bound.
    fn del(&mut self, _value: String) {}

    /// Return `true` if this resource sends its own notifications (via
    /// [`crate::app::DynamicHandler::notify`]) rather than relying on the observation scheduler.
    fn implements_observation(&self) -> bool {
        false
    }
}
