use log::debug;

use crate::app::error::RegistrationError;
use crate::app::handler::Handler;

/// Default number of slots; the target devices only ever expose a handful of resources.
pub const DEFAULT_CAPACITY: usize = 16;

/// Fixed-capacity table mapping resource paths to their live handlers.  Lookups scan the
/// occupied slots comparing path segments, which for a table this small beats hashing and never
/// allocates.
#[derive(Debug)]
pub struct ResourceRegistry<Endpoint> {
    slots: Vec<Option<RegistryEntry<Endpoint>>>,
    len: usize,
}

#[derive(Debug)]
struct RegistryEntry<Endpoint> {
    /// Normalised path segments, e.g. `"/a/b"` and `"a/b/"` both become `["a", "b"]`.
    key: Vec<String>,
    handler: Handler<Endpoint>,
}

impl<Endpoint> Default for ResourceRegistry<Endpoint> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<Endpoint> ResourceRegistry<Endpoint> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bind `handler` at `path`.  An existing binding for the same path is replaced and keeps
    /// its slot; otherwise the first free slot is consumed.
    pub fn register(
        &mut self,
        path: &str,
        handler: Handler<Endpoint>,
    ) -> Result<(), RegistrationError> {
        let key = key_from_path(path);
        if key.is_empty() {
            return Err(RegistrationError::EmptyPath);
        }

        if let Some(existing) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|entry| entry.key == key)
        {
            debug!("Replacing handler bound at [{path}]");
            existing.handler = handler;
            return Ok(());
        }

        let capacity = self.capacity();
        let free = self.slots.iter_mut().find(|slot| slot.is_none()).ok_or_else(|| {
            RegistrationError::CapacityExceeded {
                path: path.to_string(),
                capacity,
            }
        })?;
        *free = Some(RegistryEntry { key, handler });
        self.len += 1;
        Ok(())
    }

    /// Find the handler bound at exactly `path`.  Leading, trailing and repeated slashes are
    /// ignored.
    pub fn resolve(&self, path: &str) -> Option<&Handler<Endpoint>> {
        self.slots
            .iter()
            .flatten()
            .find(|entry| segments_match(&entry.key, path))
            .map(|entry| &entry.handler)
    }

    /// All bound handlers, in slot order.
    pub fn handlers(&self) -> impl Iterator<Item = &Handler<Endpoint>> {
        self.slots.iter().flatten().map(|entry| &entry.handler)
    }
}

pub fn key_from_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn segments_match(key: &[String], path: &str) -> bool {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    for expected in key {
        match segments.next() {
            Some(actual) if actual == expected => {}
            _ => return false,
        }
    }
    segments.next().is_none()
}
