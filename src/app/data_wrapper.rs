/// Transforms resource values on their way to and from the wire.  Outbound payloads (GET
/// responses and notifications) are wrapped; inbound PUT/POST/DELETE payloads are unwrapped
/// before the resource sees them.
pub trait DataWrapper: Send + Sync + 'static {
    fn wrap(&self, data: &[u8]) -> Vec<u8>;
    fn unwrap(&self, data: &[u8]) -> Vec<u8>;
}

/// Passes data through untouched.  Used when a resource has no wrapper configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl DataWrapper for Identity {
    fn wrap(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn unwrap(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }
}
