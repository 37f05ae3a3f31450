use std::sync::atomic::{AtomicBool, Ordering};

/// Predicate gating notification delivery: nothing is pushed until the endpoint has completed
/// its registration with the resource directory.  The registration handshake itself lives
/// outside this crate and reports its progress through an implementation of this trait.
pub trait RegistrationState: Send + Sync + 'static {
    fn is_registered(&self) -> bool;
}

impl<F> RegistrationState for F
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    fn is_registered(&self) -> bool {
        (self)()
    }
}

/// Simple shared flag flipped by whatever drives the directory registration.
#[derive(Debug, Default)]
pub struct RegistrationFlag(AtomicBool);

impl RegistrationFlag {
    pub fn new(registered: bool) -> Self {
        Self(AtomicBool::new(registered))
    }

    pub fn set_registered(&self, registered: bool) {
        self.0.store(registered, Ordering::Release);
    }
}

impl RegistrationState for RegistrationFlag {
    fn is_registered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
