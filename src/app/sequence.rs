//! Observe sequence numbers, which RFC 7641 limits to 24 bits.

use std::fmt::{Debug, Display, Formatter};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObserveSequence(u32);

impl ObserveSequence {
    pub const MIN: ObserveSequence = ObserveSequence(0);
    pub const MAX: ObserveSequence = ObserveSequence(0xffffff);

    /// Values wider than 24 bits are truncated, matching how the option is carried on the wire.
    pub const fn new(value: u32) -> Self {
        Self(value & Self::MAX.0)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }
}

impl Display for ObserveSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ObserveSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl From<ObserveSequence> for u32 {
    fn from(value: ObserveSequence) -> Self {
        value.0
    }
}

impl From<u16> for ObserveSequence {
    fn from(value: u16) -> Self {
        Self(u32::from(value))
    }
}
