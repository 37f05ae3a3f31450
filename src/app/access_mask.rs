use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use coap_lite::RequestType;

/// Set of request methods a resource will accept.  Anything outside the mask is a masked
/// operation and is dropped by the dispatcher.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct AccessMask(u8);

impl AccessMask {
    pub const NONE: AccessMask = AccessMask(0);
    pub const GET: AccessMask = AccessMask(1 << 0);
    pub const PUT: AccessMask = AccessMask(1 << 1);
    pub const POST: AccessMask = AccessMask(1 << 2);
    pub const DELETE: AccessMask = AccessMask(1 << 3);
    pub const ALL: AccessMask = AccessMask(0b1111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: AccessMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Mask bit for a request method, if it is one of the four verbs a resource can expose.
    pub fn for_method(method: RequestType) -> Option<AccessMask> {
        match method {
            RequestType::Get => Some(Self::GET),
            RequestType::Put => Some(Self::PUT),
            RequestType::Post => Some(Self::POST),
            RequestType::Delete => Some(Self::DELETE),
            _ => None,
        }
    }

    pub fn allows(self, method: RequestType) -> bool {
        Self::for_method(method).map_or(false, |bit| self.contains(bit))
    }
}

impl BitOr for AccessMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::GET, "GET"),
            (Self::PUT, "PUT"),
            (Self::POST, "POST"),
            (Self::DELETE, "DELETE"),
        ];
        let set: Vec<_> = names
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&set.join("|"))
        }
    }
}
