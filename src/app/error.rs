use std::fmt;
use std::fmt::Debug;

use coap_lite::error::HandlingError;
use coap_lite::{RequestType, ResponseType};

use crate::transport::TransportError;

/// Protocol-level error used by the server layer to reply to requests that never reach a
/// resource, such as an unknown path.
#[derive(Debug, Clone)]
pub struct CoapError {
    pub code: Option<ResponseType>,
    pub message: String,
}

impl CoapError {
    pub fn bad_request(msg: impl ToString) -> Self {
        Self::for_code(ResponseType::BadRequest, msg)
    }

    pub fn not_found() -> Self {
        Self::for_code(ResponseType::NotFound, "Not found")
    }

    pub fn for_code(code: ResponseType, msg: impl ToString) -> Self {
        Self {
            code: Some(code),
            message: msg.to_string(),
        }
    }

    pub(crate) fn into_handling_error(self) -> HandlingError {
        HandlingError {
            code: self.code,
            message: self.message,
        }
    }
}

impl fmt::Display for CoapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handling error {:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for CoapError {}

/// Failure to bind a resource into the [`crate::app::ResourceRegistry`].  Fatal only to that one
/// resource; the endpoint carries on without it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("registry is full ({capacity} entries), cannot bind [{path}]")]
    CapacityExceeded { path: String, capacity: usize },

    #[error("cannot bind a resource with an empty path")]
    EmptyPath,
}

/// Reasons a request was dropped without a response.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("resource({method:?}) not permitted on [{path}] (mask: {mask:#04x})")]
    MaskedOperation {
        path: String,
        method: RequestType,
        mask: u8,
    },

    #[error("resource({method:?}) on [{path}] carried an empty payload")]
    EmptyPayload { path: String, method: RequestType },

    #[error("unsupported method {method:?} on [{path}]")]
    UnsupportedMethod { path: String, method: RequestType },

    #[error("request to [{path}] cannot be answered (not a CON or NON message)")]
    Unanswerable { path: String },
}

/// Transport rejected a notification.  The subscription stays armed and the next tick retries.
#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("notification for [{path}] failed to send: {source}")]
    SendFailed {
        path: String,
        #[source]
        source: TransportError,
    },
}

/// Invalid endpoint configuration detected by [`crate::app::OptionsBuilder::build`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("registry capacity must be at least 1")]
    ZeroCapacity,

    #[error("default observation cadence must be non-zero")]
    ZeroDefaultCadence,

    #[error("observation cadence for [{path}] must be non-zero")]
    ZeroCadence { path: String },

    #[error("max value length must be at least 1 byte")]
    ZeroValueLength,
}
