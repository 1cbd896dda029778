//! Error taxonomy for the role controllers
//!
//! Controllers never hand these to the listener. Each one is logged where it
//! is detected and the offending request or update is dropped.

use crate::codec::CodecError;
use crate::ids::CharacteristicId;
use crate::model::RadioState;
use crate::transport::TransportError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// Radio is off, unsupported, unauthorized or resetting. Not fatal.
    #[error("Radio unavailable: {0}")]
    RadioUnavailable(RadioState),

    /// A transport command or its asynchronous outcome failed. No retry.
    #[error("{operation} failed: {source}")]
    TransportOperationFailed {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// The remote side sent something we do not accept
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(#[from] ProtocolMismatch),
}

impl ExchangeError {
    pub fn transport(operation: &'static str, source: TransportError) -> Self {
        ExchangeError::TransportOperationFailed { operation, source }
    }
}

/// Record an error the controller swallowed
pub(crate) fn log_absorbed(err: &ExchangeError) {
    match err {
        ExchangeError::RadioUnavailable(_) => warn!(error = %err, "radio not ready"),
        ExchangeError::TransportOperationFailed { .. } => {
            error!(error = %err, "transport operation failed")
        }
        ExchangeError::ProtocolMismatch(_) => warn!(error = %err, "dropping message"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolMismatch {
    #[error("unexpected characteristic {actual}, expected {expected}")]
    UnexpectedCharacteristic {
        expected: CharacteristicId,
        actual: CharacteristicId,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] CodecError),

    #[error("invalid read offset {offset} > {length}")]
    InvalidReadOffset { offset: usize, length: usize },
}
