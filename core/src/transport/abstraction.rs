//! Transport abstraction layer for the counter exchange
//!
//! Defines the capability traits each role needs from the platform radio
//! stack, and the events the stack delivers back. Commands never block: a
//! returned `Ok(())` only means the request was accepted, the outcome shows
//! up later as an event on the role's single callback context.

use crate::ids::{CharacteristicId, ServiceId};
use crate::model::{
    AdvertisementData, AttStatus, CharacteristicHandle, ConnectOptions, PeripheralHandle,
    RadioState, ReadRequest, RequestId, ServiceDescriptor, ServiceHandle, SubscriberHandle,
};
use std::fmt;
use thiserror::Error;

/// Errors reported by a transport, either synchronously on a command or
/// inside an event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Radio unavailable: {0}")]
    RadioUnavailable(RadioState),

    #[error("Unknown peripheral: {0}")]
    UnknownPeripheral(PeripheralHandle),

    #[error("Not connected to {0}")]
    NotConnected(PeripheralHandle),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Service already published: {0}")]
    AlreadyPublished(ServiceId),

    #[error("Unknown read request: {0:?}")]
    UnknownRequest(RequestId),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Capabilities the central role requires from the radio stack
#[cfg_attr(test, mockall::automock)]
pub trait CentralTransport: Send {
    /// Current radio state
    fn radio_state(&self) -> RadioState;

    /// Scan for peripherals advertising any of `services` (empty = all)
    fn start_scan(&mut self, services: &[ServiceId]) -> Result<(), TransportError>;

    fn stop_scan(&mut self) -> Result<(), TransportError>;

    fn is_scanning(&self) -> bool;

    fn connect(
        &mut self,
        peripheral: PeripheralHandle,
        options: ConnectOptions,
    ) -> Result<(), TransportError>;

    fn cancel_connection(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError>;

    /// Discover services on a connected peripheral (empty = all)
    fn discover_services(
        &mut self,
        peripheral: PeripheralHandle,
        services: &[ServiceId],
    ) -> Result<(), TransportError>;

    /// Discover characteristics of `service` (empty = all)
    fn discover_characteristics(
        &mut self,
        peripheral: PeripheralHandle,
        service: ServiceHandle,
        characteristics: &[CharacteristicId],
    ) -> Result<(), TransportError>;

    fn set_notify(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), TransportError>;

    /// Request the current value; the result arrives as `CentralEvent::ValueUpdated`
    fn read_value(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
    ) -> Result<(), TransportError>;
}

/// Capabilities the peripheral role requires from the radio stack
#[cfg_attr(test, mockall::automock)]
pub trait PeripheralTransport: Send {
    fn radio_state(&self) -> RadioState;

    fn start_advertising(&mut self, advertisement: &AdvertisementData)
        -> Result<(), TransportError>;

    fn stop_advertising(&mut self) -> Result<(), TransportError>;

    fn is_advertising(&self) -> bool;

    fn publish_service(&mut self, service: &ServiceDescriptor) -> Result<(), TransportError>;

    /// Push a new value to `subscribers` (empty = every subscribed central)
    fn update_value(
        &mut self,
        characteristic: CharacteristicId,
        value: &[u8],
        subscribers: &[SubscriberHandle],
    ) -> Result<(), TransportError>;

    fn respond_to_read(
        &mut self,
        request: RequestId,
        status: AttStatus,
        value: &[u8],
    ) -> Result<(), TransportError>;
}

/// Events delivered to the central role
#[derive(Debug, Clone, PartialEq)]
pub enum CentralEvent {
    RadioStateChanged(RadioState),
    PeripheralDiscovered {
        peripheral: PeripheralHandle,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    Connected(PeripheralHandle),
    ConnectFailed {
        peripheral: PeripheralHandle,
        error: TransportError,
    },
    Disconnected {
        peripheral: PeripheralHandle,
        error: Option<TransportError>,
    },
    /// Connections the platform kept alive while the process was not running
    RestoredState(Vec<PeripheralHandle>),
    ServicesDiscovered {
        peripheral: PeripheralHandle,
        result: Result<Vec<ServiceHandle>, TransportError>,
    },
    CharacteristicsDiscovered {
        peripheral: PeripheralHandle,
        service: ServiceHandle,
        result: Result<Vec<CharacteristicHandle>, TransportError>,
    },
    ValueUpdated {
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        result: Result<Vec<u8>, TransportError>,
    },
    NotificationStateUpdated {
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        result: Result<bool, TransportError>,
    },
}

impl fmt::Display for CentralEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CentralEvent::RadioStateChanged(state) => write!(f, "RadioStateChanged({})", state),
            CentralEvent::PeripheralDiscovered { peripheral, rssi, .. } => {
                write!(f, "PeripheralDiscovered {{ {}, rssi: {} }}", peripheral, rssi)
            }
            CentralEvent::Connected(peripheral) => write!(f, "Connected({})", peripheral),
            CentralEvent::ConnectFailed { peripheral, error } => {
                write!(f, "ConnectFailed {{ {}, error: {} }}", peripheral, error)
            }
            CentralEvent::Disconnected { peripheral, error } => match error {
                Some(e) => write!(f, "Disconnected {{ {}, error: {} }}", peripheral, e),
                None => write!(f, "Disconnected({})", peripheral),
            },
            CentralEvent::RestoredState(handles) => {
                write!(f, "RestoredState {{ count: {} }}", handles.len())
            }
            CentralEvent::ServicesDiscovered { peripheral, .. } => {
                write!(f, "ServicesDiscovered({})", peripheral)
            }
            CentralEvent::CharacteristicsDiscovered { service, .. } => {
                write!(f, "CharacteristicsDiscovered({})", service.id)
            }
            CentralEvent::ValueUpdated { characteristic, result, .. } => match result {
                Ok(bytes) => write!(
                    f,
                    "ValueUpdated {{ {}, len: {} }}",
                    characteristic.id,
                    bytes.len()
                ),
                Err(e) => write!(f, "ValueUpdated {{ {}, error: {} }}", characteristic.id, e),
            },
            CentralEvent::NotificationStateUpdated { characteristic, .. } => {
                write!(f, "NotificationStateUpdated({})", characteristic.id)
            }
        }
    }
}

/// Events delivered to the peripheral role
#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralEvent {
    RadioStateChanged(RadioState),
    ServicePublished {
        service: ServiceId,
        result: Result<(), TransportError>,
    },
    AdvertisingStarted(Result<(), TransportError>),
    ReadRequested(ReadRequest),
    Subscribed {
        central: SubscriberHandle,
        characteristic: CharacteristicId,
    },
    Unsubscribed {
        central: SubscriberHandle,
        characteristic: CharacteristicId,
    },
}

impl fmt::Display for PeripheralEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralEvent::RadioStateChanged(state) => write!(f, "RadioStateChanged({})", state),
            PeripheralEvent::ServicePublished { service, result } => match result {
                Ok(()) => write!(f, "ServicePublished({})", service),
                Err(e) => write!(f, "ServicePublished {{ {}, error: {} }}", service, e),
            },
            PeripheralEvent::AdvertisingStarted(result) => match result {
                Ok(()) => write!(f, "AdvertisingStarted"),
                Err(e) => write!(f, "AdvertisingStarted {{ error: {} }}", e),
            },
            PeripheralEvent::ReadRequested(request) => write!(
                f,
                "ReadRequested {{ {}, offset: {} }}",
                request.characteristic, request.offset
            ),
            PeripheralEvent::Subscribed { central, characteristic } => {
                write!(f, "Subscribed {{ {}, {} }}", central, characteristic)
            }
            PeripheralEvent::Unsubscribed { central, characteristic } => {
                write!(f, "Unsubscribed {{ {}, {} }}", central, characteristic)
            }
        }
    }
}
