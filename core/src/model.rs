//! Shared state and attribute model for both roles
//!
//! Plain data passed across the transport traits: radio and connection
//! states, opaque device handles, discovered attribute handles and the
//! descriptors a peripheral publishes.

use crate::ids::{CharacteristicId, ServiceId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Power/availability state reported by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioState {
    /// State not yet reported
    Unknown,
    /// Connection with the system service was momentarily lost
    Resetting,
    /// Device does not support the requested BLE role
    Unsupported,
    /// Application is not authorized to use BLE
    Unauthorized,
    /// Bluetooth is powered off
    PoweredOff,
    /// Bluetooth is powered on and available
    PoweredOn,
}

impl RadioState {
    pub fn is_powered_on(&self) -> bool {
        matches!(self, RadioState::PoweredOn)
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioState::Unknown => write!(f, "unknown"),
            RadioState::Resetting => write!(f, "resetting"),
            RadioState::Unsupported => write!(f, "unsupported"),
            RadioState::Unauthorized => write!(f, "unauthorized"),
            RadioState::PoweredOff => write!(f, "poweredOff"),
            RadioState::PoweredOn => write!(f, "poweredOn"),
        }
    }
}

/// Central-side connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    PoweredOff,
    PoweredOn,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::PoweredOff => write!(f, "PoweredOff"),
            ConnectionState::PoweredOn => write!(f, "PoweredOn"),
            ConnectionState::Scanning => write!(f, "Scanning"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Opaque reference to a discovered remote peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralHandle(pub Uuid);

impl PeripheralHandle {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peripheral:{}", self.0)
    }
}

/// Opaque reference to a remote central, as seen by the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberHandle(pub Uuid);

impl SubscriberHandle {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "central:{}", self.0)
    }
}

bitflags! {
    /// GATT characteristic properties
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CharacteristicProperties: u8 {
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
    }
}

bitflags! {
    /// Access permissions on a published attribute value
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttributePermissions: u8 {
        const READABLE = 0x01;
        const WRITEABLE = 0x02;
    }
}

bitflags! {
    /// Connection request options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnectOptions: u8 {
        const NOTIFY_ON_CONNECTION = 0x01;
        const NOTIFY_ON_DISCONNECTION = 0x02;
        const NOTIFY_ON_NOTIFICATION = 0x04;
    }
}

/// A service found on a connected peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    pub id: ServiceId,
    /// Attribute handle of the service declaration
    pub handle: u16,
}

/// A characteristic found on a connected peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub id: CharacteristicId,
    /// Attribute handle of the characteristic value
    pub handle: u16,
    pub properties: CharacteristicProperties,
}

impl CharacteristicHandle {
    pub fn supports_notify(&self) -> bool {
        self.properties.contains(CharacteristicProperties::NOTIFY)
    }

    pub fn supports_read(&self) -> bool {
        self.properties.contains(CharacteristicProperties::READ)
    }
}

/// Characteristic published by a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub id: CharacteristicId,
    pub properties: CharacteristicProperties,
    pub permissions: AttributePermissions,
    /// Initial value; `None` leaves reads to the read-request path
    pub value: Option<Vec<u8>>,
}

/// Service published by a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// Advertising payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub service_ids: Vec<ServiceId>,
}

impl AdvertisementData {
    pub fn advertises_any(&self, filter: &[ServiceId]) -> bool {
        filter.is_empty() || filter.iter().any(|id| self.service_ids.contains(id))
    }
}

/// Identifies an outstanding read request on the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Incoming read on a published characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub id: RequestId,
    pub central: SubscriberHandle,
    pub characteristic: CharacteristicId,
    pub offset: usize,
}

/// ATT result code carried in a read response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttStatus {
    Success,
    ReadNotPermitted,
    InvalidOffset,
    AttributeNotFound,
    UnlikelyError,
}

impl fmt::Display for AttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttStatus::Success => write!(f, "success"),
            AttStatus::ReadNotPermitted => write!(f, "readNotPermitted"),
            AttStatus::InvalidOffset => write!(f, "invalidOffset"),
            AttStatus::AttributeNotFound => write!(f, "attributeNotFound"),
            AttStatus::UnlikelyError => write!(f, "unlikelyError"),
        }
    }
}
