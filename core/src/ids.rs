//! GATT identifiers for the counter exchange
//!
//! Services and characteristics are named by 128-bit UUIDs. Short 16-bit
//! assigned numbers are expanded onto the Bluetooth base UUID so that both
//! forms compare by value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Counter service advertised by the peripheral
pub const COUNTER_SERVICE_ID: ServiceId =
    ServiceId(Uuid::from_u128(0x623B_9814_B2EA_4E78_ABE8_CC9D_1D76_A836));

/// Read + notify characteristic carrying the counter value
pub const COUNTER_CHARACTERISTIC_ID: CharacteristicId =
    CharacteristicId(Uuid::from_u128(0x3274_5B79_D94C_4879_B063_AA33_23EB_BCC6));

const fn expand_short(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

fn short_form(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let mask: u128 = 0xFFFF << 96;
    if value & !mask == BLUETOOTH_BASE_UUID {
        Some(((value & mask) >> 96) as u16)
    } else {
        None
    }
}

/// Parse either a 4-hex-digit assigned number or a full UUID string.
fn parse_uuid(s: &str) -> Result<Uuid, uuid::Error> {
    let trimmed = s.trim();
    if trimmed.len() == 4 {
        if let Ok(short) = u16::from_str_radix(trimmed, 16) {
            return Ok(expand_short(short));
        }
    }
    Uuid::parse_str(trimmed)
}

/// Identifier of a GATT service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Uuid);

impl ServiceId {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Expand a 16-bit assigned number (e.g. `0x180D`, Heart Rate)
    pub const fn from_u16(short: u16) -> Self {
        Self(expand_short(short))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// The 16-bit form, if this id lives on the base UUID
    pub fn as_u16(&self) -> Option<u16> {
        short_form(&self.0)
    }
}

impl FromStr for ServiceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uuid(s).map(Self)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(short) => write!(f, "{:04X}", short),
            None => write!(f, "{}", self.0.hyphenated().encode_upper(&mut Uuid::encode_buffer())),
        }
    }
}

/// Identifier of a GATT characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacteristicId(Uuid);

impl CharacteristicId {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn from_u16(short: u16) -> Self {
        Self(expand_short(short))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    pub fn as_u16(&self) -> Option<u16> {
        short_form(&self.0)
    }
}

impl FromStr for CharacteristicId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uuid(s).map(Self)
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(short) => write!(f, "{:04X}", short),
            None => write!(f, "{}", self.0.hyphenated().encode_upper(&mut Uuid::encode_buffer())),
        }
    }
}
