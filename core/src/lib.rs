// BLE Counter Core: counter exchange over GATT
//
// A peripheral owns a counter and publishes it as a read+notify
// characteristic. A central finds it by service id, subscribes, and
// reports every new value. Neither side touches a radio directly.

pub mod central;
pub mod codec;
pub mod config;
pub mod error;
pub mod ids;
pub mod listener;
pub mod model;
pub mod peripheral;
pub mod runtime;
pub mod transport;

pub use central::{CentralController, PendingAction, CONNECT_OPTIONS};
pub use codec::{decode_counter, encode_counter, CodecError, COUNTER_WIDTH};
pub use config::{CentralConfig, ExchangeProfile, PeripheralConfig};
pub use error::{ExchangeError, ProtocolMismatch};
pub use ids::{CharacteristicId, ServiceId, COUNTER_CHARACTERISTIC_ID, COUNTER_SERVICE_ID};
pub use listener::{ChannelListener, Listener, ListenerEvent};
pub use model::{ConnectionState, PeripheralHandle, RadioState, SubscriberHandle};
pub use peripheral::{PeripheralController, PublishState};
pub use runtime::{
    spawn_central, spawn_peripheral, CentralClient, CentralCommand, CentralSnapshot,
    PeripheralClient, PeripheralCommand, PeripheralSnapshot, RuntimeError,
};
pub use transport::{
    AirEndpoints, CentralEvent, CentralTransport, PeripheralEvent, PeripheralTransport,
    SimCentral, SimPeripheral, SimulatedAir, TransportError,
};

/// Central controller wired to the in-memory loopback radio
pub type LoopbackCentral<L> = CentralController<SimCentral, L>;

/// Peripheral controller wired to the in-memory loopback radio
pub type LoopbackPeripheral = PeripheralController<SimPeripheral>;
