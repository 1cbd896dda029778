// Transport module: radio capability traits, events and the loopback link

pub mod abstraction;
pub mod loopback;

pub use abstraction::{
    CentralEvent, CentralTransport, PeripheralEvent, PeripheralTransport, TransportError,
};
pub use loopback::{AirEndpoints, SimCentral, SimPeripheral, SimulatedAir};

#[cfg(test)]
pub use abstraction::{MockCentralTransport, MockPeripheralTransport};
