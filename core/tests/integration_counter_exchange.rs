// Integration test: central and peripheral exchanging a counter over the
// loopback radio
//
// Covers the full lifecycle:
// - deferred connect until the radio powers on
// - discovery, connection, service/characteristic discovery, subscription
// - notified counter values reaching the listener
// - explicit reads, link loss, reconnect and state restoration

use blecounter_core::transport::{AirEndpoints, SimCentral, SimPeripheral};
use blecounter_core::{
    CentralConfig, CentralController, CentralEvent, ChannelListener, ConnectionState,
    ListenerEvent, PeripheralConfig, PeripheralController, PeripheralEvent, SimulatedAir,
};
use tokio::sync::mpsc;

struct Harness {
    air: SimulatedAir,
    central: CentralController<SimCentral, ChannelListener>,
    central_events: mpsc::UnboundedReceiver<CentralEvent>,
    peripheral: PeripheralController<SimPeripheral>,
    peripheral_events: mpsc::UnboundedReceiver<PeripheralEvent>,
    listener: mpsc::UnboundedReceiver<ListenerEvent>,
}

impl Harness {
    fn new() -> Self {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init()
            .ok();

        let AirEndpoints {
            air,
            central,
            central_events,
            peripheral,
            peripheral_events,
        } = SimulatedAir::pair();
        let (listener_tx, listener) = ChannelListener::channel();

        Self {
            air,
            central: CentralController::new(central, listener_tx, CentralConfig::default()),
            central_events,
            peripheral: PeripheralController::new(peripheral, PeripheralConfig::default()),
            peripheral_events,
            listener,
        }
    }

    /// Deliver queued transport events until both sides go quiet
    fn pump(&mut self) {
        loop {
            let mut delivered = false;
            while let Ok(event) = self.central_events.try_recv() {
                self.central.handle_event(event);
                delivered = true;
            }
            while let Ok(event) = self.peripheral_events.try_recv() {
                self.peripheral.handle_event(event);
                delivered = true;
            }
            if !delivered {
                break;
            }
        }
    }

    fn listener_events(&mut self) -> Vec<ListenerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.listener.try_recv() {
            out.push(event);
        }
        out
    }

    /// Power on, advertise, connect and subscribe
    fn connected() -> Self {
        let mut harness = Self::new();
        harness.air.power_on();
        harness.pump();
        harness.central.connect();
        harness.peripheral.start_advertising();
        harness.pump();
        assert_eq!(harness.central.state(), ConnectionState::Connected);
        assert_eq!(harness.peripheral.subscribers().len(), 1);
        harness.listener_events();
        harness
    }
}

#[test]
fn test_counter_reaches_listener_after_connect() {
    let mut h = Harness::new();

    // Connect before anything is powered: parked until PoweredOn
    h.central.connect();
    assert!(h.central.has_pending_action());
    assert!(h.listener_events().is_empty());

    h.air.power_on();
    h.pump();
    assert!(h.peripheral.is_published());
    assert_eq!(h.central.state(), ConnectionState::Scanning);

    h.peripheral.start_advertising();
    h.pump();
    assert!(h.air.is_connected());
    assert_eq!(h.air.notifying_count(), 1);

    h.peripheral.set_counter(42);
    h.pump();

    assert_eq!(
        h.listener_events(),
        vec![
            ListenerEvent::Scanning(true),
            ListenerEvent::Scanning(false),
            ListenerEvent::Connected(true),
            ListenerEvent::Value(42),
        ]
    );
    assert_eq!(h.central.last_value(), Some(42));
}

#[test]
fn test_successive_counters_arrive_in_order() {
    let mut h = Harness::connected();

    for _ in 0..5 {
        h.peripheral.increment();
    }
    h.pump();

    let values: Vec<_> = h
        .listener_events()
        .into_iter()
        .filter_map(|event| match event {
            ListenerEvent::Value(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_explicit_read_returns_current_counter() {
    let mut h = Harness::connected();

    h.peripheral.set_counter(-17);
    h.pump();
    h.listener_events();

    h.central.read_value();
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Value(-17)]);
}

#[test]
fn test_value_seeded_before_power_on_is_readable() {
    let mut h = Harness::new();
    h.peripheral.set_counter(9);

    h.air.power_on();
    h.pump();
    h.central.connect();
    h.peripheral.start_advertising();
    h.pump();
    h.listener_events();

    h.central.read_value();
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Value(9)]);
}

#[test]
fn test_link_loss_and_reconnect() {
    let mut h = Harness::connected();

    h.air.drop_link();
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Connected(false)]);
    assert_eq!(h.central.peripheral(), None);
    assert!(h.peripheral.subscribers().is_empty());

    // Updates while disconnected go nowhere
    h.peripheral.set_counter(100);
    h.pump();
    assert!(h.listener_events().is_empty());

    h.central.connect();
    h.pump();
    h.peripheral.set_counter(101);
    h.pump();
    assert_eq!(
        h.listener_events(),
        vec![
            ListenerEvent::Scanning(true),
            ListenerEvent::Scanning(false),
            ListenerEvent::Connected(true),
            ListenerEvent::Value(101),
        ]
    );
}

#[test]
fn test_local_disconnect_stops_updates() {
    let mut h = Harness::connected();

    h.central.disconnect();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Connected(false)]);
    assert_eq!(h.central.state(), ConnectionState::Disconnected);

    // The transport confirms afterwards
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Connected(false)]);
    assert!(!h.air.is_connected());

    h.peripheral.set_counter(5);
    h.pump();
    assert!(h.listener_events().is_empty());
}

#[test]
fn test_restored_peripheral_is_reconnected() {
    let mut h = Harness::new();
    h.air.power_on();
    h.peripheral.start_advertising();
    h.pump();

    h.air.restore();
    h.pump();
    assert_eq!(h.central.peripheral(), Some(h.air.peripheral_handle()));
    assert_eq!(h.central.state(), ConnectionState::Connected);

    h.peripheral.set_counter(7);
    h.pump();
    assert_eq!(
        h.listener_events(),
        vec![ListenerEvent::Connected(true), ListenerEvent::Value(7)]
    );
}

#[test]
fn test_peripheral_radio_loss_disconnects_central() {
    let mut h = Harness::connected();

    h.air.set_peripheral_radio(blecounter_core::RadioState::PoweredOff);
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Connected(false)]);
    assert!(!h.peripheral.is_advertising());
}

#[test]
fn test_central_radio_loss_clears_peripheral_subscribers() {
    let mut h = Harness::connected();

    h.air.set_central_radio(blecounter_core::RadioState::PoweredOff);
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Connected(false)]);
    assert_eq!(h.central.peripheral(), None);
    assert!(!h.air.is_connected());
    assert!(h.peripheral.subscribers().is_empty());
}

#[test]
fn test_advertising_continues_while_connected() {
    let mut h = Harness::connected();
    assert!(h.peripheral.is_advertising());

    h.peripheral.stop_advertising();
    assert!(!h.peripheral.is_advertising());
    // The existing link is unaffected
    h.peripheral.set_counter(3);
    h.pump();
    assert_eq!(h.listener_events(), vec![ListenerEvent::Value(3)]);
}
