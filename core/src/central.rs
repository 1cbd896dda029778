//! Central role controller
//!
//! Drives the scan → connect → discover → subscribe lifecycle against a
//! `CentralTransport` and reports connection, scanning and counter changes
//! to a `Listener`.
//!
//! All state changes happen either inside `handle_event` or inside one of
//! the public commands, both of which take `&mut self`. Commands never wait
//! for the transport: outcomes come back later as `CentralEvent`s.

use crate::codec::decode_counter;
use crate::config::CentralConfig;
use crate::error::{log_absorbed, ExchangeError, ProtocolMismatch};
use crate::listener::Listener;
use crate::model::{
    CharacteristicHandle, ConnectOptions, ConnectionState, PeripheralHandle, RadioState,
    ServiceHandle,
};
use crate::transport::{CentralEvent, CentralTransport, TransportError};
use tracing::{debug, info, info_span, warn, Span};

/// Options used for every connection request
pub const CONNECT_OPTIONS: ConnectOptions = ConnectOptions::NOTIFY_ON_CONNECTION
    .union(ConnectOptions::NOTIFY_ON_DISCONNECTION)
    .union(ConnectOptions::NOTIFY_ON_NOTIFICATION);

/// Work parked until the radio reports `PoweredOn`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Start scanning for the configured service
    StartScan,
    /// Stop scanning and connect to a known peripheral
    Adopt(PeripheralHandle),
}

pub struct CentralController<T, L> {
    transport: T,
    listener: L,
    config: CentralConfig,
    state: ConnectionState,
    peripheral: Option<PeripheralHandle>,
    characteristic: Option<CharacteristicHandle>,
    // Single slot: a newer deferral replaces an unfired older one
    pending: Option<PendingAction>,
    last_value: Option<i64>,
    span: Span,
}

impl<T, L> CentralController<T, L>
where
    T: CentralTransport,
    L: Listener,
{
    pub fn new(transport: T, listener: L, config: CentralConfig) -> Self {
        let span = info_span!("central", service = %config.profile.service_id);
        let state = if transport.radio_state().is_powered_on() {
            ConnectionState::PoweredOn
        } else {
            ConnectionState::PoweredOff
        };

        Self {
            transport,
            listener,
            config,
            state,
            peripheral: None,
            characteristic: None,
            pending: None,
            last_value: None,
            span,
        }
    }

    /// Replace the logging span every operation runs under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peripheral(&self) -> Option<PeripheralHandle> {
        self.peripheral
    }

    pub fn last_value(&self) -> Option<i64> {
        self.last_value
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn has_pending_action(&self) -> bool {
        self.pending.is_some()
    }

    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Start looking for the counter peripheral, now or once powered on
    pub fn connect(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.transport.radio_state().is_powered_on() {
            self.pending = None;
            self.start_scanning();
        } else {
            self.defer(PendingAction::StartScan);
        }
    }

    /// Drop the current connection without waiting for confirmation
    ///
    /// Local state is cleared and the listener told immediately. A
    /// disconnect event the transport delivers afterwards is handled like
    /// any other and reports `connected_updated(false)` again.
    pub fn disconnect(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if let Some(peripheral) = self.peripheral.take() {
            info!(%peripheral, "cancelling connection");
            if let Err(e) = self.transport.cancel_connection(peripheral) {
                log_absorbed(&ExchangeError::transport("cancel connection", e));
            }
        }
        self.characteristic = None;
        if self.state != ConnectionState::PoweredOff {
            self.state = ConnectionState::Disconnected;
        }
        self.listener.connected_updated(false);
    }

    /// Ask for the current counter value outside the notification flow
    pub fn read_value(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        match (self.state, self.peripheral, self.characteristic) {
            (ConnectionState::Connected, Some(peripheral), Some(characteristic)) => {
                if let Err(e) = self.transport.read_value(peripheral, characteristic) {
                    log_absorbed(&ExchangeError::transport("read value", e));
                }
            }
            _ => debug!(state = %self.state, "no counter characteristic to read yet"),
        }
    }

    /// Process one transport callback
    pub fn handle_event(&mut self, event: CentralEvent) {
        let span = self.span.clone();
        let _enter = span.enter();
        debug!(%event, "transport event");

        match event {
            CentralEvent::RadioStateChanged(radio) => self.on_radio_state(radio),
            CentralEvent::PeripheralDiscovered {
                peripheral,
                advertisement,
                rssi,
            } => {
                info!(
                    %peripheral,
                    rssi,
                    name = ?advertisement.local_name,
                    services = advertisement.service_ids.len(),
                    "discovered peripheral"
                );
                self.adopt(peripheral);
            }
            CentralEvent::Connected(peripheral) => self.on_connected(peripheral),
            CentralEvent::ConnectFailed { peripheral, error } => {
                self.on_connect_failed(peripheral, error)
            }
            CentralEvent::Disconnected { peripheral, error } => {
                self.on_disconnected(peripheral, error)
            }
            CentralEvent::RestoredState(peripherals) => self.on_restored(peripherals),
            CentralEvent::ServicesDiscovered { peripheral, result } => {
                self.on_services_discovered(peripheral, result)
            }
            CentralEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                result,
            } => self.on_characteristics_discovered(peripheral, service, result),
            CentralEvent::ValueUpdated {
                characteristic,
                result,
                ..
            } => self.on_value_updated(characteristic, result),
            CentralEvent::NotificationStateUpdated {
                characteristic,
                result,
                ..
            } => match result {
                Ok(enabled) => info!(characteristic = %characteristic.id, enabled, "notification state updated"),
                Err(e) => log_absorbed(&ExchangeError::transport("enable notifications", e)),
            },
        }
    }

    fn defer(&mut self, action: PendingAction) {
        info!(?action, "radio not powered on, deferring");
        if let Some(previous) = self.pending.replace(action) {
            debug!(?previous, ?action, "deferred action superseded");
        }
    }

    fn start_scanning(&mut self) {
        if let Some(peripheral) = self.peripheral {
            info!(%peripheral, state = %self.state, "already holding a peripheral, not scanning");
            return;
        }

        let services = [self.config.profile.service_id];
        match self.transport.start_scan(&services) {
            Ok(()) => {
                info!("scanning");
                self.state = ConnectionState::Scanning;
                self.listener.scanning_updated(true);
            }
            Err(e) => log_absorbed(&ExchangeError::transport("start scan", e)),
        }
    }

    /// Shared path for discovered and restored peripherals
    fn adopt(&mut self, peripheral: PeripheralHandle) {
        if !self.transport.radio_state().is_powered_on() {
            self.defer(PendingAction::Adopt(peripheral));
            return;
        }
        self.pending = None;

        if let Some(current) = self.peripheral {
            debug!(%current, %peripheral, "already holding a peripheral, ignoring");
            return;
        }

        if self.transport.is_scanning() {
            if let Err(e) = self.transport.stop_scan() {
                log_absorbed(&ExchangeError::transport("stop scan", e));
            }
            self.listener.scanning_updated(false);
        }

        self.peripheral = Some(peripheral);
        self.state = ConnectionState::Connecting;
        info!(%peripheral, "connecting");
        if let Err(e) = self.transport.connect(peripheral, CONNECT_OPTIONS) {
            log_absorbed(&ExchangeError::transport("connect", e));
            self.peripheral = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    fn on_radio_state(&mut self, radio: RadioState) {
        if radio.is_powered_on() {
            info!("radio powered on");
            if self.state == ConnectionState::PoweredOff {
                self.state = ConnectionState::PoweredOn;
            }
            match self.pending.take() {
                Some(PendingAction::StartScan) => self.start_scanning(),
                Some(PendingAction::Adopt(peripheral)) => self.adopt(peripheral),
                None => {}
            }
            return;
        }

        log_absorbed(&ExchangeError::RadioUnavailable(radio));
        let was_scanning = self.state == ConnectionState::Scanning;
        self.state = ConnectionState::PoweredOff;
        self.characteristic = None;
        if was_scanning {
            self.listener.scanning_updated(false);
        }
        if let Some(peripheral) = self.peripheral.take() {
            warn!(%peripheral, "radio lost while holding a peripheral");
            self.listener.connected_updated(false);
        }
    }

    fn on_connected(&mut self, peripheral: PeripheralHandle) {
        if self.peripheral != Some(peripheral) {
            warn!(%peripheral, "connection for a peripheral we are not holding, ignoring");
            return;
        }

        info!(%peripheral, "connected");
        self.state = ConnectionState::Connected;
        self.listener.connected_updated(true);

        let services = [self.config.profile.service_id];
        if let Err(e) = self.transport.discover_services(peripheral, &services) {
            log_absorbed(&ExchangeError::transport("discover services", e));
        }
    }

    fn on_connect_failed(&mut self, peripheral: PeripheralHandle, error: TransportError) {
        log_absorbed(&ExchangeError::transport("connect", error));
        if self.peripheral == Some(peripheral) {
            self.peripheral = None;
            self.characteristic = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    fn on_disconnected(&mut self, peripheral: PeripheralHandle, error: Option<TransportError>) {
        match &error {
            Some(e) => warn!(%peripheral, error = %e, "disconnected with error"),
            None => info!(%peripheral, "disconnected"),
        }

        // A late confirmation may name an older handle; local state is
        // cleared regardless.
        if let Some(current) = self.peripheral {
            if current != peripheral {
                warn!(%current, %peripheral, "disconnect names a different peripheral, clearing anyway");
            }
        }

        self.peripheral = None;
        self.characteristic = None;
        if self.state != ConnectionState::PoweredOff {
            self.state = ConnectionState::Disconnected;
        }
        self.listener.connected_updated(false);
    }

    fn on_restored(&mut self, peripherals: Vec<PeripheralHandle>) {
        if peripherals.is_empty() {
            info!("no restored peripherals");
            return;
        }
        info!(count = peripherals.len(), "restoring peripherals");
        for peripheral in peripherals {
            self.adopt(peripheral);
        }
    }

    fn on_services_discovered(
        &mut self,
        peripheral: PeripheralHandle,
        result: Result<Vec<ServiceHandle>, TransportError>,
    ) {
        let services = match result {
            Ok(services) => services,
            Err(e) => {
                log_absorbed(&ExchangeError::transport("discover services", e));
                return;
            }
        };
        if services.is_empty() {
            warn!(%peripheral, "no services");
            return;
        }

        for service in services {
            debug!(service = %service.id, handle = service.handle, "discovering characteristics");
            if let Err(e) = self
                .transport
                .discover_characteristics(peripheral, service, &[])
            {
                log_absorbed(&ExchangeError::transport("discover characteristics", e));
            }
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        peripheral: PeripheralHandle,
        service: ServiceHandle,
        result: Result<Vec<CharacteristicHandle>, TransportError>,
    ) {
        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(e) => {
                log_absorbed(&ExchangeError::transport("discover characteristics", e));
                return;
            }
        };

        for characteristic in characteristics {
            debug!(
                service = %service.id,
                characteristic = %characteristic.id,
                read = characteristic.supports_read(),
                notify = characteristic.supports_notify(),
                "characteristic discovered"
            );
            if characteristic.id == self.config.profile.characteristic_id {
                self.characteristic = Some(characteristic);
            }
            if characteristic.supports_notify() {
                if let Err(e) = self.transport.set_notify(peripheral, characteristic, true) {
                    log_absorbed(&ExchangeError::transport("enable notifications", e));
                }
            }
        }
    }

    fn on_value_updated(
        &mut self,
        characteristic: CharacteristicHandle,
        result: Result<Vec<u8>, TransportError>,
    ) {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                log_absorbed(&ExchangeError::transport("value update", e));
                return;
            }
        };

        let expected = self.config.profile.characteristic_id;
        if characteristic.id != expected {
            log_absorbed(&ExchangeError::from(
                ProtocolMismatch::UnexpectedCharacteristic {
                    expected,
                    actual: characteristic.id,
                },
            ));
            return;
        }

        match decode_counter(&bytes) {
            Ok(value) => {
                info!(value, "counter updated");
                self.last_value = Some(value);
                self.listener.value_updated(value);
            }
            Err(e) => log_absorbed(&ExchangeError::from(ProtocolMismatch::from(e))),
        }
    }
}
