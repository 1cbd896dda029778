//! In-memory loopback radio
//!
//! Links exactly one central endpoint with one peripheral endpoint. Every
//! command is answered by pushing events onto the role's unbounded channel,
//! the same way a platform stack would call back on its delegate queue.
//! Used by the integration tests and the CLI demo.

use super::abstraction::{
    CentralEvent, CentralTransport, PeripheralEvent, PeripheralTransport, TransportError,
};
use crate::ids::{CharacteristicId, ServiceId};
use crate::model::{
    AdvertisementData, AttStatus, CharacteristicHandle, CharacteristicProperties, ConnectOptions,
    PeripheralHandle, RadioState, ReadRequest, RequestId, ServiceDescriptor, ServiceHandle,
    SubscriberHandle,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default signal strength reported on discovery
pub const DEFAULT_RSSI: i16 = -55;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Idle,
    /// Connect requested while the peripheral was unreachable
    Pending,
    Connected,
}

struct PublishedCharacteristic {
    handle: CharacteristicHandle,
    value: Option<Vec<u8>>,
}

struct PublishedService {
    handle: ServiceHandle,
    characteristics: Vec<PublishedCharacteristic>,
}

struct AirState {
    central_radio: RadioState,
    peripheral_radio: RadioState,
    central_tx: mpsc::UnboundedSender<CentralEvent>,
    peripheral_tx: mpsc::UnboundedSender<PeripheralEvent>,
    peripheral_id: PeripheralHandle,
    central_id: SubscriberHandle,
    rssi: i16,
    scan_filter: Option<Vec<ServiceId>>,
    reported_in_scan: bool,
    advertisement: Option<AdvertisementData>,
    services: Vec<PublishedService>,
    next_attribute: u16,
    link: Link,
    notifying: BTreeSet<u16>,
    pending_reads: HashMap<RequestId, CharacteristicHandle>,
    next_request: u64,
}

impl AirState {
    fn to_central(&self, event: CentralEvent) {
        trace!(%event, "air -> central");
        let _ = self.central_tx.send(event);
    }

    fn to_peripheral(&self, event: PeripheralEvent) {
        trace!(%event, "air -> peripheral");
        let _ = self.peripheral_tx.send(event);
    }

    fn find_characteristic(&self, handle: u16) -> Option<&PublishedCharacteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.handle.handle == handle)
    }

    fn find_characteristic_by_id(
        &mut self,
        id: CharacteristicId,
    ) -> Option<&mut PublishedCharacteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| c.handle.id == id)
    }

    fn require_central_powered(&self) -> Result<(), TransportError> {
        if self.central_radio.is_powered_on() {
            Ok(())
        } else {
            Err(TransportError::RadioUnavailable(self.central_radio))
        }
    }

    fn require_peripheral_powered(&self) -> Result<(), TransportError> {
        if self.peripheral_radio.is_powered_on() {
            Ok(())
        } else {
            Err(TransportError::RadioUnavailable(self.peripheral_radio))
        }
    }

    fn require_connected(&self, peripheral: PeripheralHandle) -> Result<(), TransportError> {
        if peripheral != self.peripheral_id {
            return Err(TransportError::UnknownPeripheral(peripheral));
        }
        if self.link != Link::Connected {
            return Err(TransportError::NotConnected(peripheral));
        }
        Ok(())
    }

    /// Report the peripheral once per scan if its advertisement matches
    fn maybe_report_discovery(&mut self) {
        let Some(filter) = &self.scan_filter else {
            return;
        };
        let Some(advertisement) = &self.advertisement else {
            return;
        };
        if self.reported_in_scan || self.link == Link::Connected {
            return;
        }
        if !advertisement.advertises_any(filter) {
            return;
        }
        self.reported_in_scan = true;
        self.to_central(CentralEvent::PeripheralDiscovered {
            peripheral: self.peripheral_id,
            advertisement: advertisement.clone(),
            rssi: self.rssi,
        });
    }

    fn complete_pending_connect(&mut self) {
        if self.link == Link::Pending && self.advertisement.is_some() {
            self.link = Link::Connected;
            debug!(peripheral = %self.peripheral_id, "loopback link established");
            self.to_central(CentralEvent::Connected(self.peripheral_id));
        }
    }

    /// Tear the link down, notifying both sides
    fn break_link(&mut self, error: Option<TransportError>) {
        if self.link == Link::Idle {
            return;
        }
        let was_connected = self.link == Link::Connected;
        self.link = Link::Idle;
        self.pending_reads.clear();

        let notifying = std::mem::take(&mut self.notifying);
        for handle in notifying {
            if let Some(characteristic) = self.find_characteristic(handle) {
                let id = characteristic.handle.id;
                self.to_peripheral(PeripheralEvent::Unsubscribed {
                    central: self.central_id,
                    characteristic: id,
                });
            }
        }

        if was_connected || error.is_none() {
            self.to_central(CentralEvent::Disconnected {
                peripheral: self.peripheral_id,
                error,
            });
        }
    }
}

/// Shared simulated radio medium
#[derive(Clone)]
pub struct SimulatedAir {
    inner: Arc<Mutex<AirState>>,
}

/// Both endpoints of a freshly created loopback link
pub struct AirEndpoints {
    pub air: SimulatedAir,
    pub central: SimCentral,
    pub central_events: mpsc::UnboundedReceiver<CentralEvent>,
    pub peripheral: SimPeripheral,
    pub peripheral_events: mpsc::UnboundedReceiver<PeripheralEvent>,
}

impl SimulatedAir {
    /// Create a powered-off link between one central and one peripheral
    pub fn pair() -> AirEndpoints {
        let (central_tx, central_events) = mpsc::unbounded_channel();
        let (peripheral_tx, peripheral_events) = mpsc::unbounded_channel();

        let state = AirState {
            central_radio: RadioState::Unknown,
            peripheral_radio: RadioState::Unknown,
            central_tx,
            peripheral_tx,
            peripheral_id: PeripheralHandle::random(),
            central_id: SubscriberHandle::random(),
            rssi: DEFAULT_RSSI,
            scan_filter: None,
            reported_in_scan: false,
            advertisement: None,
            services: Vec::new(),
            next_attribute: 1,
            link: Link::Idle,
            notifying: BTreeSet::new(),
            pending_reads: HashMap::new(),
            next_request: 1,
        };

        let air = SimulatedAir {
            inner: Arc::new(Mutex::new(state)),
        };

        AirEndpoints {
            central: SimCentral { air: air.clone() },
            peripheral: SimPeripheral { air: air.clone() },
            air,
            central_events,
            peripheral_events,
        }
    }

    /// Power both radios on
    pub fn power_on(&self) {
        self.set_central_radio(RadioState::PoweredOn);
        self.set_peripheral_radio(RadioState::PoweredOn);
    }

    pub fn set_central_radio(&self, radio: RadioState) {
        let mut state = self.inner.lock();
        state.central_radio = radio;
        if !radio.is_powered_on() {
            state.break_link(Some(TransportError::RadioUnavailable(radio)));
            state.scan_filter = None;
        }
        state.to_central(CentralEvent::RadioStateChanged(radio));
    }

    pub fn set_peripheral_radio(&self, radio: RadioState) {
        let mut state = self.inner.lock();
        state.peripheral_radio = radio;
        if !radio.is_powered_on() {
            state.break_link(Some(TransportError::RadioUnavailable(radio)));
            state.advertisement = None;
            state.services.clear();
            state.next_attribute = 1;
        }
        state.to_peripheral(PeripheralEvent::RadioStateChanged(radio));
    }

    /// Simulate a remote link loss
    pub fn drop_link(&self) {
        self.inner
            .lock()
            .break_link(Some(TransportError::OperationFailed("link lost".to_string())));
    }

    /// Deliver a state-restoration event naming the peripheral
    pub fn restore(&self) {
        let state = self.inner.lock();
        state.to_central(CentralEvent::RestoredState(vec![state.peripheral_id]));
    }

    pub fn set_rssi(&self, rssi: i16) {
        self.inner.lock().rssi = rssi;
    }

    pub fn peripheral_handle(&self) -> PeripheralHandle {
        self.inner.lock().peripheral_id
    }

    pub fn central_handle(&self) -> SubscriberHandle {
        self.inner.lock().central_id
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().link == Link::Connected
    }

    /// Number of characteristics the central currently receives notifications for
    pub fn notifying_count(&self) -> usize {
        self.inner.lock().notifying.len()
    }
}

/// Central endpoint of the loopback link
#[derive(Clone)]
pub struct SimCentral {
    air: SimulatedAir,
}

impl CentralTransport for SimCentral {
    fn radio_state(&self) -> RadioState {
        self.air.inner.lock().central_radio
    }

    fn start_scan(&mut self, services: &[ServiceId]) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        state.require_central_powered()?;
        state.scan_filter = Some(services.to_vec());
        state.reported_in_scan = false;
        state.maybe_report_discovery();
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.air.inner.lock().scan_filter = None;
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        self.air.inner.lock().scan_filter.is_some()
    }

    fn connect(
        &mut self,
        peripheral: PeripheralHandle,
        _options: ConnectOptions,
    ) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        state.require_central_powered()?;
        if peripheral != state.peripheral_id {
            return Err(TransportError::UnknownPeripheral(peripheral));
        }
        let link = state.link;
        match link {
            Link::Connected => state.to_central(CentralEvent::Connected(peripheral)),
            Link::Idle | Link::Pending => {
                state.link = Link::Pending;
                state.complete_pending_connect();
            }
        }
        Ok(())
    }

    fn cancel_connection(&mut self, peripheral: PeripheralHandle) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        if peripheral != state.peripheral_id {
            return Err(TransportError::UnknownPeripheral(peripheral));
        }
        state.break_link(None);
        Ok(())
    }

    fn discover_services(
        &mut self,
        peripheral: PeripheralHandle,
        services: &[ServiceId],
    ) -> Result<(), TransportError> {
        let state = self.air.inner.lock();
        state.require_connected(peripheral)?;
        let found = state
            .services
            .iter()
            .map(|s| s.handle)
            .filter(|h| services.is_empty() || services.contains(&h.id))
            .collect();
        state.to_central(CentralEvent::ServicesDiscovered {
            peripheral,
            result: Ok(found),
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        peripheral: PeripheralHandle,
        service: ServiceHandle,
        characteristics: &[CharacteristicId],
    ) -> Result<(), TransportError> {
        let state = self.air.inner.lock();
        state.require_connected(peripheral)?;
        let result = match state.services.iter().find(|s| s.handle == service) {
            Some(published) => Ok(published
                .characteristics
                .iter()
                .map(|c| c.handle)
                .filter(|h| characteristics.is_empty() || characteristics.contains(&h.id))
                .collect()),
            None => Err(TransportError::UnknownAttribute(service.id.to_string())),
        };
        state.to_central(CentralEvent::CharacteristicsDiscovered {
            peripheral,
            service,
            result,
        });
        Ok(())
    }

    fn set_notify(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        state.require_connected(peripheral)?;

        let notifiable = match state.find_characteristic(characteristic.handle) {
            Some(published) => published
                .handle
                .properties
                .intersects(CharacteristicProperties::NOTIFY | CharacteristicProperties::INDICATE),
            None => {
                state.to_central(CentralEvent::NotificationStateUpdated {
                    peripheral,
                    characteristic,
                    result: Err(TransportError::UnknownAttribute(characteristic.id.to_string())),
                });
                return Ok(());
            }
        };
        if !notifiable {
            state.to_central(CentralEvent::NotificationStateUpdated {
                peripheral,
                characteristic,
                result: Err(TransportError::OperationFailed(
                    "characteristic does not support notifications".to_string(),
                )),
            });
            return Ok(());
        }

        let changed = if enabled {
            state.notifying.insert(characteristic.handle)
        } else {
            state.notifying.remove(&characteristic.handle)
        };
        state.to_central(CentralEvent::NotificationStateUpdated {
            peripheral,
            characteristic,
            result: Ok(enabled),
        });
        if changed {
            let central = state.central_id;
            let event = if enabled {
                PeripheralEvent::Subscribed {
                    central,
                    characteristic: characteristic.id,
                }
            } else {
                PeripheralEvent::Unsubscribed {
                    central,
                    characteristic: characteristic.id,
                }
            };
            state.to_peripheral(event);
        }
        Ok(())
    }

    fn read_value(
        &mut self,
        peripheral: PeripheralHandle,
        characteristic: CharacteristicHandle,
    ) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        state.require_connected(peripheral)?;
        if state.find_characteristic(characteristic.handle).is_none() {
            return Err(TransportError::UnknownAttribute(characteristic.id.to_string()));
        }

        let id = RequestId(state.next_request);
        state.next_request += 1;
        state.pending_reads.insert(id, characteristic);
        let central = state.central_id;
        state.to_peripheral(PeripheralEvent::ReadRequested(ReadRequest {
            id,
            central,
            characteristic: characteristic.id,
            offset: 0,
        }));
        Ok(())
    }
}

/// Peripheral endpoint of the loopback link
#[derive(Clone)]
pub struct SimPeripheral {
    air: SimulatedAir,
}

impl PeripheralTransport for SimPeripheral {
    fn radio_state(&self) -> RadioState {
        self.air.inner.lock().peripheral_radio
    }

    fn start_advertising(
        &mut self,
        advertisement: &AdvertisementData,
    ) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        state.require_peripheral_powered()?;
        state.advertisement = Some(advertisement.clone());
        state.to_peripheral(PeripheralEvent::AdvertisingStarted(Ok(())));
        state.maybe_report_discovery();
        state.complete_pending_connect();
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        self.air.inner.lock().advertisement = None;
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.air.inner.lock().advertisement.is_some()
    }

    fn publish_service(&mut self, service: &ServiceDescriptor) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        state.require_peripheral_powered()?;

        if state.services.iter().any(|s| s.handle.id == service.id) {
            state.to_peripheral(PeripheralEvent::ServicePublished {
                service: service.id,
                result: Err(TransportError::AlreadyPublished(service.id)),
            });
            return Ok(());
        }

        let service_handle = ServiceHandle {
            id: service.id,
            handle: state.next_attribute,
        };
        state.next_attribute += 1;

        let mut characteristics = Vec::with_capacity(service.characteristics.len());
        for descriptor in &service.characteristics {
            // declaration + value
            let value_handle = state.next_attribute + 1;
            state.next_attribute += 2;
            characteristics.push(PublishedCharacteristic {
                handle: CharacteristicHandle {
                    id: descriptor.id,
                    handle: value_handle,
                    properties: descriptor.properties,
                },
                value: descriptor.value.clone(),
            });
        }

        state.services.push(PublishedService {
            handle: service_handle,
            characteristics,
        });
        state.to_peripheral(PeripheralEvent::ServicePublished {
            service: service.id,
            result: Ok(()),
        });
        Ok(())
    }

    fn update_value(
        &mut self,
        characteristic: CharacteristicId,
        value: &[u8],
        subscribers: &[SubscriberHandle],
    ) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        let central = state.central_id;
        let link = state.link;
        let peripheral = state.peripheral_id;

        let published = state
            .find_characteristic_by_id(characteristic)
            .ok_or_else(|| TransportError::UnknownAttribute(characteristic.to_string()))?;
        published.value = Some(value.to_vec());
        let handle = published.handle;

        let addressed = subscribers.is_empty() || subscribers.contains(&central);
        if link == Link::Connected && addressed && state.notifying.contains(&handle.handle) {
            state.to_central(CentralEvent::ValueUpdated {
                peripheral,
                characteristic: handle,
                result: Ok(value.to_vec()),
            });
        }
        Ok(())
    }

    fn respond_to_read(
        &mut self,
        request: RequestId,
        status: AttStatus,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.air.inner.lock();
        let characteristic = state
            .pending_reads
            .remove(&request)
            .ok_or(TransportError::UnknownRequest(request))?;

        let result = match status {
            AttStatus::Success => Ok(value.to_vec()),
            other => Err(TransportError::OperationFailed(format!("ATT error: {}", other))),
        };
        let peripheral = state.peripheral_id;
        state.to_central(CentralEvent::ValueUpdated {
            peripheral,
            characteristic,
            result,
        });
        Ok(())
    }
}
