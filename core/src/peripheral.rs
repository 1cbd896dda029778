//! Peripheral role controller
//!
//! Publishes the counter service once the radio powers on, advertises it on
//! request and keeps the authoritative counter. Reads are answered from the
//! encoded buffer; every counter change is pushed to subscribed centrals.

use crate::codec::encode_counter;
use crate::config::PeripheralConfig;
use crate::error::{log_absorbed, ExchangeError, ProtocolMismatch};
use crate::model::{
    AdvertisementData, AttStatus, AttributePermissions, CharacteristicDescriptor,
    CharacteristicProperties, RadioState, ReadRequest, ServiceDescriptor, SubscriberHandle,
};
use crate::transport::{PeripheralEvent, PeripheralTransport};
use std::collections::BTreeSet;
use tracing::{debug, info, info_span, warn, Span};

/// Lifecycle of the published counter service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Unpublished,
    /// Submitted, waiting for the transport to confirm
    Pending,
    Published,
    /// Rejected by the transport; never retried
    Failed,
}

pub struct PeripheralController<T> {
    transport: T,
    config: PeripheralConfig,
    counter: i64,
    value: Vec<u8>,
    subscribers: BTreeSet<SubscriberHandle>,
    publish: PublishState,
    span: Span,
}

impl<T> PeripheralController<T>
where
    T: PeripheralTransport,
{
    pub fn new(transport: T, config: PeripheralConfig) -> Self {
        let span = info_span!("peripheral", service = %config.profile.service_id);
        Self {
            transport,
            config,
            counter: 0,
            value: encode_counter(0).to_vec(),
            subscribers: BTreeSet::new(),
            publish: PublishState::Unpublished,
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn subscribers(&self) -> &BTreeSet<SubscriberHandle> {
        &self.subscribers
    }

    pub fn publish_state(&self) -> PublishState {
        self.publish
    }

    pub fn is_published(&self) -> bool {
        self.publish == PublishState::Published
    }

    pub fn is_advertising(&self) -> bool {
        self.transport.is_advertising()
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn start_advertising(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.transport.is_advertising() {
            debug!("already advertising");
            return;
        }

        let advertisement = AdvertisementData {
            local_name: self.config.local_name.clone(),
            service_ids: vec![self.config.profile.service_id],
        };
        match self.transport.start_advertising(&advertisement) {
            Ok(()) => info!(name = ?advertisement.local_name, "advertising requested"),
            Err(e) => log_absorbed(&ExchangeError::transport("start advertising", e)),
        }
    }

    pub fn stop_advertising(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if !self.transport.is_advertising() {
            debug!("not advertising");
            return;
        }
        match self.transport.stop_advertising() {
            Ok(()) => info!("advertising stopped"),
            Err(e) => log_absorbed(&ExchangeError::transport("stop advertising", e)),
        }
    }

    /// Store a new counter value and push it to subscribers
    pub fn set_counter(&mut self, value: i64) {
        let span = self.span.clone();
        let _enter = span.enter();

        self.counter = value;
        self.value = encode_counter(value).to_vec();

        if self.publish != PublishState::Published {
            debug!(value, "service not published yet, value stored");
            return;
        }

        debug!(value, subscribers = self.subscribers.len(), "pushing counter");
        // Empty subscriber list: the transport fans out to everyone subscribed
        if let Err(e) = self.transport.update_value(
            self.config.profile.characteristic_id,
            &self.value,
            &[],
        ) {
            log_absorbed(&ExchangeError::transport("update value", e));
        }
    }

    pub fn increment(&mut self) -> i64 {
        let next = self.counter.wrapping_add(1);
        self.set_counter(next);
        next
    }

    pub fn handle_event(&mut self, event: PeripheralEvent) {
        let span = self.span.clone();
        let _enter = span.enter();
        debug!(%event, "transport event");

        match event {
            PeripheralEvent::RadioStateChanged(radio) => self.on_radio_state(radio),
            PeripheralEvent::ServicePublished { service, result } => match result {
                Ok(()) => {
                    info!(%service, "service published");
                    self.publish = PublishState::Published;
                }
                Err(e) => {
                    log_absorbed(&ExchangeError::transport("publish service", e));
                    self.publish = PublishState::Failed;
                }
            },
            PeripheralEvent::AdvertisingStarted(result) => match result {
                Ok(()) => info!("advertising started"),
                Err(e) => log_absorbed(&ExchangeError::transport("start advertising", e)),
            },
            PeripheralEvent::ReadRequested(request) => self.on_read_request(request),
            PeripheralEvent::Subscribed {
                central,
                characteristic,
            } => {
                info!(%central, %characteristic, "central subscribed");
                self.subscribers.insert(central);
            }
            PeripheralEvent::Unsubscribed {
                central,
                characteristic,
            } => {
                info!(%central, %characteristic, "central unsubscribed");
                self.subscribers.remove(&central);
            }
        }
    }

    fn on_radio_state(&mut self, radio: RadioState) {
        if !radio.is_powered_on() {
            log_absorbed(&ExchangeError::RadioUnavailable(radio));
            // The stack forgets published services and subscriptions on power loss
            if matches!(self.publish, PublishState::Pending | PublishState::Published) {
                self.publish = PublishState::Unpublished;
            }
            self.subscribers.clear();
            return;
        }

        info!("radio powered on");
        match self.publish {
            PublishState::Unpublished => self.publish_service(),
            PublishState::Failed => warn!("service publication failed earlier, not retrying"),
            PublishState::Pending | PublishState::Published => {}
        }
    }

    fn publish_service(&mut self) {
        let service = ServiceDescriptor {
            id: self.config.profile.service_id,
            primary: true,
            characteristics: vec![CharacteristicDescriptor {
                id: self.config.profile.characteristic_id,
                properties: CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
                permissions: AttributePermissions::READABLE,
                value: Some(self.value.clone()),
            }],
        };

        match self.transport.publish_service(&service) {
            Ok(()) => {
                debug!(service = %service.id, "publishing service");
                self.publish = PublishState::Pending;
            }
            Err(e) => {
                log_absorbed(&ExchangeError::transport("publish service", e));
                self.publish = PublishState::Failed;
            }
        }
    }

    fn on_read_request(&mut self, request: ReadRequest) {
        let expected = self.config.profile.characteristic_id;
        if request.characteristic != expected {
            log_absorbed(&ExchangeError::from(
                ProtocolMismatch::UnexpectedCharacteristic {
                    expected,
                    actual: request.characteristic,
                },
            ));
            return;
        }

        let length = self.value.len();
        if request.offset > length {
            log_absorbed(&ExchangeError::from(ProtocolMismatch::InvalidReadOffset {
                offset: request.offset,
                length,
            }));
            if self.config.reject_invalid_offset {
                self.respond(&request, AttStatus::InvalidOffset, 0);
            }
            return;
        }

        self.respond(&request, AttStatus::Success, request.offset);
    }

    fn respond(&mut self, request: &ReadRequest, status: AttStatus, offset: usize) {
        let value = if status == AttStatus::Success {
            &self.value[offset..]
        } else {
            &[][..]
        };
        debug!(request = request.id.0, central = %request.central, %status, len = value.len(), "answering read");
        if let Err(e) = self.transport.respond_to_read(request.id, status, value) {
            log_absorbed(&ExchangeError::transport("respond to read", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CharacteristicId, COUNTER_CHARACTERISTIC_ID, COUNTER_SERVICE_ID};
    use crate::model::RequestId;
    use crate::transport::{MockPeripheralTransport, TransportError};
    use mockall::Sequence;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn published(
        mut transport: MockPeripheralTransport,
    ) -> PeripheralController<MockPeripheralTransport> {
        transport.expect_publish_service().times(1).returning(|_| Ok(()));
        let mut peripheral = PeripheralController::new(transport, PeripheralConfig::default());
        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        peripheral.handle_event(PeripheralEvent::ServicePublished {
            service: COUNTER_SERVICE_ID,
            result: Ok(()),
        });
        peripheral
    }

    fn read(offset: usize) -> ReadRequest {
        ReadRequest {
            id: RequestId(7),
            central: SubscriberHandle::random(),
            characteristic: COUNTER_CHARACTERISTIC_ID,
            offset,
        }
    }

    #[test]
    fn test_power_on_publishes_counter_service() {
        let mut transport = MockPeripheralTransport::new();
        transport
            .expect_publish_service()
            .withf(|service| {
                let chr = &service.characteristics[0];
                service.id == COUNTER_SERVICE_ID
                    && service.primary
                    && service.characteristics.len() == 1
                    && chr.id == COUNTER_CHARACTERISTIC_ID
                    && chr.properties
                        == CharacteristicProperties::READ | CharacteristicProperties::NOTIFY
                    && chr.permissions == AttributePermissions::READABLE
                    && chr.value.as_deref() == Some(&encode_counter(5)[..])
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut peripheral = PeripheralController::new(transport, PeripheralConfig::default());
        peripheral.set_counter(5);
        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        assert_eq!(peripheral.publish_state(), PublishState::Pending);

        // Powering on again while pending must not republish
        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        peripheral.handle_event(PeripheralEvent::ServicePublished {
            service: COUNTER_SERVICE_ID,
            result: Ok(()),
        });
        assert!(peripheral.is_published());
    }

    #[test]
    fn test_publish_failure_is_terminal() {
        let mut transport = MockPeripheralTransport::new();
        transport.expect_publish_service().times(1).returning(|_| Ok(()));
        transport.expect_update_value().times(0);

        let mut peripheral = PeripheralController::new(transport, PeripheralConfig::default());
        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        peripheral.handle_event(PeripheralEvent::ServicePublished {
            service: COUNTER_SERVICE_ID,
            result: Err(TransportError::OperationFailed("database full".to_string())),
        });
        assert_eq!(peripheral.publish_state(), PublishState::Failed);

        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOff));
        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        peripheral.set_counter(3);
        assert_eq!(peripheral.counter(), 3);
    }

    #[test]
    fn test_power_cycle_republishes_current_value() {
        let seeded = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut transport = MockPeripheralTransport::new();
        let record = seeded.clone();
        transport
            .expect_publish_service()
            .times(2)
            .returning(move |service| {
                record.lock().push(service.characteristics[0].value.clone());
                Ok(())
            });
        transport.expect_update_value().returning(|_, _, _| Ok(()));

        let mut peripheral = PeripheralController::new(transport, PeripheralConfig::default());
        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        peripheral.handle_event(PeripheralEvent::ServicePublished {
            service: COUNTER_SERVICE_ID,
            result: Ok(()),
        });
        peripheral.handle_event(PeripheralEvent::Subscribed {
            central: SubscriberHandle::random(),
            characteristic: COUNTER_CHARACTERISTIC_ID,
        });
        peripheral.set_counter(8);

        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOff));
        assert_eq!(peripheral.publish_state(), PublishState::Unpublished);
        assert!(peripheral.subscribers().is_empty());

        peripheral.handle_event(PeripheralEvent::RadioStateChanged(RadioState::PoweredOn));
        assert_eq!(peripheral.publish_state(), PublishState::Pending);
        assert_eq!(
            *seeded.lock(),
            vec![Some(encode_counter(0).to_vec()), Some(encode_counter(8).to_vec())]
        );
    }

    #[test]
    fn test_counter_updates_push_encoded_values() {
        let mut transport = MockPeripheralTransport::new();
        let mut seq = Sequence::new();
        for value in 0..3i64 {
            transport
                .expect_update_value()
                .withf(move |id, bytes, subscribers| {
                    *id == COUNTER_CHARACTERISTIC_ID
                        && bytes == encode_counter(value).as_slice()
                        && subscribers.is_empty()
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }

        let mut peripheral = published(transport);
        peripheral.set_counter(0);
        peripheral.set_counter(1);
        peripheral.set_counter(2);
        assert_eq!(peripheral.counter(), 2);
    }

    #[test]
    fn test_increment_wraps() {
        let mut transport = MockPeripheralTransport::new();
        transport.expect_update_value().returning(|_, _, _| Ok(()));
        let mut peripheral = published(transport);

        peripheral.set_counter(i64::MAX);
        assert_eq!(peripheral.increment(), i64::MIN);
    }

    #[test]
    fn test_read_returns_tail_from_offset() {
        let mut transport = MockPeripheralTransport::new();
        transport
            .expect_respond_to_read()
            .withf(|id, status, value| {
                *id == RequestId(7)
                    && *status == AttStatus::Success
                    && value == &encode_counter(0x0102)[2..]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        transport.expect_update_value().returning(|_, _, _| Ok(()));

        let mut peripheral = published(transport);
        peripheral.set_counter(0x0102);
        peripheral.handle_event(PeripheralEvent::ReadRequested(read(2)));
    }

    #[test]
    fn test_read_at_end_returns_empty_success() {
        let mut transport = MockPeripheralTransport::new();
        transport
            .expect_respond_to_read()
            .withf(|_, status, value| *status == AttStatus::Success && value.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut peripheral = published(transport);
        peripheral.handle_event(PeripheralEvent::ReadRequested(read(8)));
    }

    #[test]
    fn test_read_past_end_is_unanswered() {
        let mut transport = MockPeripheralTransport::new();
        transport.expect_respond_to_read().times(0);

        let mut peripheral = published(transport);
        peripheral.handle_event(PeripheralEvent::ReadRequested(read(9)));
    }

    #[test]
    fn test_read_past_end_rejected_when_configured() {
        let mut transport = MockPeripheralTransport::new();
        transport
            .expect_respond_to_read()
            .withf(|id, status, value| {
                *id == RequestId(7) && *status == AttStatus::InvalidOffset && value.is_empty()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let config = PeripheralConfig::default().with_reject_invalid_offset(true);
        let mut peripheral = PeripheralController::new(transport, config);
        peripheral.handle_event(PeripheralEvent::ReadRequested(read(12)));
    }

    #[test]
    fn test_read_for_other_characteristic_is_unanswered() {
        let mut transport = MockPeripheralTransport::new();
        transport.expect_respond_to_read().times(0);

        let mut peripheral = published(transport);
        peripheral.handle_event(PeripheralEvent::ReadRequested(ReadRequest {
            characteristic: CharacteristicId::from_u16(0x2A00),
            ..read(0)
        }));
    }

    #[test]
    fn test_advertising_is_guarded() {
        let advertising = Arc::new(AtomicBool::new(false));
        let mut transport = MockPeripheralTransport::new();
        let flag = advertising.clone();
        transport
            .expect_is_advertising()
            .returning(move || flag.load(Ordering::SeqCst));
        let flag = advertising.clone();
        transport
            .expect_start_advertising()
            .withf(|adv| {
                adv.service_ids == vec![COUNTER_SERVICE_ID]
                    && adv.local_name.as_deref() == Some("BLE-COUNTER")
            })
            .times(1)
            .returning(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
        let flag = advertising.clone();
        transport.expect_stop_advertising().times(1).returning(move || {
            flag.store(false, Ordering::SeqCst);
            Ok(())
        });

        let mut peripheral = PeripheralController::new(transport, PeripheralConfig::default());
        peripheral.start_advertising();
        peripheral.start_advertising();
        assert!(peripheral.is_advertising());
        peripheral.stop_advertising();
        peripheral.stop_advertising();
        assert!(!peripheral.is_advertising());
    }

    #[test]
    fn test_subscription_mirror() {
        let mut peripheral =
            PeripheralController::new(MockPeripheralTransport::new(), PeripheralConfig::default());
        let a = SubscriberHandle::random();
        let b = SubscriberHandle::random();

        for central in [a, b, a] {
            peripheral.handle_event(PeripheralEvent::Subscribed {
                central,
                characteristic: COUNTER_CHARACTERISTIC_ID,
            });
        }
        assert_eq!(peripheral.subscribers().len(), 2);

        peripheral.handle_event(PeripheralEvent::Unsubscribed {
            central: a,
            characteristic: COUNTER_CHARACTERISTIC_ID,
        });
        assert_eq!(peripheral.subscribers().iter().copied().collect::<Vec<_>>(), vec![b]);
    }
}
