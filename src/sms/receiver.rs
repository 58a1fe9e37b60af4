use crate::events::{Event, EventBroadcaster};
use crate::modem::types::{IncomingPduMessage, ModemIncomingMessage, PartialDeliveryReport};
use crate::sms::entity::{Sms, SmsModemHandle};
use crate::sms::part::SmsPart;
use crate::sms::registry::SmsRegistry;
use crate::sms::storage::{SmsState, Storage};
use std::sync::Arc;
use tracing::log::{debug, warn};

/// Turns `+CMT`/`+CDS` unsolicited notifications from the modem into
/// registry-visible [`Sms`] objects and broadcast [`Event`]s. Multipart
/// assembly is delegated to [`Sms::take_part`] rather than a standalone
/// buffer keyed by hash map.
#[derive(Clone)]
pub struct SmsReceiver {
    registry: Arc<SmsRegistry>,
    modem: Arc<SmsModemHandle>,
    broadcaster: Option<EventBroadcaster>,
}
impl SmsReceiver {
    pub fn new(
        registry: Arc<SmsRegistry>,
        modem: Arc<SmsModemHandle>,
        broadcaster: Option<EventBroadcaster>,
    ) -> Self {
        Self { registry, modem, broadcaster }
    }

    pub async fn handle_modem_message(&self, message: ModemIncomingMessage) {
        match message {
            ModemIncomingMessage::IncomingSMS(incoming) => self.handle_incoming_sms(incoming).await,
            ModemIncomingMessage::DeliveryReport(report) => self.handle_delivery_report(report).await,
            ModemIncomingMessage::ModemStatusUpdate { previous, current } => {
                if let Some(broadcaster) = &self.broadcaster {
                    broadcaster.broadcast(Event::ModemStatusUpdate { previous, current }).await;
                }
            }
        }
    }

    async fn handle_incoming_sms(&self, incoming: IncomingPduMessage) {
        let number = incoming.phone_number.clone();
        let delivery_report_request = incoming.delivery_report_request;
        let part = SmsPart {
            index: None,
            concat_reference: incoming.user_data_header.map(|h| h.reference).unwrap_or(0),
            concat_sequence: incoming.user_data_header.map(|h| h.index).unwrap_or(0),
            concat_max: incoming.user_data_header.map(|h| h.total).unwrap_or(1),
            number: number.clone(),
            smsc: incoming.smsc,
            text: incoming.content,
            data: incoming.data,
            timestamp: incoming.timestamp,
            validity: None,
            class: None,
            delivery_report_request,
            pdu_hex: None,
            pdu_len: None,
            smsc_header_len: None,
        };

        let sms = match incoming.user_data_header {
            None => {
                let path = self.registry.allocate_path();
                let sms = Sms::singlepart_new(path, self.modem.clone(), SmsState::Received, Storage::Unknown, part);
                self.registry.insert(sms.clone());
                sms
            }
            Some(header) if header.total <= 1 => {
                let path = self.registry.allocate_path();
                let sms = Sms::singlepart_new(path, self.modem.clone(), SmsState::Received, Storage::Unknown, part);
                self.registry.insert(sms.clone());
                sms
            }
            Some(header) => match self.registry.find_receiving(&number, header.reference) {
                Some(existing) => match existing.take_part(part).await {
                    Ok(true) => {
                        self.registry.stop_tracking_receiving(&number, header.reference);
                        existing
                    }
                    Ok(false) => {
                        debug!("Received part {}/{} for multipart SMS from {number}", header.index, header.total);
                        return;
                    }
                    Err(e) => {
                        warn!("Rejected incoming multipart part from {number}: {e}");
                        return;
                    }
                },
                None => {
                    let path = self.registry.allocate_path();
                    let sms = Sms::multipart_new(
                        path,
                        self.modem.clone(),
                        SmsState::Receiving,
                        Storage::Unknown,
                        header.reference,
                        header.total,
                        part,
                    );
                    debug!(
                        "Started tracking new multipart SMS from {number}, expecting {} parts",
                        header.total
                    );
                    self.registry.track_receiving(number.clone(), header.reference, sms);
                    return;
                }
            },
        };

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(Event::IncomingMessage(sms.snapshot().await)).await;
        }
    }

    async fn handle_delivery_report(&self, report: PartialDeliveryReport) {
        let path = match self.registry.find_sent(&report.phone_number, report.reference_id) {
            Some(sms) => sms.path().to_string(),
            None => {
                warn!(
                    "Got a delivery report for {} (ref {}) with no matching sent SMS",
                    report.phone_number, report.reference_id
                );
                return;
            }
        };

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(Event::DeliveryReport { path, report }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::storage_lock::StorageLocks;
    use crate::modem::types::ConcatenationHeader;
    use tokio::sync::mpsc;

    fn test_modem() -> Arc<SmsModemHandle> {
        let (tx, _rx) = mpsc::channel::<crate::modem::commands::OutgoingCommand>(1);
        Arc::new(SmsModemHandle {
            sender: crate::modem::sender::ModemSender::new(tx),
            storage_locks: Arc::new(StorageLocks::new()),
            default_write_storage: Storage::Me,
            writable_storages: vec![Storage::Me],
        })
    }

    fn incoming(number: &str, text: &str, header: Option<ConcatenationHeader>) -> IncomingPduMessage {
        IncomingPduMessage {
            phone_number: number.to_string(),
            smsc: None,
            timestamp: None,
            content: Some(text.to_string()),
            data: None,
            user_data_header: header,
            delivery_report_request: false,
        }
    }

    #[tokio::test]
    async fn singlepart_incoming_registers_immediately() {
        let registry = Arc::new(SmsRegistry::new());
        let receiver = SmsReceiver::new(registry.clone(), test_modem(), None);

        receiver.handle_modem_message(ModemIncomingMessage::IncomingSMS(incoming("+1", "hi", None))).await;
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn multipart_incoming_waits_for_all_parts() {
        let registry = Arc::new(SmsRegistry::new());
        let receiver = SmsReceiver::new(registry.clone(), test_modem(), None);

        let h = |index| ConcatenationHeader { reference: 5, total: 2, index };
        receiver
            .handle_modem_message(ModemIncomingMessage::IncomingSMS(incoming("+1", "part one ", Some(h(1)))))
            .await;
        assert_eq!(registry.len(), 1);
        assert!(registry.find_receiving("+1", 5).is_some());

        receiver
            .handle_modem_message(ModemIncomingMessage::IncomingSMS(incoming("+1", "part two", Some(h(2)))))
            .await;
        assert_eq!(registry.len(), 1);
        assert!(registry.find_receiving("+1", 5).is_none());

        let sms = registry.list().into_iter().next().unwrap();
        assert_eq!(sms.state().await, SmsState::Received);
        assert_eq!(sms.text().await.as_deref(), Some("part one part two"));
    }
}
