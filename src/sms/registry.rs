use crate::sms::entity::Sms;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::log::warn;

/// How long a multipart SMS can sit waiting for its remaining parts before
/// [`SmsRegistry::cleanup_stalled_receiving`] evicts it.
pub const RECEIVING_STALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Holds every live [`Sms`] object keyed by its RPC path, and hands out new
/// paths. Also indexes in-progress multipart receives by (number, reference)
/// so a part arriving mid-assembly can find the [`Sms`] it belongs to.
#[derive(Default)]
pub struct SmsRegistry {
    by_path: DashMap<String, Arc<Sms>>,
    receiving: DashMap<(String, u8), (String, Instant)>,
    sent: DashMap<(String, u8), String>,
    next_id: AtomicU64,
}
impl SmsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_path(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("/sms/{id}")
    }

    pub fn insert(&self, sms: Arc<Sms>) {
        self.by_path.insert(sms.path().to_string(), sms);
    }

    /// Registers a not-yet-complete multipart receive so later parts for
    /// the same (number, reference) can be routed to it.
    pub fn track_receiving(&self, number: String, reference: u8, sms: Arc<Sms>) {
        let path = sms.path().to_string();
        self.receiving.insert((number, reference), (path, Instant::now()));
        self.insert(sms);
    }

    pub fn find_receiving(&self, number: &str, reference: u8) -> Option<Arc<Sms>> {
        let (path, _) = self.receiving.get(&(number.to_string(), reference))?.clone();
        self.by_path.get(&path).map(|entry| entry.clone())
    }

    /// Stops tracking a multipart receive once it's complete or abandoned,
    /// without removing the [`Sms`] itself from the registry.
    pub fn stop_tracking_receiving(&self, number: &str, reference: u8) {
        self.receiving.remove(&(number.to_string(), reference));
    }

    /// Evicts multipart receives that have sat incomplete for longer than
    /// `max_age`, removing both the tracking entry and the partial [`Sms`]
    /// object itself. Call periodically from a cleanup task.
    pub async fn cleanup_stalled_receiving(&self, max_age: Duration) {
        let stalled: Vec<(String, u8, String)> = self
            .receiving
            .iter()
            .filter(|entry| entry.value().1.elapsed() > max_age)
            .map(|entry| {
                let (number, reference) = entry.key().clone();
                (number, reference, entry.value().0.clone())
            })
            .collect();

        for (number, reference, path) in stalled {
            warn!("Removing stalled multipart SMS from {number} (ref {reference}), path {path}");
            self.receiving.remove(&(number, reference));
            self.by_path.remove(&path);
        }
    }

    /// Records that a number/reference pair has just been sent, so a later
    /// `+CDS` delivery report can be correlated back to this [`Sms`].
    pub fn track_sent(&self, number: String, reference: u8, path: String) {
        self.sent.insert((number, reference), path);
    }

    pub fn find_sent(&self, number: &str, reference: u8) -> Option<Arc<Sms>> {
        let path = self.sent.get(&(number.to_string(), reference))?.clone();
        self.by_path.get(&path).map(|entry| entry.clone())
    }

    pub fn get(&self, path: &str) -> Option<Arc<Sms>> {
        self.by_path.get(path).map(|entry| entry.clone())
    }

    pub fn remove(&self, path: &str) -> Option<Arc<Sms>> {
        self.by_path.remove(path).map(|(_, sms)| sms)
    }

    pub fn list(&self) -> Vec<Arc<Sms>> {
        self.by_path.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::storage_lock::StorageLocks;
    use crate::modem::types::{ModemRequest, ModemResponse};
    use crate::sms::entity::SmsModemHandle;
    use crate::sms::part::SmsPart;
    use crate::sms::storage::{SmsState, Storage};
    use tokio::sync::mpsc;

    fn test_part() -> SmsPart {
        SmsPart {
            index: None,
            concat_reference: 0,
            concat_sequence: 0,
            concat_max: 1,
            number: "+123456789".to_string(),
            smsc: None,
            text: Some("hi".to_string()),
            data: None,
            timestamp: None,
            validity: None,
            class: None,
            delivery_report_request: false,
            pdu_hex: None,
            pdu_len: None,
            smsc_header_len: None,
        }
    }

    fn test_modem() -> Arc<SmsModemHandle> {
        let (tx, _rx) = mpsc::channel::<crate::modem::commands::OutgoingCommand>(1);
        Arc::new(SmsModemHandle {
            sender: crate::modem::sender::ModemSender::new(tx),
            storage_locks: Arc::new(StorageLocks::new()),
            default_write_storage: Storage::Me,
            writable_storages: vec![Storage::Me],
        })
    }

    #[allow(dead_code)]
    fn unused(_r: ModemRequest, _p: ModemResponse) {}

    #[test]
    fn allocates_monotonic_paths() {
        let registry = SmsRegistry::new();
        assert_eq!(registry.allocate_path(), "/sms/0");
        assert_eq!(registry.allocate_path(), "/sms/1");
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let registry = SmsRegistry::new();
        let path = registry.allocate_path();
        let sms = Sms::singlepart_new(path.clone(), test_modem(), SmsState::Unknown, Storage::Unknown, test_part());
        registry.insert(sms);

        assert!(registry.get(&path).is_some());
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(&path);
        assert!(removed.is_some());
        assert!(registry.get(&path).is_none());
    }

    #[test]
    fn tracks_and_finds_receiving_multipart() {
        let registry = SmsRegistry::new();
        let path = registry.allocate_path();
        let sms = Sms::multipart_new(
            path,
            test_modem(),
            SmsState::Receiving,
            Storage::Unknown,
            7,
            3,
            test_part(),
        );
        registry.track_receiving("+123456789".to_string(), 7, sms);

        assert!(registry.find_receiving("+123456789", 7).is_some());
        assert!(registry.find_receiving("+123456789", 8).is_none());

        registry.stop_tracking_receiving("+123456789", 7);
        assert!(registry.find_receiving("+123456789", 7).is_none());
    }
}
