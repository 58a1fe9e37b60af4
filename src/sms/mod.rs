#![cfg_attr(not(feature = "http-server"), allow(dead_code))]

pub mod assembler;
pub mod codec;
pub mod entity;
pub mod error;
pub mod part;
pub mod receiver;
pub mod registry;
pub mod storage;

use crate::events::{Event, EventBroadcaster};
use crate::modem::sender::ModemSender;
use crate::modem::storage_lock::StorageLocks;
use crate::modem::types::{ModemRequest, ModemResponse};
use crate::sms::entity::{OutgoingProperties, Sms, SmsModemHandle};
use crate::sms::error::SmsError;
use crate::sms::receiver::SmsReceiver;
use crate::sms::registry::SmsRegistry;
use crate::sms::storage::Storage;
use anyhow::Result;
use std::sync::Arc;
use tracing::log::warn;

/// Top-level façade over the SMS object model. Owns the path registry and
/// the modem handle every [`Sms`] shares, and drives the bookkeeping a
/// single object's command sequence doesn't know about on its own: sent
/// message reference indexing and event broadcast.
#[derive(Clone)]
pub struct SmsService {
    registry: Arc<SmsRegistry>,
    modem: Arc<SmsModemHandle>,
    broadcaster: Option<EventBroadcaster>,
}
impl SmsService {
    pub async fn connect(modem_sender: ModemSender, broadcaster: Option<EventBroadcaster>) -> Result<Self> {
        let writable_storages = Self::discover_storages(&modem_sender).await;
        let modem = Arc::new(SmsModemHandle {
            sender: modem_sender,
            storage_locks: Arc::new(StorageLocks::new()),
            default_write_storage: writable_storages.first().copied().unwrap_or(Storage::Me),
            writable_storages,
        });

        Ok(Self {
            registry: Arc::new(SmsRegistry::new()),
            modem,
            broadcaster,
        })
    }

    async fn discover_storages(modem_sender: &ModemSender) -> Vec<Storage> {
        match modem_sender.send_request(ModemRequest::QueryStorageCapabilities, None).await {
            Ok(ModemResponse::StorageCapabilities(names)) => {
                let storages: Vec<Storage> = names.iter().filter_map(|n| Storage::from_at_str(n)).collect();
                if storages.is_empty() {
                    warn!("Modem reported no writable SMS storages, defaulting to ME");
                    vec![Storage::Me]
                } else {
                    storages
                }
            }
            other => {
                warn!("Could not query modem storage capabilities ({other:?}), defaulting to ME");
                vec![Storage::Me]
            }
        }
    }

    pub fn receiver(&self) -> SmsReceiver {
        SmsReceiver::new(self.registry.clone(), self.modem.clone(), self.broadcaster.clone())
    }

    pub fn registry(&self) -> Arc<SmsRegistry> {
        self.registry.clone()
    }

    /// Builds and registers a new outgoing SMS without storing or sending it.
    pub fn create(&self, props: OutgoingProperties) -> Result<Arc<Sms>, SmsError> {
        let path = self.registry.allocate_path();
        let sms = Sms::from_properties(path, self.modem.clone(), props)?;
        self.registry.insert(sms.clone());
        Ok(sms)
    }

    pub fn get(&self, path: &str) -> Option<Arc<Sms>> {
        self.registry.get(path)
    }

    pub fn list(&self) -> Vec<Arc<Sms>> {
        self.registry.list()
    }

    pub async fn store(&self, sms: &Arc<Sms>, storage: Storage) -> Result<(), SmsError> {
        sms.store(storage).await
    }

    pub async fn send(&self, sms: &Arc<Sms>) -> Result<(), SmsError> {
        sms.send().await?;

        if let Some(reference) = sms.sent_reference().await {
            self.registry.track_sent(sms.number().await, reference, sms.path().to_string());
        }
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(Event::OutgoingMessage(sms.snapshot().await)).await;
        }
        Ok(())
    }

    pub async fn delete(&self, sms: &Arc<Sms>) -> Result<(), SmsError> {
        sms.delete().await?;
        self.registry.remove(sms.path());
        Ok(())
    }
}
