use crate::modem::sender::ModemSender;
use crate::modem::storage_lock::StorageLocks;
use crate::modem::types::{ModemRequest, ModemResponse};
use crate::sms::assembler::{assemble, Assembled};
use crate::sms::codec::build_outgoing_parts;
use crate::sms::error::SmsError;
use crate::sms::part::SmsPart;
use crate::sms::storage::{SmsState, Storage};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::log::{debug, warn};

pub fn random_concat_reference() -> u8 {
    rand::rng().random_range(1..=254)
}

/// The modem-facing collaborators an [`Sms`] needs to actually run its
/// command sequences: the command transport and the storage bank locks,
/// plus which storages this modem has told us it can write to.
pub struct SmsModemHandle {
    pub sender: ModemSender,
    pub storage_locks: Arc<StorageLocks>,
    pub default_write_storage: Storage,
    pub writable_storages: Vec<Storage>,
}
impl SmsModemHandle {
    pub fn supports_storage(&self, storage: Storage) -> bool {
        self.writable_storages.iter().any(|s| *s == storage)
    }
}

/// Properties supplied by a caller composing a new outgoing SMS.
#[derive(Debug, Clone, Default)]
pub struct OutgoingProperties {
    pub number: Option<String>,
    pub text: Option<String>,
    pub data: Option<Vec<u8>>,
    pub flash: bool,
    pub validity: Option<u8>,
}

struct SmsInner {
    parts: Vec<SmsPart>,
    storage: Storage,
    state: SmsState,
    assembled: Option<Assembled>,
    /// `AT+CMGS`/`AT+CMSS` message reference, kept around so a later
    /// `+CDS` delivery report for this number can be correlated back.
    sent_reference: Option<u8>,
}

/// An SMS object as ModemManager's mm-sms.c models it: a path-addressable
/// aggregate over one or more [`SmsPart`]s, carrying its own lifecycle state
/// and capable of driving its own store/send/delete command sequences.
pub struct Sms {
    path: String,
    modem: Arc<SmsModemHandle>,
    is_multipart: bool,
    multipart_reference: Option<u8>,
    max_parts: u8,
    inner: AsyncMutex<SmsInner>,
}
impl Sms {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_multipart(&self) -> bool {
        self.is_multipart
    }

    pub async fn state(&self) -> SmsState {
        self.inner.lock().await.state
    }

    pub async fn storage(&self) -> Storage {
        self.inner.lock().await.storage
    }

    pub async fn sent_reference(&self) -> Option<u8> {
        self.inner.lock().await.sent_reference
    }

    pub async fn text(&self) -> Option<String> {
        self.inner.lock().await.assembled.as_ref().and_then(|a| a.text.clone())
    }

    pub async fn number(&self) -> String {
        self.inner.lock().await.assembled.as_ref().map(|a| a.number.clone()).unwrap_or_default()
    }

    pub async fn parts(&self) -> Vec<SmsPart> {
        self.inner.lock().await.parts.clone()
    }

    pub async fn snapshot(&self) -> crate::events::SmsSnapshot {
        let guard = self.inner.lock().await;
        crate::events::SmsSnapshot {
            path: self.path.clone(),
            number: guard.assembled.as_ref().map(|a| a.number.clone()).unwrap_or_default(),
            text: guard.assembled.as_ref().and_then(|a| a.text.clone()),
            is_multipart: self.is_multipart,
            state: guard.state,
            storage: guard.storage,
        }
    }

    // ---- Factories -----------------------------------------------------

    pub fn singlepart_new(
        path: String,
        modem: Arc<SmsModemHandle>,
        state: SmsState,
        storage: Storage,
        part: SmsPart,
    ) -> Arc<Self> {
        let parts = vec![part];
        let assembled = assemble(&parts, 1).ok();
        Arc::new(Self {
            path,
            modem,
            is_multipart: false,
            multipart_reference: None,
            max_parts: 1,
            inner: AsyncMutex::new(SmsInner { parts, storage, state, assembled, sent_reference: None }),
        })
    }

    pub fn multipart_new(
        path: String,
        modem: Arc<SmsModemHandle>,
        state: SmsState,
        storage: Storage,
        reference: u8,
        max_parts: u8,
        first_part: SmsPart,
    ) -> Arc<Self> {
        let state = if state == SmsState::Received { SmsState::Receiving } else { state };
        Arc::new(Self {
            path,
            modem,
            is_multipart: true,
            multipart_reference: Some(reference),
            max_parts,
            inner: AsyncMutex::new(SmsInner {
                parts: vec![first_part],
                storage,
                state,
                assembled: None,
                sent_reference: None,
            }),
        })
    }

    /// Builds an outgoing SMS from caller-supplied properties, splitting
    /// the text into as many parts as required and pre-rendering each
    /// part's submit-PDU.
    pub fn from_properties(
        path: String,
        modem: Arc<SmsModemHandle>,
        props: OutgoingProperties,
    ) -> Result<Arc<Self>, SmsError> {
        let number = props.number.clone().ok_or(SmsError::MissingNumber)?;
        if props.text.is_none() && props.data.is_none() {
            return Err(SmsError::MissingContent);
        }

        if let Some(data) = props.data {
            let part = SmsPart {
                index: None,
                concat_reference: 0,
                concat_sequence: 0,
                concat_max: 1,
                number,
                smsc: None,
                text: None,
                data: Some(data),
                timestamp: None,
                validity: props.validity,
                class: None,
                delivery_report_request: true,
                pdu_hex: None,
                pdu_len: None,
                smsc_header_len: None,
            };
            return Ok(Self::singlepart_new(path, modem, SmsState::Unknown, Storage::Unknown, part));
        }

        let text = props.text.expect("checked above");
        let mut parts = build_outgoing_parts(&number, &text, props.flash, props.validity)
            .map_err(SmsError::Transport)?;

        if parts.len() == 1 {
            let part = parts.pop().expect("len checked");
            return Ok(Self::singlepart_new(path, modem, SmsState::Unknown, Storage::Unknown, part));
        }

        let max = parts.len() as u8;
        let reference = parts[0].concat_reference;
        let mut remaining = parts.split_off(1);
        let first = parts.pop().expect("len checked");

        let sms = Self::multipart_new(path, modem, SmsState::Unknown, Storage::Unknown, reference, max, first);
        {
            // Safe: `sms` isn't shared beyond this function yet, so a
            // synchronous try_lock can't contend.
            let mut guard = sms.inner.try_lock().expect("sms not yet shared");
            guard.parts.append(&mut remaining);
            if let Ok(assembled) = assemble(&guard.parts, max) {
                guard.assembled = Some(assembled);
            }
        }
        Ok(sms)
    }

    // ---- Operations ------------------------------------------------------

    /// Adds a received part to a multipart SMS still in the `Receiving`
    /// state. Returns `Ok(true)` once every part has arrived and the
    /// message has transitioned to `Received`.
    pub async fn take_part(&self, part: SmsPart) -> Result<bool, SmsError> {
        if !self.is_multipart {
            return Err(SmsError::NotMultipart);
        }

        let mut guard = self.inner.lock().await;
        if guard.parts.len() as u8 >= self.max_parts {
            return Err(SmsError::Saturated { max: self.max_parts });
        }

        let sequence = part.concat_sequence;
        if sequence == 0 || sequence > self.max_parts {
            return Err(SmsError::SequenceOutOfRange { sequence, max: self.max_parts });
        }
        if guard.parts.iter().any(|p| p.concat_sequence == sequence) {
            return Err(SmsError::DuplicateSequence { sequence });
        }

        guard.parts.push(part);
        if guard.parts.len() as u8 == self.max_parts {
            let assembled = assemble(&guard.parts, self.max_parts)?;
            guard.assembled = Some(assembled);
            guard.state = SmsState::Received;
            return Ok(true);
        }

        Ok(false)
    }

    pub fn multipart_reference(&self) -> Option<u8> {
        self.multipart_reference
    }

    /// Writes every not-yet-stored part to the modem via `AT+CMGW`, picking
    /// up from whichever parts already carry a storage index so a retry
    /// after a partial failure doesn't re-store what already succeeded.
    pub async fn store(&self, requested: Storage) -> Result<(), SmsError> {
        let mut guard = self.inner.lock().await;

        let storage = if requested == Storage::Unknown { self.modem.default_write_storage } else { requested };

        // Already stored: matching the current bank is a no-op success,
        // storing into a different bank is an error.
        if guard.storage != Storage::Unknown {
            if guard.storage == storage {
                return Ok(());
            }
            return Err(SmsError::AlreadyStoredElsewhere { current: guard.storage });
        }

        if !self.modem.supports_storage(storage) {
            return Err(SmsError::UnsupportedStorage { requested: storage });
        }

        let _lock = self.modem.storage_locks.lock_write().await;
        for part in guard.parts.iter_mut() {
            if part.is_stored() {
                continue;
            }

            let (pdu, len) = part
                .pdu_hex
                .clone()
                .zip(part.pdu_len)
                .ok_or_else(|| SmsError::Transport(anyhow::anyhow!("part has no rendered PDU to store")))?;

            let response = self
                .modem
                .sender
                .send_request(ModemRequest::WriteSMS { len, pdu }, None)
                .await
                .map_err(SmsError::Transport)?;

            match response {
                ModemResponse::StoreResult(index) => part.index = Some(index),
                ModemResponse::Error(message) => return Err(SmsError::Transport(anyhow::anyhow!(message))),
                other => {
                    return Err(SmsError::Transport(anyhow::anyhow!(
                        "unexpected modem response to WriteSMS: {other}"
                    )))
                }
            }
        }

        guard.storage = storage;
        if guard.state == SmsState::Unknown {
            guard.state = SmsState::Stored;
        }
        Ok(())
    }

    /// Sends every part. If the SMS is already fully stored, drives the
    /// "from storage" path via `AT+CMSS` per part (mode A); otherwise sends
    /// the rendered PDU directly via `AT+CMGS` (mode B). If a stored send
    /// fails, falls back to a direct generic send for that part and every
    /// part after it, rather than failing the whole operation.
    pub async fn send(&self) -> Result<(), SmsError> {
        let mut guard = self.inner.lock().await;
        if guard.state.is_received() {
            return Err(SmsError::CannotSendReceived);
        }

        let fully_stored = !guard.parts.is_empty() && guard.parts.iter().all(SmsPart::is_stored);
        guard.state = SmsState::Sending;

        // Held for the whole sequence since a stored-send failure may fall
        // back to a generic send mid-loop, which needs the write bank too.
        let _lock = if fully_stored {
            self.modem.storage_locks.lock_both().await
        } else {
            self.modem.storage_locks.lock_write().await
        };

        let mut using_storage = fully_stored;
        for i in 0..guard.parts.len() {
            let part = &guard.parts[i];
            let mut response = if using_storage {
                self.modem
                    .sender
                    .send_request(ModemRequest::SendStored { index: part.index.expect("fully_stored checked") }, None)
                    .await
                    .map_err(SmsError::Transport)?
            } else {
                Self::send_part_generic(&self.modem, part).await?
            };

            if using_storage {
                if let ModemResponse::Error(message) = &response {
                    debug!("AT+CMSS failed ({message}), trying generic send for remaining parts");
                    using_storage = false;
                    response = Self::send_part_generic(&self.modem, part).await?;
                }
            }

            match response {
                ModemResponse::SendResult(reference) => guard.sent_reference = Some(reference),
                ModemResponse::Ok => {}
                ModemResponse::Error(message) => {
                    // Parts keep whatever storage index they already had
                    // regardless of which mode this particular send used.
                    guard.state = if fully_stored { SmsState::Stored } else { SmsState::Unknown };
                    return Err(SmsError::Transport(anyhow::anyhow!(message)));
                }
                other => {
                    guard.state = if fully_stored { SmsState::Stored } else { SmsState::Unknown };
                    return Err(SmsError::Transport(anyhow::anyhow!(
                        "unexpected modem response to send: {other}"
                    )));
                }
            }
        }

        guard.state = SmsState::Sent;
        Ok(())
    }

    /// Sends a part's rendered PDU directly via `AT+CMGS`, bypassing storage.
    async fn send_part_generic(modem: &SmsModemHandle, part: &SmsPart) -> Result<ModemResponse, SmsError> {
        let (pdu, len) = part
            .pdu_hex
            .clone()
            .zip(part.pdu_len)
            .ok_or_else(|| SmsError::Transport(anyhow::anyhow!("part has no rendered PDU to send")))?;
        modem
            .sender
            .send_request(ModemRequest::SendSMS { len, pdu }, None)
            .await
            .map_err(SmsError::Transport)
    }

    /// Deletes every stored part via `AT+CMGD`, aggregating any failures
    /// rather than aborting on the first one so a retry doesn't re-attempt
    /// parts that already deleted cleanly.
    pub async fn delete(&self) -> Result<(), SmsError> {
        let mut guard = self.inner.lock().await;
        let stored: Vec<usize> = guard
            .parts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_stored())
            .map(|(i, _)| i)
            .collect();

        if stored.is_empty() {
            guard.storage = Storage::Unknown;
            guard.state = SmsState::Unknown;
            return Ok(());
        }

        let _lock = self.modem.storage_locks.lock_read().await;
        let total = stored.len();
        let mut failed = 0usize;
        for idx in stored {
            let index = guard.parts[idx].index.expect("filtered above");
            let response = self
                .modem
                .sender
                .send_request(ModemRequest::DeleteStored { index }, None)
                .await;

            match response {
                Ok(ModemResponse::Ok) => guard.parts[idx].index = None,
                Ok(ModemResponse::Error(message)) => {
                    warn!("Failed to delete part at storage index {index}: {message}");
                    failed += 1;
                }
                Ok(other) => {
                    warn!("Unexpected modem response deleting part at index {index}: {other}");
                    failed += 1;
                }
                Err(e) => {
                    warn!("Transport error deleting part at storage index {index}: {e}");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(SmsError::PartialDeleteFailure { failed, total });
        }

        guard.storage = Storage::Unknown;
        guard.state = SmsState::Unknown;
        debug!("Sms {} fully deleted", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::commands::OutgoingCommand;
    use tokio::sync::mpsc;

    fn part(text: &str) -> SmsPart {
        SmsPart {
            index: None,
            concat_reference: 0,
            concat_sequence: 0,
            concat_max: 1,
            number: "+123456789".to_string(),
            smsc: None,
            text: Some(text.to_string()),
            data: None,
            timestamp: None,
            validity: None,
            class: None,
            delivery_report_request: false,
            pdu_hex: Some("0001000B91214365870900".to_string()),
            pdu_len: Some(23),
            smsc_header_len: Some(1),
        }
    }

    /// Spawns a fake modem worker that answers every request with whatever
    /// `respond` returns, so `Sms` operations can be driven without a real
    /// transport.
    fn mock_modem(mut respond: impl FnMut(ModemRequest) -> ModemResponse + Send + 'static) -> Arc<SmsModemHandle> {
        let (tx, mut rx) = mpsc::channel::<OutgoingCommand>(8);
        tokio::spawn(async move {
            while let Some(mut cmd) = rx.recv().await {
                let response = respond(cmd.request.clone());
                let _ = cmd.respond(response).await;
            }
        });
        Arc::new(SmsModemHandle {
            sender: ModemSender::new(tx),
            storage_locks: Arc::new(StorageLocks::new()),
            default_write_storage: Storage::Me,
            writable_storages: vec![Storage::Me],
        })
    }

    #[tokio::test]
    async fn store_then_send_from_storage() {
        let modem = mock_modem(|req| match req {
            ModemRequest::WriteSMS { .. } => ModemResponse::StoreResult(3),
            ModemRequest::SendStored { .. } => ModemResponse::SendResult(42),
            other => panic!("unexpected request: {other:?}"),
        });
        let sms = Sms::singlepart_new("/sms/0".to_string(), modem, SmsState::Unknown, Storage::Unknown, part("hi"));

        sms.store(Storage::Me).await.unwrap();
        assert_eq!(sms.state().await, SmsState::Stored);
        assert_eq!(sms.storage().await, Storage::Me);

        sms.send().await.unwrap();
        assert_eq!(sms.state().await, SmsState::Sent);
        assert_eq!(sms.sent_reference().await, Some(42));
    }

    #[tokio::test]
    async fn send_direct_without_storing() {
        let modem = mock_modem(|req| match req {
            ModemRequest::SendSMS { .. } => ModemResponse::SendResult(7),
            other => panic!("unexpected request: {other:?}"),
        });
        let sms = Sms::singlepart_new("/sms/0".to_string(), modem, SmsState::Unknown, Storage::Unknown, part("hi"));

        sms.send().await.unwrap();
        assert_eq!(sms.state().await, SmsState::Sent);
    }

    #[tokio::test]
    async fn cannot_send_a_received_sms() {
        let modem = mock_modem(|req| panic!("no modem request expected: {req:?}"));
        let sms = Sms::singlepart_new("/sms/0".to_string(), modem, SmsState::Received, Storage::Unknown, part("hi"));

        let err = sms.send().await.unwrap_err();
        assert!(matches!(err, SmsError::CannotSendReceived));
    }

    #[tokio::test]
    async fn store_rejects_mismatched_storage() {
        let modem = mock_modem(|req| match req {
            ModemRequest::WriteSMS { .. } => ModemResponse::StoreResult(1),
            other => panic!("unexpected request: {other:?}"),
        });
        let sms = Sms::singlepart_new("/sms/0".to_string(), modem, SmsState::Unknown, Storage::Unknown, part("hi"));

        sms.store(Storage::Me).await.unwrap();
        let err = sms.store(Storage::Sim).await.unwrap_err();
        assert!(matches!(err, SmsError::UnsupportedStorage { .. } | SmsError::AlreadyStoredElsewhere { .. }));
    }

    #[tokio::test]
    async fn delete_resets_to_unknown() {
        let modem = mock_modem(|req| match req {
            ModemRequest::WriteSMS { .. } => ModemResponse::StoreResult(9),
            ModemRequest::DeleteStored { .. } => ModemResponse::Ok,
            other => panic!("unexpected request: {other:?}"),
        });
        let sms = Sms::singlepart_new("/sms/0".to_string(), modem, SmsState::Unknown, Storage::Unknown, part("hi"));

        sms.store(Storage::Me).await.unwrap();
        sms.delete().await.unwrap();
        assert_eq!(sms.state().await, SmsState::Unknown);
        assert_eq!(sms.storage().await, Storage::Unknown);
    }

    #[tokio::test]
    async fn take_part_assembles_once_all_parts_arrive() {
        let modem = mock_modem(|req| panic!("no modem request expected: {req:?}"));
        let mut first = part("hello ");
        first.concat_reference = 5;
        first.concat_sequence = 1;
        first.concat_max = 2;

        let sms = Sms::multipart_new("/sms/0".to_string(), modem, SmsState::Unknown, Storage::Unknown, 5, 2, first);

        let mut second = part("world");
        second.concat_reference = 5;
        second.concat_sequence = 2;
        second.concat_max = 2;

        let complete = sms.take_part(second).await.unwrap();
        assert!(complete);
        assert_eq!(sms.state().await, SmsState::Received);
        assert_eq!(sms.text().await, Some("hello world".to_string()));
    }

    #[tokio::test]
    async fn take_part_rejects_duplicate_sequence() {
        let modem = mock_modem(|req| panic!("no modem request expected: {req:?}"));
        let mut first = part("hello ");
        first.concat_reference = 5;
        first.concat_sequence = 1;
        first.concat_max = 2;
        let sms = Sms::multipart_new("/sms/0".to_string(), modem, SmsState::Unknown, Storage::Unknown, 5, 2, first.clone());

        let err = sms.take_part(first).await.unwrap_err();
        assert!(matches!(err, SmsError::DuplicateSequence { .. }));
    }
}
