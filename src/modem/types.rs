use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// A request queued onto the modem command channel. Each variant maps to
/// one AT command sequence; `get_default_timeout` picks the ceiling the
/// worker applies if the caller doesn't override it.
#[derive(Debug, Clone)]
pub enum ModemRequest {
    /// `AT+CMGW` — write a PDU to storage without sending it.
    WriteSMS { len: usize, pdu: String },
    /// `AT+CMGS` — send a PDU directly, not via storage.
    SendSMS { len: usize, pdu: String },
    /// `AT+CMSS` — send a PDU already held in storage.
    SendStored { index: u32 },
    /// `AT+CMGD` — delete a PDU from storage.
    DeleteStored { index: u32 },
    /// `AT+CPMS=?` — query which storages this modem exposes.
    QueryStorageCapabilities,
}
impl ModemRequest {
    const TIMEOUT_SMS: Duration = Duration::from_secs(10);
    const TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);

    pub const fn get_default_timeout(&self) -> Duration {
        match self {
            ModemRequest::WriteSMS { .. }
            | ModemRequest::SendSMS { .. }
            | ModemRequest::SendStored { .. }
            | ModemRequest::DeleteStored { .. } => Self::TIMEOUT_SMS,
            ModemRequest::QueryStorageCapabilities => Self::TIMEOUT_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ModemResponse {
    StoreResult(u32),
    SendResult(u8),
    StorageCapabilities(Vec<String>),
    Ok,
    Error(String),
}
impl Display for ModemResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ModemResponse::StoreResult(index) => write!(f, "StoreResult: index {index}"),
            ModemResponse::SendResult(reference_id) => {
                write!(f, "SendResult: ref {reference_id}")
            }
            ModemResponse::StorageCapabilities(storages) => {
                write!(f, "StorageCapabilities: {storages:?}")
            }
            ModemResponse::Ok => write!(f, "Ok"),
            ModemResponse::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModemStatus {
    Startup,
    Online,
    ShuttingDown,
    Offline,
}

#[derive(Debug)]
pub enum ModemEvent {
    UnsolicitedMessage {
        message_kind: UnsolicitedMessageKind,
        header: String,
    },
    CommandResponse(String),
    Data(String),
    Prompt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsolicitedMessageKind {
    IncomingSMS,
    DeliveryReport,
    ShuttingDown,
}
impl UnsolicitedMessageKind {
    pub fn from_header(header: &str) -> Option<Self> {
        if header.starts_with("+CMT") {
            Some(UnsolicitedMessageKind::IncomingSMS)
        } else if header.starts_with("+CDS") {
            Some(UnsolicitedMessageKind::DeliveryReport)
        } else {
            match header {
                "NORMAL POWER DOWN" | "POWER DOWN" | "SHUTDOWN" | "POWERING DOWN" => {
                    Some(UnsolicitedMessageKind::ShuttingDown)
                }
                _ => None,
            }
        }
    }

    /// Check if the notification contains additional data on a new line.
    pub fn has_next_line(&self) -> bool {
        !matches!(self, UnsolicitedMessageKind::ShuttingDown)
    }
}

/// A decoded `+CMT`/`+CDS` PDU, still in transport shape — not yet folded
/// into a domain [`crate::sms::part::SmsPart`].
#[derive(Debug, Clone)]
pub struct IncomingPduMessage {
    pub phone_number: String,
    pub smsc: Option<String>,
    pub timestamp: Option<String>,
    pub content: Option<String>,
    pub data: Option<Vec<u8>>,
    pub user_data_header: Option<ConcatenationHeader>,
    pub delivery_report_request: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConcatenationHeader {
    pub reference: u8,
    pub total: u8,
    pub index: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartialDeliveryReport {
    pub phone_number: String,
    pub reference_id: u8,
    pub status: u8,
}

#[derive(Debug, Clone)]
pub enum ModemIncomingMessage {
    IncomingSMS(IncomingPduMessage),
    DeliveryReport(PartialDeliveryReport),
    ModemStatusUpdate {
        previous: ModemStatus,
        current: ModemStatus,
    },
}
