use serde::{Deserialize, Serialize};
use std::fmt;

/// Which modem memory bank an SMS part currently resides in.
///
/// Mirrors the subset of 3GPP TS 27.005 storage identifiers a modem reports
/// back from `AT+CPMS?`/`AT+CPMS=?`. `Unknown` means the part has not been
/// written to the modem at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Unknown,
    Sim,
    Me,
    Mt,
    Sr,
    Bm,
    Ta,
}
impl Storage {
    pub fn as_at_str(self) -> Option<&'static str> {
        match self {
            Storage::Unknown => None,
            Storage::Sim => Some("SM"),
            Storage::Me => Some("ME"),
            Storage::Mt => Some("MT"),
            Storage::Sr => Some("SR"),
            Storage::Bm => Some("BM"),
            Storage::Ta => Some("TA"),
        }
    }

    pub fn from_at_str(value: &str) -> Option<Self> {
        match value.trim().trim_matches('"') {
            "SM" => Some(Storage::Sim),
            "ME" => Some(Storage::Me),
            "MT" => Some(Storage::Mt),
            "SR" => Some(Storage::Sr),
            "BM" => Some(Storage::Bm),
            "TA" => Some(Storage::Ta),
            _ => None,
        }
    }
}
impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_at_str() {
            Some(s) => f.write_str(s),
            None => f.write_str("unknown"),
        }
    }
}

/// Lifecycle state of an [`crate::sms::entity::Sms`] object.
///
/// `Receiving` is only observable while a multipart message is still
/// collecting parts; once complete it becomes `Received` and, like `Sent`,
/// can never be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsState {
    Unknown,
    Stored,
    Receiving,
    Received,
    Sending,
    Sent,
}
impl SmsState {
    pub fn is_received(self) -> bool {
        matches!(self, SmsState::Receiving | SmsState::Received)
    }
}
