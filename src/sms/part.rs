use serde::Serialize;

/// One physical message as it exists (or will exist) on the modem: either a
/// complete singlepart SMS (`concat_max == 1`) or one slice of a
/// concatenated multipart SMS.
#[derive(Debug, Clone, Serialize)]
pub struct SmsPart {
    /// Storage index once written to the modem. `None` means not yet stored.
    pub index: Option<u32>,

    /// User Data Header concatenation fields. `concat_max == 1` for
    /// singlepart parts, in which case reference/sequence are meaningless.
    pub concat_reference: u8,
    pub concat_sequence: u8,
    pub concat_max: u8,

    pub number: String,
    pub smsc: Option<String>,

    /// Exactly one of `text`/`data` is populated for a non-empty part.
    pub text: Option<String>,
    pub data: Option<Vec<u8>>,

    pub timestamp: Option<String>,
    pub validity: Option<u8>,
    pub class: Option<u8>,
    pub delivery_report_request: bool,

    /// Rendered submit-PDU for outgoing parts, computed once at construction
    /// time since part content is immutable afterwards. `None` for parts
    /// that arrived over the air, which never need to be sent again.
    pub pdu_hex: Option<String>,
    pub pdu_len: Option<usize>,
    pub smsc_header_len: Option<usize>,
}
impl SmsPart {
    pub fn is_stored(&self) -> bool {
        self.index.is_some()
    }

    pub fn is_empty_content(&self) -> bool {
        self.text.is_none() && self.data.is_none()
    }
}
