use crate::sms::part::SmsPart;
use anyhow::{anyhow, Result};
use sms_pdu::pdu::PduAddress;
use sms_pdu::{gsm_encoding, pdu};
use std::str::FromStr;

/// Character budgets per 3GPP TS 23.038: a single part can use the full
/// payload, a part that's one of several concatenated parts loses 7 bytes
/// of user data to the concatenation UDH.
const GSM7_SINGLE_CHARS: usize = 160;
const GSM7_MULTI_CHARS: usize = 153;
const UCS2_SINGLE_CHARS: usize = 70;
const UCS2_MULTI_CHARS: usize = 67;

fn is_gsm7_char(c: char) -> bool {
    // Conservative default-alphabet check: printable ASCII plus the common
    // Western European accented letters GSM 03.38 carries directly. Anything
    // else (CJK, Cyrillic, emoji, extension-table symbols) falls back to UCS2.
    matches!(c, '\u{0020}'..='\u{007e}')
        || matches!(
            c,
            '\u{00a1}' | '\u{00a3}' | '\u{00a4}' | '\u{00a5}' | '\u{00a7}' | '\u{00bf}'
                | '\u{00c4}' | '\u{00c5}' | '\u{00c6}' | '\u{00c9}' | '\u{00d1}' | '\u{00d6}'
                | '\u{00d8}' | '\u{00dc}' | '\u{00df}' | '\u{00e0}' | '\u{00e4}' | '\u{00e5}'
                | '\u{00e6}' | '\u{00e8}' | '\u{00e9}' | '\u{00ec}' | '\u{00f1}' | '\u{00f2}'
                | '\u{00f6}' | '\u{00f8}' | '\u{00f9}' | '\u{00fc}'
        )
}

/// Splits outgoing text into the chunks it will occupy once encoded, using
/// the same GSM7/UCS2 budgets the modem's own encoder works to. Returns the
/// human-readable chunk text per part; the actual wire bytes are produced
/// separately by [`build_outgoing_parts`].
pub fn split_text(text: &str) -> Vec<String> {
    let is_gsm7 = text.chars().all(is_gsm7_char);
    let (single, multi) = if is_gsm7 {
        (GSM7_SINGLE_CHARS, GSM7_MULTI_CHARS)
    } else {
        (UCS2_SINGLE_CHARS, UCS2_MULTI_CHARS)
    };

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    if chars.len() <= single {
        return vec![text.to_string()];
    }

    chars.chunks(multi).map(|c| c.iter().collect()).collect()
}

/// Builds the full set of [`SmsPart`]s for an outgoing message: splits the
/// text, encodes each chunk into a submit-PDU, and stamps the concatenation
/// UDH fields when there's more than one chunk. Attaches a random
/// concat_reference and hands back domain [`SmsPart`]s.
pub fn build_outgoing_parts(
    number: &str,
    text: &str,
    flash: bool,
    validity: Option<u8>,
) -> Result<Vec<SmsPart>> {
    let destination = PduAddress::from_str(number)
        .map_err(|e| anyhow!("invalid destination address '{number}': {e}"))?;

    let chunks = split_text(text);
    let max = chunks.len() as u8;
    let reference = if max > 1 {
        crate::sms::entity::random_concat_reference()
    } else {
        0
    };

    let mut parts = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        let sequence = (i + 1) as u8;

        let mut encoded = gsm_encoding::GsmMessageData::encode_message(&chunk)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("text encoder produced no data for a non-empty chunk"))?;

        let udhi = if max > 1 {
            let mut udh = vec![0x05u8, 0x00, 0x03, reference, max, sequence];
            udh.extend_from_slice(&encoded.bytes);
            encoded.user_data_len += 7;
            encoded.bytes = udh;
            true
        } else {
            encoded.udh
        };

        let pdu = pdu::SubmitPdu {
            sca: None,
            first_octet: pdu::PduFirstOctet {
                mti: pdu::MessageType::SmsSubmit,
                rd: false,
                vpf: pdu::VpFieldValidity::Relative,
                srr: true,
                udhi,
                rp: false,
            },
            message_id: 0,
            destination: destination.clone(),
            dcs: pdu::DataCodingScheme::Standard {
                compressed: false,
                class: flash.then_some(pdu::MessageClass::Silent),
                encoding: encoded.encoding,
            },
            validity_period: validity,
            user_data: encoded.bytes,
            user_data_len: encoded.user_data_len,
        };

        let (bytes, pdu_len) = pdu.as_bytes();
        let smsc_header_len = *bytes.first().unwrap_or(&0) as usize + 1;

        parts.push(SmsPart {
            index: None,
            concat_reference: reference,
            concat_sequence: if max > 1 { sequence } else { 0 },
            concat_max: max,
            number: number.to_string(),
            smsc: None,
            text: Some(chunk),
            data: None,
            timestamp: None,
            validity,
            class: None,
            delivery_report_request: true,
            pdu_hex: Some(hex::encode(&bytes)),
            pdu_len: Some(pdu_len),
            smsc_header_len: Some(smsc_header_len),
        });
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ascii_is_single_part() {
        assert_eq!(split_text("hello world").len(), 1);
    }

    #[test]
    fn long_ascii_splits_on_gsm7_budget() {
        let text = "a".repeat(200);
        let chunks = split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), GSM7_MULTI_CHARS);
    }

    #[test]
    fn non_gsm7_uses_ucs2_budget() {
        let text = "\u{4f60}\u{597d}".repeat(40);
        let chunks = split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks[0].chars().count() <= UCS2_MULTI_CHARS);
    }
}
