use crate::sms::error::SmsError;
use crate::sms::part::SmsPart;
use tracing::log::warn;

/// Flattened view produced once every slot of a multipart SMS (or the sole
/// part of a singlepart SMS) is present and non-empty.
#[derive(Debug, Clone, Default)]
pub struct Assembled {
    pub text: Option<String>,
    pub data: Option<Vec<u8>>,
    pub number: String,
    pub smsc: Option<String>,
    pub timestamp: Option<String>,
    pub validity: Option<u8>,
    pub class: Option<u8>,
    pub delivery_report_request: bool,
}

/// Runs the six-step assembly algorithm: slot the parts by sequence,
/// reject duplicates/out-of-range sequences, require every slot filled and
/// non-empty, then concatenate content in order. Header fields are copied
/// from slot 1; `delivery_report_request` is copied from the last slot,
/// since that's the flag the sending side actually cares about.
pub fn assemble(parts: &[SmsPart], max_parts: u8) -> Result<Assembled, SmsError> {
    if max_parts <= 1 {
        let part = parts.first().ok_or(SmsError::IncompletePartSet { missing: 1 })?;
        return merge_single(part);
    }

    let mut slots: Vec<Option<&SmsPart>> = vec![None; max_parts as usize];
    for part in parts {
        let sequence = part.concat_sequence;
        if sequence == 0 || sequence > max_parts {
            warn!("dropping part with out-of-range sequence {sequence} (max {max_parts})");
            continue;
        }

        let slot = &mut slots[(sequence - 1) as usize];
        if slot.is_some() {
            warn!("dropping part with duplicate sequence {sequence}");
            continue;
        }
        *slot = Some(part);
    }

    let mut text = String::new();
    let mut data = Vec::new();
    let mut has_text = false;
    let mut has_data = false;
    for (idx, slot) in slots.iter().enumerate() {
        let part = slot.ok_or(SmsError::IncompletePartSet { missing: (idx + 1) as u8 })?;
        match (&part.text, &part.data) {
            (None, None) => return Err(SmsError::EmptyPart { sequence: part.concat_sequence }),
            (Some(t), _) => {
                text.push_str(t);
                has_text = true;
            }
            (None, Some(d)) => {
                data.extend_from_slice(d);
                has_data = true;
            }
        }
    }

    let first = slots[0].expect("all slots validated non-empty above");
    let last = slots[max_parts as usize - 1].expect("all slots validated non-empty above");

    Ok(Assembled {
        text: has_text.then_some(text),
        data: has_data.then_some(data),
        number: first.number.clone(),
        smsc: first.smsc.clone(),
        timestamp: first.timestamp.clone(),
        validity: first.validity,
        class: first.class,
        delivery_report_request: last.delivery_report_request,
    })
}

fn merge_single(part: &SmsPart) -> Result<Assembled, SmsError> {
    if part.is_empty_content() {
        return Err(SmsError::EmptyPart { sequence: part.concat_sequence });
    }
    Ok(Assembled {
        text: part.text.clone(),
        data: part.data.clone(),
        number: part.number.clone(),
        smsc: part.smsc.clone(),
        timestamp: part.timestamp.clone(),
        validity: part.validity,
        class: part.class,
        delivery_report_request: part.delivery_report_request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(number: &str, text: &str, reference: u8, sequence: u8, max: u8) -> SmsPart {
        SmsPart {
            index: None,
            concat_reference: reference,
            concat_sequence: sequence,
            concat_max: max,
            number: number.to_string(),
            smsc: None,
            text: Some(text.to_string()),
            data: None,
            timestamp: None,
            validity: None,
            class: None,
            delivery_report_request: sequence == max,
            pdu_hex: None,
            pdu_len: None,
            smsc_header_len: None,
        }
    }

    #[test]
    fn assembles_in_order() {
        let parts = vec![
            part("+123456789", "First ", 7, 1, 3),
            part("+123456789", "Second ", 7, 2, 3),
            part("+123456789", "Third", 7, 3, 3),
        ];
        let assembled = assemble(&parts, 3).unwrap();
        assert_eq!(assembled.text.as_deref(), Some("First Second Third"));
        assert!(assembled.delivery_report_request);
    }

    #[test]
    fn assembles_out_of_order() {
        let parts = vec![
            part("+123456789", "Part3 ", 9, 3, 5),
            part("+123456789", "Part5!", 9, 5, 5),
            part("+123456789", "Part1 ", 9, 1, 5),
            part("+123456789", "Part4 ", 9, 4, 5),
            part("+123456789", "Part2 ", 9, 2, 5),
        ];
        let assembled = assemble(&parts, 5).unwrap();
        assert_eq!(assembled.text.as_deref(), Some("Part1 Part2 Part3 Part4 Part5!"));
    }

    #[test]
    fn rejects_incomplete_set() {
        let parts = vec![part("+123456789", "Only one", 1, 1, 3)];
        let err = assemble(&parts, 3).unwrap_err();
        assert!(matches!(err, SmsError::IncompletePartSet { missing: 2 }));
    }

    #[test]
    fn drops_duplicate_sequence_and_keeps_first() {
        let parts = vec![
            part("+123456789", "A", 1, 1, 2),
            part("+123456789", "B", 1, 1, 2),
            part("+123456789", "C", 1, 2, 2),
        ];
        let assembled = assemble(&parts, 2).unwrap();
        assert_eq!(assembled.text.as_deref(), Some("AC"));
    }

    #[test]
    fn drops_out_of_range_sequence_then_fails_incomplete() {
        let parts = vec![part("+123456789", "A", 1, 4, 2)];
        let err = assemble(&parts, 2).unwrap_err();
        assert!(matches!(err, SmsError::IncompletePartSet { missing: 1 }));
    }

    #[test]
    fn rejects_empty_part() {
        let mut empty = part("+123456789", "", 1, 1, 1);
        empty.text = None;
        let err = assemble(&[empty], 1).unwrap_err();
        assert!(matches!(err, SmsError::EmptyPart { .. }));
    }

    #[test]
    fn preserves_unicode_content() {
        let parts = vec![
            part("+123456789", "Hello\nWorld\t", 1, 1, 4),
            part("+123456789", "\u{1f680}\u{1f31f} emojis ", 1, 2, 4),
            part("+123456789", "\u{4f60}\u{597d}\u{4e16}\u{754c} ", 1, 3, 4),
            part("+123456789", "Math: \u{2211}\u{2211}", 1, 4, 4),
        ];
        let assembled = assemble(&parts, 4).unwrap();
        assert_eq!(
            assembled.text.as_deref(),
            Some("Hello\nWorld\t\u{1f680}\u{1f31f} emojis \u{4f60}\u{597d}\u{4e16}\u{754c} Math: \u{2211}\u{2211}")
        );
    }

    #[test]
    fn singlepart_passthrough() {
        let assembled = assemble(&[part("+1", "hi", 0, 0, 1)], 1).unwrap();
        assert_eq!(assembled.text.as_deref(), Some("hi"));
    }
}
