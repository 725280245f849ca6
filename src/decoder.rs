// src/decoder.rs
//! Turns NDEF records into the one-line summaries shown to the user.

use std::str;

use crate::ndef::{URI_RECORD_TYPE, parse_uri_payload};
use crate::types::{NdefMessage, NdefRecord, Tnf};

impl Tnf {
    pub fn description(&self) -> &'static str {
        match self {
            Tnf::WellKnown => "NFC Well Known type",
            Tnf::Media => "Media type",
            Tnf::AbsoluteUri => "Absolute URI type",
            Tnf::External => "NFC External type",
            Tnf::Unknown => "Unknown type",
            Tnf::Unchanged => "Unchanged type",
            Tnf::Empty => "Empty payload",
            Tnf::Reserved(_) => "Invalid data",
        }
    }
}

/// Summarizes a single record. `None` means there is nothing to display,
/// which happens when a type or payload that must be text is not UTF-8.
pub fn describe_record(record: &NdefRecord) -> Option<String> {
    let description = record.tnf.description();

    match record.tnf {
        Tnf::WellKnown => {
            let record_type = str::from_utf8(&record.record_type).ok()?;
            let uri = if record.record_type == URI_RECORD_TYPE {
                parse_uri_payload(&record.payload)
            } else {
                None
            };
            match uri {
                Some(uri) => Some(format!("{}: {}, {}", description, record_type, uri)),
                None => Some(format!("{}: {}", description, record_type)),
            }
        }
        Tnf::AbsoluteUri => str::from_utf8(&record.payload).ok().map(str::to_string),
        Tnf::Media => {
            let record_type = str::from_utf8(&record.record_type).ok()?;
            Some(format!("{}: {}", description, record_type))
        }
        Tnf::External | Tnf::Empty | Tnf::Unknown | Tnf::Unchanged | Tnf::Reserved(_) => {
            Some(description.to_string())
        }
    }
}

/// Summarizes the first record of a message; an empty message has no payload.
pub fn describe_message(message: &NdefMessage) -> Option<String> {
    message.records.first().and_then(describe_record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndef::uri_record;

    fn record(tnf: Tnf, record_type: &[u8], payload: &[u8]) -> NdefRecord {
        NdefRecord {
            tnf,
            record_type: record_type.to_vec(),
            payload: payload.to_vec(),
            id: None,
        }
    }

    #[test]
    fn well_known_uri_includes_the_uri() {
        let r = record(Tnf::WellKnown, b"U", b"\x00https://example.com");
        assert_eq!(
            describe_record(&r).as_deref(),
            Some("NFC Well Known type: U, https://example.com")
        );

        let r = uri_record("https://example.com").unwrap();
        assert_eq!(
            describe_record(&r).as_deref(),
            Some("NFC Well Known type: U, https://example.com")
        );
    }

    #[test]
    fn well_known_without_uri_shows_type_only() {
        let r = record(Tnf::WellKnown, b"T", b"\x02enhello");
        assert_eq!(describe_record(&r).as_deref(), Some("NFC Well Known type: T"));

        let r = record(Tnf::WellKnown, b"U", b"\x30bogus");
        assert_eq!(describe_record(&r).as_deref(), Some("NFC Well Known type: U"));
    }

    #[test]
    fn well_known_with_binary_type_has_no_output() {
        let r = record(Tnf::WellKnown, &[0xFF, 0xFE], b"");
        assert_eq!(describe_record(&r), None);
    }

    #[test]
    fn absolute_uri_is_shown_verbatim() {
        let r = record(Tnf::AbsoluteUri, b"", b"https://a.b");
        assert_eq!(describe_record(&r).as_deref(), Some("https://a.b"));

        let r = record(Tnf::AbsoluteUri, b"", &[0xC3, 0x28]);
        assert_eq!(describe_record(&r), None);
    }

    #[test]
    fn media_shows_mime_type() {
        let r = record(Tnf::Media, b"text/plain", b"hi");
        assert_eq!(describe_record(&r).as_deref(), Some("Media type: text/plain"));
    }

    #[test]
    fn other_formats_show_description_only() {
        let cases = [
            (Tnf::External, "NFC External type"),
            (Tnf::Empty, "Empty payload"),
            (Tnf::Unknown, "Unknown type"),
            (Tnf::Unchanged, "Unchanged type"),
            (Tnf::Reserved(7), "Invalid data"),
        ];
        for (tnf, expected) in cases {
            let r = record(tnf, b"android.com:pkg", b"payload");
            assert_eq!(describe_record(&r).as_deref(), Some(expected));
        }
    }

    #[test]
    fn message_uses_first_record() {
        assert_eq!(describe_message(&NdefMessage::default()), None);

        let message = NdefMessage::new(vec![
            record(Tnf::Media, b"text/plain", b""),
            record(Tnf::AbsoluteUri, b"", b"https://a.b"),
        ]);
        assert_eq!(describe_message(&message).as_deref(), Some("Media type: text/plain"));
    }
}
