// src/ndef.rs
use std::str;

use crate::error::NdefError;
use crate::types::{NdefMessage, NdefRecord, Tnf};

// Header flag bits
const FLAG_MB: u8 = 0x80; // Message Begin
const FLAG_ME: u8 = 0x40; // Message End
const FLAG_CF: u8 = 0x20; // Chunk Flag
const FLAG_SR: u8 = 0x10; // Short Record
const FLAG_IL: u8 = 0x08; // ID Length present

// Type 2 tag TLV blocks
const TLV_NULL: u8 = 0x00;
const TLV_NDEF: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;

pub const URI_RECORD_TYPE: &[u8] = b"U";

/// NFC Forum URI identifier codes. Index is the abbreviation byte.
pub const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

fn is_valid_uri(uri: &str) -> bool {
    !uri.is_empty() && !uri.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Builds a well-known URI record, abbreviating the longest known prefix.
pub fn uri_record(uri: &str) -> Result<NdefRecord, NdefError> {
    if !is_valid_uri(uri) {
        return Err(NdefError::InvalidUri);
    }

    let (code, prefix) = URI_PREFIXES
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, prefix)| uri.starts_with(*prefix))
        .max_by_key(|(_, prefix)| prefix.len())
        .map(|(code, prefix)| (code as u8, *prefix))
        .unwrap_or((0x00, ""));

    // URL Record: [Prefix Code] + [Rest of URI]
    let mut payload = Vec::with_capacity(1 + uri.len() - prefix.len());
    payload.push(code);
    payload.extend_from_slice(uri[prefix.len()..].as_bytes());

    Ok(NdefRecord {
        tnf: Tnf::WellKnown,
        record_type: URI_RECORD_TYPE.to_vec(),
        payload,
        id: None,
    })
}

/// Expands a URI record payload back into the full URI.
pub fn parse_uri_payload(payload: &[u8]) -> Option<String> {
    let (&code, rest) = payload.split_first()?;
    let prefix = URI_PREFIXES.get(code as usize)?;
    let rest = str::from_utf8(rest).ok()?;

    let uri = format!("{}{}", prefix, rest);
    is_valid_uri(&uri).then_some(uri)
}

pub fn encode_record(record: &NdefRecord, mb: bool, me: bool) -> Vec<u8> {
    let short = record.payload.len() < 256;

    // Bit 7: MB, Bit 6: ME, Bit 5: CF(0), Bit 4: SR, Bit 3: IL, Bits 2-0: TNF
    let mut header = u8::from(record.tnf);
    if mb {
        header |= FLAG_MB;
    }
    if me {
        header |= FLAG_ME;
    }
    if short {
        header |= FLAG_SR;
    }
    if record.id.is_some() {
        header |= FLAG_IL;
    }

    let mut out = Vec::new();
    out.push(header);
    out.push(record.record_type.len() as u8); // Type Length
    if short {
        out.push(record.payload.len() as u8);
    } else {
        out.extend_from_slice(&(record.payload.len() as u32).to_be_bytes());
    }
    if let Some(id) = &record.id {
        out.push(id.len() as u8);
    }
    out.extend_from_slice(&record.record_type);
    if let Some(id) = &record.id {
        out.extend_from_slice(id);
    }
    out.extend_from_slice(&record.payload);
    out
}

pub fn encode_message(message: &NdefMessage) -> Vec<u8> {
    let last = message.records.len().saturating_sub(1);
    message
        .records
        .iter()
        .enumerate()
        .flat_map(|(i, record)| encode_record(record, i == 0, i == last))
        .collect()
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], NdefError> {
        let end = self.pos.checked_add(len).ok_or(NdefError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(NdefError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, NdefError> {
        Ok(self.take(1)?[0])
    }
}

pub fn parse_message(data: &[u8]) -> Result<NdefMessage, NdefError> {
    let mut records = Vec::new();
    let mut cursor = Cursor { data, pos: 0 };

    while cursor.pos < data.len() {
        let header = cursor.byte()?;
        let is_me = header & FLAG_ME != 0;

        // 1. Type Length
        let type_len = cursor.byte()? as usize;

        // 2. Payload Length (1 byte for Short Record, 4 bytes otherwise)
        let payload_len = if header & FLAG_SR != 0 {
            cursor.byte()? as usize
        } else {
            let b = cursor.take(4)?;
            u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
        };

        // 3. ID Length (if present)
        let id_len = if header & FLAG_IL != 0 {
            Some(cursor.byte()? as usize)
        } else {
            None
        };

        // 4. Type, ID, Payload
        let record_type = cursor.take(type_len)?.to_vec();
        let id = match id_len {
            Some(len) => Some(cursor.take(len)?.to_vec()),
            None => None,
        };
        let payload = cursor.take(payload_len)?.to_vec();

        if header & FLAG_CF != 0 {
            log::warn!("Chunked NDEF record encountered, keeping chunk as-is");
        }

        records.push(NdefRecord {
            tnf: Tnf::from(header),
            record_type,
            payload,
            id,
        });

        if is_me {
            break;
        }
    }

    if records.is_empty() {
        return Err(NdefError::EmptyMessage);
    }
    Ok(NdefMessage::new(records))
}

pub fn wrap_in_tlv(ndef_bytes: &[u8]) -> Vec<u8> {
    let mut tlv = Vec::with_capacity(ndef_bytes.len() + 5);
    // T = 0x03 (NDEF Message)
    tlv.push(TLV_NDEF);

    // L (1 byte, or 0xFF followed by 2 bytes)
    if ndef_bytes.len() < 0xFF {
        tlv.push(ndef_bytes.len() as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(ndef_bytes.len() as u16).to_be_bytes());
    }

    // V (Value)
    tlv.extend_from_slice(ndef_bytes);

    tlv.push(TLV_TERMINATOR);
    tlv
}

/// Size of the TLV framing around an NDEF message of `len` bytes.
pub fn tlv_overhead(len: usize) -> usize {
    if len < 0xFF { 3 } else { 5 }
}

/// Locates the NDEF message inside a tag's data area.
///
/// Returns `Ok(None)` for a blank tag (zero-length NDEF TLV, or a
/// terminator before any NDEF TLV).
pub fn find_ndef_tlv(buffer: &[u8]) -> Result<Option<&[u8]>, NdefError> {
    let mut cursor = Cursor {
        data: buffer,
        pos: 0,
    };

    loop {
        let tag = match cursor.byte() {
            Ok(tag) => tag,
            Err(_) => return Err(NdefError::NoNdefTlv),
        };
        match tag {
            TLV_NULL => continue,
            TLV_TERMINATOR => return Ok(None),
            _ => {}
        }

        let len = match cursor.byte()? {
            0xFF => {
                let b = cursor.take(2)?;
                u16::from_be_bytes([b[0], b[1]]) as usize
            }
            len => len as usize,
        };
        let value = cursor.take(len)?;

        if tag == TLV_NDEF {
            return Ok(if value.is_empty() { None } else { Some(value) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_record_uses_longest_prefix() {
        let record = uri_record("https://www.example.com").unwrap();
        assert_eq!(record.tnf, Tnf::WellKnown);
        assert_eq!(record.record_type, b"U");
        assert_eq!(record.payload[0], 0x02);
        assert_eq!(&record.payload[1..], b"example.com");

        let record = uri_record("hello").unwrap();
        assert_eq!(record.payload, b"\x00hello");
    }

    #[test]
    fn uri_record_rejects_unencodable_strings() {
        assert_eq!(uri_record(""), Err(NdefError::InvalidUri));
        assert_eq!(uri_record("not a uri"), Err(NdefError::InvalidUri));
        assert_eq!(uri_record("tab\there"), Err(NdefError::InvalidUri));
    }

    #[test]
    fn parse_uri_payload_expands_prefix() {
        assert_eq!(
            parse_uri_payload(b"\x04example.com").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            parse_uri_payload(b"\x00https://example.com").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(parse_uri_payload(b""), None);
        assert_eq!(parse_uri_payload(b"\x24abc"), None);
        assert_eq!(parse_uri_payload(b"\x00"), None);
        assert_eq!(parse_uri_payload(&[0x04, 0xFF, 0xFE]), None);
    }

    #[test]
    fn short_record_header_matches_wire_format() {
        let record = uri_record("https://a.b").unwrap();
        let bytes = encode_message(&NdefMessage::new(vec![record]));
        // MB | ME | SR | TNF=1
        assert_eq!(bytes[0], 0xD1);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[2], 4);
        assert_eq!(&bytes[3..], b"U\x04a.b");
    }

    #[test]
    fn long_record_with_id_survives_parsing() {
        let record = NdefRecord {
            tnf: Tnf::Media,
            record_type: b"application/octet-stream".to_vec(),
            payload: vec![0xAB; 300],
            id: Some(b"id1".to_vec()),
        };
        let text = uri_record("tel:123").unwrap();
        let message = NdefMessage::new(vec![record, text]);

        let bytes = encode_message(&message);
        assert_eq!(bytes[0] & FLAG_SR, 0);
        assert_ne!(bytes[0] & FLAG_IL, 0);
        assert_eq!(parse_message(&bytes).unwrap(), message);
    }

    #[test]
    fn parse_stops_at_message_end() {
        let mut bytes = encode_message(&NdefMessage::new(vec![uri_record("https://a.b").unwrap()]));
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
        assert_eq!(parse_message(&bytes).unwrap().records.len(), 1);
    }

    #[test]
    fn parse_rejects_truncated_and_empty_input() {
        assert_eq!(parse_message(&[]), Err(NdefError::EmptyMessage));
        assert_eq!(parse_message(&[0xD1, 0x01]), Err(NdefError::Truncated));
        assert_eq!(parse_message(&[0xD1, 0x01, 0x10, b'U', 0x04]), Err(NdefError::Truncated));
        assert_eq!(
            parse_message(&[0xC1, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(NdefError::Truncated)
        );
    }

    #[test]
    fn tlv_wraps_short_and_long_messages() {
        assert_eq!(wrap_in_tlv(&[1, 2]), vec![0x03, 0x02, 1, 2, 0xFE]);

        let long = vec![0x55; 300];
        let tlv = wrap_in_tlv(&long);
        assert_eq!(&tlv[..4], &[0x03, 0xFF, 0x01, 0x2C]);
        assert_eq!(tlv.len(), long.len() + tlv_overhead(long.len()));
        assert_eq!(find_ndef_tlv(&tlv).unwrap(), Some(&long[..]));
    }

    #[test]
    fn find_ndef_tlv_skips_null_and_control_blocks() {
        // NULL, Lock Control TLV (0x01, len 3), NDEF TLV, Terminator
        let data = [0x00, 0x01, 0x03, 0xA0, 0x10, 0x44, 0x03, 0x02, 0xAA, 0xBB, 0xFE, 0x00];
        assert_eq!(find_ndef_tlv(&data).unwrap(), Some(&[0xAA, 0xBB][..]));
    }

    #[test]
    fn find_ndef_tlv_reports_blank_tags() {
        assert_eq!(find_ndef_tlv(&[0x03, 0x00, 0xFE]).unwrap(), None);
        assert_eq!(find_ndef_tlv(&[0xFE, 0x00]).unwrap(), None);
        assert_eq!(find_ndef_tlv(&[0x00, 0x00]), Err(NdefError::NoNdefTlv));
        assert_eq!(find_ndef_tlv(&[0x03, 0x05, 0x01]), Err(NdefError::Truncated));
    }
}
