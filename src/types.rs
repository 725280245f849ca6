// src/types.rs
use serde::{Deserialize, Serialize};

// Messages sent TO the WebSocket client (Frontend)
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    READER_STATUS { success: bool },
    SESSION_STATUS { message: String },
    DATA_READ_SUCCESS { data: String },
    DATA_READ_ERROR { error: String },
    DATA_WRITE_SUCCESS { message: String },
    DATA_WRITE_ERROR { error: String },
}

// Messages received FROM the WebSocket client
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    GET_READER_STATUS,
    READ_DATA,
    WRITE_DATA { data: String },
    CANCEL_SESSION,
}

/// What a session was opened to do. Fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ReadData,
    WriteData(String),
}

impl Action {
    /// Prompt shown while the reader waits for a tag.
    pub fn alert_message(&self) -> String {
        match self {
            Action::ReadData => "Place tag near iPhone to read the data.".to_string(),
            Action::WriteData(data) => format!("Place tag near iPhone to setup {}", data),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCapability {
    NotSupported,
    ReadOnly,
    ReadWrite,
}

/// Result of a capability query: access mode plus usable NDEF bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdefStatus {
    pub capability: TagCapability,
    pub capacity: usize,
}

/// Type Name Format, the low three bits of an NDEF record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tnf {
    Empty,
    WellKnown,
    Media,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    Reserved(u8),
}

impl From<u8> for Tnf {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            0x00 => Tnf::Empty,
            0x01 => Tnf::WellKnown,
            0x02 => Tnf::Media,
            0x03 => Tnf::AbsoluteUri,
            0x04 => Tnf::External,
            0x05 => Tnf::Unknown,
            0x06 => Tnf::Unchanged,
            other => Tnf::Reserved(other),
        }
    }
}

impl From<Tnf> for u8 {
    fn from(tnf: Tnf) -> Self {
        match tnf {
            Tnf::Empty => 0x00,
            Tnf::WellKnown => 0x01,
            Tnf::Media => 0x02,
            Tnf::AbsoluteUri => 0x03,
            Tnf::External => 0x04,
            Tnf::Unknown => 0x05,
            Tnf::Unchanged => 0x06,
            Tnf::Reserved(v) => v & 0x07,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: Tnf, // Type Name Format (How to interpret the type)
    pub record_type: Vec<u8>,
    pub payload: Vec<u8>,
    pub id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdefMessage {
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }
}

pub const CARD_TYPE_MIFARE_1K: &str = "6a"; // MIFARE Classic 1K
pub const CARD_TYPE_NTAG: &str = "68"; // NTAG215/Ultralight

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_message_follows_action() {
        assert_eq!(
            Action::ReadData.alert_message(),
            "Place tag near iPhone to read the data."
        );
        assert_eq!(
            Action::WriteData("https://example.com".into()).alert_message(),
            "Place tag near iPhone to setup https://example.com"
        );
    }

    #[test]
    fn tnf_uses_low_three_bits() {
        assert_eq!(Tnf::from(0xD1), Tnf::WellKnown);
        assert_eq!(Tnf::from(0x07), Tnf::Reserved(7));
        assert_eq!(u8::from(Tnf::Media), 0x02);
    }

    #[test]
    fn incoming_messages_parse_from_tagged_json() {
        let msg: IncomingMessage =
            serde_json::from_str(r#"{"type":"WRITE_DATA","data":"https://a.b"}"#).unwrap();
        assert_eq!(
            msg,
            IncomingMessage::WRITE_DATA {
                data: "https://a.b".into()
            }
        );
        let msg: IncomingMessage = serde_json::from_str(r#"{"type":"READ_DATA"}"#).unwrap();
        assert_eq!(msg, IncomingMessage::READ_DATA);
    }

    #[test]
    fn outgoing_messages_are_tagged() {
        let json = serde_json::to_string(&OutgoingMessage::SESSION_STATUS {
            message: "Read tag.".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"SESSION_STATUS","message":"Read tag."}"#);
    }
}
