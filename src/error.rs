// src/error.rs
use thiserror::Error;

/// Errors delivered to the caller of a session through its completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NfcError {
    #[error("NFC Reader Not Available")]
    Unavailable,
    #[error("{0}")]
    Invalidated(String),
    #[error("NDEF payload size exceeds the tag limit")]
    InvalidPayloadSize,
    #[error("An NFC session is already in progress")]
    Busy,
}

/// Errors reported by the tag reader hardware.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("Session invalidated by user")]
    UserCanceled,
    #[error("Session invalidated after first tag read")]
    FirstTagRead,
    #[error("Session timeout")]
    SessionTimeout,
    #[error("System resource unavailable")]
    SystemBusy,
    #[error("Tag connection lost")]
    TagConnectionLost,
    #[error("Tag is not connected")]
    TagNotConnected,
    #[error("Tag response error: {0}")]
    Transmit(String),
    #[error("Reader unavailable: {0}")]
    Unavailable(String),
}

impl ReaderError {
    /// Termination codes that end a session without it being a failure.
    pub fn is_ordinary_termination(&self) -> bool {
        matches!(self, ReaderError::UserCanceled | ReaderError::FirstTagRead)
    }
}

impl From<pcsc::Error> for ReaderError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard => ReaderError::TagConnectionLost,
            pcsc::Error::NoService | pcsc::Error::NoReadersAvailable => {
                ReaderError::Unavailable(err.to_string())
            }
            pcsc::Error::Timeout => ReaderError::SessionTimeout,
            other => ReaderError::Transmit(other.to_string()),
        }
    }
}

/// NDEF codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NdefError {
    #[error("Incomplete data")]
    Truncated,
    #[error("No NDEF TLV found")]
    NoNdefTlv,
    #[error("Empty NDEF")]
    EmptyMessage,
    #[error("Invalid URI")]
    InvalidUri,
    #[error("NDEF message of {size} bytes exceeds tag capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },
}

impl From<NdefError> for NfcError {
    fn from(_: NdefError) -> Self {
        NfcError::InvalidPayloadSize
    }
}
