pub mod apdu;
pub mod cards;
pub mod config;
pub mod decoder;
pub mod error;
pub mod ndef;
pub mod nfc_service;
pub mod pcsc_reader;
pub mod reader;
pub mod session;
pub mod types;
pub mod ws;

#[cfg(test)]
mod test_support;
