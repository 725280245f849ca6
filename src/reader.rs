// src/reader.rs
//! The seam between the session controller and the tag reader hardware.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::ReaderError;
use crate::types::{NdefMessage, NdefStatus};

/// Events the hardware delivers for one reading session, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent<T> {
    TagsDetected(Vec<T>),
    /// Always the last event of a session. A session ended by `invalidate`
    /// reports `ReaderError::UserCanceled`.
    Invalidated(ReaderError),
}

#[async_trait]
pub trait TagReader: Send + Sync {
    type Tag: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn reading_available(&self) -> bool;

    /// Opens a reading session and starts polling for tags.
    async fn begin(
        &self,
        alert_message: &str,
    ) -> Result<UnboundedReceiver<ReaderEvent<Self::Tag>>, ReaderError>;

    fn set_alert_message(&self, message: &str);

    async fn restart_polling(&self);

    async fn invalidate(&self);

    async fn connect(&self, tag: &Self::Tag) -> Result<(), ReaderError>;

    async fn query_ndef_status(&self, tag: &Self::Tag) -> Result<NdefStatus, ReaderError>;

    async fn read_ndef(&self, tag: &Self::Tag) -> Result<Option<NdefMessage>, ReaderError>;

    async fn write_ndef(&self, tag: &Self::Tag, message: &NdefMessage) -> Result<(), ReaderError>;
}
