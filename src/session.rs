// src/session.rs
//! NFC session controller.
//!
//! One session runs at a time. Each accepted `perform_action` spawns a task
//! that owns the session state and consumes the reader's events in order, so
//! at most one hardware operation is outstanding at any point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::error::{NdefError, NfcError, ReaderError};
use crate::ndef;
use crate::reader::{ReaderEvent, TagReader};
use crate::types::{Action, NdefMessage, TagCapability};

pub type SessionResult = Result<Option<NdefMessage>, NfcError>;
pub type Completion = Box<dyn FnOnce(SessionResult) + Send + 'static>;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub const TOO_MANY_TAGS: &str = "There are too many tags present. Remove all and then try again.";
pub const UNSUPPORTED_TAG: &str = "Unsupported tag.";
pub const READ_ONLY_TAG: &str = "Unable to write to tag.";
pub const COULD_NOT_READ: &str = "Could not read tag data.";
pub const READ_SUCCESS: &str = "Read tag.";
pub const WRITE_SUCCESS: &str = "Success";
pub const WRITE_FAILED: &str = "Write Failed";
pub const UNABLE_TO_CONNECT: &str = "Unable To Connect to Tag";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Polling,
    TagDetected,
    Connected,
    StatusQueried,
    Reading,
    Writing,
    Invalidated,
}

pub struct NfcController<R: TagReader> {
    reader: Arc<R>,
    retry_delay: Duration,
    active: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
}

impl<R: TagReader + 'static> NfcController<R> {
    pub fn new(reader: Arc<R>, retry_delay: Duration) -> Self {
        Self {
            reader,
            retry_delay,
            active: Arc::new(AtomicBool::new(false)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ends the live session as a user cancel. A session whose task has not
    /// opened the reader yet invalidates as soon as it does.
    pub async fn cancel(&self) {
        if !self.is_busy() {
            return;
        }
        self.cancel_requested.store(true, Ordering::Release);
        self.reader.invalidate().await;
    }

    /// Starts a session for `action`.
    ///
    /// Fails through `completion` without opening a session when the reader
    /// is unavailable or another session is still live. Otherwise returns the
    /// handle of the task driving the session.
    pub fn perform_action(
        &self,
        action: Action,
        completion: Option<Completion>,
    ) -> Option<JoinHandle<()>> {
        if !self.reader.reading_available() {
            warn!("NFC is not available on this device");
            if let Some(completion) = completion {
                completion(Err(NfcError::Unavailable));
            }
            return None;
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejecting {:?}: a session is already running", action);
            if let Some(completion) = completion {
                completion(Err(NfcError::Busy));
            }
            return None;
        }

        self.cancel_requested.store(false, Ordering::Release);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let session = Session {
            reader: Arc::clone(&self.reader),
            retry_delay: self.retry_delay,
            action,
            completion,
            state: SessionState::Idle,
            live: Arc::new(AtomicBool::new(true)),
            cancel_requested: Arc::clone(&self.cancel_requested),
        };

        Some(tokio::spawn(async move {
            let _guard = guard;
            session.run().await;
        }))
    }
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Session<R: TagReader> {
    reader: Arc<R>,
    retry_delay: Duration,
    action: Action,
    completion: Option<Completion>,
    state: SessionState,
    // Cleared on teardown so a pending polling restart becomes a no-op.
    live: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
}

impl<R: TagReader + 'static> Session<R> {
    async fn run(mut self) {
        let mut events = match self.reader.begin(&self.action.alert_message()).await {
            Ok(events) => events,
            Err(err) => {
                error!("Failed to begin reader session: {}", err);
                self.complete(Err(NfcError::Invalidated(err.to_string())));
                self.clear();
                return;
            }
        };

        self.state = SessionState::Polling;
        info!("Session started for {:?}", self.action);

        if self.cancel_requested.load(Ordering::Acquire) {
            info!("Cancel requested before the reader opened");
            self.invalidate().await;
        }

        while let Some(event) = events.recv().await {
            match event {
                ReaderEvent::TagsDetected(tags) => self.on_tags_detected(tags).await,
                ReaderEvent::Invalidated(err) => {
                    self.on_invalidated(err);
                    return;
                }
            }
        }

        warn!("Reader dropped the session without invalidating it");
        self.clear();
    }

    async fn on_tags_detected(&mut self, tags: Vec<R::Tag>) {
        if self.state != SessionState::Polling {
            debug!("Ignoring {} tag(s) in state {:?}", tags.len(), self.state);
            return;
        }

        let tag = match tags.as_slice() {
            [tag] => tag.clone(),
            _ => {
                info!("{} tags detected, waiting for exactly one", tags.len());
                self.alert(TOO_MANY_TAGS);
                self.schedule_restart();
                return;
            }
        };

        self.state = SessionState::TagDetected;
        if let Err(err) = self.reader.connect(&tag).await {
            return self.handle_error(err).await;
        }

        self.state = SessionState::Connected;
        let status = match self.reader.query_ndef_status(&tag).await {
            Ok(status) => status,
            Err(err) => return self.handle_error(err).await,
        };

        self.state = SessionState::StatusQueried;
        debug!("Tag {:?} status {:?}", tag, status);

        match (status.capability, self.action.clone()) {
            (TagCapability::NotSupported, _) => {
                self.alert(UNSUPPORTED_TAG);
                self.invalidate().await;
            }
            (TagCapability::ReadOnly, _) => {
                self.alert(READ_ONLY_TAG);
                self.invalidate().await;
            }
            (TagCapability::ReadWrite, Action::WriteData(data)) => {
                self.write_data(&tag, &data).await;
            }
            (TagCapability::ReadWrite, Action::ReadData) => {
                self.read(&tag).await;
            }
        }
    }

    fn on_invalidated(&mut self, err: ReaderError) {
        if err.is_ordinary_termination() {
            info!("Session ended: {}", err);
        } else {
            warn!("Session invalidated: {}", err);
            self.complete(Err(NfcError::Invalidated(err.to_string())));
        }
        self.clear();
    }

    async fn read(&mut self, tag: &R::Tag) {
        self.state = SessionState::Reading;
        match self.reader.read_ndef(tag).await {
            Err(err) => self.handle_error(err).await,
            Ok(None) => {
                warn!("Tag {:?} returned no NDEF message", tag);
                self.alert(COULD_NOT_READ);
                self.invalidate().await;
            }
            Ok(Some(message)) => {
                debug!("Read {} record(s) from {:?}", message.records.len(), tag);
                self.complete(Ok(Some(message)));
                self.alert(READ_SUCCESS);
                self.invalidate().await;
            }
        }
    }

    async fn write_data(&mut self, tag: &R::Tag, data: &str) {
        self.state = SessionState::Reading;
        // Only confirms the tag still answers; the content is discarded.
        if let Err(err) = self.reader.read_ndef(tag).await {
            return self.handle_error(err).await;
        }

        self.state = SessionState::Writing;
        self.write(tag, data).await;
    }

    async fn write(&mut self, tag: &R::Tag, data: &str) {
        if let Err(err) = self.reader.connect(tag).await {
            if err.is_ordinary_termination() {
                return self.handle_error(err).await;
            }
            let status = format!("{} {}", UNABLE_TO_CONNECT, err);
            return self.abort(&status, NfcError::Invalidated(status.clone())).await;
        }

        let capacity = match self.reader.query_ndef_status(tag).await {
            Ok(status) if status.capability == TagCapability::ReadWrite => status.capacity,
            Ok(status) => {
                warn!("Tag {:?} is no longer writable: {:?}", tag, status);
                let error = NfcError::Invalidated(UNABLE_TO_CONNECT.to_string());
                return self.abort(UNABLE_TO_CONNECT, error).await;
            }
            Err(err) => {
                warn!("Status query before write failed: {}", err);
                let error = NfcError::Invalidated(UNABLE_TO_CONNECT.to_string());
                return self.abort(UNABLE_TO_CONNECT, error).await;
            }
        };

        let message = match build_uri_message(data, capacity) {
            Ok(message) => message,
            Err(err) => {
                error!("Cannot encode {:?} for the tag: {}", data, err);
                return self.abort(&err.to_string(), err.into()).await;
            }
        };

        match self.reader.write_ndef(tag, &message).await {
            Ok(()) => {
                info!("Wrote {:?} to {:?}", data, tag);
                self.alert(WRITE_SUCCESS);
                self.complete(Ok(None));
            }
            Err(err) => {
                let status = format!("{} {}", WRITE_FAILED, err);
                error!("{}", status);
                self.alert(&status);
                self.complete(Err(NfcError::Invalidated(status)));
            }
        }
        self.invalidate().await;
    }

    async fn handle_error(&mut self, err: ReaderError) {
        if err.is_ordinary_termination() {
            info!("Tag operation stopped: {}", err);
            return self.invalidate().await;
        }
        let message = err.to_string();
        error!("Tag operation failed: {}", message);
        self.abort(&message, NfcError::Invalidated(message.clone()))
            .await;
    }

    async fn abort(&mut self, status: &str, error: NfcError) {
        self.alert(status);
        self.complete(Err(error));
        self.invalidate().await;
    }

    async fn invalidate(&mut self) {
        self.state = SessionState::Invalidated;
        self.reader.invalidate().await;
    }

    fn schedule_restart(&self) {
        let reader = Arc::clone(&self.reader);
        let live = Arc::clone(&self.live);
        let delay = self.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if live.load(Ordering::Acquire) {
                reader.restart_polling().await;
            }
        });
    }

    fn alert(&self, message: &str) {
        self.reader.set_alert_message(message);
    }

    fn complete(&mut self, result: SessionResult) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }

    fn clear(&mut self) {
        self.state = SessionState::Invalidated;
        self.completion = None;
        self.live.store(false, Ordering::Release);
    }
}

fn build_uri_message(data: &str, capacity: usize) -> Result<NdefMessage, NdefError> {
    let message = NdefMessage::new(vec![ndef::uri_record(data)?]);
    let size = ndef::encode_message(&message).len();
    if size > capacity {
        return Err(NdefError::PayloadTooLarge { size, capacity });
    }
    Ok(message)
}
