// src/test_support.rs
//! Scripted reader used by the controller and service tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::error::ReaderError;
use crate::reader::{ReaderEvent, TagReader};
use crate::session::{Completion, SessionResult};
use crate::types::{NdefMessage, NdefStatus, TagCapability};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin(String),
    Alert(String),
    RestartPolling,
    Invalidate,
    Connect(u32),
    QueryStatus(u32),
    Read(u32),
    Write(u32, NdefMessage),
}

pub struct MockReader {
    available: bool,
    events_tx: UnboundedSender<ReaderEvent<u32>>,
    events_rx: Mutex<Option<UnboundedReceiver<ReaderEvent<u32>>>>,
    begin_error: Mutex<Option<ReaderError>>,
    calls: Mutex<Vec<Call>>,
    connects: Mutex<VecDeque<Result<(), ReaderError>>>,
    statuses: Mutex<VecDeque<Result<NdefStatus, ReaderError>>>,
    reads: Mutex<VecDeque<Result<Option<NdefMessage>, ReaderError>>>,
    writes: Mutex<VecDeque<Result<(), ReaderError>>>,
}

impl MockReader {
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            available: true,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            begin_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            connects: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            reads: Mutex::new(VecDeque::new()),
            writes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Queues an event; events sent before `begin` are delivered once it runs.
    pub fn send(&self, event: ReaderEvent<u32>) {
        let _ = self.events_tx.send(event);
    }

    pub fn fail_begin(&self, err: ReaderError) {
        *self.begin_error.lock().unwrap() = Some(err);
    }

    pub fn push_connect(&self, result: Result<(), ReaderError>) {
        self.connects.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: Result<NdefStatus, ReaderError>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn push_read(&self, result: Result<Option<NdefMessage>, ReaderError>) {
        self.reads.lock().unwrap().push_back(result);
    }

    pub fn push_write(&self, result: Result<(), ReaderError>) {
        self.writes.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Alert(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TagReader for MockReader {
    type Tag = u32;

    fn reading_available(&self) -> bool {
        self.available
    }

    async fn begin(
        &self,
        alert_message: &str,
    ) -> Result<UnboundedReceiver<ReaderEvent<u32>>, ReaderError> {
        if let Some(err) = self.begin_error.lock().unwrap().take() {
            return Err(err);
        }
        self.record(Call::Begin(alert_message.to_string()));
        self.events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(ReaderError::SystemBusy)
    }

    fn set_alert_message(&self, message: &str) {
        self.record(Call::Alert(message.to_string()));
    }

    async fn restart_polling(&self) {
        self.record(Call::RestartPolling);
    }

    async fn invalidate(&self) {
        self.record(Call::Invalidate);
        // Before `begin` there is no session to stop.
        if self.events_rx.lock().unwrap().is_none() {
            self.send(ReaderEvent::Invalidated(ReaderError::UserCanceled));
        }
    }

    async fn connect(&self, tag: &u32) -> Result<(), ReaderError> {
        self.record(Call::Connect(*tag));
        self.connects.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn query_ndef_status(&self, tag: &u32) -> Result<NdefStatus, ReaderError> {
        self.record(Call::QueryStatus(*tag));
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(NdefStatus {
                capability: TagCapability::ReadWrite,
                capacity: 496,
            }))
    }

    async fn read_ndef(&self, tag: &u32) -> Result<Option<NdefMessage>, ReaderError> {
        self.record(Call::Read(*tag));
        self.reads.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn write_ndef(&self, tag: &u32, message: &NdefMessage) -> Result<(), ReaderError> {
        self.record(Call::Write(*tag, message.clone()));
        self.writes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// A completion that stores every result it receives.
pub fn recorder() -> (Completion, Arc<Mutex<Vec<SessionResult>>>) {
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    let completion: Completion =
        Box::new(move |result: SessionResult| sink.lock().unwrap().push(result));
    (completion, results)
}
