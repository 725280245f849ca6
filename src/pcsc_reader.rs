// src/pcsc_reader.rs
//! PC/SC implementation of the tag reader, for ACR122U-style USB readers.
//!
//! Polling runs on a blocking OS thread. It reports every reader with a card
//! on it as one detected tag, then pauses until the controller restarts
//! polling or ends the session. Card IO uses `block_in_place`, so this
//! reader needs the multi-threaded tokio runtime.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use pcsc::{Card, Context, PNP_NOTIFICATION, Protocols, ReaderState, Scope, ShareMode, State};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::error::{NdefError, ReaderError};
use crate::reader::{ReaderEvent, TagReader};
use crate::types::{
    CARD_TYPE_MIFARE_1K, CARD_TYPE_NTAG, NdefMessage, NdefStatus, OutgoingMessage, TagCapability,
};
use crate::{cards, ndef};

/// A card sitting on a specific reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscTag {
    pub reader: CString,
    pub atr: Vec<u8>,
}

impl PcscTag {
    // Last ATR byte identifies the card family on ACR122U readers
    fn card_type(&self) -> String {
        match self.atr.last() {
            Some(last) => format!("{:x}", last),
            None => "unknown".into(),
        }
    }
}

#[derive(Debug)]
enum PollCommand {
    Restart,
    Stop,
}

struct PollSession {
    ctx: Context,
    control: Sender<PollCommand>,
    thread: JoinHandle<()>,
}

struct ConnectedCard {
    reader: CString,
    card_type: String,
    data_area_size: usize,
    card: Card,
}

pub struct PcscReader {
    status_tx: Sender<OutgoingMessage>,
    poll_interval: Duration,
    session: Mutex<Option<PollSession>>,
    card: Mutex<Option<ConnectedCard>>,
    // Set by `cancel`, reset by `begin`. Tag IO after a cancel reports it.
    canceled: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn usable_capacity(data_area_size: usize) -> usize {
    data_area_size.saturating_sub(ndef::tlv_overhead(data_area_size))
}

fn list_readers(ctx: &Context) -> Result<Vec<CString>, pcsc::Error> {
    let mut readers_buf = [0; 2048];
    Ok(ctx
        .list_readers(&mut readers_buf)?
        .map(CString::from)
        .collect())
}

impl PcscReader {
    pub fn new(status_tx: Sender<OutgoingMessage>, poll_interval: Duration) -> Self {
        Self {
            status_tx,
            poll_interval,
            session: Mutex::new(None),
            card: Mutex::new(None),
            canceled: AtomicBool::new(false),
        }
    }

    /// Ends the running session as if the user dismissed it.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        let session = lock(&self.session).take();
        if let Some(session) = session {
            info!("Stopping reader session");
            let _ = session.control.send(PollCommand::Stop);
            // Wake the poll thread out of get_status_change
            let _ = session.ctx.cancel();
        }
        lock(&self.card).take();
    }

    fn ensure_not_canceled(&self) -> Result<(), ReaderError> {
        if self.canceled.load(Ordering::Acquire) {
            return Err(ReaderError::UserCanceled);
        }
        Ok(())
    }

    fn context(&self) -> Result<Context, ReaderError> {
        self.ensure_not_canceled()?;
        lock(&self.session)
            .as_ref()
            .map(|session| session.ctx.clone())
            .ok_or(ReaderError::TagNotConnected)
    }

    fn with_card<T>(
        &self,
        tag: &PcscTag,
        f: impl FnOnce(&mut ConnectedCard) -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        self.ensure_not_canceled()?;
        let mut guard = lock(&self.card);
        match guard.as_mut() {
            Some(card) if card.reader == tag.reader => tokio::task::block_in_place(|| f(card)),
            _ => Err(ReaderError::TagNotConnected),
        }
    }
}

#[async_trait]
impl TagReader for PcscReader {
    type Tag = PcscTag;

    fn reading_available(&self) -> bool {
        match Context::establish(Scope::User).and_then(|ctx| list_readers(&ctx)) {
            Ok(readers) => !readers.is_empty(),
            Err(err) => {
                debug!("PC/SC unavailable: {}", err);
                false
            }
        }
    }

    async fn begin(
        &self,
        alert_message: &str,
    ) -> Result<UnboundedReceiver<ReaderEvent<PcscTag>>, ReaderError> {
        let mut session = lock(&self.session);
        if let Some(existing) = session.as_ref() {
            if !existing.thread.is_finished() {
                return Err(ReaderError::SystemBusy);
            }
        }

        let ctx = Context::establish(Scope::User)?;
        let (events_tx, events_rx) = unbounded_channel();
        let (control_tx, control_rx) = unbounded();

        let poll_ctx = ctx.clone();
        let interval = self.poll_interval;
        let thread = std::thread::Builder::new()
            .name("nfc-poll".into())
            .spawn(move || poll(poll_ctx, control_rx, events_tx, interval))
            .map_err(|e| ReaderError::Unavailable(e.to_string()))?;

        self.canceled.store(false, Ordering::Release);
        *session = Some(PollSession {
            ctx,
            control: control_tx,
            thread,
        });
        drop(session);

        self.set_alert_message(alert_message);
        Ok(events_rx)
    }

    fn set_alert_message(&self, message: &str) {
        info!("Session status: {}", message);
        let _ = self.status_tx.send(OutgoingMessage::SESSION_STATUS {
            message: message.to_string(),
        });
    }

    async fn restart_polling(&self) {
        lock(&self.card).take();
        if let Some(session) = lock(&self.session).as_ref() {
            let _ = session.control.send(PollCommand::Restart);
        }
    }

    async fn invalidate(&self) {
        self.cancel();
    }

    async fn connect(&self, tag: &PcscTag) -> Result<(), ReaderError> {
        let ctx = self.context()?;
        let card = tokio::task::block_in_place(|| {
            ctx.connect(&tag.reader, ShareMode::Shared, Protocols::ANY)
        })?;

        match tokio::task::block_in_place(|| crate::apdu::get_uid(&card)) {
            Ok(uid) => info!("Connected to tag {} on {:?}", hex::encode(uid), tag.reader),
            Err(e) => debug!("Could not read UID on {:?}: {}", tag.reader, e),
        }

        *lock(&self.card) = Some(ConnectedCard {
            reader: tag.reader.clone(),
            card_type: tag.card_type(),
            data_area_size: 0,
            card,
        });
        Ok(())
    }

    async fn query_ndef_status(&self, tag: &PcscTag) -> Result<NdefStatus, ReaderError> {
        self.with_card(tag, |connected| {
            if connected.card_type == CARD_TYPE_MIFARE_1K {
                connected.data_area_size = cards::MIFARE_1K_DATA_BYTES;
                return Ok(NdefStatus {
                    capability: TagCapability::ReadWrite,
                    capacity: usable_capacity(connected.data_area_size),
                });
            }
            if connected.card_type != CARD_TYPE_NTAG {
                debug!("Unrecognized card type {}, probing as Type 2", connected.card_type);
            }

            let status = match cards::read_capability_container(&connected.card)
                .map_err(ReaderError::Transmit)?
            {
                None => NdefStatus {
                    capability: TagCapability::NotSupported,
                    capacity: 0,
                },
                Some(cc) => {
                    connected.data_area_size = cc.data_area_size;
                    NdefStatus {
                        capability: if cc.writable {
                            TagCapability::ReadWrite
                        } else {
                            TagCapability::ReadOnly
                        },
                        capacity: usable_capacity(cc.data_area_size),
                    }
                }
            };
            Ok(status)
        })
    }

    async fn read_ndef(&self, tag: &PcscTag) -> Result<Option<NdefMessage>, ReaderError> {
        self.with_card(tag, |connected| {
            let raw = if connected.card_type == CARD_TYPE_MIFARE_1K {
                cards::read_mifare(&connected.card)
            } else {
                cards::read_ntag(&connected.card, connected.data_area_size)
            }
            .map_err(ReaderError::Transmit)?;

            match ndef::find_ndef_tlv(&raw) {
                Ok(Some(bytes)) => ndef::parse_message(bytes)
                    .map(Some)
                    .map_err(|e| ReaderError::Transmit(e.to_string())),
                Ok(None) | Err(NdefError::NoNdefTlv) => Ok(None),
                Err(e) => Err(ReaderError::Transmit(e.to_string())),
            }
        })
    }

    async fn write_ndef(&self, tag: &PcscTag, message: &NdefMessage) -> Result<(), ReaderError> {
        let tlv_data = ndef::wrap_in_tlv(&ndef::encode_message(message));
        self.with_card(tag, |connected| {
            if connected.card_type == CARD_TYPE_MIFARE_1K {
                cards::write_mifare(&connected.card, &tlv_data)
            } else {
                cards::write_ntag(&connected.card, &tlv_data)
            }
            .map_err(ReaderError::Transmit)
        })
    }
}

fn reset_reader_states(reader_states: &mut Vec<ReaderState>, reader_names: &[CString]) {
    // Keep the PnP entry at index 0
    reader_states.truncate(1);
    for name in reader_names {
        reader_states.push(ReaderState::new(name.clone(), State::UNAWARE));
    }
}

fn poll(
    ctx: Context,
    control: Receiver<PollCommand>,
    events: UnboundedSender<ReaderEvent<PcscTag>>,
    interval: Duration,
) {
    info!("Polling for tags...");

    let mut reader_states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];
    let reader_names = list_readers(&ctx).unwrap_or_default();
    reset_reader_states(&mut reader_states, &reader_names);

    let mut paused = false;
    let mut rescan = false;

    loop {
        // 1. Commands from the controller
        while let Ok(cmd) = control.try_recv() {
            match cmd {
                PollCommand::Restart => {
                    debug!("Restarting polling");
                    paused = false;
                    rescan = true;
                }
                PollCommand::Stop => {
                    let _ = events.send(ReaderEvent::Invalidated(ReaderError::UserCanceled));
                    return;
                }
            }
        }

        // 2. Wait for a state change
        match ctx.get_status_change(interval, &mut reader_states) {
            Ok(()) | Err(pcsc::Error::Timeout) | Err(pcsc::Error::Cancelled) => {}
            Err(err) => {
                error!("PCSC Error: {}", err);
                let _ = events.send(ReaderEvent::Invalidated(err.into()));
                return;
            }
        }

        // 3. Process events
        let mut readers_changed = false;
        let mut inserted = false;

        if reader_states[0].event_state().intersects(State::CHANGED) {
            info!("Hardware change detected");
            readers_changed = true;
            reader_states[0].sync_current_state();
        }

        for rs in reader_states.iter_mut().skip(1) {
            if rs.event_state().intersects(State::CHANGED) {
                let current = rs.event_state();
                if current.intersects(State::PRESENT)
                    && !rs.current_state().intersects(State::PRESENT)
                {
                    info!("Card Inserted on {:?}", rs.name());
                    inserted = true;
                }
                if current.intersects(State::EMPTY) && rs.current_state().intersects(State::PRESENT)
                {
                    info!("Card Removed from {:?}", rs.name());
                }
                rs.sync_current_state();
            }
        }

        // 4. Report tags
        if !paused && (inserted || rescan) {
            rescan = false;
            let tags: Vec<PcscTag> = reader_states
                .iter()
                .skip(1)
                .filter(|rs| rs.current_state().intersects(State::PRESENT))
                .map(|rs| PcscTag {
                    reader: rs.name().to_owned(),
                    atr: rs.atr().to_vec(),
                })
                .collect();

            if !tags.is_empty() {
                debug!("Detected {} tag(s)", tags.len());
                paused = true;
                if events.send(ReaderEvent::TagsDetected(tags)).is_err() {
                    warn!("Session receiver dropped, stopping poll");
                    return;
                }
            }
        }

        // 5. Refresh list
        if readers_changed {
            match list_readers(&ctx) {
                Ok(names) => reset_reader_states(&mut reader_states, &names),
                Err(err) => {
                    warn!("Failed to list readers: {}", err);
                    reader_states.truncate(1);
                }
            }
        }
    }
}
