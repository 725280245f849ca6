// src/nfc_service.rs
//! Bridges client commands to the session controller and turns session
//! results into messages for connected clients.

use crossbeam_channel::Sender;
use log::{error, info};
use tokio::task::JoinHandle;

use crate::decoder::describe_message;
use crate::reader::TagReader;
use crate::session::{NfcController, SessionResult};
use crate::types::{Action, OutgoingMessage};

pub struct NfcService<R: TagReader> {
    controller: NfcController<R>,
    tx: Sender<OutgoingMessage>,
}

impl<R: TagReader + 'static> NfcService<R> {
    pub fn new(controller: NfcController<R>, tx: Sender<OutgoingMessage>) -> Self {
        Self { controller, tx }
    }

    pub fn reader_status(&self) {
        let success = self.controller.reader().reading_available();
        let _ = self.tx.send(OutgoingMessage::READER_STATUS { success });
    }

    pub fn read_data(&self) -> Option<JoinHandle<()>> {
        let tx = self.tx.clone();
        self.controller.perform_action(
            Action::ReadData,
            Some(Box::new(move |result: SessionResult| match result {
                Ok(message) => match message.as_ref().and_then(describe_message) {
                    Some(data) => {
                        let _ = tx.send(OutgoingMessage::DATA_READ_SUCCESS { data });
                    }
                    None => info!("NO PAYLOAD"),
                },
                Err(err) => {
                    error!("Read failed: {}", err);
                    let _ = tx.send(OutgoingMessage::DATA_READ_ERROR {
                        error: err.to_string(),
                    });
                }
            })),
        )
    }

    pub fn write_data(&self, payload: String) -> Option<JoinHandle<()>> {
        let tx = self.tx.clone();
        self.controller.perform_action(
            Action::WriteData(payload),
            Some(Box::new(move |result: SessionResult| {
                let msg = match result {
                    Ok(_) => OutgoingMessage::DATA_WRITE_SUCCESS {
                        message: "Data Written Successfully!".into(),
                    },
                    Err(err) => OutgoingMessage::DATA_WRITE_ERROR {
                        error: err.to_string(),
                    },
                };
                let _ = tx.send(msg);
            })),
        )
    }

    /// Ends the live session the way a user dismissing it would.
    pub async fn cancel(&self) {
        self.controller.cancel().await;
    }
}
