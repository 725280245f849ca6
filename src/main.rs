use std::sync::Arc;

use crossbeam_channel::unbounded;
use log::{error, info};
use tokio::sync::broadcast;

use ndef_session::config::Settings;
use ndef_session::nfc_service::NfcService;
use ndef_session::pcsc_reader::PcscReader;
use ndef_session::session::NfcController;
use ndef_session::types::OutgoingMessage;
use ndef_session::ws;

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("Starting NFC session service...");

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let addr = match settings.server.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid server address: {}", e);
            std::process::exit(1);
        }
    };

    // Channel: reader + sessions -> WS (Events)
    // Crossbeam because the polling thread is blocking
    let (event_tx, event_rx) = unbounded::<OutgoingMessage>();

    // Broadcast for distribution to WS clients
    let (broadcast_tx, broadcast_rx) = broadcast::channel::<OutgoingMessage>(100);

    std::thread::spawn(move || {
        while let Ok(msg) = event_rx.recv() {
            let _ = broadcast_tx.send(msg);
        }
    });

    let reader = Arc::new(PcscReader::new(
        event_tx.clone(),
        settings.session.poll_interval(),
    ));
    let controller = NfcController::new(reader, settings.session.retry_delay());
    let service = Arc::new(NfcService::new(controller, event_tx));

    ws::start_server(addr, service, broadcast_rx).await;
}
