// src/ws.rs
use crate::nfc_service::NfcService;
use crate::reader::TagReader;
use crate::types::{IncomingMessage, OutgoingMessage};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use warp::Filter;

pub async fn start_server<R: TagReader + 'static>(
    addr: SocketAddr,
    service: Arc<NfcService<R>>,
    mut nfc_event_rx: broadcast::Receiver<OutgoingMessage>,
) {
    // Shared Broadcast Channel for WS Clients
    let (ws_tx, _) = broadcast::channel::<OutgoingMessage>(32);
    let ws_tx = Arc::new(ws_tx);

    // 1. Task to forward NFC Events -> All WS Clients
    let ws_tx_clone = ws_tx.clone();
    tokio::spawn(async move {
        while let Some(msg) = next_message(&mut nfc_event_rx).await {
            let _ = ws_tx_clone.send(msg);
        }
    });

    // 2. WS route on the root path
    let ws_route = warp::path::end()
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let service = service.clone();
            let ws_tx = ws_tx.clone();
            ws.on_upgrade(move |socket| handle_connection(socket, service, ws_tx))
        });

    let routes = ws_route.with(warp::cors().allow_any_origin());

    info!("WebSocket server running on ws://{}", addr);
    warp::serve(routes).run(addr).await;
}

/// Next broadcast message, skipping over messages lost to lag.
/// `None` once every sender is gone.
async fn next_message(
    rx: &mut broadcast::Receiver<OutgoingMessage>,
) -> Option<OutgoingMessage> {
    loop {
        match rx.recv().await {
            Ok(msg) => return Some(msg),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Client lagged behind, {} message(s) dropped", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn handle_connection<R: TagReader + 'static>(
    ws: warp::ws::WebSocket,
    service: Arc<NfcService<R>>,
    ws_tx: Arc<broadcast::Sender<OutgoingMessage>>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();
    let mut rx_broadcast = ws_tx.subscribe();

    // Broadcasts -> Client
    tokio::spawn(async move {
        while let Some(msg) = next_message(&mut rx_broadcast).await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize {:?}: {}", msg, e);
                    continue;
                }
            };
            if client_ws_tx
                .send(warp::ws::Message::text(json))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Client -> NFC
    while let Some(Ok(msg)) = client_ws_rx.next().await {
        let Ok(text) = msg.to_str() else {
            continue;
        };
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(parsed) => dispatch(&service, parsed).await,
            Err(e) => debug!("Ignoring malformed message {:?}: {}", text, e),
        }
    }
}

async fn dispatch<R: TagReader + 'static>(service: &NfcService<R>, msg: IncomingMessage) {
    match msg {
        IncomingMessage::GET_READER_STATUS => service.reader_status(),
        IncomingMessage::READ_DATA => {
            service.read_data();
        }
        IncomingMessage::WRITE_DATA { data } => {
            info!("Received write request: {}", data);
            service.write_data(data);
        }
        IncomingMessage::CANCEL_SESSION => service.cancel().await,
    }
}
