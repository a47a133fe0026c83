// Improvement potential. Serve websocket and metrics on the same port.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use anyhow::Context;
use async_std::net::TcpListener;
use async_tungstenite::WebSocketStream;
use dice_chess_relay::server::{Clients, IncomingEvent, ServerState};
use dice_chess_relay::utc_time::UtcDateTime;
use futures_io::{AsyncRead, AsyncWrite};
use futures_util::StreamExt;
use instant::Instant;
use log::{error, info, warn};
use prometheus::Encoder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tide::StatusCode;

use crate::network::{self, CommunicationError};
use crate::server_config::ServerConfig;


async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin + Send + 'static>(
    peer_addr: String, stream: WebSocketStream<S>, tx: mpsc::SyncSender<IncomingEvent>,
    clients: Arc<Mutex<Clients>>,
) {
    let (mut stream_tx, mut stream_rx) = stream.split();
    info!("Client connected: {}", peer_addr);

    let (client_tx, client_rx) = async_std::channel::unbounded();
    let client_id = clients.lock().unwrap().add_client(client_tx, peer_addr.clone());

    // Client -> Server
    let reader_tx = tx.clone();
    let reader_peer_addr = peer_addr.clone();
    async_std::task::spawn(async move {
        loop {
            match network::read_text_async(&mut stream_rx).await {
                Ok(text) => {
                    if reader_tx.send(IncomingEvent::Network(client_id, text)).is_err() {
                        break;
                    }
                }
                Err(CommunicationError::ConnectionClosed) => break,
                Err(err) => {
                    warn!("Client {} disconnected due to read error: {:?}", reader_peer_addr, err);
                    break;
                }
            }
        }
        // Removing the client also closes its event channel, which stops the writer.
        let _ = reader_tx.send(IncomingEvent::Disconnect(client_id));
    });

    // Server -> Client
    while let Ok(event) = client_rx.recv().await {
        if let Err(err) = network::write_obj_async(&mut stream_tx, &event).await {
            warn!("Client {} disconnected due to write error: {:?}", peer_addr, err);
            let _ = tx.send(IncomingEvent::Disconnect(client_id));
            break;
        }
    }
}

async fn listen(
    port: u16, tx: mpsc::SyncSender<IncomingEvent>, clients: Arc<Mutex<Clients>>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .context(format!("Failed to listen on port {port}."))?;
    info!("Listening on port {}", port);
    let mut incoming = listener.incoming();
    while let Some(stream) = incoming.next().await {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to accept connection: {}", err);
                continue;
            }
        };
        let peer_addr = stream
            .peer_addr()
            .map_or_else(|_| "<unknown>".to_owned(), |addr| addr.to_string());
        let tx = tx.clone();
        let clients = Arc::clone(&clients);
        async_std::task::spawn(async move {
            match async_tungstenite::accept_async(stream).await {
                Ok(stream) => handle_connection(peer_addr, stream, tx, clients).await,
                Err(err) => warn!("Websocket handshake with {} failed: {}", peer_addr, err),
            }
        });
    }
    Ok(())
}

async fn run_metrics_server(port: u16) {
    let mut app = tide::new();
    app.at("/dyn/metrics").get(handle_metrics);
    info!("Serving metrics on port {}", port);
    if let Err(err) = app.listen(format!("0.0.0.0:{port}")).await {
        error!("Metrics server stopped: {}", err);
    }
}

async fn handle_metrics(_req: tide::Request<()>) -> tide::Result {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    let body = String::from_utf8(buffer)?;
    let mut resp = tide::Response::new(StatusCode::Ok);
    resp.set_body(body);
    Ok(resp)
}

pub fn run(config: ServerConfig) -> anyhow::Result<()> {
    let options = config.server_options();
    info!("Starting server with {:?}", options);

    // Bounded: if `apply_event` falls behind, client readers block and stop draining sockets.
    let (tx, rx) = mpsc::sync_channel(100000);
    let clients = Arc::new(Mutex::new(Clients::new()));
    let clients_copy = Arc::clone(&clients);

    thread::spawn(move || {
        let mut server_state =
            ServerState::new(options, clients_copy, Box::new(StdRng::from_os_rng()));
        for event in rx {
            server_state.apply_event(event, Instant::now(), UtcDateTime::now());
        }
        panic!("Unexpected end of events stream");
    });

    if let Some(metrics_port) = config.metrics_port {
        async_std::task::spawn(run_metrics_server(metrics_port));
    }
    async_std::task::block_on(listen(config.port, tx, clients))
}
