//! The connection task: owns the one channel instance, its reconnect
//! policy and its stall watchdog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::Command;

/// Channel tuning. The delays are fixed: reconnect never backs off and
/// never gives up.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub url: String,
    /// Fixed delay between a close and the next connect attempt.
    pub reconnect_delay: Duration,
    /// Armed on every outbound send, cleared by any inbound frame; expiry
    /// force-closes the channel.
    pub stall_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_millis(1500),
            stall_timeout: Duration::from_millis(3000),
        }
    }
}

/// What the channel delivers to the session loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// Open handshake completed; sends are legal from here on.
    Opened,
    /// One UTF-8 structured frame.
    Text(String),
    /// One out-of-band preview payload.
    Binary(Vec<u8>),
    /// Channel closed (expected or forced); a reconnect is already
    /// scheduled.
    Closed,
}

/// Handle to the connection task.
///
/// `send` is fire-and-forget: commands submitted while the gate is closed
/// (before the open handshake, after a close) are silently dropped — this
/// guards against spurious sends triggered by UI restore events.
pub struct Connection {
    outgoing_tx: mpsc::Sender<String>,
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,
    gate: Arc<AtomicBool>,
}

impl Connection {
    /// Spawn the connection task. There is one channel instance per
    /// session; dropping the handle (and its event receiver) stops the
    /// task.
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);
        let gate = Arc::new(AtomicBool::new(false));
        tokio::spawn(run(config, outgoing_rx, event_tx, gate.clone()));
        Self {
            outgoing_tx,
            event_rx: Some(event_rx),
            gate,
        }
    }

    /// Take the event receiver (once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    pub fn is_open(&self) -> bool {
        self.gate.load(Ordering::Acquire)
    }

    /// Fire-and-forget send. Dropped with a debug log when the gate is
    /// closed or the outbound queue is unavailable.
    pub fn send(&self, command: &Command) {
        if !self.is_open() {
            debug!("channel not open, dropping {command:?}");
            return;
        }
        let frame = command.encode();
        if self.outgoing_tx.try_send(frame).is_err() {
            debug!("outbound queue unavailable, dropping {command:?}");
        }
    }
}

async fn run(
    config: ConnectionConfig,
    mut outgoing_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<ChannelEvent>,
    gate: Arc<AtomicBool>,
) {
    loop {
        match tokio_tungstenite::connect_async(&config.url).await {
            Ok((ws, _)) => {
                info!("channel open: {}", config.url);
                gate.store(true, Ordering::Release);
                if event_tx.send(ChannelEvent::Opened).await.is_err() {
                    return; // session gone
                }

                let keep_running = drive(ws, &mut outgoing_rx, &event_tx, &config).await;

                gate.store(false, Ordering::Release);
                if !keep_running || event_tx.send(ChannelEvent::Closed).await.is_err() {
                    return;
                }
                info!("channel closed, retrying in {:?}", config.reconnect_delay);
            }
            Err(e) => {
                debug!("connect failed: {e}, retrying in {:?}", config.reconnect_delay);
            }
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// Pump one live socket until it closes. Returns false when the session
/// side is gone and the task should stop instead of reconnecting.
async fn drive(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    outgoing_rx: &mut mpsc::Receiver<String>,
    event_tx: &mpsc::Sender<ChannelEvent>,
    config: &ConnectionConfig,
) -> bool {
    let (mut sink, mut stream) = ws.split();
    // One watchdog deadline at a time: re-armed per send, cleared by any
    // inbound frame.
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        let armed = deadline;
        let stall = async move {
            match armed {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        deadline = Some(tokio::time::Instant::now() + config.stall_timeout);
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            return true;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return false;
                    }
                }
            }
            inbound = stream.next() => {
                deadline = None;
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(ChannelEvent::Text(text.to_string())).await.is_err() {
                            return false;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if event_tx.send(ChannelEvent::Binary(data.into())).await.is_err() {
                            return false;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return true;
                    }
                }
            }
            _ = stall => {
                warn!("stall watchdog expired after {:?}, forcing channel closed", config.stall_timeout);
                let _ = sink.close().await;
                return true;
            }
        }
    }
}
