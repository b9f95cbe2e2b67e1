//! helio — live panel client for a networked embedded controller.
//!
//! Connects to the controller's WebSocket endpoint, mirrors its variable
//! tree, and keeps applying the patch stream until interrupted.

use log::info;

use helio_client::Session;
use helio_sync::{ChannelEvent, Connection, ConnectionConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://controller.local/ws".to_string());
    info!("Starting helio against {url}...");

    let mut connection = Connection::spawn(ConnectionConfig::new(&url));
    let mut events = connection.take_event_rx().expect("fresh connection");
    let mut session = Session::new(connection);

    while let Some(event) = events.recv().await {
        let was_rendered = session.is_rendered();
        let is_close = matches!(event, ChannelEvent::Closed);
        session.handle_event(event);

        if !was_rendered && session.is_rendered() {
            info!(
                "snapshot rendered: {} variables, {} widgets, view {:?}",
                session.store().len(),
                session.view().node_count(),
                session.active_view()
            );
        }
        if is_close {
            info!("channel closed, awaiting reconnect");
        }
    }
}
