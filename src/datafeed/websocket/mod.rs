//! WebSocket adapter for the live price channel.
//!
//! This module is organized by concern:
//! - [`connection`] - per-subscription connect/read/reconnect task
//! - [`handler`] - incoming frame parsing

mod connection;
mod handler;

use std::sync::Mutex;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;
use zeroize::Zeroizing;

use super::{LiveFeed, TickStream};
use crate::Result;
use crate::models::{Period, SubscribeRequest, SymbolInfo};
use connection::SubscriptionTask;

pub use handler::parse_tick_frame;

/// Write half of a live feed connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a live feed connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`KlineError`](crate::KlineError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Sends the `subscribe` control message for one symbol.
///
/// # Errors
///
/// Returns a [`KlineError`](crate::KlineError) if sending the message fails.
pub async fn send_subscribe(write: &mut WsWriter, request: &SubscribeRequest) -> Result<()> {
    let json = serde_json::to_string(request)?;
    write.send(Message::Text(json.into())).await?;
    info!(symbol = request.symbol, "Subscribed to live prices");

    Ok(())
}

/// The subscription currently being served.
struct ActiveSubscription {
    symbol: String,
    period: Period,
    generation: u64,
    task: JoinHandle<()>,
}

/// Live feed over the price WebSocket.
///
/// Each subscription gets its own connection, opened by a background task
/// that sends the `subscribe` message on open and reconnects with backoff
/// when the connection drops. Subscribing again replaces (and closes) the
/// previous connection.
pub struct WebSocketFeed {
    url: String,
    user_id: Option<String>,
    token: Option<Zeroizing<String>>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl WebSocketFeed {
    #[must_use]
    pub fn new(url: String, user_id: Option<String>, token: Option<Zeroizing<String>>) -> Self {
        Self {
            url,
            user_id,
            token,
            active: Mutex::new(None),
        }
    }

    fn replace_active(&self, next: Option<ActiveSubscription>) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            debug!(
                symbol = previous.symbol,
                period = %previous.period,
                generation = previous.generation,
                "Closing previous live connection"
            );
            previous.task.abort();
        }
        *active = next;
    }
}

impl LiveFeed for WebSocketFeed {
    /// Opens a connection for `symbol` on a background task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    fn subscribe(&self, symbol: &SymbolInfo, period: &Period, generation: u64) -> TickStream {
        let (tx, stream) = TickStream::channel(generation);
        let request = SubscribeRequest::new(
            symbol.api_symbol(),
            self.user_id.clone(),
            self.token.as_ref().map(|t| t.to_string()),
        );

        let task = tokio::spawn(SubscriptionTask::new(self.url.clone(), request, generation, tx).run());
        self.replace_active(Some(ActiveSubscription {
            symbol: symbol.api_symbol().to_string(),
            period: period.clone(),
            generation,
            task,
        }));

        stream
    }

    fn unsubscribe(&self, symbol: &SymbolInfo, period: &Period) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let matches = active
            .as_ref()
            .is_some_and(|a| a.symbol == symbol.api_symbol() && &a.period == period);

        if matches && let Some(subscription) = active.take() {
            subscription.task.abort();
            info!(
                symbol = subscription.symbol,
                period = %subscription.period,
                generation = subscription.generation,
                "Unsubscribed from live prices"
            );
        }
    }
}

impl Drop for WebSocketFeed {
    fn drop(&mut self) {
        self.replace_active(None);
    }
}
