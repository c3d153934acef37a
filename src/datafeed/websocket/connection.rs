//! Connection lifecycle for a single live subscription.
//!
//! [`SubscriptionTask`] connects, sends the subscribe message, forwards
//! price frames into the subscription's tick channel, and reconnects with
//! exponential backoff until the receiving [`TickStream`](crate::datafeed::TickStream)
//! is dropped.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tungstenite::Message;

use super::{WsReader, connect, handler, send_subscribe};
use crate::models::{LiveTick, SubscribeRequest};

/// Initial backoff duration between reconnection attempts.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff duration between reconnection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Why the reader loop exited.
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// The tick stream was dropped (subscription replaced or disposed).
    Shutdown,
}

/// Background task serving one `(symbol, generation)` subscription.
pub(super) struct SubscriptionTask {
    url: String,
    request: SubscribeRequest,
    generation: u64,
    tx: mpsc::UnboundedSender<LiveTick>,
}

impl SubscriptionTask {
    pub(super) fn new(
        url: String,
        request: SubscribeRequest,
        generation: u64,
        tx: mpsc::UnboundedSender<LiveTick>,
    ) -> Self {
        Self {
            url,
            request,
            generation,
            tx,
        }
    }

    /// Runs until the tick stream is dropped, reconnecting on failure.
    pub(super) async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            info!(
                url = %self.url,
                symbol = self.request.symbol,
                generation = self.generation,
                "Connecting to live feed"
            );
            let (mut write, read) = match connect(&self.url).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Live feed connection failed: {e}");
                    if !self.back_off(&mut backoff).await {
                        return;
                    }
                    continue;
                }
            };

            if let Err(e) = send_subscribe(&mut write, &self.request).await {
                warn!("Subscribe failed: {e}");
                if !self.back_off(&mut backoff).await {
                    return;
                }
                continue;
            }

            // Reset backoff on successful connection
            backoff = INITIAL_BACKOFF;

            match self.read_loop(read).await {
                DisconnectReason::ConnectionError => {
                    if !self.back_off(&mut backoff).await {
                        return;
                    }
                }
                DisconnectReason::Shutdown => {
                    info!(
                        symbol = self.request.symbol,
                        generation = self.generation,
                        "Live feed task shutting down"
                    );
                    return;
                }
            }

            drop(write);
        }
    }

    /// Sleeps for the current backoff and doubles it. Returns `false` if
    /// the tick stream was dropped while waiting.
    async fn back_off(&self, backoff: &mut Duration) -> bool {
        info!(backoff_secs = backoff.as_secs(), "Backing off before retry");
        let wait = *backoff;
        *backoff = (*backoff * 2).min(MAX_BACKOFF);

        tokio::select! {
            () = tokio::time::sleep(wait) => true,
            () = self.tx.closed() => false,
        }
    }

    /// Forwards ticks until disconnection or until the stream is dropped.
    async fn read_loop(&self, mut read: WsReader) -> DisconnectReason {
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(tick) = handler::parse_tick_frame(&text, &self.request.symbol) {
                                let live = LiveTick { generation: self.generation, tick };
                                if self.tx.send(live).is_err() {
                                    return DisconnectReason::Shutdown;
                                }
                            }
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong/Close frames
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }

                () = self.tx.closed() => {
                    return DisconnectReason::Shutdown;
                }
            }
        }
    }
}
