//! Actor that drives a [`SubscriptionCoordinator`] from a single task.
//!
//! Commands from any number of [`ChartHandle`]s, seed and backfill fetches,
//! and live ticks are all handled on one `select!` loop, so the coordinator
//! never sees concurrent mutation. Fetches run as futures owned by the loop;
//! commands keep flowing while they are in flight.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::backfill::Page;
use crate::coordinator::{LoadMore, PageRequest, SeedRequest, SubscriptionCoordinator};
use crate::error::KlineError;
use crate::models::{Candle, Period, SymbolInfo};

/// Commands accepted by a running [`ChartSession`].
#[derive(Debug)]
pub enum SessionCommand {
    Switch {
        symbol: SymbolInfo,
        period: Period,
        done: oneshot::Sender<()>,
    },
    LoadMore {
        oldest: i64,
        reply: oneshot::Sender<Option<Page>>,
    },
    Dispose,
}

/// Cloneable handle to a running [`ChartSession`].
#[derive(Clone, Debug)]
pub struct ChartHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl ChartHandle {
    /// Requests a switch to `(symbol, period)`.
    ///
    /// Resolves once the most recently requested switch has seeded and
    /// subscribed. Switches issued while a seed is loading collapse into
    /// the last one.
    ///
    /// # Errors
    ///
    /// Returns [`KlineError::SessionClosed`] if the session has stopped.
    pub async fn switch_to(&self, symbol: SymbolInfo, period: Period) -> crate::Result<()> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Switch {
                symbol,
                period,
                done,
            })
            .map_err(|_| KlineError::SessionClosed)?;
        rx.await.map_err(|_| KlineError::SessionClosed)
    }

    /// Loads the page preceding `oldest`. `Ok(None)` means the request was
    /// rejected because a seed or another page is loading.
    ///
    /// # Errors
    ///
    /// Returns [`KlineError::SessionClosed`] if the session has stopped.
    pub async fn load_more(&self, oldest: i64) -> crate::Result<Option<Page>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::LoadMore { oldest, reply })
            .map_err(|_| KlineError::SessionClosed)?;
        rx.await.map_err(|_| KlineError::SessionClosed)
    }

    /// Unsubscribes and stops the session.
    pub fn dispose(&self) {
        let _ = self.commands.send(SessionCommand::Dispose);
    }
}

type SeedFetch = BoxFuture<'static, (SeedRequest, Vec<Candle>)>;
type PageFetch = BoxFuture<'static, (PageRequest, Vec<Candle>)>;

/// Owns a coordinator and processes its inputs until disposed.
pub struct ChartSession {
    coordinator: SubscriptionCoordinator,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    seed: Option<SeedFetch>,
    page: Option<PageFetch>,
    page_reply: Option<oneshot::Sender<Option<Page>>>,
    switch_waiters: Vec<oneshot::Sender<()>>,
}

impl ChartSession {
    /// Spawns the session loop on the current tokio runtime.
    ///
    /// The loop exits on [`ChartHandle::dispose`] or once every handle has
    /// been dropped; either way the coordinator is disposed first.
    pub fn spawn(coordinator: SubscriptionCoordinator) -> ChartHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            coordinator,
            commands: rx,
            seed: None,
            page: None,
            page_reply: None,
            switch_waiters: Vec::new(),
        };
        tokio::spawn(session.run());
        ChartHandle { commands: tx }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Switch { symbol, period, done }) => {
                            self.switch_waiters.push(done);
                            if let Some(request) = self.coordinator.begin_switch(symbol, period) {
                                self.start_seed(request);
                            }
                        }
                        Some(SessionCommand::LoadMore { oldest, reply }) => {
                            self.load_more(oldest, reply);
                        }
                        Some(SessionCommand::Dispose) | None => {
                            self.coordinator.dispose();
                            info!("Chart session stopped");
                            return;
                        }
                    }
                }

                (request, candles) = poll_slot(&mut self.seed) => {
                    self.seed = None;
                    match self.coordinator.finish_switch(&request, candles) {
                        Some(next) => self.start_seed(next),
                        None => {
                            for waiter in self.switch_waiters.drain(..) {
                                let _ = waiter.send(());
                            }
                        }
                    }
                }

                (request, candles) = poll_slot(&mut self.page) => {
                    self.page = None;
                    let page = self.coordinator.complete_load_more(&request, candles);
                    if let Some(reply) = self.page_reply.take() {
                        let _ = reply.send(page);
                    }
                }

                tick = self.coordinator.next_tick() => {
                    self.coordinator.handle_tick(tick);
                }
            }
        }
    }

    fn start_seed(&mut self, request: SeedRequest) {
        let history = self.coordinator.history().clone();
        self.seed = Some(
            async move {
                let candles = history
                    .fetch(&request.symbol, &request.period, request.from, request.to)
                    .await;
                (request, candles)
            }
            .boxed(),
        );
    }

    fn load_more(&mut self, oldest: i64, reply: oneshot::Sender<Option<Page>>) {
        match self.coordinator.begin_load_more(oldest) {
            LoadMore::Rejected => {
                let _ = reply.send(None);
            }
            LoadMore::Ready(page) => {
                let _ = reply.send(Some(page));
            }
            LoadMore::Fetch(request) => {
                // A page for a previous pair may still be running.
                if let Some(previous) = self.page_reply.take() {
                    debug!("Abandoning backfill page for previous subscription");
                    let _ = previous.send(None);
                }

                let history = self.coordinator.history().clone();
                self.page = Some(
                    async move {
                        let candles = history
                            .fetch(
                                &request.symbol,
                                &request.period,
                                request.window.from,
                                request.window.to,
                            )
                            .await;
                        (request, candles)
                    }
                    .boxed(),
                );
                self.page_reply = Some(reply);
            }
        }
    }
}

/// Awaits the future in `slot`, or never resolves when the slot is empty.
async fn poll_slot<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
