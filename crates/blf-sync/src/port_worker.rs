//! Port worker
//!
//! One worker per serial port keeps the boards on that port in step with
//! the model:
//!
//! 1. **Open** the port, waiting the retry interval after a failure
//! 2. **Discover** the chain with the `Setup` handshake
//! 3. **Sync**: subscribe to every present, configured board and push its state
//! 4. **Run**: push boards as their state changes
//!
//! An I/O error at any step, or a push that keeps failing, closes the port
//! and starts over at step 1.

use std::sync::Arc;
use std::time::Duration;

use blf_logic::{Board, BoardId, Model};
use blf_protocol::{PortOpener, RelayDriver, RelayError, RelayLink, Timeouts};
use tracing::{debug, error, info, warn};

use crate::pending::Pending;
use crate::worker::{Phase, Worker, WorkerContext};

/// `SetPort` attempts before the port is reopened
pub const SET_PORT_ATTEMPTS: usize = 3;

/// Failed discovery attempts between retry waits
pub const DISCOVERY_ATTEMPTS: usize = 3;

/// Serial settings shared by every port worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortSettings {
    /// Read and write limits for each exchange
    pub timeouts: Timeouts,
    /// Wait after a failed open; `None` waits until woken
    pub retry_interval: Option<Duration>,
}

/// Worker owning one serial port
pub struct PortWorker<O> {
    port: String,
    model: Arc<Model>,
    opener: Arc<O>,
    settings: PortSettings,
}

impl<O: PortOpener> PortWorker<O> {
    pub fn new(port: impl Into<String>, model: Arc<Model>, opener: Arc<O>, settings: PortSettings) -> Self {
        Self {
            port: port.into(),
            model,
            opener,
            settings,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Spawn the worker loop
    pub fn spawn(self) -> Worker {
        Worker::spawn(format!("port {}", self.port), move |ctx| self.run(ctx))
    }

    /// Open, discover, sync and run, forever
    pub async fn run(self, ctx: WorkerContext) {
        loop {
            ctx.set_phase(Phase::Opening);
            let link = match self.opener.open(&self.port).await {
                Ok(link) => link,
                Err(e) => {
                    error!("Failed to open {}: {}", self.port, e);
                    ctx.retry_wait(self.settings.retry_interval).await;
                    continue;
                }
            };
            info!("Opened {}", self.port);

            let mut driver = RelayDriver::new(self.port.clone(), link, self.settings.timeouts);
            let e = self.serve(&mut driver, &ctx).await;
            error!("Reopening {}: {}", self.port, e);
        }
    }

    /// Drive an open port until something forces a reopen
    async fn serve<T: RelayLink>(&self, driver: &mut RelayDriver<T>, ctx: &WorkerContext) -> RelayError {
        ctx.set_phase(Phase::Discovering);
        let count = match self.discover(driver, ctx).await {
            Ok(count) => count,
            Err(e) => return e,
        };

        ctx.set_phase(Phase::Syncing);
        let pending: Arc<Pending<BoardId>> = Arc::new(Pending::new());
        let mut subscriptions = Vec::new();

        for address in 1..=count {
            let Some(id) = self.model.boards().find(&self.port, address) else {
                warn!(
                    "Board {} on {} is present but not configured",
                    address, self.port
                );
                continue;
            };

            let board = self.model.boards().get(id);
            let queue = Arc::clone(&pending);
            subscriptions.push(board.subscribe(move |id| queue.insert(id)));

            if let Err(e) = self.push(driver, board).await {
                return e;
            }
        }

        for board in self.model.boards().on_port(&self.port) {
            if board.address() > count {
                warn!(
                    "Board {} on {} is configured but not present",
                    board.address(),
                    self.port
                );
            }
        }
        info!(
            "Synchronized {} of {} board(s) on {}",
            subscriptions.len(),
            count,
            self.port
        );

        ctx.set_phase(Phase::Running);
        loop {
            for id in pending.next_batch().await {
                if let Err(e) = self.push(driver, self.model.boards().get(id)).await {
                    return e;
                }
            }
        }
    }

    /// Run the `Setup` handshake until it succeeds or the link fails
    async fn discover<T: RelayLink>(
        &self,
        driver: &mut RelayDriver<T>,
        ctx: &WorkerContext,
    ) -> Result<u8, RelayError> {
        let mut failures = 0usize;
        loop {
            match driver.setup().await {
                Ok(count) => {
                    info!("Found {} board(s) on {}", count, self.port);
                    return Ok(count);
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    failures += 1;
                    warn!("Discovery on {} failed: {}", self.port, e);
                    if failures % DISCOVERY_ATTEMPTS == 0 {
                        ctx.retry_wait(self.settings.retry_interval).await;
                        ctx.set_phase(Phase::Discovering);
                    }
                }
            }
        }
    }

    /// Write a board's current state, retrying protocol failures
    async fn push<T: RelayLink>(&self, driver: &mut RelayDriver<T>, board: &Board) -> Result<(), RelayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let state = board.state();
            match driver.set_port(board.address(), state).await {
                Ok(echo) => {
                    if echo != state {
                        warn!(
                            "Board {} on {} echoed 0x{:02X} for 0x{:02X}",
                            board.address(),
                            self.port,
                            echo,
                            state
                        );
                    }
                    debug!(
                        "Board {} on {} set to {:08b}",
                        board.address(),
                        self.port,
                        state
                    );
                    return Ok(());
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!(
                        "SetPort attempt {}/{} failed: {}",
                        attempt, SET_PORT_ATTEMPTS, e
                    );
                    if attempt >= SET_PORT_ATTEMPTS {
                        return Err(e);
                    }
                }
            }
        }
    }
}
