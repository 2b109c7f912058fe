//! Status refresh controller.
//!
//! Polls the server for its status, keeps the latest snapshot for the panel
//! and hands the user back to the login page whenever a fetch fails.

use anyhow::anyhow;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::session::SessionGate;
use crate::status::{transform, StatusPayload, StatusView};
use crate::transport::StatusTransport;

/// Time between two refreshes once the first one has succeeded.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(5000);

/// What a call to [`StatusPoller::poll`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Refreshed,
    /// The fetch failed and the session gate was triggered
    Failed,
    /// Another poll was already in flight
    Skipped,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    Completed,
    /// A poll or another logout was in flight, or the poller is disposed
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Polling,
    /// Logout request outstanding; polls are dropped until it returns
    LoggingOut,
    Disposed,
}

enum Cadence {
    Stopped,
    Running(JoinHandle<()>),
}

struct PollerState {
    phase: Phase,
    cadence: Cadence,
    current: Option<Arc<StatusView>>,
}

#[derive(Debug, Clone, Default)]
pub struct PollerOptions {
    /// Give up on a status fetch after this long; `None` waits forever
    pub fetch_timeout: Option<Duration>,
}

struct Shared {
    transport: Arc<dyn StatusTransport>,
    gate: Arc<dyn SessionGate>,
    options: PollerOptions,
    state: Mutex<PollerState>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handle to a status refresh controller. Clones share the same controller;
/// dropping the last one disposes it.
#[derive(Clone)]
pub struct StatusPoller {
    shared: Arc<Shared>,
}

impl StatusPoller {
    /// Create the controller and kick off the first poll right away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        transport: Arc<dyn StatusTransport>,
        gate: Arc<dyn SessionGate>,
        options: PollerOptions,
    ) -> Self {
        let poller = Self {
            shared: Arc::new(Shared {
                transport,
                gate,
                options,
                state: Mutex::new(PollerState {
                    phase: Phase::Idle,
                    cadence: Cadence::Stopped,
                    current: None,
                }),
                shutdown: CancellationToken::new(),
            }),
        };

        let first = poller.clone();
        tokio::spawn(async move {
            first.poll().await;
        });

        poller
    }

    /// The most recent successfully fetched status, if any.
    pub fn current(&self) -> Option<Arc<StatusView>> {
        self.shared.state.lock().current.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().phase == Phase::Polling
    }

    /// Fetch the status once. A call made while another poll is still in
    /// flight is dropped, not queued.
    pub async fn poll(&self) -> PollOutcome {
        if let Err(outcome) = self.begin_poll() {
            return outcome;
        }

        match self.fetch().await {
            Ok(payload) => self.finish_success(payload),
            Err(err) => {
                if !self.finish_failure() {
                    return PollOutcome::Disposed;
                }
                warn!(error = %format!("{:#}", err), "status refresh failed, returning to entry point");
                self.shared.gate.clear_session();
                self.shared.gate.navigate_to_entry_point();
                PollOutcome::Failed
            }
        }
    }

    /// End the session. Ignored while a poll or another logout is in flight;
    /// polls started while the logout request is outstanding are dropped.
    ///
    /// Navigation to the entry point happens whether or not the server
    /// acknowledged the logout.
    pub async fn logout(&self) -> LogoutOutcome {
        if !self.begin_logout() {
            return LogoutOutcome::Skipped;
        }

        self.shared.gate.clear_session();
        if let Err(err) = self.shared.transport.fetch_logout().await {
            warn!(error = %format!("{:#}", err), "logout request failed");
        }
        {
            let mut state = self.shared.state.lock();
            if state.phase == Phase::LoggingOut {
                state.phase = Phase::Idle;
            }
        }
        self.shared.gate.navigate_to_entry_point();
        info!("logged out");
        LogoutOutcome::Completed
    }

    /// Stop refreshing. Responses to fetches already on the wire are
    /// discarded when they arrive.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        if state.phase == Phase::Disposed {
            return;
        }
        state.phase = Phase::Disposed;
        if let Cadence::Running(handle) = std::mem::replace(&mut state.cadence, Cadence::Stopped) {
            handle.abort();
        }
        self.shared.shutdown.cancel();
        info!("status poller disposed");
    }

    fn begin_logout(&self) -> bool {
        let mut state = self.shared.state.lock();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::LoggingOut;
                true
            }
            Phase::Polling | Phase::LoggingOut => {
                debug!("logout ignored, request in flight");
                false
            }
            Phase::Disposed => false,
        }
    }

    fn begin_poll(&self) -> Result<(), PollOutcome> {
        let mut state = self.shared.state.lock();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Polling;
                Ok(())
            }
            Phase::Polling | Phase::LoggingOut => {
                trace!(phase = ?state.phase, "poll skipped, request in flight");
                Err(PollOutcome::Skipped)
            }
            Phase::Disposed => Err(PollOutcome::Disposed),
        }
    }

    async fn fetch(&self) -> anyhow::Result<StatusPayload> {
        let request = self.shared.transport.fetch_status();
        match self.shared.options.fetch_timeout {
            Some(limit) => time::timeout(limit, request)
                .await
                .map_err(|_| anyhow!("status request timed out after {:?}", limit))?,
            None => request.await,
        }
    }

    fn finish_success(&self, payload: StatusPayload) -> PollOutcome {
        let mut state = self.shared.state.lock();
        if state.phase == Phase::Disposed {
            trace!("discarding status received after dispose");
            return PollOutcome::Disposed;
        }

        if let Cadence::Stopped = state.cadence {
            info!(interval_ms = REFRESH_INTERVAL.as_millis() as u64, "first status received, starting refresh cadence");
            state.cadence = Cadence::Running(self.spawn_cadence());
        }

        let view = transform(payload);
        debug!(
            running = view.snapshot.is_running,
            clients = view.client_count(),
            controllers = view.controller_count(),
            "status refreshed"
        );
        state.current = Some(Arc::new(view));
        state.phase = Phase::Idle;
        PollOutcome::Refreshed
    }

    /// Returns false when the poller was disposed while the fetch was out.
    fn finish_failure(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.phase == Phase::Disposed {
            trace!("discarding failure received after dispose");
            return false;
        }
        state.phase = Phase::Idle;
        true
    }

    fn spawn_cadence(&self) -> JoinHandle<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let shutdown = self.shared.shutdown.clone();

        tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + REFRESH_INTERVAL, REFRESH_INTERVAL);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => {
                        let Some(shared) = weak.upgrade() else { break };
                        let poller = StatusPoller { shared };
                        // Separate task, so a tick during a slow fetch hits the guard
                        tokio::spawn(async move {
                            poller.poll().await;
                        });
                    }
                }
            }
        })
    }
}
