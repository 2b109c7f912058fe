//! Test doubles shared by the unit tests.

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::session::SessionGate;
use crate::status::StatusPayload;
use crate::transport::StatusTransport;

/// Transport whose replies are scripted by the test.
#[derive(Default)]
pub struct FakeTransport {
    pub status_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub failing: AtomicBool,
    pub logout_failing: AtomicBool,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    logout_hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeTransport {
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next status fetch wait until the returned sender fires or is dropped.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock() = Some(rx);
        tx
    }

    /// Same as [`FakeTransport::hold_next`], for the logout request.
    pub fn hold_next_logout(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.logout_hold.lock() = Some(rx);
        tx
    }
}

pub fn sample_payload() -> StatusPayload {
    serde_json::from_str(
        r#"{
            "started": "2024-03-07T21:05:00Z",
            "uptime": "1d 2h",
            "isRunning": true,
            "version": "4.2.1",
            "environment": "Linux",
            "port": 5757,
            "clients": {"C1": "Press 1", "C2": "Press 2"},
            "controllers": {}
        }"#,
    )
    .unwrap()
}

#[async_trait]
impl StatusTransport for FakeTransport {
    async fn fetch_status(&self) -> anyhow::Result<StatusPayload> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let held = self.hold.lock().take();
        if let Some(rx) = held {
            let _ = rx.await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(sample_payload())
    }

    async fn fetch_logout(&self) -> anyhow::Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let held = self.logout_hold.lock().take();
        if let Some(rx) = held {
            let _ = rx.await;
        }
        if self.logout_failing.load(Ordering::SeqCst) {
            bail!("logout rejected");
        }
        Ok(())
    }
}

/// Gate that only counts how often it was used.
#[derive(Default)]
pub struct RecordingGate {
    pub cleared: AtomicUsize,
    pub navigated: AtomicUsize,
}

impl RecordingGate {
    pub fn counts(&self) -> (usize, usize) {
        (
            self.cleared.load(Ordering::SeqCst),
            self.navigated.load(Ordering::SeqCst),
        )
    }
}

impl SessionGate for RecordingGate {
    fn clear_session(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn navigate_to_entry_point(&self) {
        self.navigated.fetch_add(1, Ordering::SeqCst);
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
