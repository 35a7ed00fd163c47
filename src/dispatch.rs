//! Screen-pop dispatch.
//!
//! Turns a resolved call into a ticket URL and opens it in the default
//! browser on a background task. Opening is fire-and-forget: a slow or
//! failing browser launch must never delay AMI event processing, so the
//! task is spawned and not awaited, and failures are only logged. The
//! dispatch gate was already consumed before the request got here, so a
//! failed open is not retried within its window; that trade-off is
//! deliberate.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

/// Errors from the action sink.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The system could not launch a browser for the URL.
    #[error("failed to open URL: {0}")]
    Open(#[from] std::io::Error),
}

/// One resolved, deduplicated call to notify downstream about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// External caller number.
    pub caller: String,
    /// The watched extension that answered.
    pub extension: String,
    /// Canonical call identifier.
    pub call_id: u64,
}

/// The external side effect that surfaces a dispatch to the agent.
pub trait ActionSink: Send + Sync {
    /// Opens `url` for the agent.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the underlying launcher fails.
    fn open(&self, url: &str) -> Result<(), DispatchError>;
}

/// Opens URLs in the system default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserSink;

impl ActionSink for BrowserSink {
    fn open(&self, url: &str) -> Result<(), DispatchError> {
        open::that(url)?;
        Ok(())
    }
}

/// Builds and launches ticket screen-pops.
#[derive(Clone)]
pub struct Dispatcher {
    base_url: String,
    dept_id: String,
    sink: Arc<dyn ActionSink>,
}

impl Dispatcher {
    /// Creates a dispatcher formatting URLs under `base_url` for `dept_id`.
    #[must_use]
    pub fn new(base_url: String, dept_id: String, sink: Arc<dyn ActionSink>) -> Self {
        Self {
            base_url,
            dept_id,
            sink,
        }
    }

    /// Formats the ticket URL for a request.
    ///
    /// Field order is part of the contract with the ticket frontend:
    /// call id, department, caller, extension.
    #[must_use]
    pub fn ticket_url(&self, request: &DispatchRequest) -> String {
        format!(
            "{}/#/usersummary/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            request.call_id,
            self.dept_id,
            request.caller,
            request.extension,
        )
    }

    /// Opens the screen-pop for `request` on a background task.
    ///
    /// The sink call can block on the platform launcher, so it runs on the
    /// blocking thread pool rather than a runtime worker. Never awaited and
    /// never reports back: failures are logged and not retried.
    pub fn dispatch(&self, request: DispatchRequest) {
        let url = self.ticket_url(&request);
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            debug!(url = %url, "Opening screen-pop");
            if let Err(e) = sink.open(&url) {
                error!(
                    error = %e,
                    caller = %request.caller,
                    call_id = request.call_id,
                    "Failed to open screen-pop"
                );
            }
        });
    }
}
