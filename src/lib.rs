//! callpop - Asterisk AMI answered-call watcher.
//!
//! Watches AMI `DialBegin`/`DialEnd` events for one configured extension
//! and opens a ticket screen-pop in the local browser for each call that
//! is answered on that extension - exactly once per call within the dedup
//! windows, without blocking the event stream.
//!
//! # Architecture
//!
//! The [`ami`] client delivers events one at a time over a channel; the
//! [`correlate::CorrelationEngine`] classifies each event, bridges the
//! ring and answer phases of a call, and deduplicates across three
//! independent time windows; the [`dispatch::Dispatcher`] formats the
//! ticket URL and fires the browser on a background task.
//!
//! All correlation state lives in memory and is rebuilt from scratch on
//! restart; the exactly-once guarantee holds while the process runs.
//!
//! # Modules
//!
//! - [`ami`]: AMI protocol client (login, keepalive, reconnect)
//! - [`config`]: `settings.json` loading and validation
//! - [`correlate`]: correlation and deduplication engine
//! - [`dispatch`]: ticket URL construction and browser launching
//! - [`error`]: crate error type
//! - [`event`]: typed AMI events

pub mod ami;
pub mod config;
pub mod correlate;
pub mod dispatch;
pub mod error;
pub mod event;

pub use ami::{AmiClient, AmiError};
pub use config::{Config, ConfigError};
pub use correlate::{CorrelationEngine, EngineStats};
pub use dispatch::{ActionSink, BrowserSink, DispatchError, DispatchRequest, Dispatcher};
pub use error::{CallpopError, Result};
pub use event::{AmiEvent, EventKind};
