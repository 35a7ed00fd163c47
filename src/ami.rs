//! Asterisk Manager Interface (AMI) client.
//!
//! Speaks the line-based AMI protocol over TCP: a banner line on connect,
//! then CRLF-delimited `Key: Value` frames separated by blank lines. The
//! client logs in with the `call` event class to keep event volume down,
//! pings the server every 10 seconds so idle connections are not dropped,
//! and converts event frames into [`AmiEvent`]s delivered over an mpsc
//! channel.
//!
//! The initial connect and login are performed by the caller and are fatal
//! on failure. Once running, a lost connection is re-established in the
//! background with exponential backoff (1s → 60s, ±25% jitter); events
//! arriving while disconnected are simply missed, matching the in-memory,
//! best-effort nature of the daemon.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::AmiEvent;

/// Keepalive ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Initial reconnect delay in seconds.
const INITIAL_RETRY_DELAY_SECS: u64 = 1;

/// Maximum reconnect delay in seconds.
const MAX_RETRY_DELAY_SECS: u64 = 60;

/// Jitter factor (±25%).
const JITTER_FACTOR: f64 = 0.25;

/// Expected start of the AMI protocol banner.
const BANNER_PREFIX: &str = "Asterisk Call Manager";

/// Errors that can occur while talking to the AMI.
#[derive(Error, Debug)]
pub enum AmiError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Disconnected,

    /// The greeting did not look like an AMI banner.
    #[error("unexpected protocol banner: {0}")]
    UnexpectedBanner(String),

    /// The server rejected the login action.
    #[error("login rejected: {0}")]
    LoginRejected(String),
}

/// A parsed AMI frame: lowercased keys to raw values.
pub type Frame = HashMap<String, String>;

/// Connection parameters, extracted from the daemon config.
#[derive(Debug, Clone)]
struct AmiSettings {
    host: String,
    port: u16,
    username: String,
    secret: String,
}

impl AmiSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            secret: config.secret.clone(),
        }
    }
}

/// One live AMI session.
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// How an event-pumping session ended.
enum PumpEnd {
    /// The event channel was closed; the daemon is shutting down.
    Shutdown,
    /// The connection was lost.
    Lost(AmiError),
}

/// A connected, logged-in AMI client.
pub struct AmiClient {
    settings: AmiSettings,
    conn: Connection,
}

impl AmiClient {
    /// Connects to the AMI and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`AmiError`] when the TCP connect fails, the banner is not
    /// recognized, or the server rejects the credentials. Callers treat
    /// this as fatal at startup.
    pub async fn connect(config: &Config) -> Result<Self, AmiError> {
        let settings = AmiSettings::from_config(config);
        let conn = open(&settings).await?;
        Ok(Self { settings, conn })
    }

    /// Pumps AMI events into `tx` until the receiver is dropped.
    ///
    /// Runs as a background task for the process lifetime. Lost
    /// connections are re-established with backoff; the task only returns
    /// once the receiving side shuts down.
    pub async fn run(self, tx: mpsc::Sender<AmiEvent>) {
        let Self { settings, mut conn } = self;
        let mut retry_delay = Duration::from_secs(INITIAL_RETRY_DELAY_SECS);

        loop {
            match pump(conn, &tx).await {
                PumpEnd::Shutdown => {
                    info!("Event channel closed, AMI client stopping");
                    return;
                }
                PumpEnd::Lost(e) => {
                    warn!(error = %e, "AMI connection lost, reconnecting");
                }
            }

            conn = loop {
                let delay = add_jitter(retry_delay);
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
                sleep(delay).await;

                if tx.is_closed() {
                    info!("Shutdown during reconnect, AMI client stopping");
                    return;
                }

                match open(&settings).await {
                    Ok(conn) => {
                        info!(host = %settings.host, "Reconnected to AMI");
                        retry_delay = Duration::from_secs(INITIAL_RETRY_DELAY_SECS);
                        break conn;
                    }
                    Err(e) => {
                        warn!(error = %e, "Reconnect attempt failed");
                        retry_delay = Duration::from_secs(
                            (retry_delay.as_secs() * 2).min(MAX_RETRY_DELAY_SECS),
                        );
                    }
                }
            };
        }
    }
}

/// Opens a TCP connection, checks the banner, and logs in.
async fn open(settings: &AmiSettings) -> Result<Connection, AmiError> {
    let stream = TcpStream::connect((settings.host.as_str(), settings.port)).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut banner = String::new();
    if reader.read_line(&mut banner).await? == 0 {
        return Err(AmiError::Disconnected);
    }
    let banner = banner.trim();
    if !banner.starts_with(BANNER_PREFIX) {
        return Err(AmiError::UnexpectedBanner(banner.to_string()));
    }
    debug!(banner = %banner, "AMI banner received");

    write_action(
        &mut writer,
        "Login",
        &[
            ("Username", &settings.username),
            ("Secret", &settings.secret),
            ("Events", "call"),
        ],
    )
    .await?;

    // Events may be interleaved before the login response; skip them.
    loop {
        let frame = read_frame(&mut reader).await?;
        if let Some(response) = frame.get("response") {
            if response.eq_ignore_ascii_case("success") {
                info!(
                    host = %settings.host,
                    port = settings.port,
                    "Logged in to AMI"
                );
                return Ok(Connection { reader, writer });
            }
            let message = frame.get("message").cloned().unwrap_or_default();
            return Err(AmiError::LoginRejected(message));
        }
    }
}

/// Reads frames and forwards events until disconnect or shutdown.
async fn pump(conn: Connection, tx: &mpsc::Sender<AmiEvent>) -> PumpEnd {
    let Connection { mut reader, writer } = conn;
    let writer = Arc::new(Mutex::new(writer));
    let ping_task = tokio::spawn(ping_loop(Arc::clone(&writer)));

    let end = loop {
        match read_frame(&mut reader).await {
            Ok(frame) => {
                if let Some(event) = AmiEvent::from_frame(&frame) {
                    if tx.send(event).await.is_err() {
                        break PumpEnd::Shutdown;
                    }
                }
            }
            Err(e) => break PumpEnd::Lost(e),
        }
    };

    ping_task.abort();
    if matches!(end, PumpEnd::Shutdown) {
        // Best effort; the socket is dropped right after.
        let _ = write_action(&mut *writer.lock().await, "Logoff", &[]).await;
    }
    end
}

/// Sends a keepalive ping until the writer fails.
async fn ping_loop(writer: Arc<Mutex<OwnedWriteHalf>>) {
    let mut ticker = interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = write_action(&mut *writer.lock().await, "Ping", &[]).await {
            // The reader will observe the broken connection and reconnect.
            debug!(error = %e, "Keepalive write failed");
            return;
        }
    }
}

/// Writes one AMI action packet.
async fn write_action<W>(
    writer: &mut W,
    action: &str,
    fields: &[(&str, &str)],
) -> Result<(), AmiError>
where
    W: AsyncWrite + Unpin,
{
    let mut packet = format!("Action: {action}\r\n");
    for (key, value) in fields {
        packet.push_str(key);
        packet.push_str(": ");
        packet.push_str(value);
        packet.push_str("\r\n");
    }
    packet.push_str("\r\n");

    writer.write_all(packet.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame: `Key: Value` lines up to a blank line.
///
/// Keys are lowercased; AMI key casing is not reliable across versions.
/// Lines without a colon are ignored.
async fn read_frame<R>(reader: &mut R) -> Result<Frame, AmiError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Frame::new();

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(AmiError::Disconnected);
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if frame.is_empty() {
                // Stray separator between frames.
                continue;
            }
            return Ok(frame);
        }

        if let Some((key, value)) = line.split_once(':') {
            frame.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
}

/// Adds ±25% jitter to a delay so reconnecting clients do not stampede.
fn add_jitter(duration: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * JITTER_FACTOR;
    let jitter = rng.random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((duration.as_secs_f64() + jitter).max(0.1))
}
