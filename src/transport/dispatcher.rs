// MIT License

//! Command/response correlation over the framed transport.
//!
//! One command is in flight at a time; callers serialize on an internal
//! mutex. Each send allocates the next wrapping sequence number and parks a
//! oneshot sender that the reader task completes when the matching `'R'`
//! frame arrives.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use crate::error::{Result, TexecomError};
use crate::frame::{self, ACK};
use crate::protocol::is_mutating;

/// Default per-attempt response budget.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(3500);
/// Total attempts before a command fails with `Timeout`.
pub const COMMAND_ATTEMPTS: u32 = 5;

pub struct CommandDispatcher {
    /// Held for the duration of one `call`: commands reach the wire in the
    /// order callers acquire this lock.
    call_lock: Mutex<()>,
    writer: Mutex<OwnedWriteHalf>,
    pending: StdMutex<HashMap<u8, oneshot::Sender<Vec<u8>>>>,
    sequence: AtomicU8,
    connected: AtomicBool,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            call_lock: Mutex::new(()),
            writer: Mutex::new(writer),
            pending: StdMutex::new(HashMap::new()),
            sequence: AtomicU8::new(0),
            connected: AtomicBool::new(true),
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send a command and wait for its response payload.
    pub async fn call(&self, cmd: u8, body: &[u8]) -> Result<Vec<u8>> {
        self.call_with_timeout(cmd, body, self.timeout).await
    }

    /// Send a command with an explicit per-attempt timeout.
    pub async fn call_with_timeout(
        &self,
        cmd: u8,
        body: &[u8],
        per_attempt: Duration,
    ) -> Result<Vec<u8>> {
        let _guard = self.call_lock.lock().await;

        for attempt in 1..=COMMAND_ATTEMPTS {
            if !self.is_connected() {
                return Err(TexecomError::NotConnected);
            }

            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(seq, tx);

            let packet = frame::encode_command(seq, cmd, body);
            debug!("Sending command {:#04x} (seq {}): {:02x?}", cmd, seq, packet);

            {
                let mut writer = self.writer.lock().await;
                if let Err(e) = writer.write_all(&packet).await {
                    self.pending.lock().unwrap().remove(&seq);
                    self.connected.store(false, Ordering::Release);
                    return Err(TexecomError::Transport(e));
                }
            }

            match timeout(per_attempt, rx).await {
                Ok(Ok(payload)) => {
                    debug!("Response for command {:#04x} (seq {}): {} bytes", cmd, seq, payload.len());
                    if is_mutating(cmd) && payload.first() != Some(&ACK) {
                        return Err(TexecomError::Protocol(format!(
                            "command {:#04x} not acknowledged: {:02x?}",
                            cmd,
                            payload.first()
                        )));
                    }
                    return Ok(payload);
                }
                Ok(Err(_)) => {
                    // Reader dropped the sender: connection went down mid-call.
                    return Err(TexecomError::NotConnected);
                }
                Err(_) => {
                    self.pending.lock().unwrap().remove(&seq);
                    warn!(
                        "Command {:#04x} (seq {}) timed out (attempt {}/{})",
                        cmd, seq, attempt, COMMAND_ATTEMPTS
                    );
                }
            }
        }

        Err(TexecomError::Timeout { cmd, attempts: COMMAND_ATTEMPTS })
    }

    /// Route a response payload to the caller waiting on `seq`.
    /// Responses with no outstanding command are dropped as stale.
    pub fn complete(&self, seq: u8, payload: Vec<u8>) {
        let sender = self.pending.lock().unwrap().remove(&seq);
        match sender {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            None => warn!("Dropping stale response for seq {}", seq),
        }
    }

    /// Mark the transport as down and fail every in-flight call with
    /// `NotConnected` (their oneshot senders are dropped).
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.pending.lock().unwrap().clear();
    }

    /// Half-close the write side so the panel sees the disconnect promptly.
    pub async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
