// MIT License

//! One TCP connection to the panel: the connect ceremony, the reader task,
//! and teardown. Reconnection policy lives with the panel supervisor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;
use tokio::time::{Duration, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TexecomError};
use crate::event::{EventReceiver, EventSender, event_channel};
use crate::frame::{self, Decoded, FrameType};
use crate::protocol::{self, SERIAL_PROBE, SERIAL_PROBE_REPLY};
use crate::transport::dispatcher::CommandDispatcher;

/// TCP dial budget.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// The panel is slow to enter UDL mode after accepting the connection.
const UDL_QUIESCENCE: Duration = Duration::from_secs(2);
/// Budget for the un-framed serial-number probe response.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Read poll interval; bounds how long disconnect takes to unblock the reader.
const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Bounded queue between the reader and the panel model.
const EVENT_QUEUE_CAPACITY: usize = 100;

/// A live connection to the panel.
pub struct PanelSession {
    dispatcher: Arc<CommandDispatcher>,
    serial_number: String,
    events: Option<EventReceiver>,
    /// Panel zone count, 0 until identification has run. The reader uses it
    /// to size zone numbers in event frames.
    zone_count: Arc<AtomicU16>,
    shutdown_tx: watch::Sender<bool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl PanelSession {
    /// Dial the panel and complete the pre-login ceremony: a quiescence
    /// delay, then the raw serial-number probe. Framed traffic only starts
    /// once the probe has answered.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        info!("Connecting to panel at {}:{}", host, port);

        let mut stream = match timeout(DIAL_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(TexecomError::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )));
            }
        };
        debug!("TCP socket connected");

        sleep(UDL_QUIESCENCE).await;

        let serial_number = probe_serial_number(&mut stream).await?;
        info!("Panel serial number: {}", serial_number);

        let (read_half, write_half) = stream.into_split();
        let dispatcher = Arc::new(CommandDispatcher::new(write_half));
        let (event_tx, event_rx) = event_channel(EVENT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let zone_count = Arc::new(AtomicU16::new(0));

        let reader_handle = tokio::spawn(reader_loop(
            read_half,
            dispatcher.clone(),
            event_tx,
            zone_count.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            dispatcher,
            serial_number,
            events: Some(event_rx),
            zone_count,
            shutdown_tx,
            reader_handle,
        })
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// The 14-hex-digit serial from the probe.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Record the panel's zone count once identification has run, so the
    /// reader can size zone numbers in event frames.
    pub fn set_zone_count(&self, count: u16) {
        self.zone_count.store(count, Ordering::Relaxed);
    }

    /// The event stream for this connection. Yields `None` once the reader
    /// exits; can only be taken once.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events.take()
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    /// Tear the connection down. Idempotent: in-flight calls fail with
    /// `NotConnected`, the reader unblocks within one read timeout and closes
    /// the event channel on its way out.
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        self.dispatcher.mark_disconnected();
        self.dispatcher.shutdown_writer().await;
    }
}

impl Drop for PanelSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.reader_handle.abort();
    }
}

/// Send the raw 3-byte probe and decode the serial from the response.
async fn probe_serial_number(stream: &mut TcpStream) -> Result<String> {
    debug!("Sending serial number probe");
    stream.write_all(&SERIAL_PROBE).await?;

    let mut buf = [0u8; 64];
    let n = match timeout(PROBE_TIMEOUT, stream.read(&mut buf)).await {
        Ok(res) => res?,
        Err(_) => {
            return Err(TexecomError::Protocol(
                "no response to serial number probe".into(),
            ));
        }
    };

    if n < 9 || buf[..2] != SERIAL_PROBE_REPLY {
        return Err(TexecomError::Protocol(format!(
            "unexpected serial number response: {:02x?}",
            &buf[..n]
        )));
    }

    // The serial is the last 7 bytes, rendered as lowercase hex.
    Ok(buf[n - 7..n]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Owns the read side of the socket. Decodes frames from the byte stream and
/// routes them: responses to the dispatcher, messages to the event queue.
async fn reader_loop(
    mut read_half: OwnedReadHalf,
    dispatcher: Arc<CommandDispatcher>,
    event_tx: EventSender,
    zone_count: Arc<AtomicU16>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; 4096];
    let mut acc: Vec<u8> = Vec::new();
    let mut unknown_events: u64 = 0;

    loop {
        if *shutdown_rx.borrow() {
            debug!("Reader: shutdown requested");
            break;
        }

        tokio::select! {
            res = timeout(READ_TIMEOUT, read_half.read(&mut buf)) => match res {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    info!("Reader: connection closed by panel");
                    break;
                }
                Ok(Ok(n)) => {
                    acc.extend_from_slice(&buf[..n]);
                    drain_frames(
                        &mut acc,
                        &dispatcher,
                        &event_tx,
                        zone_count.load(Ordering::Relaxed),
                        &mut unknown_events,
                    );
                }
                Ok(Err(e)) => {
                    error!("Reader: read error: {}", e);
                    break;
                }
            },
            _ = shutdown_rx.changed() => {}
        }
    }

    dispatcher.mark_disconnected();
    event_tx.close();
    debug!("Reader: exited");
}

/// Decode and dispatch every complete frame buffered so far.
fn drain_frames(
    acc: &mut Vec<u8>,
    dispatcher: &CommandDispatcher,
    event_tx: &EventSender,
    zone_count: u16,
    unknown_events: &mut u64,
) {
    loop {
        match frame::try_decode(acc) {
            Decoded::Frame(frame, consumed) => {
                acc.drain(..consumed);
                match frame.frame_type {
                    FrameType::Response => dispatcher.complete(frame.seq, frame.payload),
                    FrameType::Message => match protocol::parse_event(&frame.payload, zone_count) {
                        Some(event) => event_tx.send(event),
                        None => {
                            *unknown_events += 1;
                            warn!(
                                "Dropping undecodable event frame {:02x?} (total: {})",
                                frame.payload, unknown_events
                            );
                        }
                    },
                    FrameType::Command => {
                        warn!("Ignoring unexpected command frame from panel");
                    }
                }
            }
            Decoded::NeedMore => break,
            Decoded::Skip(n) => {
                acc.drain(..n);
            }
        }
    }
}
