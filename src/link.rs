use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::LinkConfig;
use crate::engine::GOOD_CONTACT_THRESHOLD;
use crate::error::{DecodeError, LinkError};
use crate::parse::{decode_line, Frame, LineAccumulator};
use crate::protocol::encode_handshake;
use crate::types::{LinkStats, SensorEvent};

/// Socket read size.  Raw-wave lines are ~15 bytes, so one read usually
/// carries dozens of records.
const READ_CHUNK: usize = 4096;

// ── SensorLink ────────────────────────────────────────────────────────────────

/// TCP client for a ThinkGear Connector.
///
/// Each call to [`connect`](SensorLink::connect) starts one connection
/// attempt on a background task:
///
/// 1. open the socket to `host:port`
/// 2. write the JSON configuration handshake
/// 3. read `\n`-terminated records until the bridge closes the stream, the
///    socket fails, or [`LinkHandle::disconnect`] is called
///
/// Decoded samples and connectivity changes arrive on the returned
/// [`LinkEvents`].  Garbled lines are logged and dropped inside the loop;
/// they never interrupt the stream.  There is no automatic retry: after a
/// terminal event the caller decides whether to connect again.
pub struct SensorLink {
    config: LinkConfig,
}

impl SensorLink {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Start a connection attempt and return immediately.
    ///
    /// The connect, handshake and read loop all run on a spawned task, so
    /// the caller never blocks.  A refused connection is reported as a single
    /// [`SensorEvent::Error`] on the returned event stream.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn connect(&self) -> (LinkEvents, LinkHandle) {
        let (tx, rx) = mpsc::channel::<SensorEvent>(self.config.channel_capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(LinkStats::default()));

        let events = LinkEvents {
            rx,
            stop: stop_tx.subscribe(),
        };
        let task = tokio::spawn(run_link(
            self.config.clone(),
            tx,
            stop_rx,
            Arc::clone(&stats),
        ));
        let handle = LinkHandle {
            endpoint: self.config.endpoint(),
            stop: stop_tx,
            task: Mutex::new(Some(task)),
            stats,
        };
        (events, handle)
    }
}

// ── LinkEvents ────────────────────────────────────────────────────────────────

/// Receiving end of a connection attempt.
///
/// Once [`LinkHandle::disconnect`] has been called, `recv` returns `None`
/// even if events were still queued, so nothing reaches the host after a
/// local disconnect.
pub struct LinkEvents {
    rx: mpsc::Receiver<SensorEvent>,
    stop: watch::Receiver<bool>,
}

impl LinkEvents {
    /// Wrap a channel fed by something other than a [`SensorLink`]
    /// (a simulator, a replay, a test).
    pub fn from_receiver(rx: mpsc::Receiver<SensorEvent>) -> Self {
        let (_, stop) = watch::channel(false);
        Self { rx, stop }
    }

    /// Wait for the next event.  `None` once the attempt has ended and every
    /// event has been delivered, or immediately after a local disconnect.
    pub async fn recv(&mut self) -> Option<SensorEvent> {
        if self.stopped() {
            return None;
        }
        let event = self.rx.recv().await?;
        if self.stopped() {
            return None;
        }
        Some(event)
    }

    /// Non-blocking variant of [`recv`](LinkEvents::recv) for polling hosts.
    pub fn try_recv(&mut self) -> Result<SensorEvent, TryRecvError> {
        if self.stopped() {
            return Err(TryRecvError::Disconnected);
        }
        self.rx.try_recv()
    }

    fn stopped(&mut self) -> bool {
        if *self.stop.borrow() {
            self.rx.close();
            return true;
        }
        false
    }
}

// ── LinkHandle ────────────────────────────────────────────────────────────────

/// Controls a running connection attempt.
///
/// Dropping every handle stops the read loop just like
/// [`disconnect`](LinkHandle::disconnect), without waiting for it.
pub struct LinkHandle {
    endpoint: String,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<LinkStats>>,
}

impl LinkHandle {
    /// `host:port` this attempt connects to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the read loop and wait until it has released the socket.
    ///
    /// The loop races every read against the stop signal, so this returns
    /// promptly even when the bridge is silent.  Calling it again, or after
    /// the attempt already ended, is a no-op.
    pub async fn disconnect(&self) {
        self.stop.send_replace(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Link task for {} ended abnormally: {e}", self.endpoint);
            }
            info!("Disconnected from sensor bridge at {}", self.endpoint);
        }
    }

    /// `true` while the background task is still connecting or streaming.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Counters from the read loop.
    pub fn stats(&self) -> LinkStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Background task ───────────────────────────────────────────────────────────

async fn run_link(
    config: LinkConfig,
    tx: mpsc::Sender<SensorEvent>,
    mut stop: watch::Receiver<bool>,
    stats: Arc<Mutex<LinkStats>>,
) {
    let endpoint = config.endpoint();
    info!("Connecting to sensor bridge at {endpoint} …");

    let connected = tokio::select! {
        biased;
        _ = stop.changed() => {
            debug!("Link: stop requested while connecting to {endpoint}");
            return;
        }
        res = TcpStream::connect(endpoint.as_str()) => res,
    };
    let mut stream = match connected {
        Ok(s) => s,
        Err(source) => {
            warn!("Link: connect to {endpoint} failed: {source}");
            let err = LinkError::ConnectionRefused {
                addr: endpoint,
                source,
            };
            emit(&tx, &mut stop, SensorEvent::Error(err)).await;
            return;
        }
    };

    let peer = match stream.peer_addr() {
        Ok(a) => a,
        Err(e) => {
            warn!("Link: {endpoint} dropped right after connect: {e}");
            emit(&tx, &mut stop, SensorEvent::Error(LinkError::Read(e))).await;
            return;
        }
    };

    if let Err(source) = handshake(&mut stream).await {
        warn!("Link: handshake with {peer} failed: {source}");
        let err = LinkError::Handshake { addr: peer, source };
        emit(&tx, &mut stop, SensorEvent::Error(err)).await;
        return;
    }
    info!("Connected to sensor bridge at {peer}; handshake sent");

    if !emit(&tx, &mut stop, SensorEvent::Connected(peer)).await {
        return;
    }

    let mut reader = LineReader {
        tx: &tx,
        stats: &stats,
        max_line: config.max_line_bytes,
    };
    let mut acc = LineAccumulator::new(config.max_line_bytes);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let read = tokio::select! {
            biased;
            _ = stop.changed() => {
                debug!("Link: stop requested, leaving read loop for {peer}");
                return;
            }
            res = stream.read(&mut buf) => res,
        };

        match read {
            Ok(0) => {
                if let Some(frame) = acc.finish() {
                    if !reader.forward(frame, &mut stop).await {
                        return;
                    }
                }
                let s = *stats.lock().unwrap_or_else(PoisonError::into_inner);
                info!(
                    "Sensor bridge at {peer} closed the stream after {} lines ({} samples, {} dropped)",
                    s.lines, s.samples, s.decode_errors
                );
                emit(&tx, &mut stop, SensorEvent::StreamClosed).await;
                return;
            }
            Ok(n) => {
                for frame in acc.push(&buf[..n]) {
                    if !reader.forward(frame, &mut stop).await {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Link: read from {peer} failed: {e}");
                emit(&tx, &mut stop, SensorEvent::Error(LinkError::Read(e))).await;
                return;
            }
        }
    }
}

async fn handshake(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    stream.write_all(&encode_handshake()).await?;
    stream.flush().await
}

/// Send `event` unless a stop is requested first.  Returns `false` when the
/// loop should end (stop requested or the receiver is gone).
async fn emit(
    tx: &mpsc::Sender<SensorEvent>,
    stop: &mut watch::Receiver<bool>,
    event: SensorEvent,
) -> bool {
    if *stop.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        _ = stop.changed() => false,
        res = tx.send(event) => res.is_ok(),
    }
}

/// Per-connection decode state: turns frames into events and keeps counters.
struct LineReader<'a> {
    tx: &'a mpsc::Sender<SensorEvent>,
    stats: &'a Mutex<LinkStats>,
    max_line: usize,
}

impl LineReader<'_> {
    async fn forward(&mut self, frame: Frame, stop: &mut watch::Receiver<bool>) -> bool {
        let decoded = match frame {
            Frame::Line(bytes) => {
                if bytes.trim_ascii().is_empty() {
                    return true;
                }
                decode_line(&bytes)
            }
            Frame::Overflow(len) => Err(DecodeError::LineTooLong {
                len,
                max: self.max_line,
            }),
        };

        let sample = {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.lines += 1;
            match decoded {
                Ok(Some(sample)) => {
                    stats.samples += 1;
                    if sample.esense.is_some() {
                        stats.epochs += 1;
                        if sample.signal_level() < GOOD_CONTACT_THRESHOLD {
                            stats.good_contact_seen = true;
                        }
                    }
                    if stats.lines <= 3 || stats.lines % 5000 == 0 {
                        info!(
                            "Link: line #{} (samples {}, epochs {}, dropped {})",
                            stats.lines, stats.samples, stats.epochs, stats.decode_errors
                        );
                    }
                    sample
                }
                Ok(None) => return true,
                Err(e) => {
                    stats.decode_errors += 1;
                    debug!("Link: dropped line: {e}");
                    return true;
                }
            }
        };

        emit(self.tx, stop, SensorEvent::Sample(sample)).await
    }
}
